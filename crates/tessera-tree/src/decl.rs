//! Declarations referenced from the tree.

use bitflags::bitflags;
use tessera_core::{MachineType, TypeHash};

use crate::DeclId;

/// A resolved declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Variable(VariableInfo),
    Field(FieldInfo),
    Property(PropertyInfo),
    Function(FunctionInfo),
    Class(ClassInfo),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Variable(v) => &v.name,
            Declaration::Field(f) => &f.name,
            Declaration::Property(p) => &p.name,
            Declaration::Function(f) => &f.name,
            Declaration::Class(c) => &c.name,
        }
    }
}

/// Local variable, parameter, loop parameter or catch parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub ty: MachineType,
    /// Captured and mutated by a closure, so it lives in a heap cell.
    pub shared: bool,
}

/// A field stored directly in an object, or a static field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub owner: TypeHash,
    pub name: String,
    pub ty: MachineType,
    pub is_static: bool,
}

impl FieldInfo {
    pub fn hash(&self) -> TypeHash {
        TypeHash::from_field(self.owner, &self.name)
    }
}

/// A property accessed through optional getter/setter functions.
///
/// Missing accessors fall back to the backing field.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub owner: TypeHash,
    pub name: String,
    pub ty: MachineType,
    pub getter: Option<DeclId>,
    pub setter: Option<DeclId>,
    pub backing_field: Option<DeclId>,
    pub is_static: bool,
}

bitflags! {
    /// Function modifiers relevant to code generation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionFlags: u16 {
        /// No dispatch receiver.
        const STATIC = 1 << 0;
        /// Call sites may be inlined by the call policy.
        const INLINE = 1 << 1;
        /// Self calls in tail position become jumps.
        const TAILREC = 1 << 2;
        /// Instance constructor.
        const CONSTRUCTOR = 1 << 3;
        /// Not overridable; dispatched without a virtual lookup.
        const FINAL = 1 << 4;
        /// Private member; dispatched without a virtual lookup.
        const PRIVATE = 1 << 5;
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub decl: DeclId,
    pub name: String,
    pub ty: MachineType,
    pub has_default: bool,
    /// Variadic parameter; its type is the array type.
    pub vararg: bool,
}

/// A function, method, constructor or closure body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    /// Declaring class; `None` for top-level functions.
    pub owner: Option<TypeHash>,
    pub params: Vec<ParamInfo>,
    pub return_type: MachineType,
    /// Type of the extension receiver, for extension functions.
    pub extension_receiver: Option<MachineType>,
    pub flags: FunctionFlags,
    /// Name of the intrinsic the call policy may substitute, if any.
    pub intrinsic: Option<String>,
    /// Enclosing class whose instance is passed as a hidden argument
    /// (inner class constructors).
    pub outer_instance: Option<TypeHash>,
}

impl FunctionInfo {
    pub fn new(name: impl Into<String>, return_type: MachineType) -> Self {
        Self {
            name: name.into(),
            owner: None,
            params: Vec::new(),
            return_type,
            extension_receiver: None,
            flags: FunctionFlags::STATIC,
            intrinsic: None,
            outer_instance: None,
        }
    }

    /// Identity used at call sites.
    pub fn hash(&self) -> TypeHash {
        let params: Vec<TypeHash> = self
            .extension_receiver
            .iter()
            .copied()
            .chain(self.params.iter().map(|p| p.ty))
            .map(MachineType::type_hash)
            .collect();
        match self.owner {
            Some(owner) if self.is_constructor() => TypeHash::from_constructor(owner, &params),
            Some(owner) => TypeHash::from_method(owner, &self.name, &params),
            None => TypeHash::from_function(&self.name, &params),
        }
    }

    /// Identity of the synthetic stub that fills in default arguments.
    pub fn default_stub_hash(&self) -> TypeHash {
        let name = format!("{}$default", self.name);
        match self.owner {
            Some(owner) => TypeHash::from_method(owner, &name, &[]),
            None => TypeHash::from_function(&name, &[]),
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(FunctionFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.flags.contains(FunctionFlags::CONSTRUCTOR)
    }

    /// Whether calls pass `this` in slot 0.
    pub fn has_dispatch_receiver(&self) -> bool {
        !self.is_static() && !self.is_constructor() && self.owner.is_some()
    }

    pub fn has_defaults(&self) -> bool {
        self.params.iter().any(|p| p.has_default)
    }
}

/// A class, with its link to the enclosing instance for inner classes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub hash: TypeHash,
    pub name: String,
    /// Class of the enclosing instance and the field holding it.
    pub outer: Option<(TypeHash, String)>,
}
