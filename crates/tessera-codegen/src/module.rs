//! Compilation outputs: functions, closure classes and the module holding them.

use rustc_hash::FxHashMap;
use tessera_core::{MachineType, Result, TypeHash};
use tessera_tree::DeclId;
use tracing::trace;

use crate::bytecode::{BytecodeChunk, MemberRef};

/// Bytecode and frame layout of one function.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub owner: Option<TypeHash>,
    /// Identity call sites refer to.
    pub hash: TypeHash,
    pub decl: DeclId,
    /// Slot 0 receives the instance (method, constructor or closure body).
    pub has_this: bool,
    /// Incoming values after the instance: extension receiver, then parameters.
    pub params: Vec<MachineType>,
    pub return_type: MachineType,
    /// Local slots the frame needs.
    pub max_locals: u16,
    pub chunk: BytecodeChunk,
}

impl CompiledFunction {
    /// Reference used to call this function.
    pub fn member_ref(&self) -> MemberRef {
        MemberRef::new(self.owner.unwrap_or(TypeHash::EMPTY), self.name.as_str(), self.hash)
    }
}

/// Constructor parameter of a closure class and the field it initializes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureField {
    pub owner: TypeHash,
    pub name: String,
    pub ty: MachineType,
}

impl ClosureField {
    pub fn member_ref(&self) -> MemberRef {
        MemberRef::field(self.owner, &self.name)
    }
}

/// How a closure class implements its `invoke`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClosureStrategy {
    /// Runs a compiled lambda body.
    FunctionBody,
    /// Runs a compiled lambda body behind a single-abstract-method interface.
    SamWrapper { interface: TypeHash },
    /// Forwards its arguments to a function.
    FunctionReference {
        target: MemberRef,
        /// The first argument is the dispatch receiver.
        dispatch: bool,
    },
    /// Reads a property through its getter or backing field.
    PropertyReference {
        getter: Option<MemberRef>,
        field: Option<MemberRef>,
        is_static: bool,
    },
    /// Object literal; it has no `invoke`, only its member functions.
    ObjectLiteral,
}

/// Superclass constructor an object literal's constructor chains to.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperCall {
    pub constructor: MemberRef,
    /// Parameters passed after the captured values.
    pub params: Vec<MachineType>,
}

/// A generated closure class request.
#[derive(Debug, Clone)]
pub struct ClosureClass {
    pub class: TypeHash,
    pub superclass: Option<TypeHash>,
    pub strategy: ClosureStrategy,
    /// Constructor parameters in push order.
    pub constructor: Vec<ClosureField>,
    pub super_call: Option<SuperCall>,
    pub invoke: Option<CompiledFunction>,
    /// Member functions of an object literal.
    pub methods: Vec<CompiledFunction>,
}

impl ClosureClass {
    /// Reference to the constructor taking [`ClosureClass::constructor`],
    /// then the superclass constructor arguments.
    pub fn constructor_ref(&self) -> MemberRef {
        let extra = self.super_call.as_ref().map_or(&[][..], |s| s.params.as_slice());
        constructor_ref(self.class, &self.constructor, extra)
    }

    pub fn method(&self, hash: TypeHash) -> Option<&CompiledFunction> {
        self.methods.iter().find(|m| m.hash == hash)
    }
}

pub(crate) fn constructor_ref(
    class: TypeHash,
    fields: &[ClosureField],
    extra: &[MachineType],
) -> MemberRef {
    let params: Vec<TypeHash> = fields
        .iter()
        .map(|f| f.ty)
        .chain(extra.iter().copied())
        .map(MachineType::type_hash)
        .collect();
    MemberRef::new(class, "<init>", TypeHash::from_constructor(class, &params))
}

/// Receiver of closure class requests.
pub trait ClassSink {
    fn define_closure(&mut self, closure: ClosureClass) -> Result<()>;
}

/// All functions and closure classes of one compilation.
#[derive(Debug, Default)]
pub struct CompiledModule {
    functions: Vec<CompiledFunction>,
    closures: Vec<ClosureClass>,
    function_index: FxHashMap<TypeHash, usize>,
    closure_index: FxHashMap<TypeHash, usize>,
}

impl CompiledModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: CompiledFunction) {
        self.function_index.insert(function.hash, self.functions.len());
        self.functions.push(function);
    }

    pub fn functions(&self) -> &[CompiledFunction] {
        &self.functions
    }

    pub fn function(&self, hash: TypeHash) -> Option<&CompiledFunction> {
        self.function_index.get(&hash).map(|&i| &self.functions[i])
    }

    /// First function named `name`.
    pub fn function_named(&self, name: &str) -> Option<&CompiledFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn closures(&self) -> &[ClosureClass] {
        &self.closures
    }

    pub fn closure(&self, class: TypeHash) -> Option<&ClosureClass> {
        self.closure_index.get(&class).map(|&i| &self.closures[i])
    }
}

impl ClassSink for CompiledModule {
    fn define_closure(&mut self, closure: ClosureClass) -> Result<()> {
        // Finally replays compile the same lambda again; the first copy is kept.
        if self.closure_index.contains_key(&closure.class) {
            trace!(class = ?closure.class, "closure class already defined");
            return Ok(());
        }
        self.closure_index.insert(closure.class, self.closures.len());
        self.closures.push(closure);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closure(name: &str) -> ClosureClass {
        ClosureClass {
            class: TypeHash::from_name(name),
            superclass: None,
            strategy: ClosureStrategy::FunctionBody,
            constructor: vec![ClosureField {
                owner: TypeHash::from_name(name),
                name: "$x".to_string(),
                ty: MachineType::INT,
            }],
            super_call: None,
            invoke: None,
            methods: Vec::new(),
        }
    }

    #[test]
    fn closures_are_defined_once() {
        let mut module = CompiledModule::new();
        module.define_closure(closure("Lambda$1")).unwrap();
        module.define_closure(closure("Lambda$1")).unwrap();
        module.define_closure(closure("Lambda$2")).unwrap();
        assert_eq!(module.closures().len(), 2);
        assert!(module.closure(TypeHash::from_name("Lambda$2")).is_some());
    }

    #[test]
    fn constructor_identity_follows_layout() {
        let a = closure("Lambda$1");
        let mut b = closure("Lambda$1");
        b.constructor[0].ty = MachineType::LONG;
        assert_ne!(a.constructor_ref().hash, b.constructor_ref().hash);
        assert_eq!(a.constructor_ref().name.as_ref(), "<init>");
    }

    #[test]
    fn super_arguments_extend_the_constructor_identity() {
        let plain = closure("Object$1");
        let mut chained = closure("Object$1");
        let base = TypeHash::from_name("Base");
        chained.super_call = Some(SuperCall {
            constructor: MemberRef::new(base, "<init>", TypeHash::from_constructor(base, &[])),
            params: vec![MachineType::INT],
        });
        assert_ne!(plain.constructor_ref().hash, chained.constructor_ref().hash);
    }
}
