//! Resolution tables produced by the front end.
//!
//! The code generator treats [`Bindings`] as read-only. Every lookup returns
//! an `Option`; a `None` where the generator needs data is a front-end
//! contract violation and is reported as such by the caller.

use rustc_hash::{FxHashMap, FxHashSet};
use tessera_core::{MachineType, TypeHash};

use crate::{
    ClassInfo, DeclId, Declaration, FieldInfo, FunctionInfo, Literal, NodeId, PropertyInfo,
    VariableInfo,
};

/// How one declared parameter receives its value at a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedArgument {
    /// The call's argument at this index.
    Expression(usize),
    /// Omitted; the callee's default applies.
    Default,
    /// Variadic parameter fed by these arguments, in order.
    Vararg(Vec<VarargElement>),
}

/// One source argument feeding a variadic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarargElement {
    pub argument: usize,
    /// `*array` spread argument.
    pub spread: bool,
}

/// Overload and argument mapping chosen for a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCall {
    pub callee: DeclId,
    /// One entry per declared parameter, in declaration order.
    pub arguments: Vec<ResolvedArgument>,
    /// `super.f()` calls bypass virtual dispatch.
    pub is_super: bool,
}

/// One captured variable of a closure.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedVariable {
    pub decl: DeclId,
    pub name: String,
    pub ty: MachineType,
    /// Captured through its shared cell.
    pub shared: bool,
}

/// What a closure class receives at construction, in constructor order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureDescriptor {
    /// Enclosing instance, by class.
    pub this: Option<TypeHash>,
    /// Enclosing extension receiver.
    pub receiver: Option<MachineType>,
    pub variables: Vec<CapturedVariable>,
    /// Generated closure class this one extends.
    pub superclass: Option<TypeHash>,
}

/// The code a closure class wraps.
#[derive(Debug, Clone, PartialEq)]
pub enum ClosureKind {
    /// A lambda or anonymous function body.
    Lambda {
        function: DeclId,
        /// Passed to an inline function; returns may target enclosing functions.
        inlined: bool,
        /// Converted to this single-abstract-method interface.
        sam_interface: Option<TypeHash>,
    },
    /// `::function`
    FunctionReference { target: DeclId },
    /// `::property`
    PropertyReference { property: DeclId },
    /// `object : Base() { ... }`; members are compiled as methods of the class.
    ObjectLiteral,
}

/// Closure class generated for a lambda or callable reference node.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureInfo {
    pub class: TypeHash,
    pub kind: ClosureKind,
}

/// Closure class and holder variable of a local named function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFunction {
    pub class: TypeHash,
    /// Local variable the closure instance is stored in.
    pub variable: DeclId,
}

/// Protocol used by a `for` loop over a non-array, non-literal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRange {
    /// `iterator()`, then `hasNext()` / `next()` on the result.
    Iterator {
        iterator: DeclId,
        has_next: DeclId,
        next: DeclId,
    },
    /// Closed range object with `first` / `last` getters.
    Range { first: DeclId, last: DeclId },
    /// Stepped progression with `first` / `last` / `step` getters.
    Progression {
        first: DeclId,
        last: DeclId,
        step: DeclId,
    },
}

/// What a `this` expression refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThisTarget {
    /// Instance of this class, possibly an enclosing one.
    Class(TypeHash),
    /// Extension receiver of the enclosing extension function.
    ExtensionReceiver,
}

/// `get`/`set` operator functions used by `a[i]` on non-arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedAccess {
    pub getter: Option<DeclId>,
    pub setter: Option<DeclId>,
}

/// All resolution data for one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    declarations: Vec<Declaration>,
    types: FxHashMap<NodeId, MachineType>,
    references: FxHashMap<NodeId, DeclId>,
    calls: FxHashMap<NodeId, ResolvedCall>,
    closures: FxHashMap<NodeId, ClosureInfo>,
    captures: FxHashMap<TypeHash, CaptureDescriptor>,
    constants: FxHashMap<NodeId, Literal>,
    exhaustive: FxHashSet<NodeId>,
    tail_calls: FxHashSet<NodeId>,
    loop_ranges: FxHashMap<NodeId, LoopRange>,
    this_targets: FxHashMap<NodeId, ThisTarget>,
    indexed: FxHashMap<NodeId, IndexedAccess>,
    type_operands: FxHashMap<NodeId, MachineType>,
    local_functions: FxHashMap<DeclId, LocalFunction>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    // ==========================================================================
    // Declarations
    // ==========================================================================

    pub fn declare(&mut self, declaration: Declaration) -> DeclId {
        let id = DeclId(self.declarations.len() as u32);
        self.declarations.push(declaration);
        id
    }

    pub fn declaration(&self, id: DeclId) -> Option<&Declaration> {
        self.declarations.get(id.0 as usize)
    }

    pub fn declaration_mut(&mut self, id: DeclId) -> Option<&mut Declaration> {
        self.declarations.get_mut(id.0 as usize)
    }

    pub fn variable(&self, id: DeclId) -> Option<&VariableInfo> {
        match self.declaration(id)? {
            Declaration::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn field(&self, id: DeclId) -> Option<&FieldInfo> {
        match self.declaration(id)? {
            Declaration::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn property(&self, id: DeclId) -> Option<&PropertyInfo> {
        match self.declaration(id)? {
            Declaration::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn function(&self, id: DeclId) -> Option<&FunctionInfo> {
        match self.declaration(id)? {
            Declaration::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self, id: DeclId) -> Option<&mut FunctionInfo> {
        match self.declaration_mut(id)? {
            Declaration::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Class declaration by type identity.
    pub fn class(&self, hash: TypeHash) -> Option<&ClassInfo> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::Class(c) if c.hash == hash => Some(c),
            _ => None,
        })
    }

    // ==========================================================================
    // Per-node tables
    // ==========================================================================

    /// Machine type of an expression node's value.
    pub fn type_of(&self, node: NodeId) -> Option<MachineType> {
        self.types.get(&node).copied()
    }

    pub fn set_type(&mut self, node: NodeId, ty: MachineType) {
        self.types.insert(node, ty);
    }

    /// Declaration a node refers to or declares.
    pub fn reference(&self, node: NodeId) -> Option<DeclId> {
        self.references.get(&node).copied()
    }

    pub fn set_reference(&mut self, node: NodeId, decl: DeclId) {
        self.references.insert(node, decl);
    }

    pub fn call(&self, node: NodeId) -> Option<&ResolvedCall> {
        self.calls.get(&node)
    }

    pub fn set_call(&mut self, node: NodeId, call: ResolvedCall) {
        self.calls.insert(node, call);
    }

    pub fn closure(&self, node: NodeId) -> Option<&ClosureInfo> {
        self.closures.get(&node)
    }

    pub fn set_closure(&mut self, node: NodeId, closure: ClosureInfo) {
        self.closures.insert(node, closure);
    }

    /// Capture descriptor of a generated closure class.
    pub fn captures(&self, class: TypeHash) -> Option<&CaptureDescriptor> {
        self.captures.get(&class)
    }

    pub fn set_captures(&mut self, class: TypeHash, captures: CaptureDescriptor) {
        self.captures.insert(class, captures);
    }

    /// Folded value of a compile-time constant expression.
    pub fn constant(&self, node: NodeId) -> Option<&Literal> {
        self.constants.get(&node)
    }

    pub fn set_constant(&mut self, node: NodeId, value: Literal) {
        self.constants.insert(node, value);
    }

    /// Whether a `when` without `else` covers every possible subject value.
    pub fn is_exhaustive(&self, node: NodeId) -> bool {
        self.exhaustive.contains(&node)
    }

    pub fn mark_exhaustive(&mut self, node: NodeId) {
        self.exhaustive.insert(node);
    }

    /// Whether a call is a self call in tail position of a `tailrec` function.
    pub fn is_tail_call(&self, node: NodeId) -> bool {
        self.tail_calls.contains(&node)
    }

    pub fn mark_tail_call(&mut self, node: NodeId) {
        self.tail_calls.insert(node);
    }

    pub fn loop_range(&self, node: NodeId) -> Option<LoopRange> {
        self.loop_ranges.get(&node).copied()
    }

    pub fn set_loop_range(&mut self, node: NodeId, range: LoopRange) {
        self.loop_ranges.insert(node, range);
    }

    pub fn this_target(&self, node: NodeId) -> Option<ThisTarget> {
        self.this_targets.get(&node).copied()
    }

    pub fn set_this_target(&mut self, node: NodeId, target: ThisTarget) {
        self.this_targets.insert(node, target);
    }

    pub fn indexed_access(&self, node: NodeId) -> Option<IndexedAccess> {
        self.indexed.get(&node).copied()
    }

    pub fn set_indexed_access(&mut self, node: NodeId, access: IndexedAccess) {
        self.indexed.insert(node, access);
    }

    /// Type named by an `is`, `as` or `when` type-test node.
    pub fn type_operand(&self, node: NodeId) -> Option<MachineType> {
        self.type_operands.get(&node).copied()
    }

    pub fn set_type_operand(&mut self, node: NodeId, ty: MachineType) {
        self.type_operands.insert(node, ty);
    }

    /// Closure backing a local named function, keyed by the function.
    pub fn local_function(&self, function: DeclId) -> Option<LocalFunction> {
        self.local_functions.get(&function).copied()
    }

    pub fn set_local_function(&mut self, function: DeclId, local: LocalFunction) {
        self.local_functions.insert(function, local);
    }
}
