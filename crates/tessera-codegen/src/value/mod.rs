//! Lazy values: results described before they are produced.
//!
//! Compiling an expression yields a [`LazyValue`] instead of immediately
//! pushing something. The consumer then decides what to do with it:
//!
//! - `put` it on the stack coerced to the type it needs,
//! - `store` a new value into it (locals, fields, array elements, properties),
//! - branch on it (`cond_jump`) without ever materializing a boolean,
//! - wrap it for read-modify-write so its receiver is evaluated once.
//!
//! ```text
//! a.b[i] += 1
//!
//! ArrayElement { array: Field { b, receiver: Deferred(a) }, index: Deferred(i) }
//!   └── ReadModifyWrite: put receivers once, DupN, load, add, store
//! ```
//!
//! Values are single-use generators: materializing a `Deferred` value twice
//! evaluates its expression twice. Only the composite wrappers cache.
//! Materialization lives on the expression compiler (`materialize.rs`) since
//! deferred parts call back into it.

pub(crate) mod coerce;
mod materialize;

use std::fmt;
use std::rc::Rc;

use tessera_core::MachineType;
use tessera_tree::{Expr, Literal};

use crate::bytecode::{MemberRef, OpCode};
use crate::emit::{InstructionSink, Label};

/// A not-yet-materialized result.
#[derive(Debug, Clone)]
pub enum LazyValue<'ast> {
    /// No value; materializing it as non-void pushes a default.
    None,
    /// Already pushed.
    OnStack(MachineType),
    /// Literal of the given type.
    Constant(Literal, MachineType),
    Local { slot: u16, ty: MachineType },
    /// Local slot holding a shared cell around the value.
    SharedLocal { slot: u16, ty: MachineType },
    Field(Box<FieldValue<'ast>>),
    ArrayElement(Box<ArrayElementValue<'ast>>),
    Property(Box<PropertyValue<'ast>>),
    /// Code to run on materialization.
    Operation(Operation),
    /// Expression compiled when materialized.
    Deferred { expr: Expr<'ast>, ty: MachineType },
    Condition(Box<Condition<'ast>>),
    Composite(Box<Composite<'ast>>),
}

impl<'ast> LazyValue<'ast> {
    pub fn ty(&self) -> MachineType {
        match self {
            LazyValue::None => MachineType::Void,
            LazyValue::OnStack(ty)
            | LazyValue::Constant(_, ty)
            | LazyValue::Local { ty, .. }
            | LazyValue::SharedLocal { ty, .. }
            | LazyValue::Deferred { ty, .. } => *ty,
            LazyValue::Field(f) => f.ty,
            LazyValue::ArrayElement(e) => e.ty,
            LazyValue::Property(p) => p.ty,
            LazyValue::Operation(op) => op.ty,
            LazyValue::Condition(_) => MachineType::BOOL,
            LazyValue::Composite(c) => c.ty(),
        }
    }

    pub fn on_stack(ty: MachineType) -> Self {
        if ty.is_void() {
            LazyValue::None
        } else {
            LazyValue::OnStack(ty)
        }
    }

    pub fn local(slot: u16, ty: MachineType) -> Self {
        LazyValue::Local { slot, ty }
    }

    pub fn constant(value: Literal, ty: MachineType) -> Self {
        LazyValue::Constant(value, ty)
    }

    pub fn boolean(value: bool) -> Self {
        LazyValue::Constant(Literal::Bool(value), MachineType::BOOL)
    }

    pub fn condition(condition: Condition<'ast>) -> Self {
        LazyValue::Condition(Box::new(condition))
    }

    pub fn composite(composite: Composite<'ast>) -> Self {
        LazyValue::Composite(Box::new(composite))
    }

    /// Whether the value has a storage location.
    pub fn is_assignable(&self) -> bool {
        match self {
            LazyValue::Local { .. }
            | LazyValue::SharedLocal { .. }
            | LazyValue::Field(_)
            | LazyValue::ArrayElement(_) => true,
            LazyValue::Property(p) => p.setter.is_some() || p.backing_field.is_some(),
            LazyValue::Composite(c) => match &**c {
                Composite::ReadModifyWrite(inner) => inner.is_assignable(),
                Composite::SafeFallback { inner, .. } => inner.is_assignable(),
                Composite::SafeReceiver { .. } => false,
            },
            _ => false,
        }
    }

    /// Constant boolean value, if statically known.
    pub fn as_bool_constant(&self) -> Option<bool> {
        match self {
            LazyValue::Constant(Literal::Bool(b), _) => Some(*b),
            _ => None,
        }
    }

    /// Wrap for a read followed by a write of the same location.
    ///
    /// The receiver and index parts are pushed once by the read and
    /// consumed by the write, so their side effects happen exactly once.
    pub fn for_read_then_write(self) -> Self {
        match self {
            LazyValue::Local { .. } => self,
            other => LazyValue::composite(Composite::ReadModifyWrite(other)),
        }
    }
}

/// Instance or static field.
#[derive(Debug, Clone)]
pub struct FieldValue<'ast> {
    pub field: MemberRef,
    pub ty: MachineType,
    pub is_static: bool,
    /// The field holds a shared cell around the value.
    pub shared: bool,
    pub receiver: LazyValue<'ast>,
}

#[derive(Debug, Clone)]
pub struct ArrayElementValue<'ast> {
    pub array: LazyValue<'ast>,
    pub index: LazyValue<'ast>,
    /// Element type.
    pub ty: MachineType,
}

/// A resolved accessor function.
#[derive(Debug, Clone)]
pub struct Accessor {
    pub method: MemberRef,
    pub op: OpCode,
    /// Parameter types, receiver excluded.
    pub params: Vec<MachineType>,
    pub return_type: MachineType,
}

/// Property or indexed access going through accessors.
#[derive(Debug, Clone)]
pub struct PropertyValue<'ast> {
    pub getter: Option<Accessor>,
    pub setter: Option<Accessor>,
    /// Read and written directly when the matching accessor is absent.
    pub backing_field: Option<MemberRef>,
    pub ty: MachineType,
    pub is_static: bool,
    pub receiver: LazyValue<'ast>,
    /// Leading accessor arguments, such as the indices of `a[i, j]`.
    pub args: Vec<LazyValue<'ast>>,
}

/// Emission code deferred to materialization time.
///
/// The closure captures plain data only; everything it needs from the
/// compiler is the sink it is handed.
#[derive(Clone)]
pub struct Operation {
    pub ty: MachineType,
    emit: Rc<dyn Fn(&mut dyn InstructionSink)>,
}

impl Operation {
    pub fn new(ty: MachineType, emit: impl Fn(&mut dyn InstructionSink) + 'static) -> Self {
        Self {
            ty,
            emit: Rc::new(emit),
        }
    }

    pub fn emit(&self, sink: &mut dyn InstructionSink) {
        (self.emit)(sink)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({:?})", self.ty)
    }
}

/// Comparison operators, including reference identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Identical,
    NotIdentical,
}

impl CompareOp {
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Identical => CompareOp::NotIdentical,
            CompareOp::NotIdentical => CompareOp::Identical,
        }
    }
}

/// Boolean-valued composite compiled to branches.
#[derive(Debug, Clone)]
pub enum Condition<'ast> {
    And(LazyValue<'ast>, LazyValue<'ast>),
    Or(LazyValue<'ast>, LazyValue<'ast>),
    Not(LazyValue<'ast>),
    Compare {
        op: CompareOp,
        /// Type both operands are put as.
        operand: MachineType,
        left: LazyValue<'ast>,
        right: LazyValue<'ast>,
    },
    /// `value == null` when `is_null`, `value != null` otherwise.
    NullCheck { value: LazyValue<'ast>, is_null: bool },
}

/// Wrappers that control how often their inner value is evaluated.
#[derive(Debug, Clone)]
pub enum Composite<'ast> {
    /// Receiver parts are pushed once, then read and written.
    ReadModifyWrite(LazyValue<'ast>),
    /// Receiver of a safe call: pushed, then skipped to `if_null` when null.
    SafeReceiver { receiver: LazyValue<'ast>, if_null: Label },
    /// Selector of a safe call, yielding null when the receiver was null.
    SafeFallback { inner: LazyValue<'ast>, if_null: Label },
}

impl Composite<'_> {
    pub fn ty(&self) -> MachineType {
        match self {
            Composite::ReadModifyWrite(inner) => inner.ty(),
            Composite::SafeReceiver { receiver, .. } => receiver.ty(),
            Composite::SafeFallback { inner, .. } => match inner.ty() {
                MachineType::Primitive(kind) => MachineType::Object(kind.boxed_type()),
                MachineType::Void => MachineType::Void,
                other => other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::well_known;

    #[test]
    fn types_of_wrappers() {
        let field = LazyValue::Field(Box::new(FieldValue {
            field: MemberRef::field(well_known::ANY, "x"),
            ty: MachineType::INT,
            is_static: false,
            shared: false,
            receiver: LazyValue::local(0, MachineType::ANY),
        }));
        let rmw = field.clone().for_read_then_write();
        assert_eq!(rmw.ty(), MachineType::INT);
        assert!(rmw.is_assignable());
    }

    #[test]
    fn locals_need_no_read_then_write_wrapper() {
        let local = LazyValue::local(3, MachineType::LONG);
        assert!(matches!(local.for_read_then_write(), LazyValue::Local { slot: 3, .. }));
    }

    #[test]
    fn constants_are_not_assignable() {
        let value = LazyValue::constant(Literal::Int(1), MachineType::INT);
        assert!(!value.is_assignable());
        assert_eq!(LazyValue::boolean(true).as_bool_constant(), Some(true));
    }

    #[test]
    fn compare_negation_is_involutive() {
        for op in [CompareOp::Eq, CompareOp::Lt, CompareOp::Ge, CompareOp::Identical] {
            assert_eq!(op.negate().negate(), op);
        }
    }
}
