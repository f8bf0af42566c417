//! Conversions between machine types on the operand stack.
//!
//! Every value is put on the stack in its own type and then coerced to the
//! type its consumer expects: primitive widening and narrowing, boxing into
//! and unboxing out of references, checked downcasts from `Any`, and
//! defaults for missing (void) values.

use tessera_core::{MachineType, PrimitiveKind, StackKind, TypeHash, well_known};
use tessera_tree::BinaryOp;

use crate::bytecode::OpCode;
use crate::emit::InstructionSink;
use crate::value::CompareOp;

/// Emit the conversion of the top of stack from `from` to `to`.
pub(crate) fn coerce(from: MachineType, to: MachineType, sink: &mut dyn InstructionSink) {
    if from == to {
        return;
    }
    match (from, to) {
        (_, MachineType::Void) => sink.emit(OpCode::Pop),
        (MachineType::Void, _) => push_default(to, sink),
        (MachineType::Primitive(from), MachineType::Primitive(to)) => {
            convert_primitive(from, to, sink)
        }
        (MachineType::Primitive(kind), _) => sink.emit_box(kind),
        (_, MachineType::Primitive(kind)) => {
            match boxed_kind(from.type_hash()) {
                Some(boxed) => {
                    sink.emit_unbox(boxed);
                    convert_primitive(boxed, kind, sink);
                }
                None => {
                    sink.emit_type_op(OpCode::CheckCast, kind.boxed_type());
                    sink.emit_unbox(kind);
                }
            }
        }
        (from, to) if from == MachineType::ANY && to != MachineType::UNIT => {
            sink.emit_type_op(OpCode::CheckCast, to.type_hash());
        }
        _ => {}
    }
}

/// Push the value standing in for "no value" of type `ty`.
pub(crate) fn push_default(ty: MachineType, sink: &mut dyn InstructionSink) {
    match ty {
        MachineType::Void => {}
        MachineType::Primitive(PrimitiveKind::Bool) => sink.emit(OpCode::PushFalse),
        MachineType::Primitive(PrimitiveKind::Long) => {
            sink.emit(OpCode::PushZero);
            sink.emit(OpCode::I32toI64);
        }
        MachineType::Primitive(PrimitiveKind::Float) => sink.emit_f32(0.0),
        MachineType::Primitive(PrimitiveKind::Double) => sink.emit_f64(0.0),
        MachineType::Primitive(_) => sink.emit(OpCode::PushZero),
        MachineType::Object(hash) if hash == well_known::UNIT || hash == well_known::ANY => {
            sink.emit(OpCode::PushUnit)
        }
        MachineType::Object(_) | MachineType::Array(_) => sink.emit(OpCode::PushNull),
    }
}

/// Primitive kind whose box class is `hash`.
pub(crate) fn boxed_kind(hash: TypeHash) -> Option<PrimitiveKind> {
    PrimitiveKind::ALL
        .into_iter()
        .find(|kind| kind.boxed_type() == hash)
}

fn convert_primitive(from: PrimitiveKind, to: PrimitiveKind, sink: &mut dyn InstructionSink) {
    if from == to {
        return;
    }
    let widened = match (from.stack_kind(), to.stack_kind()) {
        (a, b) if a == b => None,
        (StackKind::I32, StackKind::I64) => Some(OpCode::I32toI64),
        (StackKind::I32, StackKind::F32) => Some(OpCode::I32toF32),
        (StackKind::I32, StackKind::F64) => Some(OpCode::I32toF64),
        (StackKind::I64, StackKind::I32) => Some(OpCode::I64toI32),
        (StackKind::I64, StackKind::F32) => Some(OpCode::I64toF32),
        (StackKind::I64, StackKind::F64) => Some(OpCode::I64toF64),
        (StackKind::F32, StackKind::I32) => Some(OpCode::F32toI32),
        (StackKind::F32, StackKind::I64) => Some(OpCode::F32toI64),
        (StackKind::F32, StackKind::F64) => Some(OpCode::F32toF64),
        (StackKind::F64, StackKind::I32) => Some(OpCode::F64toI32),
        (StackKind::F64, StackKind::I64) => Some(OpCode::F64toI64),
        (StackKind::F64, StackKind::F32) => Some(OpCode::F64toF32),
        _ => None,
    };
    if let Some(op) = widened {
        sink.emit(op);
    }
    // Sub-int targets are truncated from the 32-bit representation.
    let narrowing = match to {
        PrimitiveKind::Byte if from != PrimitiveKind::Bool => Some(OpCode::I32toI8),
        PrimitiveKind::Short if !matches!(from, PrimitiveKind::Byte | PrimitiveKind::Bool) => {
            Some(OpCode::I32toI16)
        }
        PrimitiveKind::Char if from != PrimitiveKind::Bool => Some(OpCode::I32toU16),
        _ => None,
    };
    if let Some(op) = narrowing {
        sink.emit(op);
    }
}

/// Type both operands of a primitive comparison are widened to.
pub(crate) fn promoted(left: MachineType, right: MachineType) -> MachineType {
    let rank = |ty: MachineType| match ty.stack_kind() {
        StackKind::F64 => 3,
        StackKind::F32 => 2,
        StackKind::I64 => 1,
        _ => 0,
    };
    match rank(left).max(rank(right)) {
        3 => MachineType::DOUBLE,
        2 => MachineType::FLOAT,
        1 => MachineType::LONG,
        _ => MachineType::INT,
    }
}

/// Arithmetic instruction for `op` on values of `kind`.
pub(crate) fn arithmetic_op(op: BinaryOp, kind: StackKind) -> Option<OpCode> {
    use OpCode::*;
    let ops = match kind {
        StackKind::I32 => [AddI32, SubI32, MulI32, DivI32, ModI32],
        StackKind::I64 => [AddI64, SubI64, MulI64, DivI64, ModI64],
        StackKind::F32 => [AddF32, SubF32, MulF32, DivF32, ModF32],
        StackKind::F64 => [AddF64, SubF64, MulF64, DivF64, ModF64],
        StackKind::Void | StackKind::Ref => return None,
    };
    let index = match op {
        BinaryOp::Add => 0,
        BinaryOp::Sub => 1,
        BinaryOp::Mul => 2,
        BinaryOp::Div => 3,
        BinaryOp::Rem => 4,
        _ => return None,
    };
    Some(ops[index])
}

pub(crate) fn negate_op(kind: StackKind) -> Option<OpCode> {
    match kind {
        StackKind::I32 => Some(OpCode::NegI32),
        StackKind::I64 => Some(OpCode::NegI64),
        StackKind::F32 => Some(OpCode::NegF32),
        StackKind::F64 => Some(OpCode::NegF64),
        StackKind::Void | StackKind::Ref => None,
    }
}

/// Comparison instruction for primitive operands of `kind`.
pub(crate) fn compare_op(op: CompareOp, kind: StackKind) -> Option<OpCode> {
    use OpCode::*;
    let ops = match kind {
        StackKind::I32 => [EqI32, NeI32, LtI32, LeI32, GtI32, GeI32],
        StackKind::I64 => [EqI64, NeI64, LtI64, LeI64, GtI64, GeI64],
        StackKind::F32 => [EqF32, NeF32, LtF32, LeF32, GtF32, GeF32],
        StackKind::F64 => [EqF64, NeF64, LtF64, LeF64, GtF64, GeF64],
        StackKind::Void | StackKind::Ref => return None,
    };
    let index = match op {
        CompareOp::Eq | CompareOp::Identical => 0,
        CompareOp::Ne | CompareOp::NotIdentical => 1,
        CompareOp::Lt => 2,
        CompareOp::Le => 3,
        CompareOp::Gt => 4,
        CompareOp::Ge => 5,
    };
    Some(ops[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::BytecodeEmitter;

    fn coerced(from: MachineType, to: MachineType) -> Vec<OpCode> {
        let mut emitter = BytecodeEmitter::new();
        coerce(from, to, &mut emitter);
        emitter.chunk().opcodes()
    }

    #[test]
    fn identical_types_need_nothing() {
        assert!(coerced(MachineType::INT, MachineType::INT).is_empty());
        assert!(coerced(MachineType::STRING, MachineType::STRING).is_empty());
    }

    #[test]
    fn widening_and_narrowing() {
        assert_eq!(coerced(MachineType::INT, MachineType::LONG), vec![OpCode::I32toI64]);
        assert_eq!(
            coerced(MachineType::DOUBLE, MachineType::BYTE),
            vec![OpCode::F64toI32, OpCode::I32toI8]
        );
        assert_eq!(coerced(MachineType::INT, MachineType::CHAR), vec![OpCode::I32toU16]);
        assert!(coerced(MachineType::BYTE, MachineType::INT).is_empty());
    }

    #[test]
    fn boxing_round_trip_through_any() {
        let boxed = coerced(MachineType::INT, MachineType::ANY);
        assert_eq!(boxed, vec![OpCode::Box]);
        let unboxed = coerced(MachineType::ANY, MachineType::INT);
        assert_eq!(unboxed, vec![OpCode::CheckCast, OpCode::Unbox]);
    }

    #[test]
    fn unboxing_a_known_box_converts_after() {
        let boxed_int = MachineType::Object(PrimitiveKind::Int.boxed_type());
        assert_eq!(coerced(boxed_int, MachineType::LONG), vec![OpCode::Unbox, OpCode::I32toI64]);
    }

    #[test]
    fn void_values_become_defaults() {
        assert_eq!(coerced(MachineType::Void, MachineType::UNIT), vec![OpCode::PushUnit]);
        assert_eq!(coerced(MachineType::Void, MachineType::STRING), vec![OpCode::PushNull]);
        assert_eq!(coerced(MachineType::Void, MachineType::BOOL), vec![OpCode::PushFalse]);
        assert_eq!(coerced(MachineType::LONG, MachineType::Void), vec![OpCode::Pop]);
    }

    #[test]
    fn downcasts_from_any_are_checked() {
        assert_eq!(coerced(MachineType::ANY, MachineType::STRING), vec![OpCode::CheckCast]);
        assert!(coerced(MachineType::STRING, MachineType::ANY).is_empty());
    }

    #[test]
    fn promotion_picks_the_wider_kind() {
        assert_eq!(promoted(MachineType::INT, MachineType::LONG), MachineType::LONG);
        assert_eq!(promoted(MachineType::CHAR, MachineType::BYTE), MachineType::INT);
        assert_eq!(promoted(MachineType::FLOAT, MachineType::LONG), MachineType::FLOAT);
    }

    #[test]
    fn operator_tables() {
        assert_eq!(arithmetic_op(BinaryOp::Rem, StackKind::I64), Some(OpCode::ModI64));
        assert_eq!(arithmetic_op(BinaryOp::And, StackKind::I32), None);
        assert_eq!(compare_op(CompareOp::Le, StackKind::F32), Some(OpCode::LeF32));
        assert_eq!(negate_op(StackKind::Ref), None);
    }
}
