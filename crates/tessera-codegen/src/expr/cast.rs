//! Type checks `is` and casts `as` / `as?`.

use tessera_core::{MachineType, Result};
use tessera_tree::{CastExpr, IsExpr};

use super::ExprCompiler;
use crate::bytecode::OpCode;
use crate::value::{Condition, LazyValue};

/// Reference form of `ty`: primitives are checked against their box.
pub(crate) fn checked_type(ty: MachineType) -> MachineType {
    match ty {
        MachineType::Primitive(kind) => MachineType::Object(kind.boxed_type()),
        other => other,
    }
}

/// Compile `operand is T` / `operand !is T`.
pub fn compile_is<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    is: &'ast IsExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let tested = checked_type(compiler.type_operand(is.id, is.span)?);
    compiler.compile_into(is.operand, MachineType::ANY)?;
    compiler
        .sink
        .emit_type_op(OpCode::InstanceOf, tested.type_hash());
    let result = LazyValue::OnStack(MachineType::BOOL);
    Ok(if is.negated {
        LazyValue::condition(Condition::Not(result))
    } else {
        result
    })
}

/// Compile `operand as T` or `operand as? T`.
pub fn compile_cast<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    cast: &'ast CastExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let target = compiler.type_operand(cast.id, cast.span)?;
    let source = compiler.type_of(cast.operand)?;

    if cast.safe {
        // Yields null instead of failing, so the result is a reference.
        let result = checked_type(target);
        let done = compiler.sink.new_label();
        compiler.compile_into(cast.operand, checked_type(source))?;
        compiler.sink.emit(OpCode::Dup);
        compiler
            .sink
            .emit_type_op(OpCode::InstanceOf, result.type_hash());
        compiler.sink.emit_jump(OpCode::JumpIfTrue, done);
        compiler.sink.emit(OpCode::Pop);
        compiler.sink.emit(OpCode::PushNull);
        compiler.sink.mark(done);
        return Ok(LazyValue::OnStack(result));
    }

    compiler.compile_into(cast.operand, source)?;
    let needs_check = source.is_reference()
        && target.is_reference()
        && source != target
        && source != MachineType::ANY
        && target != MachineType::ANY;
    if needs_check {
        compiler
            .sink
            .emit_type_op(OpCode::CheckCast, target.type_hash());
        return Ok(LazyValue::OnStack(target));
    }
    compiler.coerce(source, target);
    Ok(LazyValue::OnStack(target))
}
