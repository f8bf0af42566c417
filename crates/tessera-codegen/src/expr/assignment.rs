//! Assignment and compound assignment.

use tessera_core::{CodegenError, MachineType, Result};
use tessera_tree::{AssignExpr, BinaryOp};

use super::operators::string_plus;
use super::{CallSite, ExprCompiler};
use crate::bytecode::OpCode;
use crate::value::coerce::{self, promoted};
use crate::value::{Composite, LazyValue};

/// Compile `target = value` or `target op= value`.
///
/// Assignments are statements; the result is always [`LazyValue::None`].
pub fn compile_assign<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    assign: &'ast AssignExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let target = compiler.compile_value(assign.target)?;
    if !target.is_assignable() {
        return Err(CodegenError::InvalidStore {
            span: assign.target.span(),
        });
    }

    let Some(op) = assign.op.binary_op() else {
        let value = compiler.lazy(assign.value)?;
        compiler.store(&target, &value)?;
        return Ok(LazyValue::None);
    };

    if let LazyValue::Composite(c) = &target
        && matches!(**c, Composite::SafeFallback { .. })
    {
        return Err(CodegenError::unsupported(
            "compound assignment through a safe call",
            assign.span,
        ));
    }

    let site = CallSite {
        node: assign.id,
        span: assign.span,
    };
    let value_type = target.ty();

    if let Some(resolved) = compiler.bindings().call(assign.id) {
        let info = compiler.function_info(resolved.callee, assign.span)?;
        let argument = compiler.lazy(assign.value)?;
        if info.return_type.is_void() {
            // `list += x` as `list.plusAssign(x)`: the location is only read.
            compiler.compile_resolved_call(
                site,
                resolved,
                Some(target),
                vec![argument],
                MachineType::Void,
            )?;
            return Ok(LazyValue::None);
        }
        // `a += b` as `a = a.plus(b)`.
        let target = target.for_read_then_write();
        compiler.put(&target, value_type)?;
        compiler.compile_resolved_call(
            site,
            resolved,
            Some(LazyValue::OnStack(value_type)),
            vec![argument],
            value_type,
        )?;
        compiler.store(&target, &LazyValue::OnStack(value_type))?;
        return Ok(LazyValue::None);
    }

    let value_source = compiler.type_of(assign.value)?;
    let target = target.for_read_then_write();
    if value_type == MachineType::STRING && op == BinaryOp::Add {
        compiler.put(&target, MachineType::ANY)?;
        compiler.compile_into(assign.value, MachineType::ANY)?;
        compiler.sink.emit_call(OpCode::CallStatic, string_plus(), 2);
        compiler.store(&target, &LazyValue::OnStack(MachineType::STRING))?;
        return Ok(LazyValue::None);
    }

    if !value_type.is_primitive() || !value_source.is_primitive() {
        return Err(CodegenError::unsupported(
            format!("compound assignment of {value_source:?} to {value_type:?}"),
            assign.span,
        ));
    }
    let operand = promoted(value_type, value_source);
    let code = coerce::arithmetic_op(op, operand.stack_kind())
        .ok_or_else(|| CodegenError::internal(format!("no instruction for {op:?}")))?;
    compiler.put(&target, operand)?;
    compiler.compile_into(assign.value, operand)?;
    compiler.sink.emit(code);
    compiler.store(&target, &LazyValue::OnStack(operand))?;
    Ok(LazyValue::None)
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use tessera_core::{CodegenError, MachineType};
    use tessera_tree::{AssignOp, TreeBuilder};

    use crate::bytecode::OpCode;
    use crate::test_utils::compile_body;

    #[test]
    fn plain_assignment_to_a_local() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("x", MachineType::INT)], MachineType::Void);
        let x = b.params(f)[0];
        let target = b.name(x);
        let five = b.int(5);
        let assign = b.assign(target, five);
        let body = b.block(&[assign]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[OpCode::Constant, OpCode::SetLocal, OpCode::ReturnVoid]);
    }

    #[test]
    fn compound_assignment_to_an_array_element_evaluates_the_receiver_once() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let ints = MachineType::array_of(MachineType::INT);
        let f = b.function("f", &[("values", ints)], MachineType::Void);
        let values = b.params(f)[0];
        let read = b.name(values);
        let zero = b.int(0);
        let element = b.index(read, &[zero], MachineType::INT);
        let two = b.int(2);
        let assign = b.assign_op(AssignOp::MulAssign, element, two);
        let body = b.block(&[assign]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::PushZero,
            OpCode::DupN,
            OpCode::ArrayLoad,
            OpCode::Constant,
            OpCode::MulI32,
            OpCode::ArrayStore,
            OpCode::ReturnVoid,
        ]);
    }

    #[test]
    fn compound_assignment_widens_and_narrows() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("x", MachineType::INT), ("d", MachineType::DOUBLE)], MachineType::Void);
        let params = b.params(f);
        let target = b.name(params[0]);
        let d = b.name(params[1]);
        let assign = b.assign_op(AssignOp::AddAssign, target, d);
        let body = b.block(&[assign]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::I32toF64,
            OpCode::GetLocal,
            OpCode::AddF64,
            OpCode::F64toI32,
            OpCode::SetLocal,
            OpCode::ReturnVoid,
        ]);
    }

    #[test]
    fn assigning_to_a_literal_is_rejected() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[], MachineType::Void);
        let one = b.int(1);
        let two = b.int(2);
        let assign = b.assign(one, two);
        let body = b.block(&[assign]);
        let bindings = b.finish();

        let err = compile_body(&bindings, f, body).unwrap_err();
        assert!(matches!(err, CodegenError::InvalidStore { .. }));
    }
}
