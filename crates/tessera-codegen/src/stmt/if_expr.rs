//! Conditionals.

use tessera_core::{MachineType, Result};
use tessera_tree::{Expr, IfExpr};

use crate::bytecode::OpCode;
use crate::expr::ExprCompiler;
use crate::value::LazyValue;
use crate::value::coerce::push_default;

/// The branch, unless it is absent or an empty block.
fn non_empty(branch: Option<Expr<'_>>) -> Option<Expr<'_>> {
    branch.filter(|b| !matches!(b, Expr::Block(block) if block.statements.is_empty()))
}

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    /// Compile `if` as a statement (`ty` void) or as a value of `ty`.
    pub(crate) fn compile_if(
        &mut self,
        node: &'ast IfExpr<'ast>,
        ty: MachineType,
    ) -> Result<LazyValue<'ast>> {
        let then_branch = non_empty(node.then_branch);
        let else_branch = non_empty(node.else_branch);

        // A Unit-valued `if` with an empty arm is a statement followed by Unit.
        let single_arm = then_branch.is_none() || else_branch.is_none();
        if ty.is_void() || (ty == MachineType::UNIT && single_arm) {
            self.compile_if_statement(node.condition, then_branch, else_branch)?;
            if ty.is_void() {
                return Ok(LazyValue::None);
            }
            self.sink.emit(OpCode::PushUnit);
            return Ok(LazyValue::OnStack(ty));
        }

        let else_label = self.sink.new_label();
        let end = self.sink.new_label();
        let condition = self.compile_value(node.condition)?;
        self.cond_jump(&condition, else_label, true)?;
        self.compile_branch(then_branch, ty)?;
        self.sink.emit_jump(OpCode::Jump, end);
        self.sink.mark(else_label);
        self.compile_branch(else_branch, ty)?;
        self.sink.mark(end);
        Ok(LazyValue::OnStack(ty))
    }

    fn compile_if_statement(
        &mut self,
        condition: Expr<'ast>,
        then_branch: Option<Expr<'ast>>,
        else_branch: Option<Expr<'ast>>,
    ) -> Result<()> {
        let condition = self.compile_value(condition)?;
        match (then_branch, else_branch) {
            (None, None) => self.put(&condition, MachineType::Void),
            (Some(then_branch), None) => {
                let end = self.sink.new_label();
                self.cond_jump(&condition, end, true)?;
                self.compile_statement(then_branch)?;
                self.sink.mark(end);
                Ok(())
            }
            (None, Some(else_branch)) => {
                let end = self.sink.new_label();
                self.cond_jump(&condition, end, false)?;
                self.compile_statement(else_branch)?;
                self.sink.mark(end);
                Ok(())
            }
            (Some(then_branch), Some(else_branch)) => {
                let else_label = self.sink.new_label();
                let end = self.sink.new_label();
                self.cond_jump(&condition, else_label, true)?;
                self.compile_statement(then_branch)?;
                self.sink.emit_jump(OpCode::Jump, end);
                self.sink.mark(else_label);
                self.compile_statement(else_branch)?;
                self.sink.mark(end);
                Ok(())
            }
        }
    }

    /// Compile one arm of a value-producing construct as `ty`.
    pub(crate) fn compile_branch(&mut self, branch: Option<Expr<'ast>>, ty: MachineType) -> Result<()> {
        match branch {
            Some(branch) => {
                self.begin_statement(branch)?;
                self.compile_into(branch, ty)
            }
            None => {
                push_default(ty, &mut *self.sink);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use tessera_core::MachineType;
    use tessera_tree::{BinaryOp, TreeBuilder};

    use crate::bytecode::OpCode;
    use crate::test_utils::compile_body;

    #[test]
    fn if_else_value_joins_both_arms() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("flag", MachineType::BOOL)], MachineType::INT);
        let flag = b.params(f)[0];
        let read = b.name(flag);
        let one = b.int(1);
        let two = b.int(2);
        let choice = b.if_else(read, one, two, MachineType::INT);
        let body = b.ret(Some(choice));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::JumpIfFalse,
            OpCode::PushOne,
            OpCode::Jump,
            OpCode::Constant,
            OpCode::Return,
        ]);
        assert_eq!(compiled.chunk.jump_target(2), Some(9));
        assert_eq!(compiled.chunk.jump_target(6), Some(11));
    }

    #[test]
    fn comparison_conditions_branch_directly() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("x", MachineType::INT)], MachineType::Void);
        let x = b.params(f)[0];
        let read = b.name(x);
        let zero = b.int(0);
        let negative = b.compare(BinaryOp::Lt, read, zero);
        let target = b.name(x);
        let reset = b.int(0);
        let assign = b.assign(target, reset);
        let statement = b.if_then(negative, assign);
        let body = b.block(&[statement]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::PushZero,
            OpCode::LtI32,
            OpCode::JumpIfFalse,
            OpCode::PushZero,
            OpCode::SetLocal,
            OpCode::ReturnVoid,
        ]);
    }

    #[test]
    fn unit_if_with_one_arm_pushes_unit_once() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let log = b.function("log", &[], MachineType::Void);
        let f = b.function("f", &[("flag", MachineType::BOOL)], MachineType::UNIT);
        let flag = b.params(f)[0];
        let read = b.name(flag);
        let call = b.call(log, &[]);
        let statement = b.if_expr(read, Some(call), None, MachineType::UNIT);
        let body = b.ret(Some(statement));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::JumpIfFalse,
            OpCode::CallStatic,
            OpCode::PushUnit,
            OpCode::Return,
        ]);
        assert_eq!(compiled.chunk.count_opcode(OpCode::PushUnit), 1);
    }

    #[test]
    fn constant_true_condition_folds_away() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let log = b.function("log", &[], MachineType::Void);
        let f = b.function("f", &[], MachineType::Void);
        let yes = b.boolean(true);
        let call = b.call(log, &[]);
        let statement = b.if_then(yes, call);
        let body = b.block(&[statement]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled
            .chunk
            .assert_opcodes(&[OpCode::CallStatic, OpCode::ReturnVoid]);
    }
}
