//! `while` and `do-while` loops.

use tessera_core::Result;
use tessera_tree::{Expr, WhileExpr};

use crate::blocks::{BlockElement, LoopBlock};
use crate::bytecode::OpCode;
use crate::emit::Label;
use crate::expr::ExprCompiler;
use crate::value::LazyValue;

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    /// Compile `body` as the body of a loop that `break` leaves to
    /// `break_label` and `continue` resumes at `continue_label`.
    pub(crate) fn compile_loop_body(
        &mut self,
        label: Option<&'ast str>,
        break_label: Label,
        continue_label: Label,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.ctx.blocks.push(BlockElement::Loop(LoopBlock {
            label,
            break_label,
            continue_label,
        }));
        let result = body(self);
        self.ctx.blocks.pop();
        result
    }

    /// ```text
    /// condition:  <condition> JumpIfFalse exit
    ///             <body>
    ///             Jump condition
    /// exit:
    /// ```
    pub(crate) fn compile_while(&mut self, node: &'ast WhileExpr<'ast>) -> Result<LazyValue<'ast>> {
        let condition_label = self.sink.here();
        let exit = self.sink.new_label();

        let condition = self.compile_value(node.condition)?;
        self.cond_jump(&condition, exit, true)?;
        self.compile_loop_body(node.label, exit, condition_label, |c| {
            c.compile_statement(node.body)
        })?;
        self.sink.emit_jump(OpCode::Jump, condition_label);
        self.sink.mark(exit);
        Ok(LazyValue::None)
    }

    /// ```text
    /// body:       <body>
    /// condition:  <condition> JumpIfTrue body
    /// exit:
    /// ```
    ///
    /// Locals declared in the body stay visible to the condition.
    pub(crate) fn compile_do_while(
        &mut self,
        node: &'ast WhileExpr<'ast>,
    ) -> Result<LazyValue<'ast>> {
        let body_label = self.sink.here();
        let condition_label = self.sink.new_label();
        let exit = self.sink.new_label();

        let scope = self.open_scope();
        self.compile_loop_body(node.label, exit, condition_label, |c| match node.body {
            Expr::Block(block) => {
                for statement in block.statements {
                    c.compile_statement(*statement)?;
                }
                Ok(())
            }
            body => c.compile_statement(body),
        })?;
        self.sink.mark(condition_label);
        self.mark_line(node.condition.span());
        let condition = self.compile_value(node.condition)?;
        self.cond_jump(&condition, body_label, false)?;
        self.close_scope(scope)?;
        self.sink.mark(exit);
        Ok(LazyValue::None)
    }
}
