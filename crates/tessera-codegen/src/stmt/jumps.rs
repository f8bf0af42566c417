//! `break` and `continue`, and the block stack walk shared with `return`.
//!
//! Leaving a `try` replays its `finally` inline before the jump. The replay
//! is cut out of the protected ranges of every `try` the jump leaves:
//!
//! ```text
//! while (...) {
//!     try {               ┐ protected
//!         break           ┘
//!     } finally { F }     ┐ gap: replayed F, then Jump exit
//! }                       ┘
//! ```

use tessera_core::{CodegenError, Result};
use tessera_tree::JumpExpr;
use tracing::trace;

use crate::blocks::{BlockElement, LoopBlock, TryBlock};
use crate::bytecode::OpCode;
use crate::emit::Label;
use crate::expr::ExprCompiler;
use crate::value::LazyValue;

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    pub(crate) fn compile_break(&mut self, jump: &'ast JumpExpr<'ast>) -> Result<LazyValue<'ast>> {
        self.compile_loop_jump(jump, true)
    }

    pub(crate) fn compile_continue(
        &mut self,
        jump: &'ast JumpExpr<'ast>,
    ) -> Result<LazyValue<'ast>> {
        self.compile_loop_jump(jump, false)
    }

    fn compile_loop_jump(
        &mut self,
        jump: &'ast JumpExpr<'ast>,
        is_break: bool,
    ) -> Result<LazyValue<'ast>> {
        let target = self.unwind_blocks(|block| {
            let matches = jump.label.is_none() || block.label == jump.label;
            matches.then_some(if is_break {
                block.break_label
            } else {
                block.continue_label
            })
        })?;
        let Some(target) = target else {
            let keyword = if is_break { "break" } else { "continue" };
            return Err(CodegenError::UnresolvedLabel {
                what: match jump.label {
                    Some(label) => format!("{keyword}@{label}"),
                    None => format!("{keyword} outside of a loop"),
                },
                span: jump.span,
            });
        };
        trace!(is_break, label = jump.label, "loop jump");
        self.sink.emit_jump(OpCode::Jump, target);
        Ok(LazyValue::None)
    }

    /// Walk the block stack from the top until `find` accepts a loop,
    /// replaying the `finally` of every `try` on the way.
    ///
    /// The stack is left as it was. Returns what `find` produced, or `None`
    /// once the whole stack was walked.
    pub(crate) fn unwind_blocks<T>(
        &mut self,
        mut find: impl FnMut(&LoopBlock<'ast>) -> Option<T>,
    ) -> Result<Option<T>> {
        let mut popped: Vec<BlockElement<'ast>> = Vec::new();
        let mut found = None;
        let mut result = Ok(());
        while let Some(element) = self.ctx.blocks.pop() {
            match element {
                BlockElement::Loop(block) => {
                    found = find(&block);
                    popped.push(BlockElement::Loop(block));
                    if found.is_some() {
                        break;
                    }
                }
                BlockElement::Try(mut block) => {
                    // The try is off the stack while its finally runs, so
                    // jumps inside the finally do not replay it again.
                    match self.replay_finally(&block) {
                        Ok(Some((start, end))) => {
                            block.gaps.extend([start, end]);
                            for inner in &mut popped {
                                if let BlockElement::Try(inner) = inner {
                                    inner.gaps.extend([start, end]);
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(err) => result = Err(err),
                    }
                    popped.push(BlockElement::Try(block));
                    if result.is_err() {
                        break;
                    }
                }
            }
        }
        while let Some(element) = popped.pop() {
            self.ctx.blocks.push(element);
        }
        result.map(|()| found)
    }

    /// Compile the `finally` of `block` inline, returning the emitted range.
    pub(crate) fn replay_finally(&mut self, block: &TryBlock<'ast>) -> Result<Option<(Label, Label)>> {
        let Some(finally) = block.try_expr.finally else {
            return Ok(None);
        };
        trace!(span = %block.try_expr.span, "replaying finally");
        let start = self.sink.here();
        self.ctx.reset_line();
        self.compile_statement(finally)?;
        let end = self.sink.here();
        Ok(Some((start, end)))
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use tessera_core::{CodegenError, MachineType};
    use tessera_tree::TreeBuilder;

    use crate::bytecode::{CatchType, OpCode};
    use crate::test_utils::compile_body;

    #[test]
    fn labeled_break_leaves_the_outer_loop() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[], MachineType::Void);
        let stop = b.break_loop(Some("outer"));
        let inner_body = b.block(&[stop]);
        let yes = b.boolean(true);
        let inner = b.while_loop(Some("inner"), yes, inner_body);
        let outer_body = b.block(&[inner]);
        let yes = b.boolean(true);
        let outer = b.while_loop(Some("outer"), yes, outer_body);
        let body = b.block(&[outer]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::Jump,
            OpCode::Jump,
            OpCode::Jump,
            OpCode::ReturnVoid,
        ]);
        // break@outer, inner back edge, outer back edge.
        assert_eq!(compiled.chunk.jump_target(0), Some(9));
        assert_eq!(compiled.chunk.jump_target(3), Some(0));
        assert_eq!(compiled.chunk.jump_target(6), Some(0));
    }

    #[test]
    fn continue_targets_the_condition() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let check = b.function("check", &[], MachineType::BOOL);
        let f = b.function("f", &[], MachineType::Void);
        let again = b.continue_loop(None);
        let loop_body = b.block(&[again]);
        let condition = b.call(check, &[]);
        let looped = b.while_loop(None, condition, loop_body);
        let body = b.block(&[looped]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::CallStatic,
            OpCode::JumpIfFalse,
            OpCode::Jump,
            OpCode::Jump,
            OpCode::ReturnVoid,
        ]);
        assert_eq!(compiled.chunk.jump_target(7), Some(0));
    }

    #[test]
    fn break_out_of_try_replays_finally_outside_the_protected_range() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let log = b.function("log", &[], MachineType::Void);
        let f = b.function("f", &[], MachineType::Void);
        let stop = b.break_loop(None);
        let try_body = b.block(&[stop]);
        let call = b.call(log, &[]);
        let finally = b.block(&[call]);
        let guarded = b.try_catch(try_body, &[], Some(finally), MachineType::Void);
        let loop_body = b.block(&[guarded]);
        let yes = b.boolean(true);
        let looped = b.while_loop(None, yes, loop_body);
        let body = b.block(&[looped]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        // Replayed on break, on normal exit and in the catch-all handler.
        assert_eq!(compiled.chunk.count_opcode(OpCode::CallStatic), 3);
        let handlers = compiled.chunk.handlers();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].catch, CatchType::Any);
        // The replay at offset 0 is cut out; the jump after it stays covered.
        assert!(!handlers[0].covers(0));
        assert!(handlers[0].covers(4));
    }

    #[test]
    fn break_outside_a_loop_is_an_unresolved_label() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[], MachineType::Void);
        let stop = b.break_loop(Some("nowhere"));
        let body = b.block(&[stop]);
        let bindings = b.finish();

        let err = compile_body(&bindings, f, body).unwrap_err();
        assert!(err.to_string().contains("break@nowhere"));
        assert!(matches!(
            err,
            CodegenError::AtNode { .. } | CodegenError::UnresolvedLabel { .. }
        ));
    }
}
