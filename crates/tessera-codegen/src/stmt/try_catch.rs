//! `try` / `catch` / `finally`.
//!
//! ```text
//! start:      <body>                  ─┐ Class(E) → catch_e, Any → catch_all
//! end:        <finally> Jump exit      │ (not protected)
//! catch_e:    SetLocal e
//!             <clause>                ─┘ Any → catch_all
//!             <finally> Jump exit
//! catch_all:  SetLocal t <finally> GetLocal t Throw
//! exit:
//! ```
//!
//! The `finally` is duplicated on every path out of the construct. Copies
//! emitted by jumps leaving the body are gaps in the protected ranges.

use tessera_core::{CodegenError, MachineType, Result};
use tessera_tree::{Expr, TryExpr};
use tracing::trace;

use crate::blocks::{BlockElement, TryBlock};
use crate::bytecode::{CatchType, OpCode};
use crate::emit::Label;
use crate::expr::{ExprCompiler, checked_type};
use crate::value::LazyValue;

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    pub(crate) fn compile_try(
        &mut self,
        node: &'ast TryExpr<'ast>,
        ty: MachineType,
    ) -> Result<LazyValue<'ast>> {
        trace!(
            catches = node.catches.len(),
            finally = node.finally.is_some(),
            "try"
        );
        let result = if ty.is_void() {
            None
        } else {
            Some(self.ctx.frame.enter_temp(ty))
        };
        let exit = self.sink.new_label();
        let mut block = TryBlock::new(node);

        let body_ranges = self.compile_protected(&mut block, |c| {
            c.compile_try_part(node.body, ty, result)
        })?;
        self.finish_try_part(&block, exit)?;

        let mut clause_ranges = Vec::new();
        for clause in node.catches {
            let decl = self.reference(clause.id, clause.span)?;
            let info = self.variable_info(decl, clause.span)?;
            let caught = checked_type(info.ty).type_hash();

            let handler = self.sink.here();
            for &(start, end) in &body_ranges {
                self.sink
                    .add_exception_entry(start, end, handler, CatchType::Class(caught));
            }
            self.ctx.reset_line();
            self.mark_line(clause.span);

            let scope = self.open_scope();
            let local = self.enter_local(decl, clause.span)?;
            match local {
                // The cell is created above the exception.
                LazyValue::SharedLocal { slot, .. } => {
                    self.sink.emit_get_local(slot);
                    self.sink.emit(OpCode::Swap);
                    self.sink.emit(OpCode::SetRef);
                }
                _ => self.store(&local, &LazyValue::OnStack(info.ty))?,
            }
            self.scope_local(decl, clause.span)?;
            let ranges = self.compile_protected(&mut block, |c| {
                c.compile_try_part(clause.body, ty, result)
            });
            self.close_scope(scope)?;
            clause_ranges.extend(ranges?);
            self.finish_try_part(&block, exit)?;
        }

        if node.finally.is_some() {
            let handler = self.sink.here();
            for &(start, end) in body_ranges.iter().chain(&clause_ranges) {
                self.sink
                    .add_exception_entry(start, end, handler, CatchType::Any);
            }
            let pending = self.ctx.frame.enter_temp(MachineType::THROWABLE);
            self.sink.emit_set_local(pending);
            self.replay_finally(&block)?;
            self.sink.emit_get_local(pending);
            self.sink.emit(OpCode::Throw);
            self.ctx.frame.leave_temp(MachineType::THROWABLE)?;
        }

        self.sink.mark(exit);
        match result {
            Some(slot) => {
                self.sink.emit_get_local(slot);
                self.ctx.frame.leave_temp(ty)?;
                Ok(LazyValue::OnStack(ty))
            }
            None => Ok(LazyValue::None),
        }
    }

    /// Compile one region guarded by `block`, returning its protected
    /// ranges with the gaps recorded while compiling it cut out.
    fn compile_protected(
        &mut self,
        block: &mut TryBlock<'ast>,
        region: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<Vec<(Label, Label)>> {
        let mark = block.gap_mark();
        let start = self.sink.here();
        self.ctx.blocks.push(BlockElement::Try(block.clone()));
        let result = region(self);
        let end = self.sink.here();
        match self.ctx.blocks.pop() {
            Some(BlockElement::Try(updated)) => *block = updated,
            _ => return Err(CodegenError::internal("block stack out of balance after try")),
        }
        result?;
        Ok(block.ranges(start, end, mark))
    }

    /// Body or catch clause, leaving its value in the result slot.
    fn compile_try_part(&mut self, expr: Expr<'ast>, ty: MachineType, result: Option<u16>) -> Result<()> {
        match result {
            Some(slot) => {
                self.begin_statement(expr)?;
                self.compile_into(expr, ty)?;
                self.sink.emit_set_local(slot);
                Ok(())
            }
            None => self.compile_statement(expr),
        }
    }

    /// Normal exit of a body or clause: run the finally, leave the construct.
    fn finish_try_part(&mut self, block: &TryBlock<'ast>, exit: Label) -> Result<()> {
        self.replay_finally(block)?;
        self.sink.emit_jump(OpCode::Jump, exit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use tessera_core::MachineType;
    use tessera_tree::TreeBuilder;

    use crate::bytecode::{CatchType, OpCode};
    use crate::test_utils::compile_body;

    #[test]
    fn try_value_flows_through_a_result_slot() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let risky = b.function("risky", &[], MachineType::INT);
        let f = b.function("f", &[], MachineType::INT);
        let e = b.variable("e", MachineType::THROWABLE);
        let call = b.call(risky, &[]);
        let fallback = b.int(-1);
        let guarded = b.try_catch(call, &[(e, fallback)], None, MachineType::INT);
        let body = b.ret(Some(guarded));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::CallStatic,
            OpCode::SetLocal,
            OpCode::Jump,
            // catch (e: Throwable)
            OpCode::SetLocal,
            OpCode::Constant,
            OpCode::SetLocal,
            OpCode::Jump,
            OpCode::GetLocal,
            OpCode::Return,
        ]);

        let handlers = compiled.chunk.handlers();
        assert_eq!(handlers.len(), 1);
        assert_eq!((handlers[0].start, handlers[0].end, handlers[0].handler), (0, 6, 9));
        assert_eq!(
            handlers[0].catch,
            CatchType::Class(MachineType::THROWABLE.type_hash())
        );
        // Result slot plus the catch parameter.
        assert_eq!(compiled.max_locals, 2);
    }

    #[test]
    fn finally_runs_on_every_path() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let risky = b.function("risky", &[], MachineType::Void);
        let log = b.function("log", &[], MachineType::Void);
        let f = b.function("f", &[], MachineType::Void);
        let e = b.variable("e", MachineType::THROWABLE);
        let call = b.call(risky, &[]);
        let try_body = b.block(&[call]);
        let recover = b.call(risky, &[]);
        let clause = b.block(&[recover]);
        let cleanup = b.call(log, &[]);
        let finally = b.block(&[cleanup]);
        let guarded = b.try_catch(try_body, &[(e, clause)], Some(finally), MachineType::Void);
        let body = b.block(&[guarded]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        // risky() twice, log() after the body, after the clause and on throw.
        assert_eq!(compiled.chunk.count_opcode(OpCode::CallStatic), 5);

        let handlers = compiled.chunk.handlers();
        let kinds: Vec<_> = handlers.iter().map(|h| h.catch).collect();
        assert_eq!(
            kinds,
            vec![
                CatchType::Class(MachineType::THROWABLE.type_hash()),
                CatchType::Any,
                CatchType::Any,
            ]
        );
        // The clause is protected from just after its parameter is stored.
        assert_eq!((handlers[0].start, handlers[0].end), (0, 4));
        assert_eq!((handlers[1].start, handlers[1].end), (0, 4));
        assert_eq!(handlers[2].start, handlers[0].handler + 2);
        assert!(handlers[2].handler > handlers[2].end);
    }

    #[test]
    fn catch_clauses_keep_source_order() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let io = b.class("IoError");
        let risky = b.function("risky", &[], MachineType::Void);
        let f = b.function("f", &[], MachineType::Void);
        let specific = b.variable("io", MachineType::Object(io));
        let general = b.variable("e", MachineType::THROWABLE);
        let call = b.call(risky, &[]);
        let first = b.block(&[]);
        let second = b.block(&[]);
        let guarded = b.try_catch(
            call,
            &[(specific, first), (general, second)],
            None,
            MachineType::Void,
        );
        let body = b.block(&[guarded]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        let kinds: Vec<_> = compiled.chunk.handlers().iter().map(|h| h.catch).collect();
        assert_eq!(
            kinds,
            vec![
                CatchType::Class(io),
                CatchType::Class(MachineType::THROWABLE.type_hash()),
            ]
        );
    }

    #[test]
    fn shared_catch_parameter_is_boxed_in_a_cell() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let risky = b.function("risky", &[], MachineType::Void);
        let f = b.function("f", &[], MachineType::Void);
        let e = b.shared_variable("e", MachineType::THROWABLE);
        let call = b.call(risky, &[]);
        let clause = b.block(&[]);
        let guarded = b.try_catch(call, &[(e, clause)], None, MachineType::Void);
        let body = b.block(&[guarded]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_contains_opcodes(&[
            OpCode::NewRef,
            OpCode::SetLocal,
            OpCode::GetLocal,
            OpCode::Swap,
            OpCode::SetRef,
        ]);
    }
}
