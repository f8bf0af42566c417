//! `return` and `throw`.

use tessera_core::{MachineType, Result};
use tessera_tree::{ReturnExpr, ThrowExpr};
use tracing::trace;

use crate::bytecode::{Constant, OpCode};
use crate::context::{ReturnTarget, resolve_return};
use crate::expr::ExprCompiler;
use crate::value::LazyValue;
use crate::value::coerce::push_default;

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    /// Compile `return`, replaying every enclosing `finally` first.
    ///
    /// A return that leaves an inlined lambda becomes a `NonLocalReturn`
    /// carrying the token of the target scope; the target function's
    /// epilogue catches it.
    pub(crate) fn compile_return(&mut self, node: &'ast ReturnExpr<'ast>) -> Result<LazyValue<'ast>> {
        let target = resolve_return(
            &self.ctx.scope,
            node.label,
            self.options().inline_enabled,
            node.span,
        )?;
        let ty = match &target {
            ReturnTarget::Local => self.ctx.return_type(),
            ReturnTarget::NonLocal(scope) => scope.return_type,
        };

        match node.value {
            Some(value) => self.compile_into(value, ty)?,
            None if !ty.is_void() => push_default(ty, &mut *self.sink),
            None => {}
        }

        if self.ctx.blocks.has_finally() {
            let saved = if ty.is_void() {
                None
            } else {
                let slot = self.ctx.frame.enter_temp(ty);
                self.sink.emit_set_local(slot);
                Some(slot)
            };
            self.unwind_blocks(|_| None::<()>)?;
            if let Some(slot) = saved {
                self.sink.emit_get_local(slot);
                self.ctx.frame.leave_temp(ty)?;
            }
        }

        match target {
            ReturnTarget::Local => {
                self.sink.emit(if ty.is_void() {
                    OpCode::ReturnVoid
                } else {
                    OpCode::Return
                });
            }
            ReturnTarget::NonLocal(scope) => {
                trace!(label = node.label, token = %scope.token, "non-local return");
                scope.mark_targeted();
                if ty.is_void() {
                    self.sink.emit(OpCode::PushUnit);
                }
                // Local finally blocks already ran; catch-alls of this
                // function must let the signal through.
                let start = self.sink.here();
                self.sink
                    .emit_with_constant(OpCode::NonLocalReturn, Constant::TypeHash(scope.token));
                let end = self.sink.here();
                self.ctx.blocks.add_gap(start, end);
            }
        }
        Ok(LazyValue::None)
    }

    pub(crate) fn compile_throw(&mut self, node: &'ast ThrowExpr<'ast>) -> Result<LazyValue<'ast>> {
        self.compile_into(node.value, MachineType::THROWABLE)?;
        self.sink.emit(OpCode::Throw);
        Ok(LazyValue::None)
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
    fn return_through_finally_saves_the_value() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let log = b.function("log", &[], MachineType::Void);
        let f = b.function("f", &[], MachineType::INT);
        let one = b.int(1);
        let early = b.ret(Some(one));
        let try_body = b.block(&[early]);
        let call = b.call(log, &[]);
        let finally = b.block(&[call]);
        let guarded = b.try_catch(try_body, &[], Some(finally), MachineType::Void);
        let zero = b.int(0);
        let late = b.ret(Some(zero));
        let body = b.block(&[guarded, late]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            // try { return 1 } with the finally replayed before returning
            OpCode::PushOne,
            OpCode::SetLocal,
            OpCode::CallStatic,
            OpCode::GetLocal,
            OpCode::Return,
            // normal exit
            OpCode::CallStatic,
            OpCode::Jump,
            // catch-all
            OpCode::SetLocal,
            OpCode::CallStatic,
            OpCode::GetLocal,
            OpCode::Throw,
            OpCode::PushZero,
            OpCode::Return,
        ]);
        assert_eq!(compiled.max_locals, 1);

        let handlers = compiled.chunk.handlers();
        assert_eq!(handlers.len(), 2);
        assert!(handlers.iter().all(|h| h.catch == CatchType::Any && h.handler == 17));
        assert_eq!((handlers[0].start, handlers[0].end), (0, 3));
        assert_eq!((handlers[1].start, handlers[1].end), (7, 10));
    }

    #[test]
    fn void_return_without_finally_is_direct() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[], MachineType::Void);
        let done = b.ret(None);
        let body = b.block(&[done]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[OpCode::ReturnVoid]);
    }

    #[test]
    fn bare_return_from_a_value_function_pushes_a_default() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[], MachineType::LONG);
        let done = b.ret(None);
        let body = b.block(&[done]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        assert_eq!(compiled.chunk.opcodes().last(), Some(&OpCode::Return));
        assert_eq!(compiled.chunk.count_opcode(OpCode::ReturnVoid), 0);
    }

    #[test]
    fn throw_pushes_the_throwable() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let make = b.function("make", &[], MachineType::THROWABLE);
        let f = b.function("f", &[], MachineType::Void);
        let error = b.call(make, &[]);
        let thrown = b.throw(error);
        let body = b.block(&[thrown]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled
            .chunk
            .assert_opcodes(&[OpCode::CallStatic, OpCode::Throw]);
    }
}
