//! Blocks, local declarations and block scopes.

use tessera_core::{CodegenError, MachineType, Result, Span};
use tessera_tree::{BlockExpr, DeclId, Expr, MultiDeclExpr, VarDeclExpr};

use crate::bytecode::OpCode;
use crate::context::ScopedLocal;
use crate::expr::{CallSite, ExprCompiler, missing};
use crate::frame::FrameMark;
use crate::value::LazyValue;
use crate::value::coerce::push_default;

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    /// Open a block scope; locals declared until the matching
    /// [`close_scope`](Self::close_scope) live in it.
    pub(crate) fn open_scope(&mut self) -> FrameMark {
        self.ctx.scopes.push(Vec::new());
        self.ctx.frame.mark()
    }

    /// Close the innermost block scope.
    ///
    /// Shared locals have their slot cleared so the cell can be collected,
    /// and every local gets its debug range.
    pub(crate) fn close_scope(&mut self, mark: FrameMark) -> Result<()> {
        let locals = self.ctx.scopes.pop().unwrap_or_default();
        if !locals.is_empty() {
            let end = self.sink.here();
            for local in locals.iter().rev() {
                if local.shared {
                    self.sink.emit(OpCode::PushNull);
                    self.sink.emit_set_local(local.slot);
                }
            }
            if self.options().emit_local_variable_table {
                for local in &locals {
                    let ty = if local.shared { MachineType::REF } else { local.ty };
                    self.sink
                        .add_local_variable(&local.name, ty, local.start, end, local.slot);
                }
            }
        }
        self.ctx.frame.drop_to(mark)
    }

    /// Allocate the slot of local `decl`, creating its cell if it is shared.
    ///
    /// Returns the storage to initialize it through. The local only gets a
    /// debug range once [`scope_local`](Self::scope_local) is called.
    pub(crate) fn enter_local(&mut self, decl: DeclId, span: Span) -> Result<LazyValue<'ast>> {
        let info = self.variable_info(decl, span)?;
        let slot = self.ctx.frame.enter(decl, info.ty, info.shared);
        if info.shared {
            self.sink.emit(OpCode::NewRef);
            self.sink.emit_set_local(slot);
            return Ok(LazyValue::SharedLocal { slot, ty: info.ty });
        }
        Ok(LazyValue::local(slot, info.ty))
    }

    /// Start the debug range of local `decl` at the current position.
    pub(crate) fn scope_local(&mut self, decl: DeclId, span: Span) -> Result<()> {
        let info = self.variable_info(decl, span)?;
        let local = self.ctx.frame.lookup(decl).ok_or_else(|| {
            CodegenError::internal(format!("local `{}` has no slot", info.name)).at(span)
        })?;
        let start = self.sink.here();
        if let Some(scope) = self.ctx.scopes.last_mut() {
            scope.push(ScopedLocal {
                decl,
                name: info.name.clone(),
                ty: local.ty,
                slot: local.slot,
                shared: local.shared,
                start,
            });
        }
        Ok(())
    }

    /// Compile a block; its value is the value of its last statement.
    pub(crate) fn compile_block(
        &mut self,
        block: &'ast BlockExpr<'ast>,
        ty: MachineType,
    ) -> Result<LazyValue<'ast>> {
        let mark = self.open_scope();
        self.compile_block_statements(block.statements, ty)?;
        self.close_scope(mark)?;
        Ok(if ty.is_void() {
            LazyValue::None
        } else {
            LazyValue::OnStack(ty)
        })
    }

    /// Compile `statements` in the current scope, leaving the last one's
    /// value as `ty`.
    pub(crate) fn compile_block_statements(
        &mut self,
        statements: &'ast [Expr<'ast>],
        ty: MachineType,
    ) -> Result<()> {
        let Some((last, init)) = statements.split_last() else {
            push_default(ty, &mut *self.sink);
            return Ok(());
        };
        for statement in init {
            self.compile_statement(*statement)?;
        }
        if ty.is_void() {
            return self.compile_statement(*last);
        }
        self.begin_statement(*last)?;
        self.compile_into(*last, ty)
    }

    /// Compile a local variable declaration.
    pub(crate) fn compile_var_decl(
        &mut self,
        declaration: &'ast VarDeclExpr<'ast>,
    ) -> Result<LazyValue<'ast>> {
        let decl = self.reference(declaration.id, declaration.span)?;
        let local = self.enter_local(decl, declaration.span)?;
        if let Some(initializer) = declaration.initializer {
            let value = self.lazy(initializer)?;
            self.store(&local, &value)?;
        }
        self.scope_local(decl, declaration.span)?;
        Ok(LazyValue::None)
    }

    /// Compile `val (a, b) = initializer`.
    ///
    /// The initializer is kept in a temporary and each variable is set from
    /// its `componentN` call on it, in declaration order.
    pub(crate) fn compile_multi_decl(
        &mut self,
        declaration: &'ast MultiDeclExpr<'ast>,
    ) -> Result<LazyValue<'ast>> {
        let mut targets = Vec::with_capacity(declaration.entries.len());
        for entry in declaration.entries {
            let decl = self.reference(entry.id, entry.span)?;
            let local = self.enter_local(decl, entry.span)?;
            targets.push((entry, decl, local));
        }

        let ty = self.type_of(declaration.initializer)?;
        let temp = self.ctx.frame.enter_temp(ty);
        self.compile_into(declaration.initializer, ty)?;
        self.sink.emit_set_local(temp);
        for (entry, _, local) in &targets {
            let resolved = self
                .bindings()
                .call(entry.id)
                .ok_or_else(|| missing("component call", entry.id, entry.span))?;
            let site = CallSite {
                node: entry.id,
                span: entry.span,
            };
            let target_type = Self::store_type(local);
            self.put_receiver(local)?;
            let value = self.compile_resolved_call(
                site,
                resolved,
                Some(LazyValue::local(temp, ty)),
                Vec::new(),
                target_type,
            )?;
            self.put(&value, target_type)?;
            self.store_to_receiver(local)?;
        }
        if ty.is_reference() {
            self.sink.emit(OpCode::PushNull);
            self.sink.emit_set_local(temp);
        }
        self.ctx.frame.leave_temp(ty)?;

        for (entry, decl, _) in &targets {
            self.scope_local(*decl, entry.span)?;
        }
        Ok(LazyValue::None)
    }
}
