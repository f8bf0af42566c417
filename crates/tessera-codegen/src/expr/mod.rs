//! Expression compiler.
//!
//! The [`ExprCompiler`] walks one function body and turns every node into a
//! [`LazyValue`]. Nothing is pushed until the consumer asks for it:
//!
//! - `compile_value()` - describe the node's result (may emit side effects)
//! - `compile_into()` - describe it, then put it on the stack as a given type
//! - `compile_statement()` - compile it for its effects only
//!
//! Statements and expressions share one walker because every construct of
//! the language is an expression: `if`, `when`, `try` and blocks produce
//! values, and `return`, `break` and `throw` may appear in operand position.
//!
//! # Example
//!
//! ```ignore
//! let mut compiler = ExprCompiler::new(session, &mut module, &mut emitter, &mut ctx);
//! let value = compiler.compile_value(expr)?;
//! compiler.put(&value, MachineType::LONG)?;
//! ```

mod assignment;
mod calls;
mod cast;
mod lambda;
mod literals;
pub(crate) mod member;
mod names;
mod operators;
mod template;

use tessera_core::{CodegenError, MachineType, Result, Span};
use tessera_tree::{Bindings, DeclId, Expr, FunctionInfo, NodeId, VariableInfo};

use crate::context::{FunctionContext, Session};
use crate::emit::InstructionSink;
use crate::module::ClassSink;
use crate::options::CodegenOptions;
use crate::policy::CallPolicy;
use crate::value::LazyValue;

pub(crate) use calls::{CallSite, argc};
pub(crate) use cast::checked_type;
pub(crate) use operators::literal_range;

/// Compiles the expressions of one function body.
///
/// Holds the session inputs, the sink receiving closure classes, the
/// instruction sink of the function and its mutable context.
pub struct ExprCompiler<'a, 'ast> {
    session: Session<'a>,
    /// Receives closure classes of lambdas and callable references.
    pub(crate) classes: &'a mut dyn ClassSink,
    pub(crate) sink: &'a mut dyn InstructionSink,
    pub(crate) ctx: &'a mut FunctionContext<'ast>,
}

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    pub fn new(
        session: Session<'a>,
        classes: &'a mut dyn ClassSink,
        sink: &'a mut dyn InstructionSink,
        ctx: &'a mut FunctionContext<'ast>,
    ) -> Self {
        Self {
            session,
            classes,
            sink,
            ctx,
        }
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Describe the result of `expr`.
    ///
    /// Constructs with side effects emit them right away; the returned value
    /// must be consumed before anything else is emitted.
    pub fn compile_value(&mut self, expr: Expr<'ast>) -> Result<LazyValue<'ast>> {
        let span = expr.span();
        self.dispatch(expr).map_err(|e| e.at(span))
    }

    fn dispatch(&mut self, expr: Expr<'ast>) -> Result<LazyValue<'ast>> {
        if let Some(value) = self.bindings().constant(expr.id()) {
            let ty = self.type_of(expr)?;
            return Ok(LazyValue::constant(value.clone(), ty));
        }

        match expr {
            Expr::Literal(lit) => literals::compile_literal(self, lit),
            Expr::Name(name) => names::compile_name(self, name),
            Expr::This(this) => names::compile_this(self, this),
            Expr::Block(block) => {
                let ty = self.type_of(expr)?;
                self.compile_block(block, ty)
            }
            Expr::VarDecl(decl) => self.compile_var_decl(decl),
            Expr::If(if_expr) => {
                let ty = self.type_of(expr)?;
                self.compile_if(if_expr, ty)
            }
            Expr::While(while_expr) => self.compile_while(while_expr),
            Expr::DoWhile(do_while) => self.compile_do_while(do_while),
            Expr::For(for_expr) => self.compile_for(for_expr),
            Expr::Break(jump) => self.compile_break(jump),
            Expr::Continue(jump) => self.compile_continue(jump),
            Expr::Return(ret) => self.compile_return(ret),
            Expr::Throw(throw) => self.compile_throw(throw),
            Expr::Try(try_expr) => {
                let ty = self.type_of(expr)?;
                self.compile_try(try_expr, ty)
            }
            Expr::When(when) => {
                let ty = self.type_of(expr)?;
                self.compile_when(when, ty)
            }
            Expr::Binary(binary) => operators::compile_binary(self, binary),
            Expr::Unary(unary) => operators::compile_unary(self, unary),
            Expr::Postfix(postfix) => operators::compile_postfix(self, postfix),
            Expr::Assign(assign) => assignment::compile_assign(self, assign),
            Expr::Call(call) => calls::compile_call(self, call, None),
            Expr::Qualified(qualified) => member::compile_qualified(self, qualified),
            Expr::Index(index) => member::compile_index(self, index),
            Expr::Lambda(lambda) => lambda::compile_lambda(self, lambda),
            Expr::CallableRef(reference) => lambda::compile_callable_ref(self, reference),
            Expr::Is(is) => cast::compile_is(self, is),
            Expr::Cast(cast) => cast::compile_cast(self, cast),
            Expr::StringTemplate(template) => template::compile_template(self, template),
            Expr::MultiDecl(declaration) => self.compile_multi_decl(declaration),
            Expr::ObjectLiteral(object) => lambda::compile_object_literal(self, object),
            Expr::LocalFunction(local) => lambda::compile_local_function(self, local),
        }
    }

    /// Compile `expr` and leave its value on the stack as `ty`.
    pub fn compile_into(&mut self, expr: Expr<'ast>, ty: MachineType) -> Result<()> {
        let value = self.compile_value(expr)?;
        self.put(&value, ty).map_err(|e| e.at(expr.span()))
    }

    /// Compile `expr` for its effects, leaving the stack as it was.
    pub fn compile_statement(&mut self, expr: Expr<'ast>) -> Result<()> {
        self.begin_statement(expr)?;
        let span = expr.span();
        let result = match expr {
            Expr::Block(block) => self.compile_block(block, MachineType::Void).map(drop),
            Expr::If(if_expr) => self.compile_if(if_expr, MachineType::Void).map(drop),
            Expr::When(when) => self.compile_when(when, MachineType::Void).map(drop),
            Expr::Try(try_expr) => self.compile_try(try_expr, MachineType::Void).map(drop),
            _ => {
                let value = self.compile_value(expr)?;
                self.put(&value, MachineType::Void)
            }
        };
        result.map_err(|e| e.at(span))
    }

    /// Check for cancellation and record the statement's source line.
    pub(crate) fn begin_statement(&mut self, expr: Expr<'ast>) -> Result<()> {
        self.options().check_cancelled()?;
        self.mark_line(expr.span());
        Ok(())
    }

    pub(crate) fn mark_line(&mut self, span: Span) {
        if self.options().mark_line_numbers && !span.is_synthetic() && self.ctx.take_line(span.line)
        {
            self.sink.set_line(span.line);
        }
    }

    /// Describe `expr` without compiling it yet.
    ///
    /// Literals, constants and names are resolved immediately since they
    /// emit nothing; everything else is compiled when the value is put.
    pub(crate) fn lazy(&mut self, expr: Expr<'ast>) -> Result<LazyValue<'ast>> {
        match expr {
            Expr::Literal(_) | Expr::Name(_) | Expr::This(_) => self.compile_value(expr),
            _ if self.bindings().constant(expr.id()).is_some() => self.compile_value(expr),
            _ => Ok(LazyValue::Deferred {
                expr,
                ty: self.type_of(expr)?,
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn session(&self) -> Session<'a> {
        self.session
    }

    pub fn bindings(&self) -> &'a Bindings {
        self.session.bindings
    }

    pub fn options(&self) -> &'a CodegenOptions {
        self.session.options
    }

    pub(crate) fn policy(&self) -> &'a dyn CallPolicy {
        self.session.policy
    }

    // =========================================================================
    // Resolution lookups
    // =========================================================================

    pub(crate) fn type_of(&self, expr: Expr<'ast>) -> Result<MachineType> {
        self.bindings()
            .type_of(expr.id())
            .ok_or_else(|| missing("expression type", expr.id(), expr.span()))
    }

    pub(crate) fn reference(&self, node: NodeId, span: Span) -> Result<DeclId> {
        self.bindings()
            .reference(node)
            .ok_or_else(|| missing("declaration reference", node, span))
    }

    pub(crate) fn function_info(&self, decl: DeclId, span: Span) -> Result<&'a FunctionInfo> {
        self.bindings().function(decl).ok_or_else(|| {
            CodegenError::MissingResolution {
                what: "function declaration",
                node: decl.0,
                span,
            }
        })
    }

    pub(crate) fn variable_info(&self, decl: DeclId, span: Span) -> Result<&'a VariableInfo> {
        self.bindings().variable(decl).ok_or_else(|| {
            CodegenError::MissingResolution {
                what: "variable declaration",
                node: decl.0,
                span,
            }
        })
    }

    pub(crate) fn type_operand(&self, node: NodeId, span: Span) -> Result<MachineType> {
        self.bindings()
            .type_operand(node)
            .ok_or_else(|| missing("type operand", node, span))
    }
}

/// Front-end data the generator needed but did not find.
pub(crate) fn missing(what: &'static str, node: NodeId, span: Span) -> CodegenError {
    CodegenError::MissingResolution {
        what,
        node: node.0,
        span,
    }
}
