//! Function compiler for generating bytecode from function bodies.
//!
//! [`FunctionCompiler`] compiles a single body, either a declared function
//! or the `invoke` of a closure class. It handles:
//!
//! - Reserving slot 0 for the instance of methods, constructors and closures
//! - Laying out the extension receiver and parameters
//! - Moving captured-and-mutated parameters into shared cells
//! - Compiling the body and its implicit return
//! - Catching non-local returns that target the function
//!
//! # Example
//!
//! ```ignore
//! let mut compiler = FunctionCompiler::new(session, &mut module, signature);
//! compiler.setup_parameters()?;
//! compiler.compile_body(body)?;
//! let function = compiler.finish()?;
//! ```

use std::rc::Rc;

use tessera_core::{MachineType, Result, TypeHash};
use tessera_tree::{DeclId, Expr, FunctionInfo};
use tracing::debug;

use crate::bytecode::{CatchType, OpCode};
use crate::context::{FunctionContext, ScopeRecord, Session};
use crate::emit::{BytecodeEmitter, InstructionSink, Label};
use crate::expr::ExprCompiler;
use crate::module::{ClassSink, CompiledFunction};

/// Identity and layout of a body to compile.
#[derive(Debug, Clone)]
pub struct FunctionSignature<'i> {
    pub decl: DeclId,
    pub info: &'i FunctionInfo,
    pub name: String,
    pub owner: Option<TypeHash>,
    pub hash: TypeHash,
    /// Class of the instance in slot 0, if any.
    pub this_type: Option<TypeHash>,
    pub scope: Rc<ScopeRecord>,
}

impl<'i> FunctionSignature<'i> {
    /// Signature of a declared function, method or constructor.
    pub fn declared(decl: DeclId, info: &'i FunctionInfo) -> Self {
        let this_type = if info.has_dispatch_receiver() || info.is_constructor() {
            info.owner
        } else {
            None
        };
        Self {
            decl,
            info,
            name: info.name.clone(),
            owner: info.owner,
            hash: info.hash(),
            this_type,
            scope: ScopeRecord::function(decl, info),
        }
    }
}

/// Parameter whose incoming value is moved into a shared cell.
struct SharedParam {
    decl: DeclId,
    ty: MachineType,
    incoming: u16,
}

/// Compiles a single function body to bytecode.
pub struct FunctionCompiler<'a, 'ast> {
    session: Session<'a>,
    classes: &'a mut dyn ClassSink,
    signature: FunctionSignature<'a>,
    emitter: BytecodeEmitter,
    ctx: FunctionContext<'ast>,
    entry: Label,
    params: Vec<MachineType>,
    named_slots: Vec<(String, MachineType, u16)>,
}

impl<'a, 'ast> FunctionCompiler<'a, 'ast> {
    pub fn new(
        session: Session<'a>,
        classes: &'a mut dyn ClassSink,
        signature: FunctionSignature<'a>,
    ) -> Self {
        let mut emitter = BytecodeEmitter::new();
        let entry = emitter.new_label();
        let ctx = FunctionContext::new(Rc::clone(&signature.scope), signature.this_type);
        Self {
            session,
            classes,
            signature,
            emitter,
            ctx,
            entry,
            params: Vec::new(),
            named_slots: Vec::new(),
        }
    }

    /// Lay out the frame: instance, extension receiver, then parameters.
    pub fn setup_parameters(&mut self) -> Result<()> {
        self.session.options.check_cancelled()?;
        self.emitter.mark(self.entry);

        if let Some(this) = self.signature.this_type {
            let slot = self.ctx.frame.enter_temp(MachineType::Object(this));
            self.named_slots
                .push(("this".to_string(), MachineType::Object(this), slot));
        }

        let info = self.signature.info;
        if let Some(ty) = info.extension_receiver {
            let slot = self.ctx.frame.enter_temp(ty);
            self.ctx.receiver = Some((slot, ty));
            self.params.push(ty);
            self.named_slots.push(("$receiver".to_string(), ty, slot));
        }

        let mut shared = Vec::new();
        for param in &info.params {
            let is_shared = self
                .session
                .bindings
                .variable(param.decl)
                .is_some_and(|v| v.shared);
            let slot = if is_shared {
                let incoming = self.ctx.frame.enter_temp(param.ty);
                shared.push(SharedParam {
                    decl: param.decl,
                    ty: param.ty,
                    incoming,
                });
                incoming
            } else {
                let slot = self.ctx.frame.enter(param.decl, param.ty, false);
                self.named_slots.push((param.name.clone(), param.ty, slot));
                slot
            };
            self.ctx.param_slots.push((slot, param.ty));
            self.params.push(param.ty);
        }

        // Tail calls store their arguments and jump here.
        let start = self.emitter.new_label();
        self.emitter.mark(start);
        self.ctx.start_label = Some(start);

        for param in shared {
            let cell = self.ctx.frame.enter(param.decl, param.ty, true);
            self.emitter.emit(OpCode::NewRef);
            self.emitter.emit_set_local(cell);
            self.emitter.emit_get_local(cell);
            self.emitter.emit_get_local(param.incoming);
            self.emitter.emit(OpCode::SetRef);
            if let Some(variable) = self.session.bindings.variable(param.decl) {
                self.named_slots
                    .push((variable.name.clone(), MachineType::REF, cell));
            }
        }
        Ok(())
    }

    /// Compile the body and its implicit return.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile_body(&mut self, body: Expr<'ast>) -> Result<()> {
        let return_type = self.signature.info.return_type;
        let mut compiler = ExprCompiler::new(
            self.session,
            &mut *self.classes,
            &mut self.emitter,
            &mut self.ctx,
        );
        if ends_in_jump(body) {
            compiler.compile_statement(body)
        } else {
            compiler.begin_statement(body)?;
            compiler.compile_into(body, return_type)?;
            compiler.sink.emit(if return_type.is_void() {
                OpCode::ReturnVoid
            } else {
                OpCode::Return
            });
            Ok(())
        }
    }

    /// Add the non-local return epilogue, the debug tables, and assemble.
    pub fn finish(mut self) -> Result<CompiledFunction> {
        let return_type = self.signature.info.return_type;
        let scope = Rc::clone(&self.signature.scope);

        if scope.is_targeted() {
            // The signal's value is on the stack when the handler runs.
            let handler = self.emitter.new_label();
            self.emitter.mark(handler);
            self.emitter.add_exception_entry(
                self.entry,
                handler,
                handler,
                CatchType::NonLocalReturn(scope.token),
            );
            if return_type.is_void() {
                self.emitter.emit(OpCode::Pop);
                self.emitter.emit(OpCode::ReturnVoid);
            } else {
                self.emitter.emit(OpCode::Return);
            }
        }

        if self.session.options.emit_local_variable_table {
            let end = self.emitter.here();
            for (name, ty, slot) in &self.named_slots {
                self.emitter
                    .add_local_variable(name, *ty, self.entry, end, *slot);
            }
        }

        let max_locals = self.ctx.frame.max_size();
        let chunk = self.emitter.finish()?;
        debug!(
            function = %self.signature.name,
            bytes = chunk.len(),
            max_locals,
            nlr_target = scope.is_targeted(),
            "compiled function"
        );
        Ok(CompiledFunction {
            name: self.signature.name,
            owner: self.signature.owner,
            hash: self.signature.hash,
            decl: self.signature.decl,
            has_this: self.signature.this_type.is_some(),
            params: self.params,
            return_type,
            max_locals,
            chunk,
        })
    }
}

/// Compile `body` as the function described by `signature`.
pub(crate) fn compile_function<'ast>(
    session: Session<'_>,
    classes: &mut dyn ClassSink,
    signature: FunctionSignature<'_>,
    body: Expr<'ast>,
) -> Result<CompiledFunction> {
    let mut compiler = FunctionCompiler::new(session, classes, signature);
    compiler.setup_parameters()?;
    compiler.compile_body(body)?;
    compiler.finish()
}

/// Whether control never falls off the end of `body`.
fn ends_in_jump(body: Expr<'_>) -> bool {
    match body {
        Expr::Return(_) | Expr::Throw(_) => true,
        Expr::Block(block) => block.statements.last().is_some_and(|last| ends_in_jump(*last)),
        _ => false,
    }
}
