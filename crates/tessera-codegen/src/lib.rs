//! Tessera Code Generator
//!
//! Lowers resolved expression trees to stack bytecode with exception tables.
//!
//! ## Architecture
//!
//! - Every construct of the source language is an expression; one walker
//!   ([`ExprCompiler`]) compiles both statements and operands.
//! - Compiling a node yields a [`LazyValue`] describing where its result
//!   lives. The consumer decides whether to load, store or branch on it.
//! - Loops and `try` blocks push elements on a block stack so that `break`,
//!   `continue` and `return` replay every `finally` they leave.
//! - Lambdas, local functions and object literals become closure classes
//!   handed to a [`ClassSink`].
//!
//! ## Modules
//!
//! - [`bytecode`]: Opcodes, constant pools and bytecode chunks
//! - [`emit`]: Instruction sink with labels and exception tables
//! - [`frame`]: Local slot allocation
//! - [`blocks`]: Loop and try block stack
//! - [`context`]: Per-function state and the enclosing scope chain
//! - [`value`]: Lazy values and primitive coercions
//! - [`expr`]: Expression compiler
//! - [`stmt`]: Blocks, conditionals, loops, jumps, `try` and `when`
//! - [`function`]: Function prologue, body and epilogue
//! - [`module`]: Compiled functions and closure classes
//! - [`policy`]: Intrinsic and inlining decisions
//! - [`options`]: Code generation settings

pub mod blocks;
pub mod bytecode;
pub mod context;
pub mod emit;
pub mod expr;
pub mod frame;
pub mod function;
pub mod module;
pub mod options;
pub mod policy;
pub mod stmt;
pub mod value;

#[cfg(test)]
mod test_utils;

pub use bytecode::{
    BytecodeChunk, CatchType, Constant, ConstantPool, ExceptionHandler, LocalVariable, MemberRef,
    OpCode,
};
pub use context::Session;
pub use emit::{BytecodeEmitter, InstructionSink, Label};
pub use expr::ExprCompiler;
pub use function::{FunctionCompiler, FunctionSignature};
pub use module::{
    ClassSink, ClosureClass, ClosureField, ClosureStrategy, CompiledFunction, CompiledModule,
    SuperCall,
};
pub use options::{CancellationToken, CodegenOptions};
pub use policy::{CallPolicy, DefaultCallPolicy, Intrinsic};
pub use value::LazyValue;

// Re-export the error type from core for convenience
pub use tessera_core::{CodegenError, Result};

use tessera_tree::{Bindings, FunctionBody};
use tracing::{debug, info};

static DEFAULT_POLICY: DefaultCallPolicy = DefaultCallPolicy;

/// Entry point: compiles function bodies against one set of bindings.
///
/// ```ignore
/// let module = Compiler::new(&bindings)
///     .with_options(CodegenOptions::new().with_inlining(false))
///     .compile_module(&bodies)?;
/// ```
pub struct Compiler<'a> {
    bindings: &'a Bindings,
    options: CodegenOptions,
    policy: &'a dyn CallPolicy,
}

impl<'a> Compiler<'a> {
    pub fn new(bindings: &'a Bindings) -> Self {
        Self {
            bindings,
            options: CodegenOptions::default(),
            policy: &DEFAULT_POLICY,
        }
    }

    pub fn with_options(mut self, options: CodegenOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the intrinsic and inlining decisions.
    pub fn with_policy(mut self, policy: &'a dyn CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    fn session(&self) -> Session<'_> {
        Session {
            bindings: self.bindings,
            options: &self.options,
            policy: self.policy,
        }
    }

    /// Compile one function. Closure classes created on the way go to
    /// `classes`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile_function(
        &self,
        function: FunctionBody<'_>,
        classes: &mut dyn ClassSink,
    ) -> Result<CompiledFunction> {
        self.options.check_cancelled()?;
        let info = self.bindings.function(function.decl).ok_or_else(|| {
            CodegenError::internal(format!("{:?} is not a function declaration", function.decl))
        })?;
        debug!(name = %info.name, "compiling function");
        let signature = FunctionSignature::declared(function.decl, info);
        function::compile_function(self.session(), classes, signature, function.body)
    }

    /// Compile every body into a fresh module.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile_module(&self, functions: &[FunctionBody<'_>]) -> Result<CompiledModule> {
        let mut module = CompiledModule::new();
        for &function in functions {
            let compiled = self.compile_function(function, &mut module)?;
            module.add_function(compiled);
        }
        info!(
            functions = module.functions().len(),
            closures = module.closures().len(),
            "compiled module"
        );
        Ok(module)
    }
}
