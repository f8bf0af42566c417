//! Tessera
//!
//! Bytecode generation for a resolved, expression-oriented language.
//!
//! A front end resolves names, types and calls, then hands each function body
//! to the generator as an arena-allocated tree plus [`Bindings`]. The
//! generator produces stack bytecode with exception tables and the closure
//! classes the bodies need.
//!
//! ## Crates
//!
//! - [`codegen`]: the code generator
//! - [`tree`]: the resolved tree and its bindings
//! - [`tessera_core`]: spans, type identities, machine types and errors
//!
//! ## Example
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let arena = bumpalo::Bump::new();
//! let mut b = TreeBuilder::new(&arena);
//! let answer = b.function("answer", &[], MachineType::INT);
//! let body = b.int(42);
//! let bindings = b.finish();
//!
//! let module = tessera::compile(&bindings, &[FunctionBody { decl: answer, body }])?;
//! assert!(module.function_named("answer").is_some());
//! ```

pub use tessera_codegen as codegen;
pub use tessera_tree as tree;

pub use tessera_codegen::{CodegenOptions, CompiledFunction, CompiledModule, Compiler};
pub use tessera_core::{CodegenError, MachineType, Result, Span, TypeHash};
pub use tessera_tree::{Bindings, FunctionBody, TreeBuilder};

/// Common imports for embedders.
pub mod prelude {
    pub use tessera_codegen::{
        BytecodeChunk, CatchType, ClassSink, ClosureClass, ClosureStrategy, CodegenOptions,
        CompiledFunction, CompiledModule, Compiler, Constant, MemberRef, OpCode,
    };
    pub use tessera_core::{CodegenError, MachineType, PrimitiveKind, Result, Span, TypeHash};
    pub use tessera_tree::{
        AssignOp, BinaryOp, Bindings, CaptureDescriptor, CapturedVariable, ConditionSpec,
        DeclId, Expr, FunctionBody, FunctionFlags, TemplateEntry, TreeBuilder,
    };
}

/// Compile `functions` with default options.
pub fn compile(bindings: &Bindings, functions: &[FunctionBody<'_>]) -> Result<CompiledModule> {
    Compiler::new(bindings).compile_module(functions)
}
