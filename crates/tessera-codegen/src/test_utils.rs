//! Helpers shared by the unit tests of this crate.

use std::sync::Once;

use tessera_core::Result;
use tessera_tree::{Bindings, DeclId, Expr, FunctionBody};
use tracing_subscriber::EnvFilter;

use crate::module::{CompiledFunction, CompiledModule};
use crate::options::CodegenOptions;
use crate::Compiler;

static INIT: Once = Once::new();

/// Route `tracing` output to the test harness. Filter with `RUST_LOG`.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Compile one body with default options. Closure classes are discarded.
pub fn compile_body(bindings: &Bindings, decl: DeclId, body: Expr<'_>) -> Result<CompiledFunction> {
    compile_body_with(bindings, decl, body, &CodegenOptions::default())
}

pub fn compile_body_with(
    bindings: &Bindings,
    decl: DeclId,
    body: Expr<'_>,
    options: &CodegenOptions,
) -> Result<CompiledFunction> {
    init_test_logging();
    let mut module = CompiledModule::new();
    Compiler::new(bindings)
        .with_options(options.clone())
        .compile_function(FunctionBody { decl, body }, &mut module)
}

pub fn compile_module(bindings: &Bindings, functions: &[(DeclId, Expr<'_>)]) -> Result<CompiledModule> {
    init_test_logging();
    let bodies: Vec<_> = functions
        .iter()
        .map(|&(decl, body)| FunctionBody { decl, body })
        .collect();
    Compiler::new(bindings).compile_module(&bodies)
}
