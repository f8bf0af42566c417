//! Literal expression compilation.
//!
//! Literals never emit code when compiled; the constant is pushed when the
//! consumer puts it, already in the type it asks for.

use tessera_tree::LiteralExpr;

use super::{ExprCompiler, Result};
use crate::value::LazyValue;

/// Compile a literal expression.
pub fn compile_literal<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    literal: &'ast LiteralExpr,
) -> Result<LazyValue<'ast>> {
    let ty = compiler
        .bindings()
        .type_of(literal.id)
        .unwrap_or_else(|| literal.value.natural_type());
    Ok(LazyValue::constant(literal.value.clone(), ty))
}
