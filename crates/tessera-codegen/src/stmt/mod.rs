//! Statement-like constructs of the expression compiler.
//!
//! Every construct here is an expression of the language, compiled by
//! [`ExprCompiler`](crate::expr::ExprCompiler) methods split by concern:
//!
//! - `block`: blocks, local declarations and scope exit
//! - `if_expr`: conditionals
//! - `while_loop`: `while` and `do-while`
//! - `for_loop`: `for` over arrays, ranges, progressions and iterators
//! - `jumps`: `break` and `continue`, with finally replay
//! - `return_stmt`: local and non-local `return`, `throw`
//! - `try_catch`: `try`/`catch`/`finally`
//! - `when_expr`: `when` dispatch

mod block;
mod for_loop;
mod if_expr;
mod jumps;
mod return_stmt;
mod try_catch;
mod when_expr;
mod while_loop;
