//! Bytecode types produced by the code generator.
//!
//! - [`OpCode`] - the instruction set of the stack machine
//! - [`BytecodeChunk`] - compiled code, tables and constants of a function
//! - [`Constant`] and [`ConstantPool`] - per-function constant storage

mod chunk;
mod constant;
mod opcode;

pub use chunk::{BytecodeChunk, CatchType, ExceptionHandler, LocalVariable};
pub use constant::{Constant, ConstantPool, MemberRef};
pub use opcode::OpCode;
