//! Core types shared by the tessera tree and code generator crates.
//!
//! - [`Span`]: source locations
//! - [`TypeHash`]: deterministic identities for types, members and labels
//! - [`MachineType`]: machine-level value representations
//! - [`CodegenError`]: the code generator's error taxonomy

mod error;
mod machine_type;
mod span;
mod type_hash;

pub use error::CodegenError;
pub use machine_type::{ElementType, MachineType, PrimitiveKind, StackKind};
pub use span::Span;
pub use type_hash::{TypeHash, hash_constants, well_known};

/// Result type used throughout code generation.
pub type Result<T> = std::result::Result<T, CodegenError>;
