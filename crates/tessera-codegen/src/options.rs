//! Code generation settings.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tessera_core::{CodegenError, Result};

/// Shared flag that aborts an in-flight compilation.
///
/// Clones observe the same flag, so a caller can keep one handle and hand
/// another to [`CodegenOptions::with_cancellation`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Options for one compilation.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Allow inline call sites, and with them non-local returns from lambdas.
    pub inline_enabled: bool,
    /// Record source lines for statements.
    pub mark_line_numbers: bool,
    /// Register debug ranges for locals, parameters and catch parameters.
    pub emit_local_variable_table: bool,
    pub cancellation: Option<CancellationToken>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            inline_enabled: true,
            mark_line_numbers: true,
            emit_local_variable_table: true,
            cancellation: None,
        }
    }
}

impl CodegenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inlining(mut self, enabled: bool) -> Self {
        self.inline_enabled = enabled;
        self
    }

    pub fn with_line_numbers(mut self, enabled: bool) -> Self {
        self.mark_line_numbers = enabled;
        self
    }

    pub fn with_local_variable_table(mut self, enabled: bool) -> Self {
        self.emit_local_variable_table = enabled;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Fail with [`CodegenError::Cancelled`] once the token has fired.
    pub fn check_cancelled(&self) -> Result<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(CodegenError::Cancelled),
            _ => Ok(()),
        }
    }
}
