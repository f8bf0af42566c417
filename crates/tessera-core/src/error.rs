//! Errors raised while generating bytecode.
//!
//! ## Taxonomy
//!
//! ```text
//! CodegenError
//! ├── MissingResolution      - front end left a node without the data codegen needs
//! ├── Unsupported            - node shape has no compilation rule
//! ├── InvalidStore           - assignment into a read-only value
//! ├── NonLocalReturn*        - return targets that cannot be honored
//! ├── UnresolvedLabel        - break/continue/return target not on any enclosing scope
//! ├── Internal               - codegen invariant broken (labels, slots, stack discipline)
//! ├── AtNode                 - any of the above, wrapped with the failing node's span
//! └── Cancelled              - external abort, never wrapped
//! ```
//!
//! Runtime failures such as a failed cast or a non-exhaustive `when` are not
//! compile errors: they compile into code that throws.

use thiserror::Error;

use crate::Span;

/// Errors produced by the code generator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// A node lacks resolution data the front end must provide.
    #[error("at {span}: missing {what} for node #{node}")]
    MissingResolution {
        what: &'static str,
        node: u32,
        span: Span,
    },

    /// A node kind or shape with no compilation rule.
    #[error("at {span}: unsupported construct: {construct}")]
    Unsupported { construct: String, span: Span },

    /// Attempt to store into a constant, call result or other read-only value.
    #[error("at {span}: expression is not assignable")]
    InvalidStore { span: Span },

    /// A non-local return was requested while inlining is turned off.
    #[error("at {span}: non-local return requires inlining, which is disabled")]
    NonLocalReturnWithoutInlining { span: Span },

    /// A non-local return would escape a closure that is a real object.
    #[error("at {span}: return@{label} crosses a closure that is not inlined")]
    NonLocalReturnAcrossClosure { label: String, span: Span },

    /// No enclosing loop or function matches the requested label.
    #[error("at {span}: target label for {what} not found")]
    UnresolvedLabel { what: String, span: Span },

    /// A code generator invariant was violated.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// An error raised while compiling the node at `span`.
    #[error("at {span}: {source}")]
    AtNode {
        span: Span,
        #[source]
        source: Box<CodegenError>,
    },

    /// Compilation was aborted from outside.
    #[error("compilation cancelled")]
    Cancelled,
}

impl CodegenError {
    pub fn internal(message: impl Into<String>) -> Self {
        CodegenError::Internal {
            message: message.into(),
        }
    }

    pub fn unsupported(construct: impl Into<String>, span: Span) -> Self {
        CodegenError::Unsupported {
            construct: construct.into(),
            span,
        }
    }

    /// Attach a source location.
    ///
    /// Errors that already carry one are returned unchanged, and so is
    /// [`CodegenError::Cancelled`], which must reach the caller as-is.
    pub fn at(self, span: Span) -> Self {
        if self.span().is_some() || self.is_cancelled() {
            return self;
        }
        CodegenError::AtNode {
            span,
            source: Box::new(self),
        }
    }

    /// Location of the failing node, if known.
    pub fn span(&self) -> Option<Span> {
        match self {
            CodegenError::MissingResolution { span, .. }
            | CodegenError::Unsupported { span, .. }
            | CodegenError::InvalidStore { span }
            | CodegenError::NonLocalReturnWithoutInlining { span }
            | CodegenError::NonLocalReturnAcrossClosure { span, .. }
            | CodegenError::UnresolvedLabel { span, .. }
            | CodegenError::AtNode { span, .. } => Some(*span),
            CodegenError::Internal { .. } | CodegenError::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CodegenError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_get_wrapped_once() {
        let span = Span::new(4, 2, 3);
        let err = CodegenError::internal("bad slot").at(span);
        assert_eq!(err.span(), Some(span));
        let again = err.clone().at(Span::new(9, 9, 1));
        assert_eq!(again, err);
        assert_eq!(again.to_string(), "at 4:2: internal error: bad slot");
    }

    #[test]
    fn cancellation_is_never_wrapped() {
        let err = CodegenError::Cancelled.at(Span::new(1, 1, 1));
        assert!(err.is_cancelled());
        assert_eq!(err.span(), None);
    }

    #[test]
    fn located_errors_keep_their_own_span() {
        let inner = Span::new(2, 5, 1);
        let err = CodegenError::InvalidStore { span: inner }.at(Span::new(1, 1, 20));
        assert_eq!(err, CodegenError::InvalidStore { span: inner });
    }
}
