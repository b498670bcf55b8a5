//! Error type with source location tracking.
//!
//! All diagnostics in `pcc_front` carry a [`Span`]. This base type is the
//! common shape; `pcc_front::diagnostic` layers the error taxonomy from
//! `spec.md` §7 (lexical/syntactic/semantic/type/range/overflow/internal)
//! on top.

use crate::span::Span;
use std::fmt;

/// An error annotated with its source location.
#[derive(Debug, Clone)]
pub struct SpannedError {
    pub message: String,
    pub span: Span,
}

impl SpannedError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for SpannedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for SpannedError {}

/// Alias for `std::result::Result<T, SpannedError>`.
pub type Result<T> = std::result::Result<T, SpannedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanned_error_display() {
        let err = SpannedError::new("bad token", Span::new(5, 10));
        let display = format!("{}", err);
        assert!(display.contains("bad token"));
        assert!(display.contains("5..10"));
    }
}
