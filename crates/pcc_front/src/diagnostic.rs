//! Error taxonomy and propagation (`spec.md` §7).
//!
//! Every failure the front end can report is one [`Diagnostic`], carrying a
//! [`Span`] and a [`DiagnosticKind`] drawn from the taxonomy the spec names:
//! lexical, syntax, type, scope, and overflow. `pcc_base::SpannedError` is
//! used internally for the lexer (it has no taxonomy of its own, just a
//! message); everything downstream of the lexer reports through this
//! richer, serializable form so the CLI can emit machine-readable JSON
//! (`spec.md` §6.5's `--emit=json`), mirroring the way the teacher's own
//! `diagnostic.rs` shapes its rustc-compatible JSON.

use serde::Serialize;

use pcc_base::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Lexical,
    Syntax,
    Type,
    Scope,
    Overflow,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn lexical(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Lexical, message, span)
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Syntax, message, span)
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Type, message, span)
    }

    pub fn scope(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Scope, message, span)
    }

    pub fn overflow(message: impl Into<String>, span: Span) -> Self {
        Diagnostic::new(DiagnosticKind::Overflow, message, span)
    }
}

/// A sink that collects diagnostics without aborting compilation.
///
/// `spec.md` §7: "syntax errors should not abort the whole file; the
/// compiler keeps going on a best-effort basis to surface as many mistakes
/// as it safely can in one pass." Collecting into a `Vec` rather than
/// returning on the first error is what makes that possible; callers decide
/// whether any fatal condition (table overflow, unterminated string) should
/// stop the pass early by checking `is_fatal`.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        log::warn!("{:?}: {} at {:?}", diag.kind, diag.message, diag.span);
        self.diagnostics.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn is_fatal(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::Overflow))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_diagnostic_is_fatal_others_are_not() {
        let mut bag = DiagnosticBag::new();
        bag.push(Diagnostic::syntax("unexpected token", Span::new(0, 1)));
        assert!(bag.has_errors());
        assert!(!bag.is_fatal());
        bag.push(Diagnostic::overflow("symbol table overflow", Span::new(0, 0)));
        assert!(bag.is_fatal());
    }

    #[test]
    fn serializes_to_json_array() {
        let mut bag = DiagnosticBag::new();
        bag.push(Diagnostic::type_error("incompatible types", Span::new(3, 9)));
        let json = bag.to_json().unwrap();
        assert!(json.contains("\"type\""));
        assert!(json.contains("incompatible types"));
    }
}
