//! Syntax errors.

use grove_core::{Diagnostic, LineIndex, Location};
use miette::SourceSpan;
use thiserror::Error;

/// The first error found while parsing a document.
#[derive(Debug, Clone, Error, miette::Diagnostic)]
#[error("syntax error: {message} ({line}:{column})", line = .location.line, column = .location.column)]
#[diagnostic(code(grove::syntax))]
pub struct ParseError {
    pub message: String,
    pub code: &'static str,
    pub location: Location,
    #[label("here")]
    pub span: SourceSpan,
}

impl ParseError {
    pub(crate) fn from_diagnostic(diagnostic: &Diagnostic, source: &str) -> Self {
        let span = diagnostic.primary_span().unwrap_or_default();
        Self {
            message: diagnostic.message().to_string(),
            code: diagnostic.code,
            location: span.location(&LineIndex::new(source)),
            span: span.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parse_document;

    #[test]
    fn test_display_includes_location() {
        let err = parse_document("{ hero(").unwrap_err();
        assert_eq!(err.location.line, 1);
        assert!(err.to_string().starts_with("syntax error: "));
        assert!(err.to_string().ends_with("(1:8)"));
    }
}
