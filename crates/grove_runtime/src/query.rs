//! Parsed query documents.

use crate::error::ExecuteError;
use grove_core::{LineIndex, Location, Span};
use grove_syntax::{ast, parse_document, ParseError};

/// A parsed executable document together with its source text.
///
/// Execution caches coerced arguments by AST node address, so a `Query` is
/// borrowed, never moved, while it runs.
#[derive(Debug)]
pub struct Query {
    source: String,
    document: ast::Document,
    line_index: LineIndex,
}

impl Query {
    /// Parses `source`, failing on the first syntax error.
    pub fn parse(source: impl Into<String>) -> Result<Self, ParseError> {
        let source = source.into();
        let document = parse_document(&source)?;
        let line_index = LineIndex::new(&source);
        Ok(Self {
            source,
            document,
            line_index,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn document(&self) -> &ast::Document {
        &self.document
    }

    /// Line and column of a span's start.
    pub fn location(&self, span: Span) -> Location {
        span.location(&self.line_index)
    }

    /// Picks the operation to run.
    ///
    /// Without a name the document must contain exactly one operation.
    pub fn operation(&self, name: Option<&str>) -> Result<&ast::OperationDefinition, ExecuteError> {
        let mut operations = self.document.operations();
        match name {
            Some(name) => operations
                .find(|op| op.name.as_ref().is_some_and(|n| n.value == name))
                .ok_or_else(|| ExecuteError::OperationNotFound(name.to_string())),
            None => {
                let first = operations.next().ok_or(ExecuteError::NoOperation)?;
                if operations.next().is_some() {
                    return Err(ExecuteError::AmbiguousOperation);
                }
                Ok(first)
            }
        }
    }
}
