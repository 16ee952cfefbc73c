//! Error types for execution.
//!
//! Four kinds of failure flow through a run:
//! - [`ExecutionError`]: recoverable, recorded in the response and nulls its field.
//! - [`UnauthorizedError`]: routed through the schema's `unauthorized` hook.
//! - [`TypeError`]: the schema and the application data disagree; routed
//!   through the schema's `type_error` hook.
//! - [`AppError`]: arbitrary application failures; routed through the
//!   schema's `rescue` hook, aborting the run when unhandled.

use crate::value::Value;
use grove_core::Location;
use grove_syntax::OperationType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// A segment of a response path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Formats a path as `a.0.b`.
pub(crate) fn display_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// A recoverable error. Returning one from a resolver (as [`Value::Error`])
/// records it in the response and writes `null` in place of the field.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
    /// Overrides the path of the field the error is reported for.
    pub path: Option<Vec<PathSegment>>,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: None,
            path: None,
        }
    }

    /// Adds an entry to the error's `extensions`.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extensions
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Sets `extensions.code`.
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", code.into())
    }

    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }
}

/// An authorization failure for an object or a field.
#[derive(Debug, Clone)]
pub struct UnauthorizedError {
    pub message: Option<String>,
    /// The object type that refused the value.
    pub type_name: String,
    /// Set when a field, rather than a type, refused access.
    pub field: Option<String>,
    /// The value that was refused.
    pub object: Box<Value>,
}

impl UnauthorizedError {
    pub fn new(type_name: impl Into<String>, object: Value) -> Self {
        Self {
            message: None,
            type_name: type_name.into(),
            field: None,
            object: Box::new(object),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = &self.message {
            return f.write_str(message);
        }
        match &self.field {
            Some(field) => write!(f, "Unauthorized to access {}.{field}", self.type_name),
            None => write!(f, "An instance of {} failed authorization", self.type_name),
        }
    }
}

impl std::error::Error for UnauthorizedError {}

/// A disagreement between the schema and the data returned by resolvers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("Cannot return null for non-nullable {subject} {parent_type}.{field}", subject = null_subject(.is_from_array))]
    InvalidNull {
        parent_type: String,
        field: String,
        is_from_array: bool,
    },
    #[error(
        "The value from \"{field}\" on \"{parent_type}\" could not be resolved to \"{abstract_type}\". (Received: `{received}`, Expected: [{expected}])",
        received = .resolved.as_deref().unwrap_or("nil"),
        expected = .possible_types.join(", ")
    )]
    UnresolvedType {
        parent_type: String,
        field: String,
        abstract_type: String,
        resolved: Option<String>,
        possible_types: Vec<String>,
    },
    #[error("Failed to build a list result for field `{parent_type}.{field}` at path `{path}`. Expected a list, got `{received}`")]
    ListResultFailed {
        parent_type: String,
        field: String,
        path: String,
        received: String,
    },
    #[error("`{type_name}` cannot be used as the return type of `{parent_type}.{field}`")]
    InvalidOutputType {
        parent_type: String,
        field: String,
        type_name: String,
    },
}

fn null_subject(is_from_array: &bool) -> &'static str {
    if *is_from_array {
        "list element of"
    } else {
        "field"
    }
}

/// An arbitrary application failure.
#[derive(Clone)]
pub struct AppError(Rc<dyn std::error::Error>);

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

impl AppError {
    pub fn new<E: std::error::Error + 'static>(error: E) -> Self {
        Self(Rc::new(error))
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(MessageError(message.to_string()))
    }

    /// Returns the wrapped error if it is of type `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// An error as reported in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    /// Builds the response error for an execution error raised at `path`.
    pub(crate) fn from_execution_error(
        error: ExecutionError,
        path: Vec<PathSegment>,
        location: Option<Location>,
    ) -> Self {
        Self {
            message: error.message,
            locations: location.into_iter().collect(),
            path: error.path.unwrap_or(path),
            extensions: error.extensions,
        }
    }
}

/// Errors that prevent a response from being produced.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("document does not contain any operations")]
    NoOperation,
    #[error("unknown operation named \"{0}\"")]
    OperationNotFound(String),
    #[error("an operation name is required when the document contains multiple operations")]
    AmbiguousOperation,
    #[error("schema is not configured for {0} operations")]
    MissingRootType(OperationType),
    #[error("unhandled application error: {0}")]
    Unhandled(#[source] AppError),
}

/// Errors found while building a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("query root type is not defined")]
    MissingQueryType,
    #[error("root type `{0}` must be an object type")]
    InvalidRootType(String),
    #[error("type `{type_name}` referenced by `{referenced_by}` is not defined")]
    UnknownType {
        type_name: String,
        referenced_by: String,
    },
}
