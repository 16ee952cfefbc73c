//! Query execution entry point.

use crate::context::Context;
use crate::error::{ExecuteError, FieldError};
use crate::query::Query;
use crate::runtime::Runtime;
use crate::schema::Schema;
use crate::value::{Json, Value};
use serde::{Deserialize, Serialize};

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Run root mutation fields one at a time, each fully resolved before
    /// the next starts.
    pub eager_mutations: bool,
    /// Evaluate each object item of a list as its own job. When false,
    /// items are evaluated in place.
    pub schedule_list_items: bool,
    /// Result nodes deeper than this are not built; the field becomes
    /// `null` with an error.
    pub max_depth: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            eager_mutations: true,
            schedule_list_items: true,
            max_depth: None,
        }
    }
}

/// The query executor.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    /// Creates a new executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor with configuration.
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes the selected operation of `query`.
    ///
    /// Field errors end up in the response. An `Err` means no response could
    /// be produced: the operation could not be selected, or an application
    /// error was not rescued.
    pub fn execute(
        &self,
        schema: &Schema,
        query: &Query,
        request: &Request,
        ctx: &Context,
    ) -> Result<Response, ExecuteError> {
        let operation = query.operation(request.operation_name.as_deref())?;
        let root_type = schema
            .root_type(operation.operation)
            .ok_or(ExecuteError::MissingRootType(operation.operation))?;

        let span = tracing::debug_span!(
            "execute",
            operation = operation.name.as_ref().map_or("", |name| name.as_str()),
            kind = %operation.operation,
        );
        let _guard = span.enter();

        Runtime::new(schema, query, operation, &request.variables, ctx, &self.config)
            .run(root_type, request.root_value.clone())
    }
}

/// What to execute: operation name, variables and root value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: serde_json::Map<String, Json>,
    /// The object root fields are resolved on.
    #[serde(skip)]
    pub root_value: Value,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Sets every variable from a JSON object. Other JSON values clear the
    /// variables.
    #[must_use]
    pub fn variables(mut self, variables: Json) -> Self {
        self.variables = match variables {
            Json::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn root_value(mut self, value: impl Into<Value>) -> Self {
        self.root_value = value.into();
        self
    }
}

/// An execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// `None` when a null reached the root.
    pub data: Option<Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl Response {
    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if the response has data.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// The response in its JSON shape.
    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}
