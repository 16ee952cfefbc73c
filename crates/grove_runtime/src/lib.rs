//! Query execution runtime for grove.
//!
//! This crate executes parsed GraphQL operations against a schema of
//! resolver hooks:
//! - `schema`: Types, fields, arguments and the schema-wide hooks
//! - `value`: Values returned by resolvers, including deferred ones
//! - `arguments`: Argument coercion and the per-node arguments cache
//! - `directives`: Directive definitions and their runtime hooks
//! - `query`: Parsed documents and operation selection
//! - `gather`: Collecting the fields selected on an object
//! - `result`: The response tree and null propagation
//! - `scheduler`: Job queue and depth-ordered lazy draining
//! - `lazy`: Memoized deferred computations
//! - `dataloader`: Batch loading keyed lookups
//! - `lookahead`: Inspecting a field's sub-selections
//! - `executor`: Query execution

pub mod arguments;
pub mod context;
pub mod dataloader;
pub mod directives;
pub mod error;
pub mod executor;
pub mod gather;
pub mod lazy;
pub mod lookahead;
pub mod query;
pub mod result;
mod runtime;
pub mod scheduler;
pub mod schema;
pub mod value;

pub use arguments::{
    ArgumentValue, Arguments, ArgumentsCache, ArgumentsResult, ExecutionErrors, Extras,
    FieldNode, Prepared,
};
pub use context::Context;
pub use dataloader::{BatchLoader, BatchSource};
pub use directives::{DirectiveDef, DirectiveLocation};
pub use error::{
    AppError, ExecuteError, ExecutionError, FieldError, PathSegment, SchemaError, TypeError,
    UnauthorizedError,
};
pub use executor::{Executor, ExecutorConfig, Request, Response};
pub use lazy::{Deferred, LazyValue, Settled};
pub use lookahead::Lookahead;
pub use query::Query;
pub use schema::{
    ArgumentDef, EnumDef, Extra, FieldDef, InputObjectDef, InterfaceDef, ObjectDef, ScalarDef,
    Schema, SchemaBuilder, TypeDef, TypeKind, TypeRef, TypeResolution, UnionDef,
};
pub use value::{Fields, Json, Object, ObjectId, Value};
