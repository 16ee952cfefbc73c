//! Argument coercion and the per-execution arguments cache.
//!
//! Raw argument nodes are turned into JSON (substituting variables), checked
//! and coerced against the declared argument types, passed through `prepare`
//! hooks, and frozen into an [`Arguments`] value. Results are cached by
//! argument owner, AST node and, for owners whose hooks read the parent
//! object, the parent's identity.

use crate::context::Context;
use crate::directives::DirectiveDef;
use crate::error::{ExecutionError, FieldError, PathSegment};
use crate::lazy::{Deferred, LazyValue, Settled};
use crate::lookahead::Lookahead;
use crate::schema::{ArgumentDef, FieldDef, Prepare, Schema, TypeDef, TypeRef};
use crate::value::{Json, ObjectId, Value};
use grove_core::Location;
use grove_syntax::ast;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// The result of an argument's `prepare` hook.
#[derive(Debug, Clone)]
pub enum Prepared {
    Value(Json),
    /// Rejects the arguments; the field resolves to `null` with this error.
    Error(ExecutionError),
    Lazy(LazyValue<Prepared>),
}

impl Prepared {
    pub fn lazy(f: impl FnOnce() -> Prepared + 'static) -> Self {
        Self::Lazy(LazyValue::new(f))
    }

    fn force(mut self) -> Result<Json, ExecutionError> {
        loop {
            match self {
                Self::Value(value) => return Ok(value),
                Self::Error(err) => return Err(err),
                Self::Lazy(lazy) => self = lazy.force(),
            }
        }
    }
}

/// A single coerced argument.
#[derive(Clone)]
pub struct ArgumentValue {
    pub definition: Arc<ArgumentDef>,
    /// The value after `prepare`.
    pub value: Json,
    /// The coerced value before `prepare`.
    pub original_value: Json,
    /// True when the argument was absent and its default was used.
    pub default_used: bool,
}

impl fmt::Debug for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentValue")
            .field("name", &self.definition.name)
            .field("value", &self.value)
            .field("original_value", &self.original_value)
            .field("default_used", &self.default_used)
            .finish()
    }
}

/// A handle for adding errors at a field's path.
#[derive(Clone)]
pub struct ExecutionErrors {
    sink: Rc<RefCell<Vec<FieldError>>>,
    path: Vec<PathSegment>,
    location: Option<Location>,
}

impl ExecutionErrors {
    pub(crate) fn new(
        sink: Rc<RefCell<Vec<FieldError>>>,
        path: Vec<PathSegment>,
        location: Option<Location>,
    ) -> Self {
        Self {
            sink,
            path,
            location,
        }
    }

    /// Records an error without changing the field's value.
    pub fn add(&self, error: ExecutionError) {
        self.sink.borrow_mut().push(FieldError::from_execution_error(
            error,
            self.path.clone(),
            self.location,
        ));
    }

    /// Number of errors recorded so far in the whole response.
    pub fn len(&self) -> usize {
        self.sink.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ExecutionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionErrors")
            .field("path", &self.path)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// The selection a field was resolved for.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub name: String,
    pub alias: Option<String>,
    pub location: Location,
}

/// Values injected for the extras a field requests. Only requested extras
/// are set.
#[derive(Debug, Clone, Default)]
pub struct Extras {
    pub ast_node: Option<FieldNode>,
    pub path: Option<Vec<PathSegment>>,
    pub execution_errors: Option<ExecutionErrors>,
    pub lookahead: Option<Lookahead>,
    /// The coerced arguments themselves, with per-argument details.
    pub argument_details: Option<Rc<Arguments>>,
    /// The application object one level above the field's owner.
    pub parent: Option<Value>,
    pub custom: IndexMap<String, Json>,
}

/// Coerced arguments for one field or directive. Never mutated once built.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    keyword_arguments: IndexMap<String, Json>,
    argument_values: IndexMap<String, ArgumentValue>,
    extras: Extras,
}

impl Arguments {
    /// Creates arguments from already coerced values.
    pub fn new(keyword_arguments: IndexMap<String, Json>) -> Self {
        Self {
            keyword_arguments,
            argument_values: IndexMap::new(),
            extras: Extras::default(),
        }
    }

    /// Gets an argument value.
    pub fn get(&self, name: &str) -> Option<&Json> {
        self.keyword_arguments.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument.
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, ExecutionError> {
        let value = self
            .get(name)
            .ok_or_else(|| ExecutionError::new(format!("Missing required argument: {name}")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ExecutionError::new(format!("Invalid argument {name}: {e}")))
    }

    /// True if the argument was given or defaulted, even to `null`.
    pub fn contains(&self, name: &str) -> bool {
        self.keyword_arguments.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.keyword_arguments.is_empty()
    }

    pub fn keyword_arguments(&self) -> &IndexMap<String, Json> {
        &self.keyword_arguments
    }

    pub fn argument_value(&self, name: &str) -> Option<&ArgumentValue> {
        self.argument_values.get(name)
    }

    pub fn argument_values(&self) -> impl Iterator<Item = &ArgumentValue> {
        self.argument_values.values()
    }

    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    /// Returns a copy carrying `extras`.
    #[must_use]
    pub fn merge_extras(&self, extras: Extras) -> Self {
        Self {
            keyword_arguments: self.keyword_arguments.clone(),
            argument_values: self.argument_values.clone(),
            extras,
        }
    }
}

/// Coerced arguments, an argument error, or a deferred result.
#[derive(Debug, Clone)]
pub enum ArgumentsResult {
    Ready(Rc<Arguments>),
    Error(ExecutionError),
    Lazy(LazyValue<ArgumentsResult>),
}

impl Deferred for ArgumentsResult {
    fn settle(self) -> Settled<Self> {
        match self {
            Self::Lazy(lazy) => Settled::Pending(lazy),
            other => Settled::Ready(other),
        }
    }
}

/// Something that declares arguments.
#[derive(Clone, Copy)]
pub enum ArgumentOwner<'s> {
    Field(&'s FieldDef),
    Directive(&'s DirectiveDef),
}

impl<'s> ArgumentOwner<'s> {
    fn arguments(&self) -> &'s IndexMap<String, Arc<ArgumentDef>> {
        match self {
            Self::Field(field) => &field.arguments,
            Self::Directive(directive) => &directive.arguments,
        }
    }

    fn address(&self) -> usize {
        match self {
            Self::Field(field) => *field as *const FieldDef as usize,
            Self::Directive(directive) => *directive as *const DirectiveDef as usize,
        }
    }

    /// Owners whose hooks never read the parent coerce the same way for
    /// every parent object.
    fn is_static(&self) -> bool {
        !self.arguments().values().any(|arg| arg.reads_parent())
    }

    fn describe(&self) -> String {
        match self {
            Self::Field(field) => format!("Field '{}'", field.name),
            Self::Directive(directive) => format!("Directive '@{}'", directive.name),
        }
    }
}

/// Variable values for one operation.
#[derive(Clone, Copy)]
pub(crate) struct Variables<'a> {
    values: &'a serde_json::Map<String, Json>,
    definitions: &'a [ast::VariableDefinition],
}

impl<'a> Variables<'a> {
    pub(crate) fn new(
        values: &'a serde_json::Map<String, Json>,
        definitions: &'a [ast::VariableDefinition],
    ) -> Self {
        Self {
            values,
            definitions,
        }
    }

    /// A bound value, else the operation's default, else no value.
    fn get(&self, name: &str) -> Option<Json> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        self.definitions
            .iter()
            .find(|def| def.name.value == name)?
            .default_value
            .as_ref()
            .and_then(|default| input_from_ast(default, *self))
    }
}

/// Converts an argument node to JSON. `None` means no value, which is
/// distinct from an explicit `null`.
pub(crate) fn input_from_ast(value: &ast::Value, variables: Variables<'_>) -> Option<Json> {
    Some(match value {
        ast::Value::Variable(name) => return variables.get(&name.value),
        ast::Value::Int(i, _) => Json::from(*i),
        ast::Value::Float(f, _) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        ast::Value::String(s, _) => Json::String(s.clone()),
        ast::Value::Boolean(b, _) => Json::Bool(*b),
        ast::Value::Null(_) => Json::Null,
        ast::Value::Enum(name) => Json::String(name.value.clone()),
        ast::Value::List(items, _) => Json::Array(
            items
                .iter()
                .map(|item| input_from_ast(item, variables).unwrap_or(Json::Null))
                .collect(),
        ),
        ast::Value::Object(fields, _) => Json::Object(
            fields
                .iter()
                .filter_map(|(name, v)| Some((name.value.clone(), input_from_ast(v, variables)?)))
                .collect(),
        ),
    })
}

/// Coerces an input value to `ty`, returning the reason on failure.
pub(crate) fn coerce_input(schema: &Schema, ty: &TypeRef, value: Json) -> Result<Json, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                Err("Expected value to not be null".to_string())
            } else {
                coerce_input(schema, inner, value)
            }
        }
        _ if value.is_null() => Ok(Json::Null),
        TypeRef::List(inner) => match value {
            Json::Array(items) => items
                .into_iter()
                .map(|item| coerce_input(schema, inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            single => Ok(Json::Array(vec![coerce_input(schema, inner, single)?])),
        },
        TypeRef::Named(name) => match schema.get_type(name) {
            Some(TypeDef::Scalar(scalar)) => scalar.input(&value),
            Some(TypeDef::Enum(enum_def)) => {
                if value.as_str().is_some_and(|v| enum_def.has_value(v)) {
                    Ok(value)
                } else {
                    Err(format!("Expected {value} to be one of: {}", enum_values(&enum_def.values)))
                }
            }
            Some(TypeDef::InputObject(input)) => {
                let mut fields = match value {
                    Json::Object(fields) => fields,
                    other => return Err(format!("Expected {other} to be a key-value object")),
                };
                if let Some(unknown) = fields.keys().find(|key| !input.fields.contains_key(*key)) {
                    return Err(format!("Field '{unknown}' is not defined on {}", input.name));
                }
                let mut coerced = serde_json::Map::new();
                for (field_name, def) in &input.fields {
                    let raw = match fields.remove(field_name) {
                        Some(raw) => raw,
                        None => match &def.default_value {
                            Some(default) => default.clone(),
                            None if def.ty.is_non_null() => {
                                return Err(format!("Missing required field '{field_name}'"));
                            }
                            None => continue,
                        },
                    };
                    let value = coerce_input(schema, &def.ty, raw)
                        .map_err(|reason| format!("{field_name}: {reason}"))?;
                    coerced.insert(field_name.clone(), value);
                }
                Ok(Json::Object(coerced))
            }
            Some(other) => Err(format!("{} is not an input type", other.name())),
            None => Err(format!("Unknown type {name}")),
        },
    }
}

fn enum_values(values: &[crate::schema::EnumValueDef]) -> String {
    values
        .iter()
        .map(|v| v.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// What coercion reads besides the argument nodes.
#[derive(Clone, Copy)]
pub(crate) struct Coercion<'a> {
    pub schema: &'a Schema,
    pub variables: Variables<'a>,
    pub ctx: &'a Context,
}

struct Entry {
    definition: Arc<ArgumentDef>,
    original: Json,
    default_used: bool,
    prepared: Prepared,
}

/// Coerces `nodes` against the owner's declared arguments.
pub(crate) fn coerce_arguments(
    owner: ArgumentOwner<'_>,
    nodes: &[ast::Argument],
    parent: &Value,
    input: Coercion<'_>,
) -> ArgumentsResult {
    match prepare_entries(owner, nodes, parent, input) {
        Ok(entries) if entries.iter().any(|e| matches!(e.prepared, Prepared::Lazy(_))) => {
            ArgumentsResult::Lazy(LazyValue::new(move || build(entries)))
        }
        Ok(entries) => build(entries),
        Err(err) => ArgumentsResult::Error(err),
    }
}

fn prepare_entries(
    owner: ArgumentOwner<'_>,
    nodes: &[ast::Argument],
    parent: &Value,
    input: Coercion<'_>,
) -> Result<Vec<Entry>, ExecutionError> {
    let mut entries = Vec::with_capacity(owner.arguments().len());
    for (name, definition) in owner.arguments() {
        let provided = nodes
            .iter()
            .find(|node| &node.name.value == name)
            .and_then(|node| input_from_ast(&node.value, input.variables));
        let (raw, default_used) = match provided {
            Some(value) => (value, false),
            None => match &definition.default_value {
                Some(default) => (default.clone(), true),
                None if definition.ty.is_non_null() => {
                    return Err(ExecutionError::new(format!(
                        "{} is missing required argument '{name}'",
                        owner.describe()
                    )));
                }
                None => continue,
            },
        };
        let coerced = coerce_input(input.schema, &definition.ty, raw.clone()).map_err(|reason| {
            ExecutionError::new(format!(
                "Argument '{name}' on {} has an invalid value ({raw}). Expected type '{}'.",
                owner.describe(),
                definition.ty
            ))
            .with_extension("reason", reason)
        })?;
        let prepared = match definition.prepare_hook() {
            Some(Prepare::Static(prepare)) => prepare(coerced.clone(), input.ctx),
            Some(Prepare::WithParent(prepare)) => prepare(coerced.clone(), parent, input.ctx),
            None => Prepared::Value(coerced.clone()),
        };
        if let Prepared::Error(err) = prepared {
            return Err(err);
        }
        entries.push(Entry {
            definition: Arc::clone(definition),
            original: coerced,
            default_used,
            prepared,
        });
    }
    Ok(entries)
}

fn build(entries: Vec<Entry>) -> ArgumentsResult {
    let mut arguments = Arguments::default();
    for entry in entries {
        let value = match entry.prepared.force() {
            Ok(value) => value,
            Err(err) => return ArgumentsResult::Error(err),
        };
        let name = entry.definition.name.clone();
        arguments.keyword_arguments.insert(name.clone(), value.clone());
        arguments.argument_values.insert(
            name,
            ArgumentValue {
                definition: entry.definition,
                value,
                original_value: entry.original,
                default_used: entry.default_used,
            },
        );
    }
    ArgumentsResult::Ready(Rc::new(arguments))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ArgumentsKey {
    owner: usize,
    parent: Option<ObjectId>,
    node: usize,
}

/// Coerced arguments for one execution.
#[derive(Default)]
pub struct ArgumentsCache {
    entries: FxHashMap<ArgumentsKey, ArgumentsResult>,
    empty: Rc<Arguments>,
}

impl ArgumentsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coerced arguments for `owner` at the AST node whose argument list is
    /// `nodes`, building and caching them on first use.
    pub(crate) fn fetch(
        &mut self,
        owner: ArgumentOwner<'_>,
        node: usize,
        nodes: &[ast::Argument],
        parent: &Value,
        input: Coercion<'_>,
    ) -> ArgumentsResult {
        if owner.arguments().is_empty() {
            return ArgumentsResult::Ready(Rc::clone(&self.empty));
        }
        let parent_key = if owner.is_static() {
            None
        } else if let Some(id) = parent.identity() {
            Some(id)
        } else {
            // Without an identity there is nothing stable to key on.
            return coerce_arguments(owner, nodes, parent, input);
        };
        let key = ArgumentsKey {
            owner: owner.address(),
            parent: parent_key,
            node,
        };
        self.entries
            .entry(key)
            .or_insert_with(|| coerce_arguments(owner, nodes, parent, input))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
