//! Application values handed to and returned from resolvers.

use crate::error::{AppError, ExecutionError, UnauthorizedError};
use crate::lazy::{Deferred, LazyValue, Settled};
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Plain JSON data.
pub type Json = serde_json::Value;

/// A record object: named properties read by the default resolver.
pub type Fields = IndexMap<String, Value>;

/// The stable identity of an [`Object`]: its allocation address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

/// An application object with identity.
///
/// Clones share the allocation and so share identity. Caches keyed by
/// object (such as the arguments cache) compare identity, never contents.
#[derive(Clone)]
pub struct Object {
    inner: Rc<dyn Any>,
    type_name: Option<Rc<str>>,
}

impl Object {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            inner: Rc::new(value),
            type_name: None,
        }
    }

    /// Creates an object that declares its concrete GraphQL type, used to
    /// resolve interface and union fields when no hook is configured.
    pub fn typed<T: Any>(type_name: &str, value: T) -> Self {
        Self {
            inner: Rc::new(value),
            type_name: Some(Rc::from(type_name)),
        }
    }

    /// Wraps an existing allocation, keeping its identity.
    pub fn from_rc<T: Any>(value: Rc<T>) -> Self {
        Self {
            inner: value,
            type_name: None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn id(&self) -> ObjectId {
        ObjectId(Rc::as_ptr(&self.inner).cast::<()>() as usize)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type_name", &self.type_name())
            .field("id", &self.id())
            .finish()
    }
}

/// A value produced by application code.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    /// Plain data. JSON objects and arrays can also back object and list
    /// fields.
    Json(Json),
    Object(Object),
    List(Vec<Value>),
    /// A deferred value, forced by the runtime.
    Lazy(LazyValue<Value>),
    /// A recoverable error: recorded, and the field becomes `null`.
    Error(ExecutionError),
    /// An application failure, routed through the schema's rescue hook.
    Failed(AppError),
    Unauthorized(UnauthorizedError),
    /// Removes the field from the response entirely.
    Skip,
    /// Written to the response as-is, without coercion or sub-selections.
    Raw(Json),
}

impl Value {
    /// Creates a deferred value.
    pub fn lazy(f: impl FnOnce() -> Value + 'static) -> Self {
        Self::Lazy(LazyValue::new(f))
    }

    /// Creates a record object, optionally declaring its concrete type.
    pub fn record(type_name: Option<&str>, fields: Fields) -> Self {
        Self::Object(match type_name {
            Some(name) => Object::typed(name, fields),
            None => Object::new(fields),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ExecutionError::new(message))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Json(Json::Null))
    }

    pub fn as_json(&self) -> Option<&Json> {
        match self {
            Self::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Downcasts an object value.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_object().and_then(Object::downcast_ref)
    }

    /// Identity used by identity-keyed caches. Only objects have one.
    pub fn identity(&self) -> Option<ObjectId> {
        self.as_object().map(Object::id)
    }

    /// Reads a named property from a record object or a JSON object.
    ///
    /// Falls back to the snake_case spelling of `name`, so `firstName` finds
    /// a `first_name` property.
    pub fn property(&self, name: &str) -> Option<Value> {
        let lookup = |key: &str| match self {
            Self::Json(Json::Object(map)) => map.get(key).cloned().map(Self::Json),
            Self::Object(object) => object
                .downcast_ref::<Fields>()
                .and_then(|fields| fields.get(key).cloned()),
            _ => None,
        };
        lookup(name).or_else(|| {
            let snake = to_snake_case(name);
            (snake != name).then(|| lookup(&snake)).flatten()
        })
    }

    /// The concrete type an object declares about itself, through
    /// [`Object::typed`] or a `__typename` property.
    pub fn declared_type_name(&self) -> Option<String> {
        match self {
            Self::Object(object) => object.type_name().map(str::to_string).or_else(|| {
                object
                    .downcast_ref::<Fields>()
                    .and_then(|fields| fields.get("__typename"))
                    .and_then(|v| v.as_json().and_then(Json::as_str).map(str::to_string))
            }),
            Self::Json(Json::Object(map)) => map
                .get("__typename")
                .and_then(Json::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    /// A short description for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Json(json) => {
                let mut text = json.to_string();
                if text.len() > 60 {
                    let mut end = 57;
                    while !text.is_char_boundary(end) {
                        end -= 1;
                    }
                    text.truncate(end);
                    text.push_str("...");
                }
                text
            }
            Self::Object(object) => match object.type_name() {
                Some(name) => format!("#<{name}>"),
                None => "#<object>".to_string(),
            },
            Self::List(items) => format!("list of {}", items.len()),
            Self::Lazy(_) => "lazy value".to_string(),
            Self::Error(err) => format!("error: {err}"),
            Self::Failed(err) => format!("failure: {err}"),
            Self::Unauthorized(err) => format!("unauthorized: {err}"),
            Self::Skip => "skip".to_string(),
            Self::Raw(json) => json.to_string(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Json(json) => f.debug_tuple("Json").field(json).finish(),
            Self::Object(object) => fmt::Debug::fmt(object, f),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Lazy(lazy) => fmt::Debug::fmt(lazy, f),
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
            Self::Unauthorized(err) => f.debug_tuple("Unauthorized").field(err).finish(),
            Self::Skip => f.write_str("Skip"),
            Self::Raw(json) => f.debug_tuple("Raw").field(json).finish(),
        }
    }
}

impl Deferred for Value {
    fn settle(self) -> Settled<Self> {
        match self {
            Self::Lazy(lazy) => Settled::Pending(lazy),
            value => Settled::Ready(value),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Self::Json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Json(Json::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Json(Json::from(s))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Json(Json::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Json(Json::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Json(Json::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Json(Json::from(b))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<ExecutionError> for Value {
    fn from(err: ExecutionError) -> Self {
        Self::Error(err)
    }
}

impl From<LazyValue<Value>> for Value {
    fn from(lazy: LazyValue<Value>) -> Self {
        Self::Lazy(lazy)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Converts camelCase to snake_case.
pub(crate) fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
