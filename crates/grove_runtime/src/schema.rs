//! Programmatic schema definition for grove.
//!
//! A [`Schema`] is built once with [`SchemaBuilder`] and shared between
//! executions. Every hook is an `Arc`'d closure, so schemas are `Send + Sync`.

use crate::arguments::{Arguments, Prepared};
use crate::context::Context;
use crate::directives::{builtin_directives, DirectiveDef};
use crate::error::{AppError, ExecutionError, SchemaError, TypeError, UnauthorizedError};
use crate::lazy::{Deferred, LazyValue, Settled};
use crate::value::{Json, Value};
use grove_syntax::OperationType;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves a field's value from its parent object.
pub type Resolver =
    Arc<dyn Fn(&Value, &Arguments, &Context) -> Result<Value, AppError> + Send + Sync>;

/// Converts between runtime values and their JSON representation.
pub type CoerceFn = Arc<dyn Fn(&Json) -> Result<Json, String> + Send + Sync>;

/// Authorizes or replaces an object before its fields are resolved.
pub type WrapFn = Arc<dyn Fn(Value, &Context) -> Value + Send + Sync>;

/// Picks the concrete type of an interface or union value.
pub type ResolveTypeFn = Arc<dyn Fn(&Value, &Context) -> TypeResolution + Send + Sync>;

pub type RescueFn = Arc<dyn Fn(&AppError, &Context) -> Option<Value> + Send + Sync>;
pub type TypeErrorFn = Arc<dyn Fn(&TypeError, &Context) -> Option<ExecutionError> + Send + Sync>;
pub type UnauthorizedFn = Arc<dyn Fn(&UnauthorizedError, &Context) -> Value + Send + Sync>;

/// The kind of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

impl TypeKind {
    pub fn is_abstract(self) -> bool {
        matches!(self, Self::Interface | Self::Union)
    }

    /// Object, interface and union types have sub-selections.
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Object | Self::Interface | Self::Union)
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, Self::Scalar | Self::Enum)
    }
}

/// A type reference such as `[User!]!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// Parses GraphQL type notation. Malformed input becomes a named type,
    /// which the schema builder then reports as undefined.
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if let Some(inner) = source.strip_suffix('!') {
            return Self::non_null(Self::parse(inner));
        }
        if let Some(inner) = source.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return Self::list(Self::parse(inner));
        }
        Self::named(source)
    }

    /// The innermost named type.
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Strips one `NonNull` wrapper.
    pub fn nullable(&self) -> &TypeRef {
        match self {
            Self::NonNull(inner) => &**inner,
            other => other,
        }
    }

    /// The item type, if this is a (possibly non-null) list.
    pub fn list_item(&self) -> Option<&TypeRef> {
        match self.nullable() {
            Self::List(inner) => Some(&**inner),
            _ => None,
        }
    }
}

impl From<&str> for TypeRef {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// The outcome of abstract type resolution.
#[derive(Clone, Debug)]
pub enum TypeResolution {
    Type(String),
    /// A type plus a replacement for the resolved value.
    TypeWithValue(String, Value),
    Lazy(LazyValue<TypeResolution>),
    Unresolved,
}

impl TypeResolution {
    pub fn lazy(f: impl FnOnce() -> TypeResolution + 'static) -> Self {
        Self::Lazy(LazyValue::new(f))
    }
}

impl Deferred for TypeResolution {
    fn settle(self) -> Settled<Self> {
        match self {
            Self::Lazy(lazy) => Settled::Pending(lazy),
            other => Settled::Ready(other),
        }
    }
}

/// A type definition.
#[derive(Clone)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(s) => &s.name,
            Self::Object(o) => &o.name,
            Self::Interface(i) => &i.name,
            Self::Union(u) => &u.name,
            Self::Enum(e) => &e.name,
            Self::InputObject(i) => &i.name,
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Scalar(_) => TypeKind::Scalar,
            Self::Object(_) => TypeKind::Object,
            Self::Interface(_) => TypeKind::Interface,
            Self::Union(_) => TypeKind::Union,
            Self::Enum(_) => TypeKind::Enum,
            Self::InputObject(_) => TypeKind::InputObject,
        }
    }

    /// Output fields of an object or interface.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        match self {
            Self::Object(o) => o.fields.get(name),
            Self::Interface(i) => i.fields.get(name),
            _ => None,
        }
    }
}

macro_rules! impl_from_def {
    ($($variant:ident($def:ty)),* $(,)?) => {
        $(impl From<$def> for TypeDef {
            fn from(def: $def) -> Self {
                Self::$variant(def)
            }
        })*
    };
}

impl_from_def!(
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
);

/// Scalar type definition.
#[derive(Clone)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
    coerce_result: CoerceFn,
    coerce_input: CoerceFn,
}

impl ScalarDef {
    /// Creates a custom scalar that passes values through unchanged.
    pub fn new(name: impl Into<String>) -> Self {
        let identity: CoerceFn = Arc::new(|value: &Json| Ok(value.clone()));
        Self {
            name: name.into(),
            description: None,
            coerce_result: Arc::clone(&identity),
            coerce_input: identity,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Sets the conversion applied to resolved values.
    pub fn coerce_result(
        mut self,
        f: impl Fn(&Json) -> Result<Json, String> + Send + Sync + 'static,
    ) -> Self {
        self.coerce_result = Arc::new(f);
        self
    }

    /// Sets the conversion applied to argument and variable values.
    pub fn coerce_input(
        mut self,
        f: impl Fn(&Json) -> Result<Json, String> + Send + Sync + 'static,
    ) -> Self {
        self.coerce_input = Arc::new(f);
        self
    }

    pub fn result(&self, value: &Json) -> Result<Json, String> {
        (self.coerce_result)(value)
    }

    pub fn input(&self, value: &Json) -> Result<Json, String> {
        (self.coerce_input)(value)
    }
}

/// Object type definition.
#[derive(Clone)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
    wrap: Option<WrapFn>,
}

impl ObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
            wrap: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    /// Sets the hook every value of this type passes through before its
    /// fields are resolved. It may return the value, a replacement, a
    /// deferred value, an error, or [`Value::Unauthorized`].
    pub fn wrap(mut self, f: impl Fn(Value, &Context) -> Value + Send + Sync + 'static) -> Self {
        self.wrap = Some(Arc::new(f));
        self
    }

    /// Sets a wrap hook that refuses values for which `check` is false.
    pub fn authorize(self, check: impl Fn(&Value, &Context) -> bool + Send + Sync + 'static) -> Self {
        let type_name = self.name.clone();
        self.wrap(move |value, ctx| {
            if check(&value, ctx) {
                value
            } else {
                Value::Unauthorized(UnauthorizedError::new(type_name.clone(), value))
            }
        })
    }

    /// Applies the wrap hook, if any.
    pub fn wrap_value(&self, value: Value, ctx: &Context) -> Value {
        match &self.wrap {
            Some(wrap) => wrap(value, ctx),
            None => value,
        }
    }
}

/// Interface type definition.
#[derive(Clone)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
    resolve_type: Option<ResolveTypeFn>,
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
            resolve_type: None,
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    pub fn resolve_type(
        mut self,
        f: impl Fn(&Value, &Context) -> TypeResolution + Send + Sync + 'static,
    ) -> Self {
        self.resolve_type = Some(Arc::new(f));
        self
    }
}

/// Union type definition.
#[derive(Clone)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
    resolve_type: Option<ResolveTypeFn>,
}

impl UnionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            members: Vec::new(),
            resolve_type: None,
        }
    }

    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.members.push(name.into());
        self
    }

    pub fn resolve_type(
        mut self,
        f: impl Fn(&Value, &Context) -> TypeResolution + Send + Sync + 'static,
    ) -> Self {
        self.resolve_type = Some(Arc::new(f));
        self
    }
}

/// Enum type definition.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValueDef>,
}

/// Enum value definition.
#[derive(Debug, Clone)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            values: Vec::new(),
        }
    }

    pub fn value(mut self, name: impl Into<String>) -> Self {
        self.values.push(EnumValueDef {
            name: name.into(),
            description: None,
            deprecation_reason: None,
        });
        self
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.values.iter().any(|v| v.name == name)
    }
}

/// Input object type definition.
#[derive(Clone)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, Arc<ArgumentDef>>,
}

impl InputObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
        }
    }

    pub fn field(mut self, field: ArgumentDef) -> Self {
        self.fields.insert(field.name.clone(), Arc::new(field));
        self
    }
}

/// Values injected into a field's arguments after coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extra {
    AstNode,
    ExecutionErrors,
    Path,
    Lookahead,
    ArgumentDetails,
    /// The application object one level above the field's owner.
    Parent,
    /// A value read from [`Context::data`] under this key.
    Custom(String),
}

/// Field definition.
#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, Arc<ArgumentDef>>,
    pub extras: Vec<Extra>,
    resolver: Option<Resolver>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty: ty.into(),
            arguments: IndexMap::new(),
            extras: Vec::new(),
            resolver: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn argument(mut self, argument: ArgumentDef) -> Self {
        self.arguments.insert(argument.name.clone(), Arc::new(argument));
        self
    }

    pub fn extra(mut self, extra: Extra) -> Self {
        self.extras.push(extra);
        self
    }

    /// Sets the resolver. Without one the field reads the property of the
    /// same name from its parent.
    pub fn resolve(
        mut self,
        f: impl Fn(&Value, &Arguments, &Context) -> Result<Value, AppError> + Send + Sync + 'static,
    ) -> Self {
        self.resolver = Some(Arc::new(f));
        self
    }

    pub fn resolver(&self) -> Option<&Resolver> {
        self.resolver.as_ref()
    }

    /// True when some argument's `prepare` hook reads the parent object, so
    /// coerced arguments differ between parents.
    pub fn has_parent_dependent_arguments(&self) -> bool {
        self.arguments.values().any(|arg| arg.reads_parent())
    }
}

/// A `prepare` hook on an argument.
#[derive(Clone)]
pub enum Prepare {
    Static(Arc<dyn Fn(Json, &Context) -> Prepared + Send + Sync>),
    WithParent(Arc<dyn Fn(Json, &Value, &Context) -> Prepared + Send + Sync>),
}

/// Argument or input field definition.
#[derive(Clone)]
pub struct ArgumentDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<Json>,
    prepare: Option<Prepare>,
}

impl ArgumentDef {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty: ty.into(),
            default_value: None,
            prepare: None,
        }
    }

    pub fn default_value(mut self, value: impl Into<Json>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Transforms the coerced value before the resolver sees it.
    pub fn prepare(mut self, f: impl Fn(Json, &Context) -> Prepared + Send + Sync + 'static) -> Self {
        self.prepare = Some(Prepare::Static(Arc::new(f)));
        self
    }

    /// Like [`ArgumentDef::prepare`], with access to the parent object.
    pub fn prepare_with_parent(
        mut self,
        f: impl Fn(Json, &Value, &Context) -> Prepared + Send + Sync + 'static,
    ) -> Self {
        self.prepare = Some(Prepare::WithParent(Arc::new(f)));
        self
    }

    pub fn prepare_hook(&self) -> Option<&Prepare> {
        self.prepare.as_ref()
    }

    pub fn reads_parent(&self) -> bool {
        matches!(self.prepare, Some(Prepare::WithParent(_)))
    }
}

/// Schema-wide hooks.
#[derive(Clone, Default)]
pub struct SchemaHooks {
    resolve_type: Option<ResolveTypeFn>,
    rescue: Option<RescueFn>,
    type_error: Option<TypeErrorFn>,
    unauthorized: Option<UnauthorizedFn>,
}

/// A schema.
pub struct Schema {
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    types: IndexMap<String, TypeDef>,
    directives: IndexMap<String, DirectiveDef>,
    possible_types: FxHashMap<String, Vec<String>>,
    hooks: SchemaHooks,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Gets a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Returns all types.
    pub fn types(&self) -> impl Iterator<Item = (&String, &TypeDef)> {
        self.types.iter()
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        match self.types.get(name) {
            Some(TypeDef::Object(object)) => Some(object),
            _ => None,
        }
    }

    /// Looks up an output field on an object or interface type.
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.types.get(type_name)?.field(field_name)
    }

    pub fn directive(&self, name: &str) -> Option<&DirectiveDef> {
        self.directives.get(name)
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    /// The root object type for an operation kind, if configured.
    pub fn root_type(&self, operation: OperationType) -> Option<&ObjectDef> {
        let name = match operation {
            OperationType::Query => Some(self.query_type.as_str()),
            OperationType::Mutation => self.mutation_type.as_deref(),
            OperationType::Subscription => self.subscription_type.as_deref(),
        };
        name.and_then(|name| self.object(name))
    }

    /// The object types a value of `type_name` may have. An object type is
    /// its own only possible type.
    pub fn possible_types(&self, type_name: &str) -> &[String] {
        self.possible_types
            .get(type_name)
            .map_or(&[], Vec::as_slice)
    }

    pub fn is_possible_type(&self, type_name: &str, object_type: &str) -> bool {
        self.possible_types(type_name).iter().any(|t| t == object_type)
    }

    /// The abstract type's own hook, falling back to the schema-wide one.
    pub(crate) fn type_resolver(&self, abstract_type: &str) -> Option<&ResolveTypeFn> {
        let own = match self.types.get(abstract_type) {
            Some(TypeDef::Interface(i)) => i.resolve_type.as_ref(),
            Some(TypeDef::Union(u)) => u.resolve_type.as_ref(),
            _ => None,
        };
        own.or(self.hooks.resolve_type.as_ref())
    }

    /// Replacement value for an application failure, or `None` to abort.
    pub fn rescue(&self, error: &AppError, ctx: &Context) -> Option<Value> {
        self.hooks.rescue.as_ref().and_then(|rescue| rescue(error, ctx))
    }

    /// The error to record for a type error. By default every type error is
    /// recorded with its message.
    pub fn type_error(&self, error: &TypeError, ctx: &Context) -> Option<ExecutionError> {
        match &self.hooks.type_error {
            Some(hook) => hook(error, ctx),
            None => Some(ExecutionError::new(error.to_string())),
        }
    }

    /// Replacement value for an authorization failure; `null` by default.
    pub fn unauthorized(&self, error: &UnauthorizedError, ctx: &Context) -> Value {
        match &self.hooks.unauthorized {
            Some(hook) => hook(error, ctx),
            None => Value::Null,
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("query_type", &self.query_type)
            .field("mutation_type", &self.mutation_type)
            .field("subscription_type", &self.subscription_type)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("directives", &self.directives.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Schema builder.
pub struct SchemaBuilder {
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    types: IndexMap<String, TypeDef>,
    directives: IndexMap<String, DirectiveDef>,
    hooks: SchemaHooks,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Creates a new schema builder with the built-in scalars and
    /// directives.
    pub fn new() -> Self {
        let mut builder = Self {
            query_type: None,
            mutation_type: None,
            subscription_type: None,
            types: IndexMap::new(),
            directives: IndexMap::new(),
            hooks: SchemaHooks::default(),
        };
        for scalar in builtin_scalars() {
            builder.types.insert(scalar.name.clone(), TypeDef::Scalar(scalar));
        }
        for directive in builtin_directives() {
            builder.directives.insert(directive.name.clone(), directive);
        }
        builder
    }

    /// Sets the query type.
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.query_type = Some(name.into());
        self
    }

    /// Sets the mutation type.
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = Some(name.into());
        self
    }

    /// Sets the subscription type.
    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.subscription_type = Some(name.into());
        self
    }

    /// Adds a type, replacing any type with the same name.
    pub fn add_type(mut self, type_def: impl Into<TypeDef>) -> Self {
        let type_def = type_def.into();
        self.types.insert(type_def.name().to_string(), type_def);
        self
    }

    /// Adds a directive definition.
    pub fn add_directive(mut self, directive: DirectiveDef) -> Self {
        self.directives.insert(directive.name.clone(), directive);
        self
    }

    /// Sets the fallback type resolver for interfaces and unions without
    /// their own.
    pub fn resolve_type(
        mut self,
        f: impl Fn(&Value, &Context) -> TypeResolution + Send + Sync + 'static,
    ) -> Self {
        self.hooks.resolve_type = Some(Arc::new(f));
        self
    }

    pub fn rescue(
        mut self,
        f: impl Fn(&AppError, &Context) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.rescue = Some(Arc::new(f));
        self
    }

    pub fn type_error(
        mut self,
        f: impl Fn(&TypeError, &Context) -> Option<ExecutionError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.type_error = Some(Arc::new(f));
        self
    }

    pub fn unauthorized(
        mut self,
        f: impl Fn(&UnauthorizedError, &Context) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.hooks.unauthorized = Some(Arc::new(f));
        self
    }

    /// Builds the schema, checking that every referenced type exists.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let query_type = self.query_type.ok_or(SchemaError::MissingQueryType)?;
        for root in std::iter::once(&query_type)
            .chain(self.mutation_type.as_ref())
            .chain(self.subscription_type.as_ref())
        {
            match self.types.get(root) {
                Some(TypeDef::Object(_)) => {}
                Some(_) => return Err(SchemaError::InvalidRootType(root.clone())),
                None if root == &query_type => return Err(SchemaError::MissingQueryType),
                None => return Err(SchemaError::InvalidRootType(root.clone())),
            }
        }

        let check = |type_name: &str, referenced_by: String| {
            if self.types.contains_key(type_name) {
                Ok(())
            } else {
                Err(SchemaError::UnknownType {
                    type_name: type_name.to_string(),
                    referenced_by,
                })
            }
        };
        let check_arguments =
            |owner: &str, arguments: &IndexMap<String, Arc<ArgumentDef>>| -> Result<(), SchemaError> {
                for arg in arguments.values() {
                    check(arg.ty.name(), format!("{owner}({}:)", arg.name))?;
                }
                Ok(())
            };

        let mut possible_types: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for type_def in self.types.values() {
            match type_def {
                TypeDef::Object(ObjectDef {
                    name,
                    fields,
                    implements,
                    ..
                })
                | TypeDef::Interface(InterfaceDef {
                    name,
                    fields,
                    implements,
                    ..
                }) => {
                    for field in fields.values() {
                        let owner = format!("{name}.{}", field.name);
                        check(field.ty.name(), owner.clone())?;
                        check_arguments(&owner, &field.arguments)?;
                    }
                    for interface in implements {
                        check(interface, name.clone())?;
                    }
                    if let TypeDef::Object(_) = type_def {
                        possible_types
                            .entry(name.clone())
                            .or_default()
                            .push(name.clone());
                        for interface in implements {
                            possible_types
                                .entry(interface.clone())
                                .or_default()
                                .push(name.clone());
                        }
                    }
                }
                TypeDef::Union(union) => {
                    for member in &union.members {
                        check(member, union.name.clone())?;
                    }
                    possible_types
                        .entry(union.name.clone())
                        .or_default()
                        .extend(union.members.iter().cloned());
                }
                TypeDef::InputObject(input) => check_arguments(&input.name, &input.fields)?,
                TypeDef::Scalar(_) | TypeDef::Enum(_) => {}
            }
        }
        for directive in self.directives.values() {
            check_arguments(&format!("@{}", directive.name), &directive.arguments)?;
        }

        Ok(Schema {
            query_type,
            mutation_type: self.mutation_type,
            subscription_type: self.subscription_type,
            types: self.types,
            directives: self.directives,
            possible_types,
            hooks: self.hooks,
        })
    }
}

fn builtin_scalars() -> Vec<ScalarDef> {
    vec![
        ScalarDef::new("Int")
            .description("Built-in Int scalar")
            .coerce_result(|value| int_value(value, true))
            .coerce_input(|value| int_value(value, false)),
        ScalarDef::new("Float")
            .description("Built-in Float scalar")
            .coerce_result(|value| float_value(value, true))
            .coerce_input(|value| float_value(value, false)),
        ScalarDef::new("String")
            .description("Built-in String scalar")
            .coerce_result(|value| match value {
                Json::String(_) => Ok(value.clone()),
                Json::Number(n) => Ok(Json::String(n.to_string())),
                Json::Bool(b) => Ok(Json::String(b.to_string())),
                other => Err(format!("String cannot represent value: {other}")),
            })
            .coerce_input(|value| match value {
                Json::String(_) => Ok(value.clone()),
                other => Err(format!("String cannot represent a non string value: {other}")),
            }),
        ScalarDef::new("Boolean")
            .description("Built-in Boolean scalar")
            .coerce_result(|value| match value {
                Json::Bool(_) => Ok(value.clone()),
                other => Err(format!("Boolean cannot represent a non boolean value: {other}")),
            })
            .coerce_input(|value| match value {
                Json::Bool(_) => Ok(value.clone()),
                other => Err(format!("Boolean cannot represent a non boolean value: {other}")),
            }),
        ScalarDef::new("ID")
            .description("Built-in ID scalar")
            .coerce_result(id_value)
            .coerce_input(id_value),
    ]
}

fn int_value(value: &Json, lenient: bool) -> Result<Json, String> {
    let int = match value {
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Json::String(s) if lenient => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match int.and_then(|i| i32::try_from(i).ok()) {
        Some(i) => Ok(Json::from(i)),
        None => Err(format!("Int cannot represent non 32-bit signed integer value: {value}")),
    }
}

fn float_value(value: &Json, lenient: bool) -> Result<Json, String> {
    let float = match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) if lenient => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    float
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Json::Number)
        .ok_or_else(|| format!("Float cannot represent non numeric value: {value}"))
}

fn id_value(value: &Json) -> Result<Json, String> {
    match value {
        Json::String(_) => Ok(value.clone()),
        Json::Number(n) if n.is_i64() || n.is_u64() => Ok(Json::String(n.to_string())),
        other => Err(format!("ID cannot represent value: {other}")),
    }
}
