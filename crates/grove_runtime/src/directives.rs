//! Directive definitions and the built-in `@include` / `@skip`.
//!
//! A directive takes part in execution through up to three hooks:
//! - `include`: decides, while selections are gathered, whether a selection
//!   is kept at all;
//! - `resolve`: wraps the evaluation of a field or fragment selection;
//! - `resolve_each`: wraps the evaluation of each item of a list field.
//!
//! Directives with a `resolve` or `resolve_each` hook are runtime
//! directives. Wrapping hooks receive a `next` callback and must call it for
//! the wrapped work to happen.

use crate::arguments::Arguments;
use crate::context::Context;
use crate::schema::ArgumentDef;
use crate::value::Value;
use grove_syntax::{ast, OperationType};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

pub type IncludeFn = Arc<dyn Fn(&Value, &Arguments, &Context) -> bool + Send + Sync>;
pub type ResolveFn = Arc<dyn Fn(&Value, &Arguments, &Context, &mut dyn FnMut()) + Send + Sync>;

/// Where a directive may appear in an executable document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveLocation {
    Query,
    Mutation,
    Subscription,
    Field,
    FragmentSpread,
    InlineFragment,
}

impl DirectiveLocation {
    /// Where the directives of `selection` are applied.
    pub fn of_selection(selection: &ast::Selection) -> Self {
        match selection {
            ast::Selection::Field(_) => Self::Field,
            ast::Selection::FragmentSpread(_) => Self::FragmentSpread,
            ast::Selection::InlineFragment(_) => Self::InlineFragment,
        }
    }

    pub fn of_operation(kind: OperationType) -> Self {
        match kind {
            OperationType::Query => Self::Query,
            OperationType::Mutation => Self::Mutation,
            OperationType::Subscription => Self::Subscription,
        }
    }
}

/// Directive definition.
#[derive(Clone)]
pub struct DirectiveDef {
    pub name: String,
    pub description: Option<String>,
    pub arguments: IndexMap<String, Arc<ArgumentDef>>,
    pub locations: Vec<DirectiveLocation>,
    include: Option<IncludeFn>,
    resolve: Option<ResolveFn>,
    resolve_each: Option<ResolveFn>,
}

impl DirectiveDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: IndexMap::new(),
            locations: Vec::new(),
            include: None,
            resolve: None,
            resolve_each: None,
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

    pub fn location(mut self, location: DirectiveLocation) -> Self {
        self.locations.push(location);
        self
    }

    /// Sets the hook that decides whether a selection is kept.
    pub fn on_include(
        mut self,
        f: impl Fn(&Value, &Arguments, &Context) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.include = Some(Arc::new(f));
        self
    }

    /// Sets the hook wrapping each selection the directive is applied to.
    pub fn on_resolve(
        mut self,
        f: impl Fn(&Value, &Arguments, &Context, &mut dyn FnMut()) + Send + Sync + 'static,
    ) -> Self {
        self.resolve = Some(Arc::new(f));
        self
    }

    /// Sets the hook wrapping each item of a list field.
    pub fn on_resolve_each(
        mut self,
        f: impl Fn(&Value, &Arguments, &Context, &mut dyn FnMut()) + Send + Sync + 'static,
    ) -> Self {
        self.resolve_each = Some(Arc::new(f));
        self
    }

    /// Whether the directive was declared for `location`. Directives applied
    /// anywhere else are ignored.
    pub fn allows(&self, location: DirectiveLocation) -> bool {
        self.locations.contains(&location)
    }

    pub fn has_include(&self) -> bool {
        self.include.is_some()
    }

    /// True when the directive wraps evaluation.
    pub fn is_runtime(&self) -> bool {
        self.resolve.is_some() || self.resolve_each.is_some()
    }

    pub fn has_resolve_each(&self) -> bool {
        self.resolve_each.is_some()
    }

    /// Whether a selection carrying this directive is kept. Directives
    /// without an `include` hook keep everything.
    pub fn include(&self, object: &Value, args: &Arguments, ctx: &Context) -> bool {
        self.include.as_ref().map_or(true, |f| f(object, args, ctx))
    }

    /// Runs `next` inside the `resolve` hook, or directly without one.
    pub fn resolve(&self, object: &Value, args: &Arguments, ctx: &Context, next: &mut dyn FnMut()) {
        match &self.resolve {
            Some(f) => f(object, args, ctx, next),
            None => next(),
        }
    }

    /// Runs `next` inside the `resolve_each` hook, or directly without one.
    pub fn resolve_each(
        &self,
        object: &Value,
        args: &Arguments,
        ctx: &Context,
        next: &mut dyn FnMut(),
    ) {
        match &self.resolve_each {
            Some(f) => f(object, args, ctx, next),
            None => next(),
        }
    }
}

impl fmt::Debug for DirectiveDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveDef")
            .field("name", &self.name)
            .field("arguments", &self.arguments.keys().collect::<Vec<_>>())
            .field("locations", &self.locations)
            .field("include", &self.include.is_some())
            .field("runtime", &self.is_runtime())
            .finish()
    }
}

const SELECTION_LOCATIONS: [DirectiveLocation; 3] = [
    DirectiveLocation::Field,
    DirectiveLocation::FragmentSpread,
    DirectiveLocation::InlineFragment,
];

/// `@include(if:)` and `@skip(if:)`.
pub(crate) fn builtin_directives() -> Vec<DirectiveDef> {
    let condition = |directive: DirectiveDef, description: &str| {
        SELECTION_LOCATIONS
            .into_iter()
            .fold(directive, DirectiveDef::location)
            .argument(ArgumentDef::new("if", "Boolean!").description(description))
    };
    vec![
        condition(
            DirectiveDef::new("include")
                .description("Directs the executor to include this field or fragment only when the `if` argument is true.")
                .on_include(|_, args, _| if_argument(args)),
            "Included when true.",
        ),
        condition(
            DirectiveDef::new("skip")
                .description("Directs the executor to skip this field or fragment when the `if` argument is true.")
                .on_include(|_, args, _| !if_argument(args)),
            "Skipped when true.",
        ),
    ]
}

fn if_argument(args: &Arguments) -> bool {
    matches!(args.get("if"), Some(Json::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn args(value: Json) -> Arguments {
        let mut keywords = IndexMap::new();
        keywords.insert("if".to_string(), value);
        Arguments::new(keywords)
    }

    #[test]
    fn test_builtin_include_and_skip() {
        let ctx = Context::new();
        let directives = builtin_directives();
        let include = &directives[0];
        let skip = &directives[1];

        assert!(include.include(&Value::Null, &args(json!(true)), &ctx));
        assert!(!include.include(&Value::Null, &args(json!(false)), &ctx));
        assert!(!skip.include(&Value::Null, &args(json!(true)), &ctx));
        assert!(skip.include(&Value::Null, &args(json!(false)), &ctx));
        assert!(!include.is_runtime());
        assert!(include.arguments["if"].ty.is_non_null());
        assert!(skip.allows(DirectiveLocation::InlineFragment));
        assert!(!skip.allows(DirectiveLocation::Query));
    }

    #[test]
    fn test_locations_of_selections_and_operations() {
        let document = grove_syntax::parse_document(
            "mutation { a ... on M { b } ...F } fragment F on M { c }",
        )
        .unwrap();
        let op = document.operations().next().unwrap();
        assert_eq!(
            DirectiveLocation::of_operation(op.operation),
            DirectiveLocation::Mutation
        );
        let locations: Vec<_> = op
            .selection_set
            .selections
            .iter()
            .map(DirectiveLocation::of_selection)
            .collect();
        assert_eq!(
            locations,
            [
                DirectiveLocation::Field,
                DirectiveLocation::InlineFragment,
                DirectiveLocation::FragmentSpread
            ]
        );
    }

    #[test]
    fn test_resolve_without_hook_calls_next() {
        let ctx = Context::new();
        let directive = DirectiveDef::new("noop");
        let called = Cell::new(false);
        directive.resolve(&Value::Null, &Arguments::default(), &ctx, &mut || called.set(true));
        assert!(called.get());
        assert!(directive.include(&Value::Null, &Arguments::default(), &ctx));
    }

    #[test]
    fn test_resolve_hook_wraps_next() {
        let ctx = Context::new();
        let directive = DirectiveDef::new("twice").on_resolve_each(|_, _, _, next| {
            next();
            next();
        });
        assert!(directive.is_runtime());
        assert!(directive.has_resolve_each());

        let calls = Cell::new(0);
        directive.resolve_each(&Value::Null, &Arguments::default(), &ctx, &mut || {
            calls.set(calls.get() + 1);
        });
        assert_eq!(calls.get(), 2);

        // `resolve` is unset, so it runs the work once.
        directive.resolve(&Value::Null, &Arguments::default(), &ctx, &mut || {
            calls.set(calls.get() + 1);
        });
        assert_eq!(calls.get(), 3);
    }
}
