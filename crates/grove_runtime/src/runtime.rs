//! The field evaluator.
//!
//! A [`Runtime`] executes one operation. Every selection becomes a job on the
//! scheduler and every deferred value a continuation parked at the depth of
//! the result node it writes into. Continuations carry their position as a
//! [`CurrentState`], so nothing depends on which job happens to be running.
//!
//! Completing a value happens in two steps. `continue_value` deals with the
//! outcomes that end a field: nulls, errors, skips, raw values, refused
//! authorization and application failures. `continue_field` takes whatever
//! is left and completes it against the field's return type.

use crate::arguments::{
    ArgumentOwner, Arguments, ArgumentsCache, ArgumentsResult, Coercion, ExecutionErrors, Extras,
    FieldNode, Variables,
};
use crate::context::Context;
use crate::directives::{DirectiveDef, DirectiveLocation};
use crate::error::{
    display_path, AppError, ExecuteError, ExecutionError, FieldError, PathSegment, TypeError,
};
use crate::executor::{ExecutorConfig, Response};
use crate::gather::{gather_selections, SelectionGroup, SelectionNode};
use crate::lazy::{Deferred, Settled};
use crate::lookahead::Lookahead;
use crate::query::Query;
use crate::result::{Attachment, NodeId, ResultTree, Slot};
use crate::scheduler::{self, JobHost, Scheduler};
use crate::schema::{EnumDef, Extra, FieldDef, ObjectDef, Schema, TypeDef, TypeRef, TypeResolution};
use crate::value::{Fields, Json, Value};
use grove_core::Span;
use grove_syntax::{ast, OperationType};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy)]
enum DirectiveHook {
    Resolve,
    ResolveEach,
}

/// The field a continuation belongs to.
struct FieldFrame<'a> {
    def: &'a FieldDef,
    /// The type declaring the field.
    owner_type: &'a str,
    owner: Value,
    selection: SelectionNode<'a>,
    arguments: Rc<Arguments>,
}

impl<'a> FieldFrame<'a> {
    fn ast_node(&self) -> &'a ast::Field {
        self.selection.first()
    }
}

/// The slot a continuation writes to, and the field it writes for.
#[derive(Clone)]
struct CurrentState<'a> {
    field: Rc<FieldFrame<'a>>,
    node: NodeId,
    key: PathSegment,
}

/// Execution state for one operation.
pub(crate) struct Runtime<'a> {
    schema: &'a Schema,
    query: &'a Query,
    operation: &'a ast::OperationDefinition,
    ctx: &'a Context,
    variables: Variables<'a>,
    config: &'a ExecutorConfig,
    scheduler: Scheduler<'a, Runtime<'a>>,
    tree: ResultTree,
    arguments: ArgumentsCache,
    errors: Rc<RefCell<Vec<FieldError>>>,
    fatal: Option<AppError>,
}

impl<'a> JobHost<'a> for Runtime<'a> {
    fn scheduler(&mut self) -> &mut Scheduler<'a, Self> {
        &mut self.scheduler
    }

    fn is_halted(&self) -> bool {
        self.fatal.is_some()
    }
}

impl<'a> Runtime<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        query: &'a Query,
        operation: &'a ast::OperationDefinition,
        variables: &'a serde_json::Map<String, Json>,
        ctx: &'a Context,
        config: &'a ExecutorConfig,
    ) -> Self {
        Self {
            schema,
            query,
            operation,
            ctx,
            variables: Variables::new(variables, &operation.variables),
            config,
            scheduler: Scheduler::new(ctx.batch_sources()),
            tree: ResultTree::new(),
            arguments: ArgumentsCache::new(),
            errors: Rc::default(),
            fatal: None,
        }
    }

    /// Runs the operation to completion.
    pub(crate) fn run(
        mut self,
        root_type: &'a ObjectDef,
        root_value: Value,
    ) -> Result<Response, ExecuteError> {
        let query = self.query;
        let operation = self.operation;
        let eager =
            operation.operation == OperationType::Mutation && self.config.eager_mutations;

        let root_value = if root_value.is_null() {
            Value::record(Some(&root_type.name), Fields::new())
        } else {
            root_value
        };
        let wrapped = root_type.wrap_value(root_value, self.ctx);
        let data = match self.settle_root(wrapped) {
            Some(object) => {
                let groups = gather_selections(
                    self.coercion(),
                    query.document(),
                    &mut self.arguments,
                    &object,
                    &root_type.name,
                    &operation.selection_set.selections,
                );
                let root = self
                    .tree
                    .add_hash(None, &root_type.name, object.clone(), group_keys(&groups));
                self.tree.set_eager(root, eager);

                let directives: Vec<&'a ast::Directive> = operation.directives.iter().collect();
                self.call_directives(
                    DirectiveHook::Resolve,
                    DirectiveLocation::of_operation(operation.operation),
                    &object,
                    &directives,
                    root,
                    None,
                    &mut |rt: &mut Runtime<'a>| {
                        for group in &groups {
                            let group = group.clone();
                            rt.scheduler.append_job(move |rt: &mut Runtime<'a>| {
                                rt.evaluate_selections(group, root);
                            });
                        }
                    },
                );
                scheduler::drain_by_depth(&mut self);
                self.tree.to_json(root)
            }
            None => None,
        };

        if let Some(error) = self.fatal.take() {
            return Err(ExecuteError::Unhandled(error));
        }
        let errors = std::mem::take(&mut *self.errors.borrow_mut());
        Ok(Response { data, errors })
    }

    /// Forces and classifies the wrapped root value. `None` means the
    /// response data is `null`, which only happens when authorization or a
    /// hook refuses the root object.
    fn settle_root(&mut self, mut value: Value) -> Option<Value> {
        loop {
            value = match value {
                Value::Lazy(lazy) => lazy.force(),
                Value::Unauthorized(error) => match self.schema.unauthorized(&error, self.ctx) {
                    Value::Unauthorized(_) => return None,
                    replacement => replacement,
                },
                Value::Failed(error) => match self.schema.rescue(&error, self.ctx) {
                    Some(Value::Failed(_)) | None => {
                        self.abort(error);
                        return None;
                    }
                    Some(replacement) => replacement,
                },
                Value::Error(error) => {
                    self.errors
                        .borrow_mut()
                        .push(FieldError::from_execution_error(error, Vec::new(), None));
                    return None;
                }
                Value::Skip => return None,
                value if value.is_null() => return None,
                value => return Some(value),
            };
        }
    }

    fn coercion(&self) -> Coercion<'a> {
        Coercion {
            schema: self.schema,
            variables: self.variables,
            ctx: self.ctx,
        }
    }

    /// The object type a hash node was built for.
    fn node_type(&self, node: NodeId) -> &'a str {
        self.schema
            .get_type(self.tree.type_name(node))
            .map_or("", TypeDef::name)
    }

    // ========================================================================
    // Selections
    // ========================================================================

    fn evaluate_selections(&mut self, group: SelectionGroup<'a>, node: NodeId) {
        let object = self.tree.object(node).clone();
        let eager = self.tree.is_eager(node);
        let directives: Vec<&'a ast::Directive> = group.directives.iter().collect();
        self.call_directives(
            DirectiveHook::Resolve,
            group.location,
            &object,
            &directives,
            node,
            None,
            &mut |rt: &mut Runtime<'a>| {
                for (&key, selection) in &group.fields {
                    let selection = selection.clone();
                    if eager {
                        rt.scheduler.clear_cache();
                        scheduler::run_isolated(rt, move |rt: &mut Runtime<'a>| {
                            rt.evaluate_selection(key, selection, node);
                            rt.scheduler.clear_cache();
                        });
                    } else {
                        rt.scheduler.append_job(move |rt: &mut Runtime<'a>| {
                            rt.evaluate_selection(key, selection, node);
                        });
                    }
                }
            },
        );
    }

    fn evaluate_selection(&mut self, key: &'a str, selection: SelectionNode<'a>, node: NodeId) {
        if self.tree.is_dead(node) {
            return;
        }
        let ast_node = selection.first();
        let owner_type = self.node_type(node);
        let key = PathSegment::from(key);

        if ast_node.name.value == "__typename" {
            self.tree
                .set_result(node, &key, Slot::Leaf(Json::from(owner_type)), false);
            return;
        }
        let Some(def) = self.schema.field(owner_type, &ast_node.name.value) else {
            let error = ExecutionError::new(format!(
                "Field '{}' doesn't exist on type '{owner_type}'",
                ast_node.name.value
            ));
            let path = self.tree.path_to(node, &key);
            self.push_error(error, path, ast_node.span);
            self.tree.set_result(node, &key, Slot::NULL, false);
            return;
        };

        let owner = self.tree.object(node).clone();
        let input = self.coercion();
        let arguments = self.arguments.fetch(
            ArgumentOwner::Field(def),
            ast_node as *const ast::Field as usize,
            &ast_node.arguments,
            &owner,
            input,
        );
        let frame = FieldFrame {
            def,
            owner_type,
            owner,
            selection,
            arguments: Rc::default(),
        };
        self.with_arguments(arguments, frame, node, key);
    }

    fn with_arguments(
        &mut self,
        result: ArgumentsResult,
        frame: FieldFrame<'a>,
        node: NodeId,
        key: PathSegment,
    ) {
        match result {
            ArgumentsResult::Ready(arguments) => {
                let arguments = self.inject_extras(&frame, arguments, node, &key);
                let frame = Rc::new(FieldFrame { arguments, ..frame });
                self.resolve_field(frame, node, key);
            }
            ArgumentsResult::Error(error) => {
                let is_non_null = frame.def.ty.is_non_null();
                let state = CurrentState {
                    field: Rc::new(frame),
                    node,
                    key,
                };
                self.continue_value(Value::Error(error), &state, is_non_null);
            }
            lazy @ ArgumentsResult::Lazy(_) => {
                self.after_lazy(lazy, node, key.clone(), move |rt, result| {
                    rt.with_arguments(result, frame, node, key);
                });
            }
        }
    }

    /// Adds the requested extras. Only called with successfully coerced
    /// arguments.
    fn inject_extras(
        &self,
        frame: &FieldFrame<'a>,
        arguments: Rc<Arguments>,
        node: NodeId,
        key: &PathSegment,
    ) -> Rc<Arguments> {
        if frame.def.extras.is_empty() {
            return arguments;
        }
        let ast_node = frame.ast_node();
        let location = self.query.location(ast_node.span);
        let path = self.tree.path_to(node, key);
        let mut extras = Extras::default();
        for extra in &frame.def.extras {
            match extra {
                Extra::AstNode => {
                    extras.ast_node = Some(FieldNode {
                        name: ast_node.name.value.clone(),
                        alias: ast_node.alias.as_ref().map(|alias| alias.value.clone()),
                        location,
                    });
                }
                Extra::ExecutionErrors => {
                    extras.execution_errors = Some(ExecutionErrors::new(
                        Rc::clone(&self.errors),
                        path.clone(),
                        Some(location),
                    ));
                }
                Extra::Path => extras.path = Some(path.clone()),
                Extra::Lookahead => {
                    extras.lookahead = Some(Lookahead::build(
                        self.schema,
                        self.query.document(),
                        self.variables,
                        frame.def.ty.name(),
                        frame.selection.nodes(),
                    ));
                }
                Extra::ArgumentDetails => extras.argument_details = Some(Rc::clone(&arguments)),
                Extra::Parent => extras.parent = Some(self.parent_object(node)),
                Extra::Custom(name) => {
                    let value = self.ctx.data.get(name).cloned().unwrap_or(Json::Null);
                    extras.custom.insert(name.clone(), value);
                }
            }
        }
        Rc::new(arguments.merge_extras(extras))
    }

    /// The application object one level above the owner of fields written
    /// into `node`, skipping list levels.
    fn parent_object(&self, node: NodeId) -> Value {
        let mut parent = self.tree.parent(node);
        while let Some(id) = parent.filter(|&id| self.tree.is_array(id)) {
            parent = self.tree.parent(id);
        }
        parent.map_or(Value::Null, |id| self.tree.object(id).clone())
    }

    fn resolve_field(&mut self, frame: Rc<FieldFrame<'a>>, node: NodeId, key: PathSegment) {
        let directives: Vec<&'a ast::Directive> = frame
            .selection
            .nodes()
            .iter()
            .copied()
            .flat_map(|field: &'a ast::Field| field.directives.iter())
            .collect();
        let def = frame.def;
        let object = frame.owner.clone();
        self.call_directives(
            DirectiveHook::Resolve,
            DirectiveLocation::Field,
            &object,
            &directives,
            node,
            Some(&key),
            &mut |rt: &mut Runtime<'a>| {
                tracing::trace!(
                    parent_type = frame.owner_type,
                    field = %def.name,
                    path = %display_path(&rt.tree.path_to(node, &key)),
                    "resolving field"
                );
                let value = rt.call_resolver(&frame);
                let state = CurrentState {
                    field: Rc::clone(&frame),
                    node,
                    key: key.clone(),
                };
                rt.resolve_value(value, state, &def.ty);
            },
        );
    }

    fn call_resolver(&self, frame: &FieldFrame<'a>) -> Value {
        let result = match frame.def.resolver() {
            Some(resolver) => resolver(&frame.owner, &*frame.arguments, self.ctx),
            None => Ok(frame.owner.property(&frame.def.name).unwrap_or_default()),
        };
        result.unwrap_or_else(Value::Failed)
    }

    // ========================================================================
    // Deferred values
    // ========================================================================

    /// Calls `then` with `value` once it is no longer deferred.
    ///
    /// A deferred value is parked at the depth of `node` and forced when the
    /// scheduler drains that depth; a value deferring again is parked again
    /// at the same depth. Nodes of eager root fields force in place.
    fn after_lazy<T: Deferred>(
        &mut self,
        value: T,
        node: NodeId,
        key: PathSegment,
        then: impl FnOnce(&mut Self, T) + 'a,
    ) {
        match value.settle() {
            Settled::Ready(value) => then(self, value),
            Settled::Pending(lazy) if self.tree.is_eager(node) => {
                self.after_lazy(lazy.force(), node, key, then);
            }
            Settled::Pending(lazy) => {
                let depth = self.tree.depth(node);
                self.scheduler.defer(depth, move |rt: &mut Runtime<'a>| {
                    rt.after_lazy(lazy.force(), node, key, then);
                });
            }
        }
    }

    /// Completes a resolved value for `ty`, waiting for it first if it is
    /// deferred.
    fn resolve_value(&mut self, value: Value, state: CurrentState<'a>, ty: &'a TypeRef) {
        let (node, key) = (state.node, state.key.clone());
        self.after_lazy(value, node, key, move |rt, value| {
            if let Some(value) = rt.continue_value(value, &state, ty.is_non_null()) {
                rt.continue_field(value, state, ty, false);
            }
        });
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Writes the outcomes that end a field. Returns the value when
    /// completion should go on.
    fn continue_value(
        &mut self,
        value: Value,
        state: &CurrentState<'a>,
        is_non_null: bool,
    ) -> Option<Value> {
        let (node, key) = (state.node, &state.key);
        match value {
            value if value.is_null() => {
                if self.tree.set_result(node, key, Slot::NULL, is_non_null) {
                    let error = TypeError::InvalidNull {
                        parent_type: state.field.owner_type.to_string(),
                        field: state.field.def.name.clone(),
                        is_from_array: self.tree.is_array(node),
                    };
                    self.type_error(error, state);
                }
                None
            }
            Value::Error(error) => {
                if !self.tree.is_dead(node) {
                    self.record(error, state);
                    self.tree.set_result(node, key, Slot::NULL, is_non_null);
                }
                None
            }
            Value::List(items)
                if !items.is_empty() && items.iter().all(|item| matches!(item, Value::Error(_))) =>
            {
                if !self.tree.is_dead(node) {
                    let is_list = matches!(state.field.def.ty.nullable(), TypeRef::List(_));
                    let count = items.len();
                    let path = self.tree.path_to(node, key);
                    let span = state.field.ast_node().span;
                    for (index, item) in items.into_iter().enumerate() {
                        if let Value::Error(error) = item {
                            let mut path = path.clone();
                            if is_list {
                                path.push(PathSegment::Index(index));
                            }
                            self.push_error(error, path, span);
                        }
                    }
                    let slot = if is_list {
                        Slot::Leaf(Json::Array(vec![Json::Null; count]))
                    } else {
                        Slot::NULL
                    };
                    self.tree.set_result(node, key, slot, is_non_null);
                }
                None
            }
            Value::Skip => {
                self.tree.set_result(node, key, Slot::Skipped, false);
                None
            }
            Value::Raw(Json::Null) => self.continue_value(Value::Null, state, is_non_null),
            Value::Raw(json) => {
                self.tree.set_result(node, key, Slot::Leaf(json), is_non_null);
                None
            }
            Value::Unauthorized(error) => match self.schema.unauthorized(&error, self.ctx) {
                Value::Unauthorized(_) => self.continue_value(Value::Null, state, is_non_null),
                replacement => self.continue_value(settle_now(replacement), state, is_non_null),
            },
            Value::Failed(error) => match self.schema.rescue(&error, self.ctx) {
                Some(Value::Failed(_)) | None => {
                    self.abort(error);
                    None
                }
                Some(replacement) => {
                    self.continue_value(settle_now(replacement), state, is_non_null)
                }
            },
            value => Some(value),
        }
    }

    /// Completes `value` against `ty`.
    fn continue_field(
        &mut self,
        value: Value,
        state: CurrentState<'a>,
        ty: &'a TypeRef,
        is_non_null: bool,
    ) {
        match ty {
            TypeRef::NonNull(inner) => self.continue_field(value, state, inner, true),
            TypeRef::List(item) => self.continue_list(value, state, item, is_non_null),
            TypeRef::Named(name) => match self.schema.get_type(name) {
                Some(TypeDef::Scalar(scalar)) => {
                    let result = leaf_json(value).and_then(|json| scalar.result(&json));
                    self.write_leaf(result, &state, is_non_null);
                }
                Some(TypeDef::Enum(def)) => {
                    let result = leaf_json(value).and_then(|json| enum_result(def, json));
                    self.write_leaf(result, &state, is_non_null);
                }
                Some(TypeDef::Object(object)) => {
                    self.continue_object(value, state, object, is_non_null);
                }
                Some(TypeDef::Interface(_) | TypeDef::Union(_)) => {
                    self.continue_abstract(value, state, name, is_non_null);
                }
                Some(TypeDef::InputObject(_)) | None => {
                    let error = TypeError::InvalidOutputType {
                        parent_type: state.field.owner_type.to_string(),
                        field: state.field.def.name.clone(),
                        type_name: name.clone(),
                    };
                    self.type_error(error, &state);
                    self.tree
                        .set_result(state.node, &state.key, Slot::NULL, is_non_null);
                }
            },
        }
    }

    fn write_leaf(
        &mut self,
        result: Result<Json, String>,
        state: &CurrentState<'a>,
        is_non_null: bool,
    ) {
        match result {
            Ok(json) if json.is_null() => {
                self.continue_value(Value::Null, state, is_non_null);
            }
            Ok(json) => {
                self.tree
                    .set_result(state.node, &state.key, Slot::Leaf(json), is_non_null);
            }
            Err(reason) => {
                self.continue_value(Value::Error(ExecutionError::new(reason)), state, is_non_null);
            }
        }
    }

    fn continue_object(
        &mut self,
        value: Value,
        state: CurrentState<'a>,
        object: &'a ObjectDef,
        is_non_null: bool,
    ) {
        if self.tree.is_dead(state.node) {
            return;
        }
        let wrapped = object.wrap_value(value, self.ctx);
        let (node, key) = (state.node, state.key.clone());
        self.after_lazy(wrapped, node, key, move |rt, inner| {
            if let Some(inner) = rt.continue_value(inner, &state, is_non_null) {
                rt.build_object(inner, &state, object, is_non_null);
            }
        });
    }

    /// Creates the result node for an object and evaluates its selections.
    fn build_object(
        &mut self,
        value: Value,
        state: &CurrentState<'a>,
        object: &'a ObjectDef,
        is_non_null: bool,
    ) {
        if self.exceeds_max_depth(state, is_non_null) {
            return;
        }
        let query = self.query;
        let selections = state
            .field
            .selection
            .nodes()
            .iter()
            .copied()
            .flat_map(ast::Field::selections);
        let groups = gather_selections(
            self.coercion(),
            query.document(),
            &mut self.arguments,
            &value,
            &object.name,
            selections,
        );
        let attachment = Attachment {
            parent: state.node,
            key: state.key.clone(),
            non_null: is_non_null,
        };
        let child = self
            .tree
            .add_hash(Some(attachment), &object.name, value, group_keys(&groups));
        for group in groups {
            self.evaluate_selections(group, child);
        }
    }

    fn exceeds_max_depth(&mut self, state: &CurrentState<'a>, is_non_null: bool) -> bool {
        let Some(max_depth) = self.config.max_depth else {
            return false;
        };
        let depth = self.tree.depth(state.node) + 1;
        if depth <= max_depth {
            return false;
        }
        let error = ExecutionError::new(format!(
            "Result depth {depth} exceeds the maximum of {max_depth}"
        ));
        self.continue_value(Value::Error(error), state, is_non_null);
        true
    }

    // ========================================================================
    // Abstract types
    // ========================================================================

    fn continue_abstract(
        &mut self,
        value: Value,
        state: CurrentState<'a>,
        abstract_type: &'a str,
        is_non_null: bool,
    ) {
        let resolution = self.resolve_type(abstract_type, &value);
        self.with_resolved_type(resolution, value, state, abstract_type, is_non_null);
    }

    /// The abstract type's hook, else the schema's hook. Values they leave
    /// unresolved fall back to the type the value declares itself.
    fn resolve_type(&self, abstract_type: &str, value: &Value) -> TypeResolution {
        tracing::trace!(abstract_type, "resolving type");
        self.schema
            .type_resolver(abstract_type)
            .map_or(TypeResolution::Unresolved, |hook| hook(value, self.ctx))
    }

    fn with_resolved_type(
        &mut self,
        resolution: TypeResolution,
        value: Value,
        state: CurrentState<'a>,
        abstract_type: &'a str,
        is_non_null: bool,
    ) {
        let (resolved, value) = match resolution {
            TypeResolution::Type(name) => (Some(name), value),
            TypeResolution::TypeWithValue(name, replacement) => (Some(name), replacement),
            TypeResolution::Unresolved => (value.declared_type_name(), value),
            lazy @ TypeResolution::Lazy(_) => {
                let (node, key) = (state.node, state.key.clone());
                return self.after_lazy(lazy, node, key, move |rt, resolution| {
                    rt.with_resolved_type(resolution, value, state, abstract_type, is_non_null);
                });
            }
        };

        let object = resolved
            .as_deref()
            .and_then(|name| self.schema.object(name))
            .filter(|object| self.schema.is_possible_type(abstract_type, &object.name));
        match object {
            Some(object) => self.continue_object(value, state, object, is_non_null),
            None if self.tree.is_dead(state.node) => {}
            None => {
                let error = TypeError::UnresolvedType {
                    parent_type: state.field.owner_type.to_string(),
                    field: state.field.def.name.clone(),
                    abstract_type: abstract_type.to_string(),
                    resolved,
                    possible_types: self.schema.possible_types(abstract_type).to_vec(),
                };
                self.type_error(error, &state);
                self.tree
                    .set_result(state.node, &state.key, Slot::NULL, is_non_null);
            }
        }
    }

    // ========================================================================
    // Lists
    // ========================================================================

    fn continue_list(
        &mut self,
        value: Value,
        state: CurrentState<'a>,
        item_ty: &'a TypeRef,
        is_non_null: bool,
    ) {
        if self.tree.is_dead(state.node) {
            return;
        }
        let items: Vec<Value> = match value {
            Value::List(items) => items,
            Value::Json(Json::Array(items)) => items.into_iter().map(Value::Json).collect(),
            other => {
                let path = self.tree.path_to(state.node, &state.key);
                let error = TypeError::ListResultFailed {
                    parent_type: state.field.owner_type.to_string(),
                    field: state.field.def.name.clone(),
                    path: display_path(&path),
                    received: other.describe(),
                };
                self.type_error(error, &state);
                self.tree
                    .set_result(state.node, &state.key, Slot::NULL, is_non_null);
                return;
            }
        };
        if self.exceeds_max_depth(&state, is_non_null) {
            return;
        }

        let attachment = Attachment {
            parent: state.node,
            key: state.key.clone(),
            non_null: is_non_null,
        };
        let list = self.tree.add_array(
            Some(attachment),
            &format!("[{item_ty}]"),
            state.field.owner.clone(),
            items.len(),
        );
        let schedule = self.config.schedule_list_items
            && self
                .schema
                .get_type(item_ty.name())
                .is_some_and(|def| def.kind().is_composite());
        for (index, item) in items.into_iter().enumerate() {
            let item_state = CurrentState {
                field: Rc::clone(&state.field),
                node: list,
                key: PathSegment::Index(index),
            };
            if schedule {
                self.scheduler.append_job(move |rt: &mut Runtime<'a>| {
                    rt.resolve_list_item(item, item_state, item_ty);
                });
            } else {
                self.resolve_list_item(item, item_state, item_ty);
            }
        }
    }

    fn resolve_list_item(&mut self, item: Value, state: CurrentState<'a>, item_ty: &'a TypeRef) {
        let directives: Vec<&'a ast::Directive> =
            state.field.ast_node().directives.iter().collect();
        let object = state.field.owner.clone();
        let (node, key) = (state.node, state.key.clone());
        self.call_directives(
            DirectiveHook::ResolveEach,
            DirectiveLocation::Field,
            &object,
            &directives,
            node,
            Some(&key),
            &mut |rt: &mut Runtime<'a>| rt.resolve_value(item.clone(), state.clone(), item_ty),
        );
    }

    // ========================================================================
    // Directives
    // ========================================================================

    /// Runs `body` inside the given hook of every runtime directive in
    /// `directives` declared for `location`, outermost first. Directives
    /// whose arguments are rejected stop the chain.
    #[allow(clippy::too_many_arguments)]
    fn call_directives(
        &mut self,
        hook: DirectiveHook,
        location: DirectiveLocation,
        object: &Value,
        directives: &[&'a ast::Directive],
        node: NodeId,
        key: Option<&PathSegment>,
        body: &mut dyn FnMut(&mut Runtime<'a>),
    ) {
        let Some((&first, rest)) = directives.split_first() else {
            return body(self);
        };
        let Some(def) = self
            .schema
            .directive(&first.name.value)
            .filter(|def| def.is_runtime() && def.allows(location))
        else {
            return self.call_directives(hook, location, object, rest, node, key, body);
        };
        let Some(arguments) = self.directive_arguments(def, first, object, node, key) else {
            return;
        };
        let ctx = self.ctx;
        let mut next = || self.call_directives(hook, location, object, rest, node, key, body);
        match hook {
            DirectiveHook::Resolve => def.resolve(object, &arguments, ctx, &mut next),
            DirectiveHook::ResolveEach => def.resolve_each(object, &arguments, ctx, &mut next),
        }
    }

    /// Coerced directive arguments. Deferred arguments are forced in place.
    fn directive_arguments(
        &mut self,
        def: &'a DirectiveDef,
        directive: &'a ast::Directive,
        object: &Value,
        node: NodeId,
        key: Option<&PathSegment>,
    ) -> Option<Rc<Arguments>> {
        let input = self.coercion();
        let mut result = self.arguments.fetch(
            ArgumentOwner::Directive(def),
            directive as *const ast::Directive as usize,
            &directive.arguments,
            object,
            input,
        );
        loop {
            match result {
                ArgumentsResult::Ready(arguments) => return Some(arguments),
                ArgumentsResult::Lazy(lazy) => result = lazy.force(),
                ArgumentsResult::Error(error) => {
                    let path = match key {
                        Some(key) => self.tree.path_to(node, key),
                        None => self.tree.path(node),
                    };
                    self.push_error(error, path, directive.span);
                    return None;
                }
            }
        }
    }

    // ========================================================================
    // Errors
    // ========================================================================

    fn push_error(&self, error: ExecutionError, path: Vec<PathSegment>, span: Span) {
        let location = self.query.location(span);
        self.errors
            .borrow_mut()
            .push(FieldError::from_execution_error(error, path, Some(location)));
    }

    /// Records an error at the continuation's slot.
    fn record(&self, error: ExecutionError, state: &CurrentState<'a>) {
        let path = self.tree.path_to(state.node, &state.key);
        self.push_error(error, path, state.field.ast_node().span);
    }

    fn type_error(&self, error: TypeError, state: &CurrentState<'a>) {
        if let Some(error) = self.schema.type_error(&error, self.ctx) {
            self.record(error, state);
        }
    }

    fn abort(&mut self, error: AppError) {
        tracing::warn!(%error, "unhandled application error, aborting execution");
        self.fatal.get_or_insert(error);
    }
}

fn group_keys<'q>(groups: &[SelectionGroup<'q>]) -> Vec<&'q str> {
    groups
        .iter()
        .flat_map(|group| group.fields.keys().copied())
        .collect()
}

/// Forces a replacement value handed back by a schema hook.
fn settle_now(mut value: Value) -> Value {
    loop {
        match value {
            Value::Lazy(lazy) => value = lazy.force(),
            other => return other,
        }
    }
}

fn leaf_json(value: Value) -> Result<Json, String> {
    match value {
        Value::Json(json) => Ok(json),
        Value::List(items) => items
            .into_iter()
            .map(leaf_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        other => Err(format!("{} is not a serializable value", other.describe())),
    }
}

fn enum_result(def: &EnumDef, json: Json) -> Result<Json, String> {
    if json.as_str().is_some_and(|name| def.has_value(name)) {
        Ok(json)
    } else {
        Err(format!("`{json}` is not a valid value for enum {}", def.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, Request};
    use crate::schema::SchemaBuilder;
    use crate::value::Fields;
    use serde_json::json;

    #[test]
    fn test_leaf_values() {
        assert_eq!(leaf_json(Value::from(json!(1))), Ok(json!(1)));
        assert_eq!(
            leaf_json(Value::List(vec!["a".into(), "b".into()])),
            Ok(json!(["a", "b"]))
        );
        assert!(leaf_json(Value::Skip).is_err());

        let color = EnumDef::new("Color").value("RED");
        assert_eq!(enum_result(&color, json!("RED")), Ok(json!("RED")));
        assert_eq!(
            enum_result(&color, json!("BLUE")),
            Err("`\"BLUE\"` is not a valid value for enum Color".to_string())
        );
    }

    #[test]
    fn test_settle_now_forces_chains() {
        let value = settle_now(Value::lazy(|| Value::lazy(|| "done".into())));
        assert_eq!(value.as_json(), Some(&json!("done")));
    }

    #[test]
    fn test_extras_see_position_in_tree() {
        let schema = SchemaBuilder::new()
            .query_type("Query")
            .add_type(ObjectDef::new("Query").field(FieldDef::new("me", "User").resolve(
                |_, _, _| {
                    let mut fields = Fields::new();
                    fields.insert("name".to_string(), "Ada".into());
                    fields.insert("posts".to_string(), json!([{ "title": "one" }]).into());
                    Ok(Value::record(None, fields))
                },
            )))
            .add_type(
                ObjectDef::new("User")
                    .field(FieldDef::new("name", "String"))
                    .field(FieldDef::new("posts", "[Post]")),
            )
            .add_type(
                ObjectDef::new("Post").field(FieldDef::new("title", "String")).field(
                    FieldDef::new("info", "String")
                        .extra(Extra::Parent)
                        .extra(Extra::AstNode)
                        .extra(Extra::ExecutionErrors)
                        .extra(Extra::Lookahead)
                        .resolve(|_, args, _| {
                            let extras = args.extras();
                            let parent = extras
                                .parent
                                .as_ref()
                                .and_then(|parent| parent.property("name"))
                                .and_then(|name| name.as_json().cloned())
                                .unwrap_or_default();
                            let node = extras.ast_node.as_ref().map(|node| node.alias.clone());
                            if let Some(errors) = &extras.execution_errors {
                                errors.add(ExecutionError::new("noted"));
                            }
                            let lookahead = extras.lookahead.as_ref().map(Lookahead::name);
                            Ok(json!([parent, node, lookahead]).to_string().into())
                        }),
                ),
            )
            .build()
            .unwrap();

        let query = Query::parse("{ me { posts { about: info } } }").unwrap();
        let response = Executor::new()
            .execute(&schema, &query, &Request::new(), &Context::new())
            .unwrap();
        assert_eq!(
            response.data,
            Some(json!({ "me": { "posts": [{ "about": "[\"Ada\",\"about\",\"info\"]" }] } }))
        );
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message, "noted");
        assert_eq!(
            response.errors[0].path,
            vec![
                PathSegment::from("me"),
                PathSegment::from("posts"),
                PathSegment::Index(0),
                PathSegment::from("about"),
            ]
        );
    }
}
