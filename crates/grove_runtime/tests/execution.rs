//! Integration tests for query execution.

use grove_runtime::{
    AppError, ArgumentDef, Arguments, BatchLoader, Context, DirectiveDef, DirectiveLocation,
    ExecuteError, ExecutionError, Executor, ExecutorConfig, Extra, FieldDef, Fields, InterfaceDef,
    ObjectDef, PathSegment, Prepared, Query, Request, Response, Schema, SchemaBuilder,
    TypeResolution, UnionDef, Value,
};
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn execute(schema: &Schema, source: &str) -> Response {
    execute_with(schema, source, &Context::new()).unwrap()
}

fn execute_with(schema: &Schema, source: &str, ctx: &Context) -> Result<Response, ExecuteError> {
    let query = Query::parse(source).unwrap();
    Executor::new().execute(schema, &query, &Request::new(), ctx)
}

fn context_with_log() -> (Context, Log) {
    let log = Log::default();
    let mut ctx = Context::new();
    ctx.insert(Rc::clone(&log));
    (ctx, log)
}

fn push(ctx: &Context, entry: impl Into<String>) {
    ctx.get_ext::<Log>().unwrap().borrow_mut().push(entry.into());
}

fn user(id: &str, name: Option<&str>) -> Value {
    let mut fields = Fields::new();
    fields.insert("id".to_string(), id.into());
    fields.insert("name".to_string(), name.into());
    Value::record(Some("User"), fields)
}

fn user_type() -> ObjectDef {
    ObjectDef::new("User")
        .implements("Node")
        .field(FieldDef::new("id", "ID!"))
        .field(FieldDef::new("name", "String!"))
        .field(FieldDef::new("friend", "User").resolve(|_, _, _| Ok(user("2", Some("Bo")))))
}

fn greeting() -> FieldDef {
    FieldDef::new("greeting", "String").resolve(|_, _, _| Ok("hi".into()))
}

fn path(segments: &[&str]) -> Vec<PathSegment> {
    segments
        .iter()
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::from(*segment),
        })
        .collect()
}

#[test]
fn test_key_order_ignores_completion_order() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::TRACE)
        .try_init();

    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("slow", "String").resolve(|_, _, _| {
                    Ok(Value::lazy(|| Value::lazy(|| "slow".into())))
                }))
                .field(FieldDef::new("middle", "String").resolve(|_, _, _| {
                    Ok(Value::lazy(|| "middle".into()))
                }))
                .field(greeting()),
        )
        .build()
        .unwrap();

    let response = execute(&schema, "{ slow greeting b: middle a: greeting }");
    assert!(!response.has_errors());
    let data = response.data.unwrap();
    let keys: Vec<&str> = data.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["slow", "greeting", "b", "a"]);
    assert_eq!(
        data,
        json!({ "slow": "slow", "greeting": "hi", "b": "middle", "a": "hi" })
    );
}

#[test]
fn test_non_null_violation_bubbles_once() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("me", "User").resolve(|_, _, _| Ok(user("1", None))))
                .field(greeting()),
        )
        .add_type(InterfaceDef::new("Node").field(FieldDef::new("id", "ID!")))
        .add_type(user_type())
        .build()
        .unwrap();

    let response = execute(&schema, "{ me { id name } greeting }");
    assert_eq!(response.data, Some(json!({ "me": null, "greeting": "hi" })));
    assert_eq!(response.errors.len(), 1);
    let error = &response.errors[0];
    assert_eq!(
        error.message,
        "Cannot return null for non-nullable field User.name"
    );
    assert_eq!(error.path, path(&["me", "name"]));
    assert_eq!(error.locations[0].line, 1);
    assert_eq!(error.locations[0].column, 11);
}

#[test]
fn test_non_null_root_field_nulls_the_response() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("viewer", "User!").resolve(|_, _, _| Ok(Value::Null)))
                .field(greeting()),
        )
        .add_type(InterfaceDef::new("Node").field(FieldDef::new("id", "ID!")))
        .add_type(user_type())
        .build()
        .unwrap();

    let response = execute(&schema, "{ greeting viewer { id } }");
    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, path(&["viewer"]));
    assert_eq!(
        response.to_json(),
        json!({
            "data": null,
            "errors": [{
                "message": "Cannot return null for non-nullable field Query.viewer",
                "locations": [{ "line": 1, "column": 12 }],
                "path": ["viewer"]
            }]
        })
    );
}

#[test]
fn test_null_list_element_reports_one_error() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("tags", "[String!]").resolve(|_, _, _| {
                    Ok(json!(["a", null, null]).into())
                }))
                .field(greeting()),
        )
        .build()
        .unwrap();

    let response = execute(&schema, "{ tags greeting }");
    assert_eq!(response.data, Some(json!({ "tags": null, "greeting": "hi" })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        "Cannot return null for non-nullable list element of Query.tags"
    );
    assert_eq!(response.errors[0].path, path(&["tags", "1"]));
}

#[derive(Default)]
struct SeenArguments {
    greet: RefCell<Vec<usize>>,
    score: RefCell<Vec<usize>>,
}

fn address(args: &Arguments) -> usize {
    args as *const Arguments as usize
}

#[test]
fn test_arguments_cached_per_node_and_parent() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(ObjectDef::new("Query").field(FieldDef::new("users", "[User]").resolve(
            |_, _, _| Ok(vec![user("1", Some("Ada")), user("2", Some("Bo")), user("3", Some("Cy"))].into()),
        )))
        .add_type(InterfaceDef::new("Node").field(FieldDef::new("id", "ID!")))
        .add_type(
            user_type()
                .field(
                    FieldDef::new("greet", "String")
                        .argument(ArgumentDef::new("salutation", "String").default_value("hi"))
                        .resolve(|user, args, ctx| {
                            ctx.get_ext::<SeenArguments>().unwrap().greet.borrow_mut().push(address(args));
                            let salutation: String = args.get_as("salutation").unwrap_or_default();
                            let name = user.property("name").and_then(|name| name.as_json().cloned());
                            Ok(format!("{salutation} {}", name.unwrap_or_default().as_str().unwrap_or("")).into())
                        }),
                )
                .field(
                    FieldDef::new("score", "Int")
                        .argument(
                            ArgumentDef::new("base", "Int")
                                .prepare_with_parent(|value, _parent, _| Prepared::Value(value)),
                        )
                        .resolve(|_, args, ctx| {
                            ctx.get_ext::<SeenArguments>().unwrap().score.borrow_mut().push(address(args));
                            Ok(args.get("base").cloned().unwrap_or_default().into())
                        }),
                ),
        )
        .build()
        .unwrap();

    let mut ctx = Context::new();
    ctx.insert(SeenArguments::default());
    let response = execute_with(&schema, "{ users { greet score(base: 2) } }", &ctx).unwrap();
    assert!(!response.has_errors());
    assert_eq!(
        response.data,
        Some(json!({
            "users": [
                { "greet": "hi Ada", "score": 2 },
                { "greet": "hi Bo", "score": 2 },
                { "greet": "hi Cy", "score": 2 }
            ]
        }))
    );

    let seen = ctx.get_ext::<SeenArguments>().unwrap();
    let greet = seen.greet.borrow();
    assert_eq!(greet.len(), 3);
    assert!(greet.iter().all(|&addr| addr == greet[0]));

    let mut score = seen.score.borrow().clone();
    assert_eq!(score.len(), 3);
    score.sort_unstable();
    score.dedup();
    assert_eq!(score.len(), 3);
}

#[derive(Default)]
struct Completed(RefCell<Vec<i64>>);

/// A value that settles after `rounds` trips through the scheduler.
fn settle_after(rounds: usize, index: i64, completed: Rc<Completed>) -> Value {
    if rounds == 0 {
        completed.0.borrow_mut().push(index);
        return index.into();
    }
    Value::lazy(move || settle_after(rounds - 1, index, completed))
}

#[test]
fn test_list_items_keep_index_order() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(ObjectDef::new("Query").field(FieldDef::new("numbers", "[Int]").resolve(
            |_, _, ctx| {
                let completed = Rc::clone(ctx.get_ext::<Rc<Completed>>().unwrap());
                Ok(Value::List(
                    (0..3)
                        .map(|index| settle_after(3 - index as usize, index, Rc::clone(&completed)))
                        .collect(),
                ))
            },
        )))
        .build()
        .unwrap();

    let completed = Rc::new(Completed::default());
    let mut ctx = Context::new();
    ctx.insert(Rc::clone(&completed));
    let response = execute_with(&schema, "{ numbers }", &ctx).unwrap();
    assert_eq!(*completed.0.borrow(), [2, 1, 0]);
    assert_eq!(response.data, Some(json!({ "numbers": [0, 1, 2] })));
}

fn loaded(key: &'static str) -> FieldDef {
    FieldDef::new(key, "String").resolve(move |_, _, ctx| {
        let loader = ctx
            .loader::<String, String>()
            .ok_or_else(|| AppError::msg("loader missing"))?;
        Ok(Value::Lazy(loader.load(key.to_string()).map(Value::from)))
    })
}

#[test]
fn test_lazies_batch_by_depth() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("a", "A").resolve(|_, _, _| Ok(json!({}).into())))
                .field(FieldDef::new("c", "C").resolve(|_, _, _| Ok(json!({}).into()))),
        )
        .add_type(ObjectDef::new("A").field(loaded("b1")).field(loaded("b2")))
        .add_type(
            ObjectDef::new("C")
                .field(loaded("d1"))
                .field(loaded("d2"))
                .field(FieldDef::new("more", "More").resolve(|_, _, _| {
                    Ok(Value::lazy(|| json!({}).into()))
                })),
        )
        .add_type(ObjectDef::new("More").field(loaded("e1")))
        .build()
        .unwrap();

    let batches: Rc<RefCell<Vec<Vec<String>>>> = Rc::default();
    let recorded = Rc::clone(&batches);
    let loader = BatchLoader::new(move |keys: &[String]| {
        recorded.borrow_mut().push(keys.to_vec());
        keys.iter()
            .map(|key| (key.clone(), key.to_uppercase()))
            .collect::<HashMap<_, _>>()
    });
    let mut ctx = Context::new();
    ctx.register_loader(loader.clone());

    let response = execute_with(
        &schema,
        "{ a { b1 b2 } c { d1 d2 more { e1 } } }",
        &ctx,
    )
    .unwrap();
    assert!(!response.has_errors());
    assert_eq!(
        response.data,
        Some(json!({
            "a": { "b1": "B1", "b2": "B2" },
            "c": { "d1": "D1", "d2": "D2", "more": { "e1": "E1" } }
        }))
    );
    assert_eq!(
        *batches.borrow(),
        vec![vec!["b1", "b2", "d1", "d2"], vec!["e1"]]
    );
    assert_eq!(loader.batch_count(), 2);
}

fn node_schema(resolve_type: bool) -> Schema {
    let mut node = InterfaceDef::new("Node").field(FieldDef::new("id", "ID!"));
    if resolve_type {
        node = node.resolve_type(|_, _| TypeResolution::lazy(|| TypeResolution::Type("User".into())));
    }
    SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("node", "Node").resolve(|_, _, _| {
                    let mut fields = Fields::new();
                    fields.insert("id".to_string(), "c1".into());
                    fields.insert("name".to_string(), "Comment".into());
                    Ok(Value::record(Some("Comment"), fields))
                }))
                .field(greeting()),
        )
        .add_type(node)
        .add_type(user_type())
        .add_type(ObjectDef::new("Comment").field(FieldDef::new("id", "ID!")))
        .build()
        .unwrap()
}

#[test]
fn test_abstract_value_of_non_member_type() {
    let response = execute(
        &node_schema(false),
        "{ node { id ...on User { name } } greeting }",
    );
    assert_eq!(response.data, Some(json!({ "node": null, "greeting": "hi" })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        "The value from \"node\" on \"Query\" could not be resolved to \"Node\". (Received: `Comment`, Expected: [User])"
    );
    assert_eq!(response.errors[0].path, path(&["node"]));
}

#[test]
fn test_deferred_type_resolution() {
    let response = execute(
        &node_schema(true),
        "{ node { __typename id ...on User { name } } }",
    );
    assert!(!response.has_errors());
    assert_eq!(
        response.data,
        Some(json!({ "node": { "__typename": "User", "id": "c1", "name": "Comment" } }))
    );
}

#[test]
fn test_skipped_field_is_absent_not_null() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(greeting())
                .field(FieldDef::new("nothing", "String").resolve(|_, _, _| Ok(Value::Null))),
        )
        .build()
        .unwrap();

    let response = execute(
        &schema,
        "{ greeting @skip(if: true) nothing hidden: greeting @include(if: false) }",
    );
    assert!(!response.has_errors());
    let data = response.data.unwrap();
    assert_eq!(data, json!({ "nothing": null }));
    assert!(!data.as_object().unwrap().contains_key("greeting"));
}

#[test]
fn test_skip_value_removes_the_key() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(greeting())
                .field(FieldDef::new("gone", "String").resolve(|_, _, _| Ok(Value::Skip))),
        )
        .build()
        .unwrap();

    let response = execute(&schema, "{ gone greeting }");
    assert_eq!(response.data, Some(json!({ "greeting": "hi" })));
}

fn counter_schema() -> Schema {
    let add = || {
        FieldDef::new("add", "Int")
            .argument(ArgumentDef::new("n", "Int!"))
            .resolve(|_, args, ctx| {
                let n: i64 = args.get_as("n").unwrap_or_default();
                let log = Rc::clone(ctx.get_ext::<Log>().unwrap());
                log.borrow_mut().push(format!("resolve {n}"));
                Ok(Value::lazy(move || {
                    log.borrow_mut().push(format!("settle {n}"));
                    n.into()
                }))
            })
    };
    SchemaBuilder::new()
        .query_type("Query")
        .mutation_type("Mutation")
        .add_type(ObjectDef::new("Query").field(add()))
        .add_type(ObjectDef::new("Mutation").field(add()))
        .build()
        .unwrap()
}

#[test]
fn test_mutation_fields_run_serially() {
    let schema = counter_schema();

    let (ctx, log) = context_with_log();
    let response = execute_with(
        &schema,
        "mutation { first: add(n: 1) second: add(n: 2) }",
        &ctx,
    )
    .unwrap();
    assert_eq!(response.data, Some(json!({ "first": 1, "second": 2 })));
    assert_eq!(*log.borrow(), ["resolve 1", "settle 1", "resolve 2", "settle 2"]);

    let (ctx, log) = context_with_log();
    let response = execute_with(&schema, "{ first: add(n: 1) second: add(n: 2) }", &ctx).unwrap();
    assert_eq!(response.data, Some(json!({ "first": 1, "second": 2 })));
    assert_eq!(*log.borrow(), ["resolve 1", "resolve 2", "settle 1", "settle 2"]);
}

#[test]
fn test_mutations_without_eager_config_interleave() {
    let schema = counter_schema();
    let (ctx, log) = context_with_log();
    let query = Query::parse("mutation { first: add(n: 1) second: add(n: 2) }").unwrap();
    let executor = Executor::with_config(ExecutorConfig {
        eager_mutations: false,
        ..ExecutorConfig::default()
    });
    let response = executor
        .execute(&schema, &query, &Request::new(), &ctx)
        .unwrap();
    assert_eq!(response.data, Some(json!({ "first": 1, "second": 2 })));
    assert_eq!(*log.borrow(), ["resolve 1", "resolve 2", "settle 1", "settle 2"]);
}

#[test]
fn test_variables_and_operation_name() {
    let schema = counter_schema();
    let (ctx, _log) = context_with_log();
    let query = Query::parse(
        "query Add($n: Int!) { add(n: $n) } query Other { add(n: 0) }",
    )
    .unwrap();
    let request = Request::new().operation_name("Add").variable("n", 5);
    let response = Executor::new().execute(&schema, &query, &request, &ctx).unwrap();
    assert_eq!(response.data, Some(json!({ "add": 5 })));

    let err = Executor::new()
        .execute(&schema, &query, &Request::new(), &ctx)
        .unwrap_err();
    assert!(matches!(err, ExecuteError::AmbiguousOperation));
}

#[test]
fn test_extras_follow_successful_coercion() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query").field(
                FieldDef::new("echo", "String")
                    .argument(ArgumentDef::new("text", "String").prepare(|value, _| {
                        if value.as_str() == Some("bad") {
                            Prepared::Error(ExecutionError::new("text is bad"))
                        } else {
                            Prepared::Value(value)
                        }
                    }))
                    .extra(Extra::Path)
                    .extra(Extra::Custom("locale".into()))
                    .resolve(|_, args, ctx| {
                        push(ctx, "called");
                        let extras = args.extras();
                        let path: Vec<String> = extras
                            .path
                            .iter()
                            .flatten()
                            .map(ToString::to_string)
                            .collect();
                        let locale = extras.custom.get("locale").and_then(|v| v.as_str()).unwrap_or("");
                        let text: String = args.get_as("text").unwrap_or_default();
                        Ok(format!("{text}@{}/{locale}", path.join(".")).into())
                    }),
            ),
        )
        .build()
        .unwrap();

    let (mut ctx, log) = context_with_log();
    ctx.set("locale", "en");
    let response = execute_with(&schema, "{ ok: echo(text: \"fine\") bad: echo(text: \"bad\") }", &ctx).unwrap();
    assert_eq!(response.data, Some(json!({ "ok": "fine@ok/en", "bad": null })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "text is bad");
    assert_eq!(response.errors[0].path, path(&["bad"]));
    assert_eq!(*log.borrow(), ["called"]);
}

fn failing_schema(rescue: bool) -> Schema {
    let mut builder = SchemaBuilder::new().query_type("Query").add_type(
        ObjectDef::new("Query")
            .field(FieldDef::new("boom", "String").resolve(|_, _, _| Err(AppError::msg("kaboom"))))
            .field(greeting()),
    );
    if rescue {
        builder = builder.rescue(|error, _| Some(Value::error(format!("rescued: {error}"))));
    }
    builder.build().unwrap()
}

#[test]
fn test_unrescued_failure_aborts() {
    let err = execute_with(&failing_schema(false), "{ greeting boom }", &Context::new()).unwrap_err();
    match err {
        ExecuteError::Unhandled(error) => assert_eq!(error.to_string(), "kaboom"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_rescued_failure_becomes_field_error() {
    let response = execute(&failing_schema(true), "{ boom greeting }");
    assert_eq!(response.data, Some(json!({ "boom": null, "greeting": "hi" })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "rescued: kaboom");
    assert_eq!(response.errors[0].path, path(&["boom"]));
}

#[test]
fn test_unauthorized_object() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(ObjectDef::new("Query").field(
            FieldDef::new("secret", "Secret").resolve(|_, _, _| Ok(json!({ "code": "1234" }).into())),
        ))
        .add_type(
            ObjectDef::new("Secret")
                .field(FieldDef::new("code", "String"))
                .authorize(|_, ctx| ctx.get::<bool>("admin").unwrap_or(false)),
        )
        .unauthorized(|error, _| Value::error(error.to_string()))
        .build()
        .unwrap();

    let response = execute(&schema, "{ secret { code } }");
    assert_eq!(response.data, Some(json!({ "secret": null })));
    assert_eq!(
        response.errors[0].message,
        "An instance of Secret failed authorization"
    );
    assert_eq!(response.errors[0].path, path(&["secret"]));

    let mut ctx = Context::new();
    ctx.set("admin", true);
    let response = execute_with(&schema, "{ secret { code } }", &ctx).unwrap();
    assert_eq!(response.data, Some(json!({ "secret": { "code": "1234" } })));
}

#[test]
fn test_list_errors_and_non_list_values() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("failures", "[String]").resolve(|_, _, _| {
                    Ok(Value::List(vec![Value::error("first"), Value::error("second")]))
                }))
                .field(FieldDef::new("broken", "[String]").resolve(|_, _, _| Ok("oops".into()))),
        )
        .build()
        .unwrap();

    let response = execute(&schema, "{ failures broken }");
    assert_eq!(
        response.data,
        Some(json!({ "failures": [null, null], "broken": null }))
    );
    let paths: Vec<_> = response.errors.iter().map(|e| e.path.clone()).collect();
    assert_eq!(
        paths,
        [path(&["failures", "0"]), path(&["failures", "1"]), path(&["broken"])]
    );
    assert_eq!(response.errors[0].message, "first");
    assert!(response.errors[2].message.contains("Expected a list"));
}

#[test]
fn test_runtime_directives_wrap_resolution() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(greeting())
                .field(FieldDef::new("names", "[String]").resolve(|_, _, _| {
                    Ok(json!(["a", "b", "c"]).into())
                })),
        )
        .add_directive(
            DirectiveDef::new("trace")
                .location(DirectiveLocation::Field)
                .on_resolve(|_, _, ctx, next| {
                    push(ctx, "before");
                    next();
                    push(ctx, "after");
                })
                .on_resolve_each(|_, _, ctx, next| {
                    push(ctx, "item");
                    next();
                }),
        )
        .add_directive(
            DirectiveDef::new("hide")
                .location(DirectiveLocation::Field)
                .on_resolve(|_, _, _, _| {}),
        )
        .build()
        .unwrap();

    let (ctx, log) = context_with_log();
    let response = execute_with(
        &schema,
        "{ greeting @trace hidden: greeting @hide names @trace }",
        &ctx,
    )
    .unwrap();
    assert_eq!(
        response.data,
        Some(json!({ "greeting": "hi", "names": ["a", "b", "c"] }))
    );
    assert_eq!(
        *log.borrow(),
        ["before", "after", "before", "item", "item", "item", "after"]
    );
}

#[test]
fn test_max_depth() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("me", "User").resolve(|_, _, _| Ok(user("1", Some("Ada"))))),
        )
        .add_type(InterfaceDef::new("Node").field(FieldDef::new("id", "ID!")))
        .add_type(user_type())
        .build()
        .unwrap();

    let query = Query::parse("{ me { name friend { name } } }").unwrap();
    let executor = Executor::with_config(ExecutorConfig {
        max_depth: Some(2),
        ..ExecutorConfig::default()
    });
    let response = executor
        .execute(&schema, &query, &Request::new(), &Context::new())
        .unwrap();
    assert_eq!(
        response.data,
        Some(json!({ "me": { "name": "Ada", "friend": null } }))
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        "Result depth 3 exceeds the maximum of 2"
    );
    assert_eq!(response.errors[0].path, path(&["me", "friend"]));
}

#[test]
fn test_unknown_field_and_missing_root() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(ObjectDef::new("Query").field(greeting()))
        .build()
        .unwrap();

    let response = execute(&schema, "{ greeting missing }");
    assert_eq!(response.data, Some(json!({ "greeting": "hi", "missing": null })));
    assert_eq!(
        response.errors[0].message,
        "Field 'missing' doesn't exist on type 'Query'"
    );

    let err = execute_with(&schema, "mutation { greeting }", &Context::new()).unwrap_err();
    assert!(matches!(err, ExecuteError::MissingRootType(_)));
}

#[test]
fn test_default_request_resolves_against_empty_root() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(greeting())
                .field(FieldDef::new("version", "String")),
        )
        .build()
        .unwrap();

    let query = Query::parse("{ greeting version __typename }").unwrap();
    let response = Executor::new()
        .execute(&schema, &query, &Request::new(), &Context::new())
        .unwrap();
    assert!(!response.has_errors());
    assert_eq!(
        response.data,
        Some(json!({ "greeting": "hi", "version": null, "__typename": "Query" }))
    );
}

#[test]
fn test_refused_root_nulls_the_response() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(greeting())
                .authorize(|_, ctx| ctx.get::<bool>("admin").unwrap_or(false)),
        )
        .build()
        .unwrap();

    let response = execute(&schema, "{ greeting }");
    assert_eq!(response.data, None);
    assert!(!response.has_errors());
}

fn pet(type_name: &str, field: &str, value: &str) -> Value {
    let mut fields = Fields::new();
    fields.insert(field.to_string(), value.into());
    Value::record(Some(type_name), fields)
}

fn pet_schema() -> Schema {
    SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("items", "[Item!]!").resolve(|_, _, _| {
                    Ok(Value::List(vec![pet("Cat", "meow", "m"), pet("Dog", "woof", "w")]))
                }))
                .field(FieldDef::new("stray", "Item").resolve(|_, _, _| {
                    Ok(pet("Bird", "tweet", "t"))
                }))
                .field(FieldDef::new("pets", "[Item]").resolve(|_, _, _| {
                    Ok(Value::List(vec![pet("Dog", "woof", "w"), pet("Bird", "tweet", "t")]))
                })),
        )
        .add_type(UnionDef::new("Item").member("Cat").member("Dog"))
        .add_type(ObjectDef::new("Cat").field(FieldDef::new("meow", "String")))
        .add_type(ObjectDef::new("Dog").field(FieldDef::new("woof", "String")))
        .add_type(ObjectDef::new("Bird").field(FieldDef::new("tweet", "String")))
        .build()
        .unwrap()
}

#[test]
fn test_union_list_resolves_each_item() {
    let response = execute(
        &pet_schema(),
        "{ items { __typename ... on Cat { meow } ... on Dog { woof } } }",
    );
    assert!(!response.has_errors());
    assert_eq!(
        response.data,
        Some(json!({
            "items": [
                { "__typename": "Cat", "meow": "m" },
                { "__typename": "Dog", "woof": "w" }
            ]
        }))
    );
}

#[test]
fn test_union_value_of_non_member_type() {
    let response = execute(
        &pet_schema(),
        "{ stray { __typename } pets { ... on Dog { woof } } }",
    );
    assert_eq!(
        response.data,
        Some(json!({ "stray": null, "pets": [{ "woof": "w" }, null] }))
    );
    assert_eq!(response.errors.len(), 2);
    assert_eq!(
        response.errors[0].message,
        "The value from \"stray\" on \"Query\" could not be resolved to \"Item\". (Received: `Bird`, Expected: [Cat, Dog])"
    );
    assert_eq!(response.errors[0].path, path(&["stray"]));
    assert_eq!(response.errors[1].path, path(&["pets", "1"]));
}

#[test]
fn test_raw_values_skip_completion() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(
            ObjectDef::new("Query")
                .field(FieldDef::new("blob", "String!").resolve(|_, _, _| {
                    Ok(Value::Raw(json!({ "prebuilt": [1, 2] })))
                }))
                .field(FieldDef::new("missing", "String!").resolve(|_, _, _| {
                    Ok(Value::Raw(serde_json::Value::Null))
                })),
        )
        .build()
        .unwrap();

    let response = execute(&schema, "{ blob }");
    assert!(!response.has_errors());
    assert_eq!(response.data, Some(json!({ "blob": { "prebuilt": [1, 2] } })));

    let response = execute(&schema, "{ blob missing }");
    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        "Cannot return null for non-nullable field Query.missing"
    );
    assert_eq!(response.errors[0].path, path(&["missing"]));
}

#[test]
fn test_directives_only_run_where_declared() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(ObjectDef::new("Query").field(greeting()))
        .add_directive(
            DirectiveDef::new("log")
                .location(DirectiveLocation::Query)
                .on_resolve(|_, _, ctx, next| {
                    push(ctx, "log");
                    next();
                }),
        )
        .build()
        .unwrap();

    let (ctx, log) = context_with_log();
    let response = execute_with(
        &schema,
        "query @log { greeting @log ... @log { again: greeting } }",
        &ctx,
    )
    .unwrap();
    assert!(!response.has_errors());
    assert_eq!(response.data, Some(json!({ "greeting": "hi", "again": "hi" })));
    assert_eq!(*log.borrow(), ["log"]);
}
