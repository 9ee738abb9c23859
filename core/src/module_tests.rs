//! Tests for module compilation, initialization and host invocation

use super::*;
use crate::engine::Engine;
use crate::errors::ErrorKind;
use crate::interpreter::natives::NativeObject;
use crate::interpreter::types::BinaryOp;
use maplit::hashmap;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Native counting how often the module body touched it
#[derive(Debug, Default)]
struct InitCounter {
    runs: Arc<AtomicUsize>,
}

impl NativeObject for InitCounter {
    fn type_name(&self) -> &str {
        "test.InitCounter"
    }

    fn invoke(&self, _method: &str, _args: &[Value]) -> anyhow::Result<Value> {
        Ok(Value::Integer(self.runs.fetch_add(1, Ordering::SeqCst) as i64 + 1))
    }
}

fn add_function() -> FunctionDecl {
    FunctionDecl::new(
        "add",
        &["a", "b"],
        Node::ret(Some(Node::binary(BinaryOp::Add, Node::var("a"), Node::var("b")))),
    )
}

#[test]
fn test_top_level_arithmetic() {
    let engine = Engine::new().unwrap();
    let module = engine
        .compile(
            "arith",
            ModuleDef::new(Node::block(vec![
                Node::data("x", Node::binary(BinaryOp::Mul, Node::int(20), Node::int(40))),
                Node::data("y", Node::binary(BinaryOp::Mul, Node::float(20.1), Node::int(40))),
                Node::data("z", Node::binary(BinaryOp::Add, Node::var("x"), Node::int(1))),
            ])),
        )
        .unwrap();

    assert!(!module.is_initialized());
    module.initialize().unwrap();

    assert!(module.is_initialized());
    assert_eq!(module.variable("x"), Some(Value::Integer(800)));
    assert_eq!(module.variable("y"), Some(Value::Float(804.0)));
    assert_eq!(module.variable("z"), Some(Value::Integer(801)));
}

#[test]
fn test_initialize_runs_once() {
    let engine = Engine::new().unwrap();
    let counter = InitCounter::default();
    let runs = counter.runs.clone();
    engine.register_native("test.InitCounter", counter);

    let module = engine
        .compile(
            "once",
            ModuleDef::new(Node::method(Node::import("test.InitCounter"), "tick", vec![])),
        )
        .unwrap();

    module.initialize().unwrap();
    module.initialize().unwrap();
    module.clone().initialize().unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_initialize_runs_once() {
    let engine = Engine::new().unwrap();
    let counter = InitCounter::default();
    let runs = counter.runs.clone();
    engine.register_native("test.InitCounter", counter);

    let module = engine
        .compile(
            "racy",
            ModuleDef::new(Node::method(Node::import("test.InitCounter"), "tick", vec![])),
        )
        .unwrap();

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let module = module.clone();
            std::thread::spawn(move || module.initialize().unwrap())
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_initialization_runs_on_owner_thread() {
    let engine = Engine::new().unwrap();
    let module = engine
        .compile(
            "owner",
            ModuleDef::new(Node::data(
                "ran_on",
                Node::method(Node::import("contan.Thread"), "currentName", vec![]),
            )),
        )
        .unwrap();

    module.initialize().unwrap();

    assert_eq!(
        module.variable("ran_on"),
        Some(Value::from(engine.main_thread().name()))
    );
}

#[test]
fn test_failed_initialization_can_retry() {
    let engine = Engine::new().unwrap();
    let module = engine
        .compile("broken", ModuleDef::new(Node::var("undefined_thing")))
        .unwrap();

    let err = module.initialize().unwrap_err();
    assert_eq!(
        err.downcast_ref::<RuntimeError>().map(RuntimeError::kind),
        Some(ErrorKind::NotFound)
    );
    assert!(!module.is_initialized());
    assert!(module.initialize().is_err());
}

#[test]
fn test_invocation_modes() {
    let engine = Engine::new().unwrap();
    let module = engine
        .compile(
            "calls",
            ModuleDef::new(Node::data("stored", Node::int(0)))
                .function(add_function())
                .function(FunctionDecl::new(
                    "store",
                    &["v"],
                    Node::assign(Node::var("stored"), Node::var("v")),
                ))
                .function(FunctionDecl::new(
                    "load",
                    &[],
                    Node::ret(Some(Node::var("stored"))),
                )),
        )
        .unwrap();
    module.initialize().unwrap();

    assert_eq!(
        module.invoke_function("add", &[json!(2), json!(3)]).unwrap(),
        Some(json!(5))
    );
    assert_eq!(
        module
            .invoke_function_sync("add", vec![json!(1.5), json!(1)])
            .unwrap(),
        Some(json!(2.5))
    );

    // Same FIFO queue: the queued store lands before the load
    module.invoke_function_async("store", vec![json!("queued")]).unwrap();
    assert_eq!(
        module.invoke_function_sync("load", vec![]).unwrap(),
        Some(json!("queued"))
    );

    // No return value
    assert_eq!(module.invoke_function("store", &[json!(1)]).unwrap(), None);
}

#[test]
fn test_in_place_call_queues_owner_async_blocks() {
    let current_name = || Node::method(Node::import("contan.Thread"), "currentName", vec![]);
    let engine = Engine::new().unwrap();
    let module = engine
        .compile(
            "placement",
            ModuleDef::new(Node::block(vec![]))
                .function(FunctionDecl::new("here", &[], Node::ret(Some(current_name()))))
                .function(FunctionDecl::new(
                    "on_owner",
                    &[],
                    Node::block(vec![
                        Node::data(
                            "h",
                            Node::async_block(
                                Node::var("MainThread"),
                                Node::ret(Some(current_name())),
                            ),
                        ),
                        Node::ret(Some(Node::method(Node::var("h"), "await", vec![]))),
                    ]),
                )),
        )
        .unwrap();

    let owner = json!(engine.main_thread().name());
    assert_ne!(module.invoke_function("here", &[]).unwrap(), Some(owner.clone()));
    assert_eq!(module.invoke_function("on_owner", &[]).unwrap(), Some(owner));
}

#[test]
fn test_host_objects_as_arguments() {
    let engine = Engine::new().unwrap();
    let module = engine
        .compile(
            "host",
            ModuleDef::new(Node::block(vec![]))
                .function(FunctionDecl::new(
                    "count",
                    &["items"],
                    Node::ret(Some(Node::method(Node::var("items"), "size", vec![]))),
                ))
                .function(FunctionDecl::new(
                    "label",
                    &["record"],
                    Node::ret(Some(Node::method(
                        Node::var("record"),
                        "get",
                        vec![Node::str("label")],
                    ))),
                ))
                .function(FunctionDecl::new("echo", &["v"], Node::ret(Some(Node::var("v"))))),
        )
        .unwrap();

    let record = hashmap! {
        "label".to_string() => json!("nightly"),
        "ids".to_string() => json!([1, 2, 3]),
    };
    let record = serde_json::to_value(record).unwrap();

    assert_eq!(
        module.invoke_function("count", &[json!([1, 2, 3])]).unwrap(),
        Some(json!(3))
    );
    assert_eq!(
        module.invoke_function("label", &[record.clone()]).unwrap(),
        Some(json!("nightly"))
    );
    assert_eq!(module.invoke_function("echo", &[record.clone()]).unwrap(), Some(record));
}

#[test]
fn test_unknown_function_and_arity() {
    let engine = Engine::new().unwrap();
    let module = engine
        .compile("lookup", ModuleDef::new(Node::block(vec![])).function(add_function()))
        .unwrap();

    let err = module.invoke_function("missing", &[]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::FunctionNotFound { name, .. }) if name == "missing"
    ));

    let err = module.invoke_function_sync("add", vec![json!(1)]).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RuntimeError>(),
        Some(&RuntimeError::FunctionNotFound {
            name: "add".to_string(),
            arity: 1
        })
    );
}

#[test]
fn test_non_host_result_is_rejected() {
    let engine = Engine::new().unwrap();
    let module = engine
        .compile(
            "leak",
            ModuleDef::new(Node::block(vec![])).function(FunctionDecl::new(
                "thread",
                &[],
                Node::ret(Some(Node::var("MainThread"))),
            )),
        )
        .unwrap();

    let err = module.invoke_function("thread", &[]).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RuntimeError>().map(RuntimeError::kind),
        Some(ErrorKind::TypeMismatch)
    );
}

#[test]
fn test_class_resolution_errors() {
    let engine = Engine::new().unwrap();

    let orphan = ModuleDef::new(Node::block(vec![])).class(ClassDef::new("A", &[]).extends("Missing"));
    let err = engine.compile("orphan", orphan).unwrap_err();
    assert!(format!("{err:#}").contains("unknown class `Missing`"));

    let cycle = ModuleDef::new(Node::block(vec![]))
        .class(ClassDef::new("A", &[]).extends("B"))
        .class(ClassDef::new("B", &[]).extends("A"));
    let err = engine.compile("cycle", cycle).unwrap_err();
    assert!(format!("{err:#}").contains("inheritance cycle"));

    let twice = ModuleDef::new(Node::block(vec![]))
        .class(ClassDef::new("A", &[]))
        .class(ClassDef::new("A", &[]));
    assert!(engine.compile("twice", twice).is_err());
}

#[test]
fn test_compile_json_end_to_end() {
    let engine = Engine::new().unwrap();
    let module = engine
        .compile_json(
            "json",
            r#"{
                "functions": [
                    {
                        "name": "area",
                        "params": ["w", "h"],
                        "body": {
                            "t": "Return",
                            "value": {
                                "t": "Binary",
                                "op": "Mul",
                                "lhs": { "t": "Var", "name": "w" },
                                "rhs": { "t": "Var", "name": "h" }
                            }
                        }
                    }
                ],
                "classes": [
                    {
                        "name": "Pair",
                        "params": ["i", "j"],
                        "initializers": [
                            {
                                "t": "Data",
                                "name": "sum",
                                "init": {
                                    "t": "Binary",
                                    "op": "Add",
                                    "lhs": { "t": "Var", "name": "i" },
                                    "rhs": { "t": "Var", "name": "j" }
                                }
                            }
                        ],
                        "methods": [
                            {
                                "name": "total",
                                "body": { "t": "Return", "value": { "t": "Var", "name": "sum" } }
                            }
                        ]
                    }
                ],
                "body": {
                    "t": "Block",
                    "body": [
                        {
                            "t": "Data",
                            "name": "p",
                            "init": {
                                "t": "New",
                                "class": { "t": "Var", "name": "Pair" },
                                "args": [{ "t": "Int", "v": 1 }, { "t": "Int", "v": 2 }]
                            }
                        },
                        {
                            "t": "Data",
                            "name": "sum",
                            "init": {
                                "t": "Method",
                                "receiver": { "t": "Var", "name": "p" },
                                "name": "total"
                            }
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

    module.initialize().unwrap();

    assert_eq!(module.variable("sum"), Some(Value::Integer(3)));
    assert!(module.has_function("area"));
    assert_eq!(module.class("Pair").map(|class| class.params.len()), Some(2));
    assert_eq!(
        module.invoke_function("area", &[json!(3), json!(4)]).unwrap(),
        Some(json!(12))
    );
}

#[test]
fn test_compile_json_rejects_malformed_tree() {
    let engine = Engine::new().unwrap();
    let err = engine
        .compile_json("bad", r#"{ "body": { "t": "Teleport" } }"#)
        .unwrap_err();

    assert!(err.to_string().contains("Failed to parse module `bad`"));
}
