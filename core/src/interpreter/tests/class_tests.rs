//! Tests for classes, instances, fields and inheritance

use super::helpers::{init_error, init_module};
use crate::errors::{ErrorKind, RuntimeError};
use crate::interpreter::{BinaryOp, FunctionDecl, Node, Value};
use crate::module::{ClassDef, ModuleDef};

/// `class Pair(i, j) { data sum = i + j; total() { return sum } }`
fn pair_class() -> ClassDef {
    ClassDef::new("Pair", &["i", "j"])
        .initializer(Node::data(
            "sum",
            Node::binary(BinaryOp::Add, Node::var("i"), Node::var("j")),
        ))
        .method(FunctionDecl::new("total", &[], Node::ret(Some(Node::var("sum")))))
        .method(FunctionDecl::new(
            "total",
            &["k"],
            Node::ret(Some(Node::binary(BinaryOp::Mul, Node::var("sum"), Node::var("k")))),
        ))
}

/// `class Counter() { data count = 0; bump() { count = count + 1; return count } }`
fn counter_class() -> ClassDef {
    ClassDef::new("Counter", &[])
        .initializer(Node::data("count", Node::int(0)))
        .method(FunctionDecl::new(
            "bump",
            &[],
            Node::block(vec![
                Node::assign(
                    Node::var("count"),
                    Node::binary(BinaryOp::Add, Node::var("count"), Node::int(1)),
                ),
                Node::ret(Some(Node::var("count"))),
            ]),
        ))
}

fn new_instance(class: &str, args: Vec<Node>) -> Node {
    Node::new_instance(Node::var(class), args)
}

#[test]
fn test_initializer_state_visible_to_methods() {
    let def = ModuleDef::new(Node::block(vec![
        Node::data("p", new_instance("Pair", vec![Node::int(1), Node::int(2)])),
        Node::data("total", Node::method(Node::var("p"), "total", vec![])),
        Node::data("scaled", Node::method(Node::var("p"), "total", vec![Node::int(10)])),
        Node::data("field", Node::field(Node::var("p"), "sum")),
    ]))
    .class(pair_class());

    let (_engine, module) = init_module(def);

    assert_eq!(module.variable("total"), Some(Value::Integer(3)));
    assert_eq!(module.variable("scaled"), Some(Value::Integer(30)));
    assert_eq!(module.variable("field"), Some(Value::Integer(3)));
}

#[test]
fn test_missing_constructor_arguments_bind_void() {
    let def = ModuleDef::new(Node::block(vec![
        Node::data("p", new_instance("Counter", vec![])),
        Node::data("q", new_instance("Holder", vec![Node::int(1)])),
        Node::data("second", Node::field(Node::var("q"), "b")),
    ]))
    .class(counter_class())
    .class(ClassDef::new("Holder", &["a", "b"]));

    let (_engine, module) = init_module(def);

    assert_eq!(module.variable("second"), Some(Value::Void));
}

#[test]
fn test_instances_alias_but_primitives_copy() {
    let def = ModuleDef::new(Node::block(vec![
        Node::data("a", new_instance("Counter", vec![])),
        Node::data("b", Node::var("a")),
        Node::method(Node::var("b"), "bump", vec![]),
        Node::data("seen_through_a", Node::field(Node::var("a"), "count")),
        Node::data("c", new_instance("Counter", vec![])),
        Node::method(Node::var("c"), "bump", vec![]),
        Node::method(Node::var("c"), "bump", vec![]),
        Node::data("a_after_c", Node::field(Node::var("a"), "count")),
        Node::data("x", Node::int(1)),
        Node::data("y", Node::var("x")),
        Node::assign(Node::var("y"), Node::int(2)),
    ]))
    .class(counter_class());

    let (_engine, module) = init_module(def);

    assert_eq!(module.variable("seen_through_a"), Some(Value::Integer(1)));
    assert_eq!(module.variable("a_after_c"), Some(Value::Integer(1)));
    assert_eq!(module.variable("x"), Some(Value::Integer(1)));
    assert_eq!(module.variable("a"), module.variable("b"));
    assert_ne!(module.variable("a"), module.variable("c"));
}

#[test]
fn test_field_assignment_through_instance() {
    let def = ModuleDef::new(Node::block(vec![
        Node::data("p", new_instance("Pair", vec![Node::int(1), Node::int(2)])),
        Node::assign(Node::field(Node::var("p"), "sum"), Node::int(10)),
        Node::data("total", Node::method(Node::var("p"), "total", vec![])),
    ]))
    .class(pair_class());

    let (_engine, module) = init_module(def);

    assert_eq!(module.variable("total"), Some(Value::Integer(10)));
}

#[test]
fn test_base_initializers_run_first() {
    let base = ClassDef::new("Greeter", &["name"])
        .initializer(Node::data(
            "greeting",
            Node::binary(BinaryOp::Add, Node::str("hi "), Node::var("name")),
        ))
        .method(FunctionDecl::new("greet", &[], Node::ret(Some(Node::var("greeting")))));
    let derived = ClassDef::new("Shouter", &["name", "punct"])
        .extends("Greeter")
        .initializer(Node::data(
            "loud",
            Node::binary(BinaryOp::Add, Node::var("greeting"), Node::var("punct")),
        ))
        .method(FunctionDecl::new("shout", &[], Node::ret(Some(Node::var("loud")))));

    let def = ModuleDef::new(Node::block(vec![
        Node::data("s", new_instance("Shouter", vec![Node::str("ann"), Node::str("!")])),
        Node::data("greeted", Node::method(Node::var("s"), "greet", vec![])),
        Node::data("shouted", Node::method(Node::var("s"), "shout", vec![])),
    ]))
    .class(derived)
    .class(base);

    let (_engine, module) = init_module(def);

    assert_eq!(module.variable("greeted"), Some(Value::from("hi ann")));
    assert_eq!(module.variable("shouted"), Some(Value::from("hi ann!")));
}

#[test]
fn test_yielding_initializer_and_method_complete() {
    let class = ClassDef::new("Lazy", &["v"])
        .initializer(Node::block(vec![
            Node::yield_now(),
            Node::data("ready", Node::bool(true)),
        ]))
        .method(FunctionDecl::new(
            "get",
            &[],
            Node::block(vec![Node::yield_now(), Node::ret(Some(Node::var("v")))]),
        ));

    let def = ModuleDef::new(Node::block(vec![
        Node::data("l", new_instance("Lazy", vec![Node::int(8)])),
        Node::data("ready", Node::field(Node::var("l"), "ready")),
        Node::data("got", Node::method(Node::var("l"), "get", vec![])),
    ]))
    .class(class);

    let (_engine, module) = init_module(def);

    assert_eq!(module.variable("ready"), Some(Value::Bool(true)));
    assert_eq!(module.variable("got"), Some(Value::Integer(8)));
}

#[test]
fn test_unknown_method_and_field() {
    let err = init_error(
        ModuleDef::new(Node::method(
            new_instance("Counter", vec![]),
            "reset",
            vec![],
        ))
        .class(counter_class()),
    );
    assert!(matches!(err, RuntimeError::MethodNotFound { ref method, .. } if method == "reset"));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = init_error(
        ModuleDef::new(Node::field(new_instance("Counter", vec![]), "size")).class(counter_class()),
    );
    assert_eq!(
        err,
        RuntimeError::UnknownField {
            class: "Counter".to_string(),
            field: "size".to_string()
        }
    );
}

#[test]
fn test_new_on_non_class_fails() {
    let err = init_error(ModuleDef::new(Node::new_instance(Node::int(3), vec![])));
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}
