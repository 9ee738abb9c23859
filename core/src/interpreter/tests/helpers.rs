//! Test helpers for evaluator tests
//!
//! Scopes on real worker threads, JSON tree parsing, and a counting native
//! used to check that finished operands are never evaluated twice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::Engine;
use crate::errors::RuntimeError;
use crate::interpreter::natives::{NativeHandle, NativeObject, NativeRegistry};
use crate::module::{ContanModule, ModuleDef};
use crate::interpreter::{drive, FunctionDecl, FunctionValue, Node, Scope, ScopeKind, Value};
use crate::thread::ContanThread;

/// Module scope on a fresh thread, with built-in natives
pub fn module_scope() -> Scope {
    let thread = ContanThread::spawn("eval-test").expect("Failed to spawn test thread");
    Scope::root(
        ScopeKind::Module,
        thread,
        Arc::new(NativeRegistry::with_builtins()),
    )
}

/// Compile and initialize `def` on a fresh engine
pub fn init_module(def: ModuleDef) -> (Engine, ContanModule) {
    let engine = Engine::new().expect("Failed to start engine");
    let module = engine.compile("test", def).expect("Module compilation failed");
    module.initialize().expect("Module initialization failed");
    (engine, module)
}

/// Compile `def` and return the error its initialization fails with
pub fn init_error(def: ModuleDef) -> RuntimeError {
    let engine = Engine::new().expect("Failed to start engine");
    let module = engine.compile("test", def).expect("Module compilation failed");
    let err = module.initialize().expect_err("Module initialization succeeded");
    err.downcast_ref::<RuntimeError>()
        .cloned()
        .expect("Initialization failed with a non-runtime error")
}

/// Deserialize a `"t"`-tagged JSON tree
pub fn parse(json: &str) -> Node {
    serde_json::from_str(json).expect("Tree deserialization failed")
}

/// Evaluate `node` to completion, resuming through any yields
pub fn run(node: &Node, scope: &Scope) -> Value {
    drive(node, scope).expect("Evaluation failed")
}

/// Bind an overload group into `scope` the way modules do
pub fn declare_functions(scope: &Scope, name: &str, decls: Vec<FunctionDecl>) {
    let overloads = decls.into_iter().map(Arc::new).collect();
    let function = FunctionValue::declared(name, overloads, scope);
    scope.declare(name, Value::Function(function));
}

/// Native that counts `hit()` calls
#[derive(Debug, Default)]
pub struct Probe {
    hits: Arc<AtomicUsize>,
}

impl Probe {
    /// Register a probe as `test.Probe` and return its counter
    pub fn install(scope: &Scope) -> Arc<AtomicUsize> {
        let probe = Probe::default();
        let hits = probe.hits.clone();
        scope.natives().register("test.Probe", NativeHandle::new(probe));
        hits
    }

    /// `import("test.Probe").hit()`
    pub fn hit() -> Node {
        Node::method(Node::import("test.Probe"), "hit", vec![])
    }
}

impl NativeObject for Probe {
    fn type_name(&self) -> &str {
        "test.Probe"
    }

    fn invoke(&self, method: &str, _args: &[Value]) -> anyhow::Result<Value> {
        match method {
            "hit" => Ok(Value::Integer(
                self.hits.fetch_add(1, Ordering::SeqCst) as i64 + 1,
            )),
            other => anyhow::bail!("unknown probe method `{other}`"),
        }
    }
}

pub fn hits(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
