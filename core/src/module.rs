//! Compiled modules
//!
//! A module is the unit the parser hands over: grouped function
//! declarations, class declarations and a top-level tree. Compiling binds
//! every function group and class into the module scope; initializing runs
//! the top-level tree once, on the module's owning thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::errors::{RuntimeError, RuntimeResult};
use crate::interpreter::exec_loop::drive;
use crate::interpreter::host::{json_to_val, val_to_json};
use crate::interpreter::invoke::{ClassDecl, ClassValue, FunctionValue};
use crate::interpreter::scope::Scope;
use crate::interpreter::types::{FunctionDecl, Node, Value};
use crate::thread::ContanThread;

/* ===================== Definitions ===================== */

/// Class as produced by the parser
#[derive(Debug, Deserialize)]
pub struct ClassDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    /// Base class declared in the same module
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub initializers: Vec<Arc<Node>>,
    #[serde(default)]
    pub methods: Vec<FunctionDecl>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>, params: &[&str]) -> Self {
        ClassDef {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            extends: None,
            initializers: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    pub fn initializer(mut self, body: Node) -> Self {
        self.initializers.push(Arc::new(body));
        self
    }

    pub fn method(mut self, method: FunctionDecl) -> Self {
        self.methods.push(method);
        self
    }

    fn into_decl(self, base: Option<Arc<ClassDecl>>) -> ClassDecl {
        let mut methods: HashMap<String, Vec<Arc<FunctionDecl>>> = HashMap::new();
        for method in self.methods {
            methods
                .entry(method.name.clone())
                .or_default()
                .push(Arc::new(method));
        }
        ClassDecl {
            name: self.name,
            params: self.params,
            initializers: self.initializers,
            methods,
            base,
        }
    }
}

/// Module as produced by the parser
#[derive(Debug, Deserialize)]
pub struct ModuleDef {
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub classes: Vec<ClassDef>,
    #[serde(default = "empty_body")]
    pub body: Node,
}

fn empty_body() -> Node {
    Node::block(Vec::new())
}

impl ModuleDef {
    pub fn new(body: Node) -> Self {
        ModuleDef {
            functions: Vec::new(),
            classes: Vec::new(),
            body,
        }
    }

    pub fn function(mut self, function: FunctionDecl) -> Self {
        self.functions.push(function);
        self
    }

    pub fn class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self
    }
}

/* ===================== Module ===================== */

struct ModuleInner {
    root_name: String,
    functions: HashMap<String, FunctionValue>,
    classes: HashMap<String, Arc<ClassDecl>>,
    body: Arc<Node>,
    scope: Scope,
    owner: ContanThread,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
}

/// A compiled module, shareable across threads
#[derive(Clone)]
pub struct ContanModule {
    inner: Arc<ModuleInner>,
}

impl ContanModule {
    /// Bind `def` into `scope`; the module runs on `scope`'s thread
    pub(crate) fn compile(root_name: &str, def: ModuleDef, scope: Scope) -> Result<Self> {
        let ModuleDef {
            functions,
            classes,
            body,
        } = def;

        let mut groups: HashMap<String, Vec<Arc<FunctionDecl>>> = HashMap::new();
        for function in functions {
            groups
                .entry(function.name.clone())
                .or_default()
                .push(Arc::new(function));
        }
        let functions: HashMap<String, FunctionValue> = groups
            .into_iter()
            .map(|(name, overloads)| {
                let value = FunctionValue::declared(name.clone(), overloads, &scope);
                (name, value)
            })
            .collect();

        let classes = resolve_classes(classes)
            .with_context(|| format!("Failed to compile module `{root_name}`"))?;

        for (name, function) in &functions {
            scope.declare(name, Value::Function(function.clone()));
        }
        for (name, class) in &classes {
            scope.declare(name, Value::Class(ClassValue::new(class.clone(), &scope)));
        }

        debug!(
            module = root_name,
            functions = functions.len(),
            classes = classes.len(),
            "compiled module"
        );

        Ok(ContanModule {
            inner: Arc::new(ModuleInner {
                root_name: root_name.to_string(),
                functions,
                classes,
                body: Arc::new(body),
                owner: scope.thread().clone(),
                scope,
                initialized: AtomicBool::new(false),
                init_lock: Mutex::new(()),
            }),
        })
    }

    pub fn root_name(&self) -> &str {
        &self.inner.root_name
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Thread initialization and synchronous invocations run on
    pub fn owner(&self) -> &ContanThread {
        &self.inner.owner
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.inner.functions.contains_key(name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.inner.classes.get(name).map(|class| class.as_ref())
    }

    /// Current value of a module-scope variable
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.inner.scope.lookup_local(name).and_then(|slot| slot.get().ok())
    }

    /* ----- initialization ----- */

    /// Run the top-level tree once
    ///
    /// Later calls, including re-entrant ones made while initialization is
    /// still running, return immediately. A failed initialization can be
    /// retried.
    pub fn initialize(&self) -> Result<()> {
        self.ensure_initialized()
            .with_context(|| format!("Failed to initialize module `{}`", self.inner.root_name))
    }

    fn ensure_initialized(&self) -> RuntimeResult<()> {
        if self.inner.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self
            .inner
            .init_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.initialized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(module = %self.inner.root_name, thread = %self.inner.owner.name(), "initializing module");
        let module = self.clone();
        let result = self
            .inner
            .owner
            .run_and_wait(move || drive(&module.inner.body, &module.inner.scope).map(|_| ()));

        if result.is_err() {
            self.inner.initialized.store(false, Ordering::Release);
        }
        result
    }

    /* ----- invocation ----- */

    /// Call `name` on the caller's own OS thread
    ///
    /// The call scope still names the module owner as its thread, so
    /// `async` blocks targeting the owner are queued there rather than run
    /// in place on the caller.
    pub fn invoke_function(&self, name: &str, args: &[JsonValue]) -> Result<Option<JsonValue>> {
        self.ensure_initialized()
            .and_then(|_| self.call(name, args))
            .with_context(|| self.call_context(name))
    }

    /// Call `name` on the owning thread, blocking until it returns
    pub fn invoke_function_sync(&self, name: &str, args: Vec<JsonValue>) -> Result<Option<JsonValue>> {
        let module = self.clone();
        let function = name.to_string();
        self.ensure_initialized()
            .and_then(|_| {
                self.inner
                    .owner
                    .run_and_wait(move || module.call(&function, &args))
            })
            .with_context(|| self.call_context(name))
    }

    /// Queue a call to `name` on the owning thread without waiting
    ///
    /// Only delivery can fail here; a failure inside the call is logged.
    pub fn invoke_function_async(&self, name: &str, args: Vec<JsonValue>) -> Result<()> {
        let module = self.clone();
        let function = name.to_string();
        self.inner
            .owner
            .schedule(move || {
                let outcome = module
                    .ensure_initialized()
                    .and_then(|_| module.call(&function, &args));
                if let Err(err) = outcome {
                    warn!(
                        module = %module.inner.root_name,
                        function = %function,
                        error = %err,
                        "async invocation failed"
                    );
                }
            })
            .with_context(|| self.call_context(name))
    }

    fn call(&self, name: &str, args: &[JsonValue]) -> RuntimeResult<Option<JsonValue>> {
        let function =
            self.inner
                .functions
                .get(name)
                .ok_or_else(|| RuntimeError::FunctionNotFound {
                    name: name.to_string(),
                    arity: args.len(),
                })?;

        let args: Vec<Value> = args.iter().map(json_to_val).collect();
        let result = function
            .prepare(args.len())?
            .run_to_completion(&self.inner.owner, &args)?;
        val_to_json(&result)
    }

    fn call_context(&self, name: &str) -> String {
        format!("Failed to invoke `{}.{name}`", self.inner.root_name)
    }
}

impl std::fmt::Debug for ContanModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContanModule")
            .field("root_name", &self.inner.root_name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/* ===================== Class resolution ===================== */

fn resolve_classes(defs: Vec<ClassDef>) -> Result<HashMap<String, Arc<ClassDecl>>> {
    let mut pending: HashMap<String, ClassDef> = HashMap::new();
    for def in defs {
        if pending.contains_key(&def.name) {
            bail!("class `{}` is declared twice", def.name);
        }
        pending.insert(def.name.clone(), def);
    }

    let mut names: Vec<String> = pending.keys().cloned().collect();
    names.sort();

    let mut resolved = HashMap::new();
    for name in names {
        resolve_class(&name, &mut pending, &mut resolved, &mut Vec::new())?;
    }
    Ok(resolved)
}

fn resolve_class(
    name: &str,
    pending: &mut HashMap<String, ClassDef>,
    resolved: &mut HashMap<String, Arc<ClassDecl>>,
    visiting: &mut Vec<String>,
) -> Result<Arc<ClassDecl>> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }
    if visiting.iter().any(|seen| seen == name) {
        bail!("inheritance cycle: {} -> {name}", visiting.join(" -> "));
    }
    let Some(def) = pending.remove(name) else {
        bail!("unknown class `{name}`");
    };

    visiting.push(name.to_string());
    let base = match def.extends.clone() {
        Some(base) => Some(
            resolve_class(&base, pending, resolved, visiting)
                .with_context(|| format!("class `{name}` extends `{base}`"))?,
        ),
        None => None,
    };
    visiting.pop();

    let decl = Arc::new(def.into_decl(base));
    resolved.insert(name.to_string(), decl.clone());
    Ok(decl)
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
