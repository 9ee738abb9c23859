//! Functions, classes and instances
//!
//! Calls never run on a native stack of their own: an `Invocation` names the
//! declaration to run and the scope to parent it to, `start` binds the
//! arguments and evaluates the body once, and a suspended call is resumed by
//! handing the same call scope back to `resume`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{RuntimeError, RuntimeResult};
use crate::interpreter::exec_loop;
use crate::interpreter::scope::{Scope, ScopeKind, WeakScope};
use crate::interpreter::types::{EvalResult, FunctionDecl, Node, Value};
use crate::thread::ContanThread;

/* ===================== Functions ===================== */

/// Scope a function body is parented to
#[derive(Debug, Clone)]
pub enum Closure {
    /// Lambda: keeps the defining scope alive
    Captured(Scope),
    /// Module-level declaration: the module scope owns the function, not
    /// the other way round
    Declared(WeakScope),
}

/// An overload group plus the scope its bodies close over
#[derive(Debug, Clone)]
pub struct FunctionValue {
    name: String,
    overloads: Arc<Vec<Arc<FunctionDecl>>>,
    closure: Closure,
}

impl FunctionValue {
    pub fn declared(name: impl Into<String>, overloads: Vec<Arc<FunctionDecl>>, site: &Scope) -> Self {
        FunctionValue {
            name: name.into(),
            overloads: Arc::new(overloads),
            closure: Closure::Declared(site.downgrade()),
        }
    }

    pub fn lambda(params: Vec<String>, body: Arc<Node>, captured: &Scope) -> Self {
        let decl = FunctionDecl {
            name: "lambda".to_string(),
            params,
            body,
        };
        FunctionValue {
            name: decl.name.clone(),
            overloads: Arc::new(vec![Arc::new(decl)]),
            closure: Closure::Captured(captured.clone()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overloads(&self) -> &[Arc<FunctionDecl>] {
        &self.overloads
    }

    pub fn ptr_eq(&self, other: &FunctionValue) -> bool {
        Arc::ptr_eq(&self.overloads, &other.overloads)
    }

    /// First overload taking exactly `arity` arguments
    pub fn select(&self, arity: usize) -> RuntimeResult<Arc<FunctionDecl>> {
        self.overloads
            .iter()
            .find(|decl| decl.arity() == arity)
            .cloned()
            .ok_or_else(|| RuntimeError::FunctionNotFound {
                name: self.name.clone(),
                arity,
            })
    }

    fn closure_scope(&self) -> RuntimeResult<Scope> {
        match &self.closure {
            Closure::Captured(scope) => Ok(scope.clone()),
            Closure::Declared(site) => site.upgrade().ok_or_else(|| RuntimeError::NotCallable {
                value: format!("{} (its module was dropped)", self.name),
            }),
        }
    }

    /// Resolve the overload for a call with `arity` arguments
    pub fn prepare(&self, arity: usize) -> RuntimeResult<Invocation> {
        Ok(Invocation {
            decl: self.select(arity)?,
            parent: self.closure_scope()?,
        })
    }
}

/* ===================== Invocation ===================== */

/// A selected declaration and the scope its call frame hangs off
#[derive(Debug, Clone)]
pub struct Invocation {
    decl: Arc<FunctionDecl>,
    parent: Scope,
}

impl Invocation {
    pub fn decl(&self) -> &FunctionDecl {
        &self.decl
    }

    /// Bind `args` in a fresh call scope and evaluate the body once
    ///
    /// Returns the call scope and the call result, `None` if the body
    /// suspended. A suspended call continues with `resume(call_scope)`.
    pub fn start(
        &self,
        thread: &ContanThread,
        args: &[Value],
    ) -> RuntimeResult<(Scope, Option<Value>)> {
        let call_scope = self
            .parent
            .child_named_on(ScopeKind::Function, &self.decl.name, thread.clone());
        for (param, arg) in self.decl.params.iter().zip(args) {
            call_scope.declare(param, arg.create_clone()?);
        }
        let outcome = self.run(&call_scope)?;
        Ok((call_scope, outcome))
    }

    pub fn resume(&self, call_scope: &Scope) -> RuntimeResult<Option<Value>> {
        call_scope.clear_yield();
        self.run(call_scope)
    }

    /// `start`, then resume until the body finishes
    pub fn run_to_completion(&self, thread: &ContanThread, args: &[Value]) -> RuntimeResult<Value> {
        let (call_scope, mut outcome) = self.start(thread, args)?;
        loop {
            if let Some(value) = outcome {
                return Ok(value);
            }
            outcome = self.resume(&call_scope)?;
        }
    }

    fn run(&self, call_scope: &Scope) -> RuntimeResult<Option<Value>> {
        match self.decl.body.eval(call_scope)? {
            EvalResult::Suspend => Ok(None),
            EvalResult::Value(_) => match call_scope.take_return_value() {
                Some(value) => value.resolve().map(Some),
                None => Ok(Some(Value::Void)),
            },
        }
    }
}

/* ===================== Classes ===================== */

/// A class with its base resolved
#[derive(Debug)]
pub struct ClassDecl {
    pub name: String,
    pub params: Vec<String>,
    pub initializers: Vec<Arc<Node>>,
    pub methods: HashMap<String, Vec<Arc<FunctionDecl>>>,
    pub base: Option<Arc<ClassDecl>>,
}

impl ClassDecl {
    /// Method overload for `arity`, searching base classes when this class
    /// has none under `name`
    pub fn find_method(&self, name: &str, arity: usize) -> Option<Arc<FunctionDecl>> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(group) = class.methods.get(name) {
                if let Some(decl) = group.iter().find(|decl| decl.arity() == arity) {
                    return Some(decl.clone());
                }
            }
            current = class.base.as_deref();
        }
        None
    }

    /// This class and its bases, most-derived first
    fn lineage(&self) -> Vec<&ClassDecl> {
        let mut chain = vec![self];
        let mut current = self.base.as_deref();
        while let Some(class) = current {
            chain.push(class);
            current = class.base.as_deref();
        }
        chain
    }
}

/// A class bound at its declaration site
#[derive(Debug, Clone)]
pub struct ClassValue {
    decl: Arc<ClassDecl>,
    site: WeakScope,
}

impl ClassValue {
    pub fn new(decl: Arc<ClassDecl>, site: &Scope) -> Self {
        ClassValue {
            decl,
            site: site.downgrade(),
        }
    }

    pub fn decl(&self) -> &ClassDecl {
        &self.decl
    }

    pub fn ptr_eq(&self, other: &ClassValue) -> bool {
        Arc::ptr_eq(&self.decl, &other.decl)
    }

    /// Bind constructor arguments and run every initializer
    ///
    /// Parameters a class shares with its bases are bound once, from the
    /// most-derived declaration. Missing arguments bind to void. Base
    /// initializers run before derived ones.
    pub fn instantiate(&self, thread: &ContanThread, args: &[Value]) -> RuntimeResult<Instance> {
        let site = self.site.upgrade().ok_or_else(|| RuntimeError::NotAClass {
            value: format!("{} (its module was dropped)", self.decl.name),
        })?;
        let scope = site.child_named_on(ScopeKind::Instance, &self.decl.name, thread.clone());

        let lineage = self.decl.lineage();
        for class in &lineage {
            for (index, param) in class.params.iter().enumerate() {
                if scope.has_local(param) {
                    continue;
                }
                let value = match args.get(index) {
                    Some(arg) => arg.create_clone()?,
                    None => Value::Void,
                };
                scope.declare(param, value);
            }
        }

        for class in lineage.iter().rev() {
            for initializer in &class.initializers {
                exec_loop::drive(initializer, &scope)?;
            }
        }
        // A `return` inside an initializer only ends that initializer
        scope.take_return_value();

        Ok(Instance {
            inner: Arc::new(InstanceData {
                class: self.decl.clone(),
                scope,
            }),
        })
    }
}

/* ===================== Instances ===================== */

struct InstanceData {
    class: Arc<ClassDecl>,
    scope: Scope,
}

/// Shared handle to a class instance
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceData>,
}

impl Instance {
    pub fn class(&self) -> &ClassDecl {
        &self.inner.class
    }

    /// Scope holding constructor arguments and initializer state
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Method call frame parented to this instance's scope
    pub fn prepare_method(&self, name: &str, arity: usize) -> RuntimeResult<Invocation> {
        let decl =
            self.inner
                .class
                .find_method(name, arity)
                .ok_or_else(|| RuntimeError::MethodNotFound {
                    receiver: format!("instance of {}", self.inner.class.name),
                    method: name.to_string(),
                    arity,
                })?;
        Ok(Invocation {
            decl,
            parent: self.inner.scope.clone(),
        })
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.inner.class.name)
            .finish()
    }
}
