//! Scopes: variable frames plus per-activation control signals
//!
//! A scope is shared (`Arc`) because the same frame can be reachable from
//! several places at once: an instance scope is the parent of every method
//! call on it, and a completable handle keeps its async scope alive for both
//! the submitting and the awaiting thread. Only the thread that owns a scope
//! evaluates against it at any one time; the mutex exists so the data can be
//! read from elsewhere afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::trace;

use crate::errors::{RuntimeError, RuntimeResult};
use crate::interpreter::natives::NativeRegistry;
use crate::interpreter::types::{NodeId, SuspendState, Value};
use crate::thread::ContanThread;

/* ===================== Slots ===================== */

/// A named, mutable binding
#[derive(Debug, Clone)]
pub struct Slot {
    cell: Arc<Mutex<Value>>,
}

impl Slot {
    pub fn new(value: Value) -> Self {
        Slot {
            cell: Arc::new(Mutex::new(value)),
        }
    }

    /// Copy of the value presently stored
    pub fn get(&self) -> RuntimeResult<Value> {
        self.cell
            .lock()
            .map(|value| value.clone())
            .map_err(|_| RuntimeError::CloneFailure {
                reason: "slot was poisoned by a panicking writer".to_string(),
            })
    }

    /// Replace the stored value
    pub fn set(&self, value: Value) -> RuntimeResult<()> {
        let mut cell = self.cell.lock().map_err(|_| RuntimeError::CloneFailure {
            reason: "slot was poisoned by a panicking writer".to_string(),
        })?;
        *cell = value;
        Ok(())
    }

    pub fn ptr_eq(&self, other: &Slot) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

/* ===================== Signals ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelStatus {
    #[default]
    None,
    Stop,
}

/// What created a scope
///
/// Boundary kinds catch `return`; loop and block scopes forward it upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Instance,
    Async,
    Loop,
    Block,
}

impl ScopeKind {
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            ScopeKind::Module | ScopeKind::Function | ScopeKind::Instance | ScopeKind::Async
        )
    }
}

/* ===================== Scope ===================== */

#[derive(Default)]
struct ScopeState {
    variables: HashMap<String, Slot>,
    return_value: Option<Value>,
    cancel: CancelStatus,
    yielded: bool,
    suspended: HashMap<NodeId, SuspendState>,
}

struct ScopeInner {
    kind: ScopeKind,
    name: Option<String>,
    parent: Option<Scope>,
    thread: ContanThread,
    natives: Arc<NativeRegistry>,
    state: Mutex<ScopeState>,
}

#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

/// Non-owning scope handle, used where a scope would otherwise own itself
#[derive(Clone)]
pub struct WeakScope {
    inner: Weak<ScopeInner>,
}

impl WeakScope {
    pub fn upgrade(&self) -> Option<Scope> {
        self.inner.upgrade().map(|inner| Scope { inner })
    }
}

impl fmt::Debug for WeakScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(scope) => write!(f, "WeakScope({scope:?})"),
            None => write!(f, "WeakScope(<dropped>)"),
        }
    }
}

impl Scope {
    /// Scope with no parent, owned by `thread`
    pub fn root(kind: ScopeKind, thread: ContanThread, natives: Arc<NativeRegistry>) -> Self {
        Scope::build(kind, None, None, thread, natives)
    }

    /// Child scope on the same thread
    pub fn child(&self, kind: ScopeKind) -> Self {
        Scope::build(
            kind,
            None,
            Some(self.clone()),
            self.inner.thread.clone(),
            self.inner.natives.clone(),
        )
    }

    pub fn child_named(&self, kind: ScopeKind, name: Option<&str>) -> Self {
        Scope::build(
            kind,
            name.map(str::to_string),
            Some(self.clone()),
            self.inner.thread.clone(),
            self.inner.natives.clone(),
        )
    }

    /// Child scope whose evaluation belongs to another thread
    pub fn child_on(&self, kind: ScopeKind, thread: ContanThread) -> Self {
        Scope::build(
            kind,
            None,
            Some(self.clone()),
            thread,
            self.inner.natives.clone(),
        )
    }

    /// Named frame (function or class name) evaluated on `thread`
    pub fn child_named_on(&self, kind: ScopeKind, name: &str, thread: ContanThread) -> Self {
        Scope::build(
            kind,
            Some(name.to_string()),
            Some(self.clone()),
            thread,
            self.inner.natives.clone(),
        )
    }

    fn build(
        kind: ScopeKind,
        name: Option<String>,
        parent: Option<Scope>,
        thread: ContanThread,
        natives: Arc<NativeRegistry>,
    ) -> Self {
        Scope {
            inner: Arc::new(ScopeInner {
                kind,
                name,
                parent,
                thread,
                natives,
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScopeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> ScopeKind {
        self.inner.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    pub fn thread(&self) -> &ContanThread {
        &self.inner.thread
    }

    pub fn natives(&self) -> &Arc<NativeRegistry> {
        &self.inner.natives
    }

    pub fn downgrade(&self) -> WeakScope {
        WeakScope {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /* ----- variables ----- */

    /// Create (or replace) a binding in this frame
    pub fn declare(&self, name: &str, value: Value) -> Slot {
        let slot = Slot::new(value);
        self.state()
            .variables
            .insert(name.to_string(), slot.clone());
        slot
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.state().variables.contains_key(name)
    }

    /// Binding in this frame only
    pub fn lookup_local(&self, name: &str) -> Option<Slot> {
        self.state().variables.get(name).cloned()
    }

    /// Binding in this frame or the nearest ancestor that has one
    pub fn lookup(&self, name: &str) -> Option<Slot> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(slot) = scope.lookup_local(name) {
                return Some(slot);
            }
            current = scope.parent();
        }
        None
    }

    /// Value bound to `name`, if any
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lookup(name).and_then(|slot| slot.get().ok())
    }

    /* ----- return ----- */

    /// Nearest scope (self included) that catches `return`
    pub fn boundary(&self) -> Scope {
        let mut current = self;
        loop {
            if current.kind().is_boundary() {
                return current.clone();
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return current.clone(),
            }
        }
    }

    pub fn set_return_value(&self, value: Value) {
        self.boundary().state().return_value = Some(value);
    }

    pub fn has_return_value(&self) -> bool {
        self.boundary().state().return_value.is_some()
    }

    pub fn return_value(&self) -> Option<Value> {
        self.boundary().state().return_value.clone()
    }

    pub fn take_return_value(&self) -> Option<Value> {
        self.boundary().state().return_value.take()
    }

    /* ----- cancel ----- */

    pub fn cancel_status(&self) -> CancelStatus {
        self.state().cancel
    }

    pub fn set_cancel_status(&self, status: CancelStatus) {
        self.state().cancel = status;
    }

    /// True once this activation should stop running further statements
    pub fn should_unwind(&self) -> bool {
        self.cancel_status() == CancelStatus::Stop || self.has_return_value()
    }

    /* ----- suspension ----- */

    /// Set while this scope holds a suspended evaluation
    pub fn is_yielded(&self) -> bool {
        self.state().yielded
    }

    pub fn mark_yielded(&self) {
        self.state().yielded = true;
    }

    /// Called by whoever re-enters a suspended scope
    pub fn clear_yield(&self) {
        self.state().yielded = false;
    }

    pub fn has_suspend_state(&self, node: NodeId) -> bool {
        self.state().suspended.contains_key(&node)
    }

    /// Remove and return the record `node` left on its last pass
    pub fn take_suspend_state(&self, node: NodeId) -> Option<SuspendState> {
        let state = self.state().suspended.remove(&node);
        if let Some(record) = &state {
            trace!(node = %node, progress = ?record.progress, "resuming node");
        }
        state
    }

    pub fn save_suspend_state(&self, node: NodeId, record: SuspendState) {
        trace!(node = %node, progress = ?record.progress, "suspending node");
        let mut state = self.state();
        state.yielded = true;
        state.suspended.insert(node, record);
    }

    /// Number of nodes currently suspended in this scope
    pub fn suspended_nodes(&self) -> usize {
        self.state().suspended.len()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("kind", &self.inner.kind)
            .field("name", &self.inner.name)
            .field("thread", &self.inner.thread.name())
            .finish()
    }
}
