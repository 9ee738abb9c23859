//! Completable handles
//!
//! An `async` block's body and scope, plus where its evaluation has got to.
//! Every pass over the body happens on the target thread: either in place
//! (the caller already is that thread) or through its queue. Because that
//! queue is FIFO, an awaiter on another thread simply queues one more pass
//! behind whatever is already scheduled and waits for it.
//!
//! ```text
//! PENDING -> RUNNING -> COMPLETE
//!               |  ^
//!               v  |
//!            SUSPENDED
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

use super::exec_loop::completion_value;
use super::scope::Scope;
use super::types::{EvalResult, Node, Value};
use crate::errors::{RuntimeError, RuntimeResult};
use crate::thread::ContanThread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Pending,
    Running,
    Suspended,
    Complete,
}

#[derive(Debug)]
enum TaskState {
    Pending,
    Running,
    Suspended,
    /// Final value, or the failure every awaiter receives
    Complete(RuntimeResult<Value>),
}

impl TaskState {
    fn status(&self) -> CompletionStatus {
        match self {
            TaskState::Pending => CompletionStatus::Pending,
            TaskState::Running => CompletionStatus::Running,
            TaskState::Suspended => CompletionStatus::Suspended,
            TaskState::Complete(_) => CompletionStatus::Complete,
        }
    }
}

struct CompletableInner {
    id: Uuid,
    scope: Scope,
    body: Arc<Node>,
    state: Mutex<TaskState>,
}

/// Handle returned by an `async` block
#[derive(Clone)]
pub struct Completable {
    inner: Arc<CompletableInner>,
}

impl Completable {
    /// `scope` must be owned by the thread meant to run `body`
    pub fn new(scope: Scope, body: Arc<Node>) -> Self {
        Completable {
            inner: Arc::new(CompletableInner {
                id: Uuid::new_v4(),
                scope,
                body,
                state: Mutex::new(TaskState::Pending),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &Completable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn status(&self) -> CompletionStatus {
        self.state().status()
    }

    /// Thread the body runs on
    pub fn target(&self) -> &ContanThread {
        self.inner.scope.thread()
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Run one pass over the body, resuming it if it had suspended
    ///
    /// A no-op unless the handle is pending or suspended.
    pub fn drive(&self) -> CompletionStatus {
        {
            let mut state = self.state();
            if !matches!(*state, TaskState::Pending | TaskState::Suspended) {
                return state.status();
            }
            *state = TaskState::Running;
        }

        let scope = &self.inner.scope;
        scope.clear_yield();
        let next = match self.inner.body.eval(scope) {
            Ok(EvalResult::Suspend) => TaskState::Suspended,
            Ok(EvalResult::Value(value)) => TaskState::Complete(completion_value(scope, value)),
            Err(err) => TaskState::Complete(Err(err)),
        };

        let status = next.status();
        debug!(handle = %self.inner.id, status = ?status, "async pass finished");
        *self.state() = next;
        status
    }

    /// Queue the first pass on the target thread
    pub fn submit(&self) -> RuntimeResult<()> {
        let handle = self.clone();
        debug!(handle = %self.inner.id, thread = %self.target().name(), "submitting async block");
        self.target().schedule(move || {
            handle.drive();
        })
    }

    /// Block until the body completes and return its value
    ///
    /// A completed handle answers immediately. On the target thread the
    /// body is resumed in place; from anywhere else each remaining pass is
    /// queued on the target and waited for.
    pub fn await_value(&self) -> RuntimeResult<Value> {
        loop {
            let status = match &*self.state() {
                TaskState::Complete(result) => return result.clone(),
                other => other.status(),
            };

            let target = self.target();
            if target.is_current() {
                if status == CompletionStatus::Running {
                    return Err(RuntimeError::SelfAwait {
                        handle: self.inner.id.to_string(),
                    });
                }
                self.drive();
            } else {
                let handle = self.clone();
                target.run_and_wait(move || Ok(handle.drive()))?;
            }
        }
    }
}

impl fmt::Debug for Completable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completable")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}
