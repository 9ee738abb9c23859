//! Logical threads
//!
//! A `ContanThread` is one dedicated OS thread serving one FIFO task queue.
//! Submitting to the queue is the only way to run work on that thread, so
//! everything submitted to one thread executes strictly in submission order.
//!
//! Two submission primitives:
//! - `run_and_wait`: block the caller until the task finishes. Short-circuits
//!   when the caller already is the target thread (a single worker waiting on
//!   its own queue would never wake up).
//! - `schedule`: enqueue and return immediately.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{RuntimeError, RuntimeResult};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// State shared between a thread handle and its worker
#[derive(Default)]
struct WorkerState {
    /// Tasks submitted but not yet picked up
    pending: AtomicUsize,
    /// Set when shutdown gave up waiting; queued tasks are dropped unrun
    abandon: AtomicBool,
    finished: Mutex<bool>,
    finished_signal: Condvar,
}

impl WorkerState {
    fn mark_finished(&self) {
        let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        *finished = true;
        self.finished_signal.notify_all();
    }

    /// Wait until the worker loop exits; false if `timeout` elapsed first
    fn wait_finished(&self, timeout: Duration) -> bool {
        let finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        let (finished, _) = self
            .finished_signal
            .wait_timeout_while(finished, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *finished
    }
}

/// Marks the worker finished even if a task panics and unwinds the loop
struct FinishGuard(Arc<WorkerState>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}

struct ThreadInner {
    id: Uuid,
    name: String,
    os_id: std::thread::ThreadId,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Arc<WorkerState>,
}

/// Handle to a logical thread; cheap to clone, compared by identity
#[derive(Clone)]
pub struct ContanThread {
    inner: Arc<ThreadInner>,
}

/// Outcome of draining one thread at shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadShutdown {
    pub name: String,
    /// Worker exited within the grace period
    pub drained: bool,
    /// Tasks still queued when the grace period ran out
    pub abandoned: usize,
}

impl ContanThread {
    /// Start a worker named `name`
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel::<Task>();
        let state = Arc::new(WorkerState::default());

        let worker_state = state.clone();
        let worker = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(receiver, worker_state))?;

        let id = Uuid::new_v4();
        debug!(thread = %name, id = %id, "started logical thread");

        Ok(ContanThread {
            inner: Arc::new(ThreadInner {
                id,
                name,
                os_id: worker.thread().id(),
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
                state,
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True when called from this thread's worker
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.inner.os_id
    }

    pub fn ptr_eq(&self, other: &ContanThread) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Tasks waiting in the queue
    pub fn pending_tasks(&self) -> usize {
        self.inner.state.pending.load(Ordering::SeqCst)
    }

    pub fn is_accepting(&self) -> bool {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn unavailable(&self) -> RuntimeError {
        RuntimeError::ThreadUnavailable {
            thread: self.inner.name.clone(),
        }
    }

    /// Enqueue `task` without waiting for it
    pub fn schedule<F>(&self, task: F) -> RuntimeResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(self.unavailable());
        };

        self.inner.state.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(Box::new(task)).is_err() {
            self.inner.state.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(self.unavailable());
        }
        Ok(())
    }

    /// Run `task` on this thread and block until it returns
    ///
    /// Runs in place when the caller already is this thread.
    pub fn run_and_wait<T, F>(&self, task: F) -> RuntimeResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> RuntimeResult<T> + Send + 'static,
    {
        if self.is_current() {
            return task();
        }

        let (result_tx, result_rx) = oneshot::channel();
        self.schedule(move || {
            // Receiver only disappears if the waiting thread itself went away
            let _ = result_tx.send(task());
        })?;

        result_rx.blocking_recv().map_err(|_| self.unavailable())?
    }

    /// Stop accepting work and wait up to `timeout` for the queue to drain
    ///
    /// Tasks still queued after the timeout are dropped without running;
    /// the task in flight is never interrupted.
    pub fn shutdown_with_await(&self, timeout: Duration) -> ThreadShutdown {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let drained = !self.is_current() && self.inner.state.wait_finished(timeout);
        let abandoned = if drained {
            if let Some(worker) = self
                .inner
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                let _ = worker.join();
            }
            0
        } else {
            self.inner.state.abandon.store(true, Ordering::SeqCst);
            let abandoned = self.pending_tasks();
            warn!(
                thread = %self.inner.name,
                abandoned,
                "shutdown grace period elapsed; dropping queued tasks"
            );
            abandoned
        };

        debug!(thread = %self.inner.name, drained, "logical thread shut down");
        ThreadShutdown {
            name: self.inner.name.clone(),
            drained,
            abandoned,
        }
    }
}

impl fmt::Debug for ContanThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContanThread")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .finish()
    }
}

fn run_worker(mut receiver: mpsc::UnboundedReceiver<Task>, state: Arc<WorkerState>) {
    let _guard = FinishGuard(state.clone());

    while let Some(task) = receiver.blocking_recv() {
        state.pending.fetch_sub(1, Ordering::SeqCst);
        if state.abandon.load(Ordering::SeqCst) {
            continue;
        }
        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    #[test]
    fn test_tasks_run_in_submission_order() {
        let thread = ContanThread::spawn("fifo").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let order = order.clone();
            thread.schedule(move || order.lock().unwrap().push(i)).unwrap();
        }

        let seen = thread
            .run_and_wait({
                let order = order.clone();
                move || Ok(order.lock().unwrap().clone())
            })
            .unwrap();

        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_and_wait_returns_on_worker() {
        let thread = ContanThread::spawn("worker").unwrap();
        let probe = thread.clone();

        let ran_on_worker = thread.run_and_wait(move || Ok(probe.is_current())).unwrap();

        assert!(ran_on_worker);
        assert!(!thread.is_current());
    }

    #[test]
    fn test_run_and_wait_from_own_thread_does_not_deadlock() {
        let thread = ContanThread::spawn("reentrant").unwrap();
        let inner = thread.clone();

        let value = thread
            .run_and_wait(move || inner.run_and_wait(|| Ok(42)))
            .unwrap();

        assert_eq!(value, 42);
    }

    #[test]
    fn test_run_and_wait_propagates_failure() {
        let thread = ContanThread::spawn("failing").unwrap();

        let err = thread
            .run_and_wait(|| -> RuntimeResult<()> {
                Err(RuntimeError::UndefinedVariable {
                    name: "ghost".to_string(),
                })
            })
            .unwrap_err();

        assert_eq!(
            err,
            RuntimeError::UndefinedVariable {
                name: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let thread = ContanThread::spawn("drain").unwrap();
        let (tx, rx) = std_mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            thread.schedule(move || tx.send(i).unwrap()).unwrap();
        }

        let report = thread.shutdown_with_await(Duration::from_secs(5));

        assert!(report.drained);
        assert_eq!(report.abandoned, 0);
        assert_eq!(rx.try_iter().count(), 5);
        assert!(thread.schedule(|| {}).is_err());
    }

    #[test]
    fn test_shutdown_timeout_abandons_queued_tasks() {
        let thread = ContanThread::spawn("slow").unwrap();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let (started_tx, started_rx) = std_mpsc::channel::<()>();
        let (ran_tx, ran_rx) = std_mpsc::channel();

        thread
            .schedule(move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            })
            .unwrap();
        started_rx.recv().unwrap();
        for i in 0..3 {
            let ran_tx = ran_tx.clone();
            thread.schedule(move || ran_tx.send(i).unwrap()).unwrap();
        }

        let report = thread.shutdown_with_await(Duration::from_millis(50));
        assert!(!report.drained);
        assert_eq!(report.abandoned, 3);

        release_tx.send(()).unwrap();
        drop(ran_tx);
        assert_eq!(ran_rx.iter().count(), 0);
    }
}
