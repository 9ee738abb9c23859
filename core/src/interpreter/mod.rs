//! # Resumable tree evaluator
//!
//! ## Core Principles
//!
//! 1. **No native coroutine stack**: a suspended evaluation is resumed by
//!    walking the same tree again against the same scope
//! 2. **Suspend state keyed by node identity**: every composite node records
//!    its own progress in the scope it runs in
//! 3. **Suspension is not failure**: `EvalResult::Suspend` travels beside
//!    errors, never through them
//! 4. **Threads by queue only**: work reaches another logical thread solely
//!    through its FIFO queue or a completable handle

pub mod exec_loop;
pub mod expressions;
pub mod host;
pub mod invoke;
pub mod natives;
pub mod scope;
pub mod statements;
pub mod tasks;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use exec_loop::{drive, Coroutine, Resumption};
pub use invoke::{ClassDecl, ClassValue, FunctionValue, Instance, Invocation};
pub use natives::{HostObject, NativeHandle, NativeObject, NativeRegistry};
pub use scope::{CancelStatus, Scope, ScopeKind, Slot};
pub use tasks::{Completable, CompletionStatus};
pub use types::{BinaryOp, EvalResult, FunctionDecl, Node, NodeId, NodeKind, UnaryOp, Value};
