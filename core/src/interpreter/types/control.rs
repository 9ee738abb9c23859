//! Evaluation outcome and suspend records

use super::phase::Progress;
use super::values::Value;
use crate::interpreter::scope::Scope;

/// Result of evaluating one node
///
/// Suspension is a control-flow outcome, not a failure; failures travel in
/// the surrounding `RuntimeResult`.
#[derive(Debug, Clone)]
pub enum EvalResult {
    /// Node finished with a value
    Value(Value),
    /// Node (or a descendant) suspended; evaluate it again to resume
    Suspend,
}

impl EvalResult {
    pub fn is_suspend(&self) -> bool {
        matches!(self, EvalResult::Suspend)
    }
}

/// What a suspended node needs to pick up where it left off
#[derive(Debug, Clone)]
pub struct SuspendState {
    pub progress: Progress,
    /// Results of children that already completed, in evaluation order
    pub saved: Vec<Value>,
    /// Scope that must be reused on resume (loop bodies, invoked bodies)
    pub resumable: Option<Scope>,
}

impl SuspendState {
    pub fn new(progress: Progress, saved: Vec<Value>) -> Self {
        SuspendState {
            progress,
            saved,
            resumable: None,
        }
    }

    pub fn with_scope(progress: Progress, saved: Vec<Value>, scope: Scope) -> Self {
        SuspendState {
            progress,
            saved,
            resumable: Some(scope),
        }
    }
}
