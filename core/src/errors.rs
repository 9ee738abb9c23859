//! Runtime error types
//!
//! Every failure the evaluator can raise is a `RuntimeError` variant. The
//! variants are grouped into a small closed set of kinds (`ErrorKind`) so an
//! embedder can react to the class of failure without matching on messages.

use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Failure classes surfaced to the embedder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No function/method/variable/native matches the requested name and arity
    NotFound,
    /// Left side of an assignment is not a slot
    NotAssignable,
    /// Operator or conversion applied to incompatible values
    TypeMismatch,
    /// A native call failed
    NativeInvocationFailure,
    /// A value could not be duplicated
    CloneFailure,
    /// An `async` target did not evaluate to a thread handle
    InvalidThreadTarget,
    /// Integer division or remainder by zero
    ArithmeticFault,
    /// Work could not be delivered to a worker, or the worker dropped it
    ThreadUnavailable,
    /// An async block awaited its own handle while running
    AwaitCycle,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Function `{name}` not found for {arity} argument(s)")]
    FunctionNotFound { name: String, arity: usize },

    #[error("Method `{method}` not found on {receiver} for {arity} argument(s)")]
    MethodNotFound {
        receiver: String,
        method: String,
        arity: usize,
    },

    #[error("Undefined variable `{name}`")]
    UndefinedVariable { name: String },

    #[error("Value `{value}` is not callable")]
    NotCallable { value: String },

    #[error("Value `{value}` is not a class")]
    NotAClass { value: String },

    #[error("Instance of `{class}` has no field `{field}`")]
    UnknownField { class: String, field: String },

    #[error("Left side of assignment is not assignable (got `{value}`)")]
    NotAssignable { value: String },

    #[error("Operator `{op}` cannot be applied to operands\nLeft : {left}\nRight : {right}")]
    OperandMismatch {
        op: &'static str,
        left: String,
        right: String,
    },

    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("Integer {op} by zero\nLeft : {left}")]
    DivisionByZero { op: &'static str, left: i64 },

    #[error("No native registered under `{path}`")]
    UnknownNative { path: String },

    #[error("Native call `{target}.{method}` failed: {message}")]
    NativeInvocation {
        target: String,
        method: String,
        message: String,
    },

    #[error("Value could not be cloned: {reason}")]
    CloneFailure { reason: String },

    #[error("Async target `{value}` is not a thread")]
    InvalidThreadTarget { value: String },

    #[error("Thread `{thread}` is not accepting work")]
    ThreadUnavailable { thread: String },

    #[error("Async block `{handle}` awaited itself while running")]
    SelfAwait { handle: String },
}

impl RuntimeError {
    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::FunctionNotFound { .. }
            | RuntimeError::MethodNotFound { .. }
            | RuntimeError::UndefinedVariable { .. }
            | RuntimeError::UnknownField { .. }
            | RuntimeError::UnknownNative { .. } => ErrorKind::NotFound,
            RuntimeError::NotAssignable { .. } => ErrorKind::NotAssignable,
            RuntimeError::NotCallable { .. }
            | RuntimeError::NotAClass { .. }
            | RuntimeError::OperandMismatch { .. }
            | RuntimeError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            RuntimeError::DivisionByZero { .. } => ErrorKind::ArithmeticFault,
            RuntimeError::NativeInvocation { .. } => ErrorKind::NativeInvocationFailure,
            RuntimeError::CloneFailure { .. } => ErrorKind::CloneFailure,
            RuntimeError::InvalidThreadTarget { .. } => ErrorKind::InvalidThreadTarget,
            RuntimeError::ThreadUnavailable { .. } => ErrorKind::ThreadUnavailable,
            RuntimeError::SelfAwait { .. } => ErrorKind::AwaitCycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_group_lookup_failures() {
        let err = RuntimeError::FunctionNotFound {
            name: "add".to_string(),
            arity: 3,
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = RuntimeError::UndefinedVariable {
            name: "x".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = RuntimeError::UnknownNative {
            path: "no.Such".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_operand_mismatch_message_names_both_operands() {
        let err = RuntimeError::OperandMismatch {
            op: "/",
            left: "10".to_string(),
            right: "hello".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Left : 10"));
        assert!(message.contains("Right : hello"));
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }
}
