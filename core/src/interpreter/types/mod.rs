//! Type definitions for the interpreter
//!
//! - Tree nodes (`Node`, `NodeKind`, `FunctionDecl`)
//! - Runtime values (`Value`)
//! - Evaluation outcome and suspend records (`EvalResult`, `SuspendState`)
//! - Progress markers (`Progress`)

pub mod ast;
pub mod control;
pub mod phase;
pub mod values;

pub use ast::{BinaryOp, FunctionDecl, Node, NodeId, NodeKind, UnaryOp};
pub use control::{EvalResult, SuspendState};
pub use phase::Progress;
pub use values::Value;
