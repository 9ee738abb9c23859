//! Core evaluation loop
//!
//! `Node::eval` is the single entry point every node goes through. It
//! dispatches to the statement and expression handlers, which all follow the
//! same resume contract:
//!
//! 1. On entry, take this node's suspend record from the scope (taking it
//!    removes it, so a clean completion leaves nothing behind).
//! 2. Skip straight to the recorded progress, reusing saved child results.
//! 3. If a child suspends, save progress plus finished results under this
//!    node's id and return `EvalResult::Suspend` without further effects.
//!
//! ## Function Organization
//! 1. `drive()` / `Coroutine` - Top-level drivers (evaluate until complete)
//! 2. `Node::eval()` - Dispatch
//! 3. `eval_operands()` - Shared left-to-right operand evaluation

use std::sync::Arc;

use super::expressions;
use super::scope::Scope;
use super::statements;
use super::types::{EvalResult, Node, NodeId, NodeKind, Progress, SuspendState, Value};
use crate::errors::RuntimeResult;

/* ===================== Drivers ===================== */

/// Evaluate `node` against `scope`, resuming until it completes
///
/// The completion value is a pending `return` value if there is one,
/// otherwise the value the node itself produced.
pub fn drive(node: &Node, scope: &Scope) -> RuntimeResult<Value> {
    loop {
        scope.clear_yield();
        match node.eval(scope)? {
            EvalResult::Suspend => continue,
            EvalResult::Value(value) => return completion_value(scope, value),
        }
    }
}

/// Value a finished tree hands back to whoever drove it
pub fn completion_value(scope: &Scope, value: Value) -> RuntimeResult<Value> {
    match scope.take_return_value() {
        Some(returned) => returned.resolve(),
        None => value.resolve(),
    }
}

/// Outcome of one `Coroutine::resume`
#[derive(Debug, Clone, PartialEq)]
pub enum Resumption {
    /// Yielded; call `resume` again to continue
    Suspended,
    Complete(Value),
}

/// Step-by-step driver for a tree that may yield
#[derive(Debug)]
pub struct Coroutine {
    node: Arc<Node>,
    scope: Scope,
    result: Option<Value>,
}

impl Coroutine {
    pub fn new(node: Arc<Node>, scope: Scope) -> Self {
        Coroutine {
            node,
            scope,
            result: None,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Run until the next yield or until the tree completes
    ///
    /// Resuming a finished coroutine returns its result again without
    /// re-evaluating anything.
    pub fn resume(&mut self) -> RuntimeResult<Resumption> {
        if let Some(value) = &self.result {
            return Ok(Resumption::Complete(value.clone()));
        }

        self.scope.clear_yield();
        match self.node.eval(&self.scope)? {
            EvalResult::Suspend => Ok(Resumption::Suspended),
            EvalResult::Value(value) => {
                let value = completion_value(&self.scope, value)?;
                self.result = Some(value.clone());
                Ok(Resumption::Complete(value))
            }
        }
    }

    pub fn run_to_completion(mut self) -> RuntimeResult<Value> {
        loop {
            if let Resumption::Complete(value) = self.resume()? {
                return Ok(value);
            }
        }
    }
}

/* ===================== Dispatch ===================== */

impl Node {
    /// Evaluate this node against `scope`
    ///
    /// Re-evaluating a node that previously returned `Suspend`, against the
    /// same scope, resumes it.
    pub fn eval(&self, scope: &Scope) -> RuntimeResult<EvalResult> {
        let id = self.id;
        match &self.kind {
            NodeKind::Int { v } => Ok(EvalResult::Value(Value::Integer(*v))),
            NodeKind::Float { v } => Ok(EvalResult::Value(Value::Float(*v))),
            NodeKind::Str { v } => Ok(EvalResult::Value(Value::Str(v.clone()))),
            NodeKind::Bool { v } => Ok(EvalResult::Value(Value::Bool(*v))),
            NodeKind::Null => Ok(EvalResult::Value(Value::Null)),
            NodeKind::Void => Ok(EvalResult::Value(Value::Void)),

            NodeKind::Var { name } => expressions::eval_var(name, scope),
            NodeKind::Assign { target, value } => {
                expressions::eval_assign(id, target, value, scope)
            }
            NodeKind::Binary { op, lhs, rhs } => {
                expressions::eval_binary(id, *op, lhs, rhs, scope)
            }
            NodeKind::Unary { op, operand } => expressions::eval_unary(id, *op, operand, scope),
            NodeKind::Call { callee, args } => expressions::eval_call(id, callee, args, scope),
            NodeKind::Method {
                receiver,
                name,
                args,
            } => expressions::eval_method(id, receiver, name, args, scope),
            NodeKind::Field { receiver, name } => {
                expressions::eval_field(id, receiver, name, scope)
            }
            NodeKind::New { class, args } => expressions::eval_new(id, class, args, scope),
            NodeKind::Lambda { params, body } => expressions::eval_lambda(params, body, scope),
            NodeKind::Async { thread, body } => expressions::eval_async(id, thread, body, scope),
            NodeKind::Import { path } => expressions::eval_import(path, scope),

            NodeKind::Data { name, init } => {
                statements::execute_data(id, name, init.as_deref(), scope)
            }
            NodeKind::Block { body } => statements::execute_block(id, body, scope),
            NodeKind::If {
                test,
                then_s,
                else_s,
            } => statements::execute_if(id, test, then_s, else_s.as_deref(), scope),
            NodeKind::Repeat { count, body, label } => statements::execute_repeat(
                id,
                count.as_deref(),
                body,
                label.as_deref(),
                scope,
            ),
            NodeKind::Stop => statements::execute_stop(scope),
            NodeKind::Return { value } => statements::execute_return(id, value.as_deref(), scope),
            NodeKind::Yield => statements::execute_yield(id, scope),
        }
    }
}

/* ===================== Operands ===================== */

/// How an operand's result is kept
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    /// Snapshot of the value, read through any slot reference
    Value(&'a Node),
    /// Keep the slot reference itself (assignment targets)
    Place(&'a Node),
}

/// Evaluate `operands` left to right on behalf of `owner`
///
/// Returns `None` if one of them suspended; progress and the results of
/// operands that already finished are then saved under `owner`, and the
/// next call with the taken record picks up at the unfinished operand.
pub fn eval_operands(
    owner: NodeId,
    operands: &[Operand<'_>],
    scope: &Scope,
    resumed: Option<SuspendState>,
) -> RuntimeResult<Option<Vec<Value>>> {
    let (start, mut values) = match resumed {
        Some(SuspendState {
            progress: Progress::Operand(index),
            saved,
            ..
        }) => (index, saved),
        _ => (0, Vec::with_capacity(operands.len())),
    };

    for (index, operand) in operands.iter().enumerate().skip(start) {
        let (node, keep_place) = match operand {
            Operand::Value(node) => (node, false),
            Operand::Place(node) => (node, true),
        };

        match node.eval(scope)? {
            EvalResult::Value(value) if keep_place => values.push(value),
            EvalResult::Value(value) => values.push(value.resolve()?),
            EvalResult::Suspend => {
                scope.save_suspend_state(
                    owner,
                    SuspendState::new(Progress::Operand(index), values),
                );
                return Ok(None);
            }
        }
    }

    Ok(Some(values))
}
