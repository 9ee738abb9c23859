//! Statement handlers
//!
//! Declarations, blocks, branching, loops and the control signals
//! (`stop`, `return`, `yield`).

use super::exec_loop::{eval_operands, Operand};
use super::scope::{CancelStatus, Scope, ScopeKind};
use super::types::{EvalResult, Node, NodeId, Progress, SuspendState, Value};
use crate::errors::RuntimeResult;

/// `data name = init`: declare a fresh binding in the current frame
pub fn execute_data(
    id: NodeId,
    name: &str,
    init: Option<&Node>,
    scope: &Scope,
) -> RuntimeResult<EvalResult> {
    let value = match init {
        Some(init) => {
            let resumed = scope.take_suspend_state(id);
            let Some(values) = eval_operands(id, &[Operand::Value(init)], scope, resumed)? else {
                return Ok(EvalResult::Suspend);
            };
            first(values).create_clone()?
        }
        None => Value::Void,
    };

    scope.declare(name, value.clone());
    Ok(EvalResult::Value(value))
}

/// Run statements in order; the block's value is the last statement's
///
/// Stops early once the frame is cancelled or a `return` is pending.
pub fn execute_block(id: NodeId, body: &[Node], scope: &Scope) -> RuntimeResult<EvalResult> {
    let start = match scope.take_suspend_state(id) {
        Some(SuspendState {
            progress: Progress::Operand(index),
            ..
        }) => index,
        _ => 0,
    };

    let mut last = Value::Void;
    for (index, statement) in body.iter().enumerate().skip(start) {
        match statement.eval(scope)? {
            EvalResult::Value(value) => last = value,
            EvalResult::Suspend => {
                scope.save_suspend_state(id, SuspendState::new(Progress::Operand(index), vec![]));
                return Ok(EvalResult::Suspend);
            }
        }
        if scope.should_unwind() {
            break;
        }
    }

    Ok(EvalResult::Value(last.resolve()?))
}

pub fn execute_if(
    id: NodeId,
    test: &Node,
    then_s: &Node,
    else_s: Option<&Node>,
    scope: &Scope,
) -> RuntimeResult<EvalResult> {
    let taken = match scope.take_suspend_state(id) {
        Some(SuspendState {
            progress: Progress::Branch(taken),
            ..
        }) => taken,
        resumed => {
            let Some(values) = eval_operands(id, &[Operand::Value(test)], scope, resumed)? else {
                return Ok(EvalResult::Suspend);
            };
            first(values).is_truthy()
        }
    };

    let branch = if taken { Some(then_s) } else { else_s };
    let Some(branch) = branch else {
        return Ok(EvalResult::Value(Value::Void));
    };

    match branch.eval(scope)? {
        EvalResult::Suspend => {
            scope.save_suspend_state(id, SuspendState::new(Progress::Branch(taken), vec![]));
            Ok(EvalResult::Suspend)
        }
        EvalResult::Value(value) => Ok(EvalResult::Value(value.resolve()?)),
    }
}

/// `repeat [count] { body }`
///
/// The body runs in one loop scope that lives as long as the loop does, so
/// its locals survive both iterations and suspensions. A suspended loop
/// saves that scope plus the iteration it stopped in; resuming continues
/// that iteration and never replays finished ones.
pub fn execute_repeat(
    id: NodeId,
    count: Option<&Node>,
    body: &Node,
    label: Option<&str>,
    scope: &Scope,
) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);

    if let Some(SuspendState {
        progress: Progress::Iteration(iteration),
        saved,
        resumable: Some(body_scope),
    }) = resumed
    {
        let limit = saved.first().and_then(Value::as_i64);
        body_scope.clear_yield();
        return run_iterations(id, body, scope, body_scope, iteration, limit);
    }

    let limit = match count {
        Some(count) => {
            let Some(values) = eval_operands(id, &[Operand::Value(count)], scope, resumed)? else {
                return Ok(EvalResult::Suspend);
            };
            Some(first(values).to_repeat_count()?)
        }
        None => None,
    };

    let body_scope = scope.child_named(ScopeKind::Loop, label);
    run_iterations(id, body, scope, body_scope, 0, limit)
}

fn run_iterations(
    id: NodeId,
    body: &Node,
    scope: &Scope,
    body_scope: Scope,
    start: i64,
    limit: Option<i64>,
) -> RuntimeResult<EvalResult> {
    let mut iteration = start;
    while limit.map_or(true, |limit| iteration < limit) {
        if let EvalResult::Suspend = body.eval(&body_scope)? {
            let saved = limit.map(Value::Integer).into_iter().collect();
            scope.save_suspend_state(
                id,
                SuspendState::with_scope(Progress::Iteration(iteration), saved, body_scope),
            );
            return Ok(EvalResult::Suspend);
        }

        if body_scope.cancel_status() == CancelStatus::Stop || body_scope.should_unwind() {
            break;
        }
        iteration += 1;
    }

    Ok(EvalResult::Value(Value::Void))
}

/// `stop`: cancel the current frame
pub fn execute_stop(scope: &Scope) -> RuntimeResult<EvalResult> {
    scope.set_cancel_status(CancelStatus::Stop);
    Ok(EvalResult::Value(Value::Void))
}

pub fn execute_return(id: NodeId, value: Option<&Node>, scope: &Scope) -> RuntimeResult<EvalResult> {
    let value = match value {
        Some(value) => {
            let resumed = scope.take_suspend_state(id);
            let Some(values) = eval_operands(id, &[Operand::Value(value)], scope, resumed)? else {
                return Ok(EvalResult::Suspend);
            };
            first(values)
        }
        None => Value::Void,
    };

    scope.set_return_value(value.clone());
    Ok(EvalResult::Value(value))
}

/// `yield`: suspend once; the next pass continues past it
pub fn execute_yield(id: NodeId, scope: &Scope) -> RuntimeResult<EvalResult> {
    if scope.take_suspend_state(id).is_some() {
        return Ok(EvalResult::Value(Value::Void));
    }
    scope.save_suspend_state(id, SuspendState::new(Progress::Yielded, vec![]));
    Ok(EvalResult::Suspend)
}

/// Single result of a one-operand evaluation
pub(super) fn first(values: Vec<Value>) -> Value {
    values.into_iter().next().unwrap_or(Value::Void)
}
