//! Expression evaluation
//!
//! Operators, variable and field access, calls, instantiation, closures,
//! native imports and `async` blocks.

use std::sync::Arc;

use super::exec_loop::{eval_operands, Operand};
use super::invoke::{FunctionValue, Invocation};
use super::scope::{Scope, ScopeKind};
use super::statements::first;
use super::tasks::Completable;
use super::types::{BinaryOp, EvalResult, Node, NodeId, Progress, SuspendState, UnaryOp, Value};
use crate::errors::{RuntimeError, RuntimeResult};

/* ===================== Variables ===================== */

/// Variables evaluate to their slot so assignment can write through them
pub fn eval_var(name: &str, scope: &Scope) -> RuntimeResult<EvalResult> {
    scope
        .lookup(name)
        .map(|slot| EvalResult::Value(Value::Reference(slot)))
        .ok_or_else(|| RuntimeError::UndefinedVariable {
            name: name.to_string(),
        })
}

/// Store a clone of the right side into the left-side slot
///
/// The slot is only written once the right side has fully evaluated.
pub fn eval_assign(
    id: NodeId,
    target: &Node,
    value: &Node,
    scope: &Scope,
) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);
    let operands = [Operand::Place(target), Operand::Value(value)];
    let Some(values) = eval_operands(id, &operands, scope, resumed)? else {
        return Ok(EvalResult::Suspend);
    };

    let [target, value]: [Value; 2] = values.try_into().map_err(|_| operand_count("="))?;
    let Value::Reference(slot) = target else {
        return Err(RuntimeError::NotAssignable {
            value: target.to_string(),
        });
    };

    let stored = value.create_clone()?;
    slot.set(stored.clone())?;
    Ok(EvalResult::Value(stored))
}

/* ===================== Operators ===================== */

pub fn eval_binary(
    id: NodeId,
    op: BinaryOp,
    lhs: &Node,
    rhs: &Node,
    scope: &Scope,
) -> RuntimeResult<EvalResult> {
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        return eval_logical(id, op, lhs, rhs, scope);
    }

    let resumed = scope.take_suspend_state(id);
    let operands = [Operand::Value(lhs), Operand::Value(rhs)];
    let Some(values) = eval_operands(id, &operands, scope, resumed)? else {
        return Ok(EvalResult::Suspend);
    };

    let [left, right]: [Value; 2] = values.try_into().map_err(|_| operand_count(op.symbol()))?;
    apply_binary(op, &left, &right).map(EvalResult::Value)
}

/// `&&` and `||` skip the right side when the left decides
fn eval_logical(
    id: NodeId,
    op: BinaryOp,
    lhs: &Node,
    rhs: &Node,
    scope: &Scope,
) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);
    let resumed_right = matches!(
        resumed,
        Some(SuspendState {
            progress: Progress::Operand(1),
            ..
        })
    );

    if !resumed_right {
        let Some(values) = eval_operands(id, &[Operand::Value(lhs)], scope, resumed)? else {
            return Ok(EvalResult::Suspend);
        };
        let left = first(values).is_truthy();
        match (op, left) {
            (BinaryOp::And, false) => return Ok(EvalResult::Value(Value::Bool(false))),
            (BinaryOp::Or, true) => return Ok(EvalResult::Value(Value::Bool(true))),
            _ => {}
        }
    }

    match rhs.eval(scope)? {
        EvalResult::Suspend => {
            scope.save_suspend_state(id, SuspendState::new(Progress::Operand(1), vec![]));
            Ok(EvalResult::Suspend)
        }
        EvalResult::Value(right) => Ok(EvalResult::Value(Value::Bool(right.is_truthy()))),
    }
}

/// Apply a non-logical binary operator to two finished operands
///
/// Numeric operators promote to float if either side is a float. `+`
/// concatenates when either side is a string. Integer arithmetic wraps.
pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> RuntimeResult<Value> {
    let mismatch = || RuntimeError::OperandMismatch {
        op: op.symbol(),
        left: left.to_string(),
        right: right.to_string(),
    };

    match op {
        BinaryOp::Add if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) => {
            Ok(Value::Str(format!("{left}{right}")))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            match (left, right) {
                (Value::Integer(a), Value::Integer(b)) => integer_arithmetic(op, *a, *b),
                (a, b) if a.is_numeric() && b.is_numeric() => {
                    let (a, b) = (a.as_f64().ok_or_else(mismatch)?, b.as_f64().ok_or_else(mismatch)?);
                    Ok(Value::Float(float_arithmetic(op, a, b)))
                }
                _ => Err(mismatch()),
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                (a, b) if a.is_numeric() && b.is_numeric() => {
                    a.as_f64().partial_cmp(&b.as_f64())
                }
                _ => return Err(mismatch()),
            };
            let Some(ordering) = ordering else {
                // NaN compares false with everything
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(match op {
            BinaryOp::And => left.is_truthy() && right.is_truthy(),
            _ => left.is_truthy() || right.is_truthy(),
        })),
    }
}

fn integer_arithmetic(op: BinaryOp, a: i64, b: i64) -> RuntimeResult<Value> {
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b == 0 => {
            return Err(RuntimeError::DivisionByZero {
                op: "division",
                left: a,
            })
        }
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Rem if b == 0 => {
            return Err(RuntimeError::DivisionByZero {
                op: "remainder",
                left: a,
            })
        }
        _ => a.wrapping_rem(b),
    };
    Ok(Value::Integer(value))
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a % b,
    }
}

/// `1 == 1.0`; everything else compares by kind
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
            (*a as f64) == *b
        }
        _ => left == right,
    }
}

pub fn eval_unary(id: NodeId, op: UnaryOp, operand: &Node, scope: &Scope) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);
    let Some(values) = eval_operands(id, &[Operand::Value(operand)], scope, resumed)? else {
        return Ok(EvalResult::Suspend);
    };

    let value = first(values);
    let result = match (op, &value) {
        (UnaryOp::Not, v) => Value::Bool(!v.is_truthy()),
        (UnaryOp::Neg, Value::Integer(i)) => Value::Integer(i.wrapping_neg()),
        (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
        (UnaryOp::Neg, other) => {
            return Err(RuntimeError::TypeMismatch {
                message: format!("cannot negate {} `{other}`", other.kind_name()),
            })
        }
    };
    Ok(EvalResult::Value(result))
}

/* ===================== Calls ===================== */

/// `callee(args...)`
pub fn eval_call(id: NodeId, callee: &Node, args: &[Node], scope: &Scope) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);
    if let Some(SuspendState {
        progress: Progress::Invoking,
        saved,
        resumable: Some(call_scope),
    }) = resumed
    {
        let invocation = prepare_call(&saved)?;
        let outcome = invocation.resume(&call_scope)?;
        return Ok(settle(id, scope, outcome, saved, call_scope));
    }

    let operands: Vec<_> = std::iter::once(Operand::Value(callee))
        .chain(args.iter().map(Operand::Value))
        .collect();
    let Some(values) = eval_operands(id, &operands, scope, resumed)? else {
        return Ok(EvalResult::Suspend);
    };

    let invocation = prepare_call(&values)?;
    let (call_scope, outcome) = invocation.start(scope.thread(), &values[1..])?;
    Ok(settle(id, scope, outcome, values, call_scope))
}

/// Pick the overload for `[callee, args...]`
fn prepare_call(values: &[Value]) -> RuntimeResult<Invocation> {
    match values.split_first() {
        Some((Value::Function(function), args)) => function.prepare(args.len()),
        Some((other, _)) => Err(RuntimeError::NotCallable {
            value: other.to_string(),
        }),
        None => Err(operand_count("call")),
    }
}

/// Turn an invocation outcome into this node's result, saving the call
/// scope if the invoked body suspended
fn settle(
    id: NodeId,
    scope: &Scope,
    outcome: Option<Value>,
    operands: Vec<Value>,
    call_scope: Scope,
) -> EvalResult {
    match outcome {
        Some(value) => EvalResult::Value(value),
        None => {
            scope.save_suspend_state(
                id,
                SuspendState::with_scope(Progress::Invoking, operands, call_scope),
            );
            EvalResult::Suspend
        }
    }
}

/// `receiver.name(args...)`
///
/// Instances dispatch to their class methods; completable handles answer
/// `await`; native handles forward to the native object. `await` on any
/// other value returns the value itself.
pub fn eval_method(
    id: NodeId,
    receiver: &Node,
    name: &str,
    args: &[Node],
    scope: &Scope,
) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);
    if let Some(SuspendState {
        progress: Progress::Invoking,
        saved,
        resumable: Some(call_scope),
    }) = resumed
    {
        let invocation = match saved.first() {
            Some(Value::Instance(instance)) => instance.prepare_method(name, saved.len() - 1)?,
            _ => return Err(operand_count(name)),
        };
        let outcome = invocation.resume(&call_scope)?;
        return Ok(settle(id, scope, outcome, saved, call_scope));
    }

    let operands: Vec<_> = std::iter::once(Operand::Value(receiver))
        .chain(args.iter().map(Operand::Value))
        .collect();
    let Some(values) = eval_operands(id, &operands, scope, resumed)? else {
        return Ok(EvalResult::Suspend);
    };
    let Some((target, args)) = values.split_first() else {
        return Err(operand_count(name));
    };

    match (target, name, args) {
        (Value::Completable(handle), "await", []) => handle.await_value().map(EvalResult::Value),
        (Value::Instance(instance), _, _) => {
            let invocation = instance.prepare_method(name, args.len())?;
            let (call_scope, outcome) = invocation.start(scope.thread(), args)?;
            Ok(settle(id, scope, outcome, values, call_scope))
        }
        (Value::Native(native), _, _) => native.invoke(name, args).map(EvalResult::Value),
        (other, "await", []) => Ok(EvalResult::Value(other.clone())),
        (other, _, _) => Err(RuntimeError::MethodNotFound {
            receiver: format!("{} `{other}`", other.kind_name()),
            method: name.to_string(),
            arity: args.len(),
        }),
    }
}

/// `receiver.name`: the field's slot in the instance scope
pub fn eval_field(id: NodeId, receiver: &Node, name: &str, scope: &Scope) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);
    let Some(values) = eval_operands(id, &[Operand::Value(receiver)], scope, resumed)? else {
        return Ok(EvalResult::Suspend);
    };

    match first(values) {
        Value::Instance(instance) => instance
            .scope()
            .lookup_local(name)
            .map(|slot| EvalResult::Value(Value::Reference(slot)))
            .ok_or_else(|| RuntimeError::UnknownField {
                class: instance.class().name.clone(),
                field: name.to_string(),
            }),
        other => Err(RuntimeError::UnknownField {
            class: other.kind_name().to_string(),
            field: name.to_string(),
        }),
    }
}

/// `new Class(args...)`
pub fn eval_new(id: NodeId, class: &Node, args: &[Node], scope: &Scope) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);
    let operands: Vec<_> = std::iter::once(Operand::Value(class))
        .chain(args.iter().map(Operand::Value))
        .collect();
    let Some(values) = eval_operands(id, &operands, scope, resumed)? else {
        return Ok(EvalResult::Suspend);
    };

    match values.split_first() {
        Some((Value::Class(class), args)) => class
            .instantiate(scope.thread(), args)
            .map(|instance| EvalResult::Value(Value::Instance(instance))),
        Some((other, _)) => Err(RuntimeError::NotAClass {
            value: other.to_string(),
        }),
        None => Err(operand_count("new")),
    }
}

pub fn eval_lambda(params: &[String], body: &Arc<Node>, scope: &Scope) -> RuntimeResult<EvalResult> {
    let function = FunctionValue::lambda(params.to_vec(), body.clone(), scope);
    Ok(EvalResult::Value(Value::Function(function)))
}

pub fn eval_import(path: &str, scope: &Scope) -> RuntimeResult<EvalResult> {
    let native = scope.natives().resolve(path)?;
    Ok(EvalResult::Value(Value::Native(native)))
}

/* ===================== Async ===================== */

/// `async(thread) { body }`
///
/// The body gets its own scope owned by the target thread. On the target
/// thread already, it runs in place; otherwise it is queued there. Either
/// way the result is a completable handle.
pub fn eval_async(id: NodeId, thread: &Node, body: &Arc<Node>, scope: &Scope) -> RuntimeResult<EvalResult> {
    let resumed = scope.take_suspend_state(id);
    let Some(values) = eval_operands(id, &[Operand::Value(thread)], scope, resumed)? else {
        return Ok(EvalResult::Suspend);
    };

    let target = match first(values) {
        Value::Thread(target) => target,
        other => {
            return Err(RuntimeError::InvalidThreadTarget {
                value: other.to_string(),
            })
        }
    };

    let body_scope = scope.child_on(ScopeKind::Async, target.clone());
    let handle = Completable::new(body_scope, body.clone());
    if target.is_current() {
        handle.drive();
    } else {
        handle.submit()?;
    }
    Ok(EvalResult::Value(Value::Completable(handle)))
}

fn operand_count(op: &str) -> RuntimeError {
    RuntimeError::TypeMismatch {
        message: format!("`{op}` received the wrong number of operands"),
    }
}
