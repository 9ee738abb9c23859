//! Runtime value type

use std::fmt;

use crate::errors::{RuntimeError, RuntimeResult};
use crate::interpreter::invoke::{ClassValue, FunctionValue, Instance};
use crate::interpreter::natives::NativeHandle;
use crate::interpreter::scope::Slot;
use crate::interpreter::tasks::Completable;
use crate::thread::ContanThread;

/// Runtime value
///
/// Primitives are copied on every assignment. Instances, native handles,
/// threads and completables are shared handles: cloning the value clones the
/// handle, never the object behind it.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Null,
    Integer(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Function(FunctionValue),
    Class(ClassValue),
    Instance(Instance),
    Native(NativeHandle),
    Thread(ContanThread),
    Completable(Completable),
    /// A named slot inside a scope; produced by variable and field access
    Reference(Slot),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Function(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::Native(_) => "native",
            Value::Thread(_) => "thread",
            Value::Completable(_) => "completable",
            Value::Reference(_) => "reference",
        }
    }

    /// Value presently held, reading through a slot reference
    pub fn resolve(&self) -> RuntimeResult<Value> {
        match self {
            Value::Reference(slot) => slot.get(),
            other => Ok(other.clone()),
        }
    }

    /// Copy stored by assignment
    ///
    /// Primitives are duplicated; handle kinds share their target.
    pub fn create_clone(&self) -> RuntimeResult<Value> {
        self.resolve()
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Void | Value::Null => false,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Reference(slot) => slot.get().map(|v| v.is_truthy()).unwrap_or(false),
            _ => true,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Iteration count for a bounded `repeat`
    pub fn to_repeat_count(&self) -> RuntimeResult<i64> {
        self.as_i64().ok_or_else(|| RuntimeError::TypeMismatch {
            message: format!("repeat count must be numeric, got {} `{}`", self.kind_name(), self),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Class(a), Value::Class(b)) => a.ptr_eq(b),
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            (Value::Native(a), Value::Native(b)) => a.ptr_eq(b),
            (Value::Thread(a), Value::Thread(b)) => a.ptr_eq(b),
            (Value::Completable(a), Value::Completable(b)) => a.ptr_eq(b),
            (Value::Reference(a), Value::Reference(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Null => write!(f, "null"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::Class(class) => write!(f, "<class {}>", class.decl().name),
            Value::Instance(instance) => write!(f, "<instance of {}>", instance.class().name),
            Value::Native(native) => write!(f, "<native {}>", native.type_name()),
            Value::Thread(thread) => write!(f, "<thread {}>", thread.name()),
            Value::Completable(handle) => write!(f, "<completable {}>", handle.id()),
            Value::Reference(slot) => match slot.get() {
                Ok(value) => write!(f, "{value}"),
                Err(_) => write!(f, "<unreadable slot>"),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_display_keeps_fraction() {
        assert_eq!(Value::Float(804.0).to_string(), "804.0");
        assert_eq!(Value::Integer(800).to_string(), "800");
    }

    #[test]
    fn test_reference_clone_reads_current_value() {
        let slot = Slot::new(Value::Integer(1));
        let reference = Value::Reference(slot.clone());

        let copy = reference.create_clone().unwrap();
        slot.set(Value::Integer(2)).unwrap();

        assert_eq!(copy, Value::Integer(1));
        assert_eq!(reference.resolve().unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_repeat_count_rejects_strings() {
        assert_eq!(Value::Float(3.9).to_repeat_count().unwrap(), 3);
        assert!(Value::Str("three".to_string()).to_repeat_count().is_err());
    }
}
