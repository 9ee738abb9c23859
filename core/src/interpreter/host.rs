//! Host value conversion
//!
//! Host values are `serde_json::Value`. Scalars map onto primitives; arrays
//! and objects enter the language as `HostObject` natives and come back out
//! unchanged.

use serde_json::{Number, Value as JsonValue};

use super::natives::{HostObject, NativeHandle};
use super::types::Value;
use crate::errors::{RuntimeError, RuntimeResult};

pub fn json_to_val(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::Str(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            Value::Native(NativeHandle::new(HostObject::new(json.clone())))
        }
    }
}

/// Host form of `value`; `None` for void
pub fn val_to_json(value: &Value) -> RuntimeResult<Option<JsonValue>> {
    let json = match value {
        Value::Void => return Ok(None),
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::from(*i),
        Value::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Reference(slot) => return val_to_json(&slot.get()?),
        Value::Native(native) => native.to_host().ok_or_else(|| not_representable(value))?,
        Value::Function(_)
        | Value::Class(_)
        | Value::Instance(_)
        | Value::Thread(_)
        | Value::Completable(_) => return Err(not_representable(value)),
    };
    Ok(Some(json))
}

fn not_representable(value: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        message: format!("{} `{value}` has no host representation", value.kind_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars_map_onto_primitives() {
        assert_eq!(json_to_val(&json!(800)), Value::Integer(800));
        assert_eq!(json_to_val(&json!(804.0)), Value::Float(804.0));
        assert_eq!(json_to_val(&json!("x")), Value::from("x"));
        assert_eq!(json_to_val(&json!(null)), Value::Null);

        assert_eq!(val_to_json(&Value::Void).unwrap(), None);
        assert_eq!(val_to_json(&Value::Float(804.0)).unwrap(), Some(json!(804.0)));
    }

    #[test]
    fn test_host_objects_round_trip() {
        let original = json!({ "ids": [1, 2, 3], "label": "batch" });
        let value = json_to_val(&original);

        assert!(matches!(value, Value::Native(_)));
        assert_eq!(val_to_json(&value).unwrap(), Some(original));
    }
}
