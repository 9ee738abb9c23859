//! Native interop boundary
//!
//! Natively implemented objects are reached through one trait. The registry
//! maps dotted names (`contan.Thread`) to handles; `Import` nodes resolve
//! against it at evaluation time.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{anyhow, bail};
use serde_json::Value as JsonValue;

use crate::errors::{RuntimeError, RuntimeResult};
use crate::interpreter::host::json_to_val;
use crate::interpreter::types::Value;

/// A natively implemented object callable from the language
pub trait NativeObject: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    /// Invoke `method` with already-evaluated arguments
    fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Value>;

    /// Host representation, when the object has one
    fn to_host(&self) -> Option<JsonValue> {
        None
    }
}

/// Shared handle to a native object
#[derive(Clone)]
pub struct NativeHandle {
    object: Arc<dyn NativeObject>,
}

impl NativeHandle {
    pub fn new(object: impl NativeObject + 'static) -> Self {
        NativeHandle {
            object: Arc::new(object),
        }
    }

    pub fn type_name(&self) -> &str {
        self.object.type_name()
    }

    pub fn invoke(&self, method: &str, args: &[Value]) -> RuntimeResult<Value> {
        self.object
            .invoke(method, args)
            .map_err(|err| RuntimeError::NativeInvocation {
                target: self.object.type_name().to_string(),
                method: method.to_string(),
                message: format!("{err:#}"),
            })
    }

    pub fn to_host(&self) -> Option<JsonValue> {
        self.object.to_host()
    }

    pub fn ptr_eq(&self, other: &NativeHandle) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:?})", self.object)
    }
}

/* ===================== Registry ===================== */

#[derive(Default)]
pub struct NativeRegistry {
    entries: RwLock<HashMap<String, NativeHandle>>,
}

impl NativeRegistry {
    /// Registry preloaded with the built-in natives
    pub fn with_builtins() -> Self {
        let registry = NativeRegistry::default();
        registry.register("contan.Thread", NativeHandle::new(ThreadNative));
        registry
    }

    pub fn register(&self, path: impl Into<String>, handle: NativeHandle) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), handle);
    }

    pub fn resolve(&self, path: &str) -> RuntimeResult<NativeHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownNative {
                path: path.to_string(),
            })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = entries.keys().collect();
        names.sort();
        f.debug_struct("NativeRegistry")
            .field("entries", &names)
            .finish()
    }
}

/* ===================== Built-ins ===================== */

/// `contan.Thread`: blocking helpers for the current OS thread
#[derive(Debug)]
struct ThreadNative;

impl NativeObject for ThreadNative {
    fn type_name(&self) -> &str {
        "contan.Thread"
    }

    fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Value> {
        match (method, args) {
            ("sleep", [millis]) => {
                let millis = millis
                    .as_i64()
                    .ok_or_else(|| anyhow!("sleep expects milliseconds, got `{millis}`"))?;
                std::thread::sleep(Duration::from_millis(millis.max(0) as u64));
                Ok(Value::Void)
            }
            ("currentName", []) => Ok(Value::Str(
                std::thread::current().name().unwrap_or("unnamed").to_string(),
            )),
            _ => bail!("no method `{method}` taking {} argument(s)", args.len()),
        }
    }
}

/// Host array or object passed into the language
#[derive(Debug)]
pub struct HostObject {
    json: JsonValue,
}

impl HostObject {
    pub fn new(json: JsonValue) -> Self {
        HostObject { json }
    }
}

impl NativeObject for HostObject {
    fn type_name(&self) -> &str {
        match self.json {
            JsonValue::Array(_) => "host.Array",
            _ => "host.Object",
        }
    }

    fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Value> {
        match (method, args, &self.json) {
            ("size", [], JsonValue::Array(items)) => Ok(Value::Integer(items.len() as i64)),
            ("size", [], JsonValue::Object(map)) => Ok(Value::Integer(map.len() as i64)),
            ("get", [index], JsonValue::Array(items)) => {
                let index = index
                    .as_i64()
                    .ok_or_else(|| anyhow!("array index must be an integer, got `{index}`"))?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .map(json_to_val)
                    .ok_or_else(|| anyhow!("index {index} out of bounds for {} items", items.len()))
            }
            ("get", [key], JsonValue::Object(map)) => {
                let key = key
                    .as_str()
                    .ok_or_else(|| anyhow!("object key must be a string, got `{key}`"))?;
                Ok(map.get(key).map(json_to_val).unwrap_or(Value::Null))
            }
            ("keys", [], JsonValue::Object(map)) => Ok(Value::Native(NativeHandle::new(
                HostObject::new(JsonValue::Array(
                    map.keys().cloned().map(JsonValue::String).collect(),
                )),
            ))),
            _ => bail!("no method `{method}` taking {} argument(s)", args.len()),
        }
    }

    fn to_host(&self) -> Option<JsonValue> {
        Some(self.json.clone())
    }
}
