//! Conversion tables between socket types.
//!
//! Every socket carries a [`ConverterSet`]: a map from source type name
//! to a function producing a value of the socket's own type. The set is
//! copied into a socket when its type is established and travels with
//! assignment, so a socket that adopted `f64` also adopted the
//! `json -> f64` rule.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::value::{FOREIGN_TYPE, Value};

/// Conversion function: source value in, destination-typed value out.
pub type ConvertFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Source type name -> converter, for one destination type.
#[derive(Clone, Default)]
pub struct ConverterSet {
    by_source: FxHashMap<&'static str, ConvertFn>,
}

impl ConverterSet {
    /// The built-in rules for a destination of the given value's type:
    /// primitives convert from the foreign object type and back, the
    /// foreign type converts from every primitive, opaque types convert
    /// from nothing but themselves (same-type copies bypass the table).
    pub fn builtin_for(prototype: &Value) -> ConverterSet {
        let mut set = ConverterSet::default();
        match prototype {
            Value::Bool(_) => set.insert(FOREIGN_TYPE, Arc::new(foreign_to_bool)),
            Value::Int(_) => set.insert(FOREIGN_TYPE, Arc::new(foreign_to_int)),
            Value::Float(_) => set.insert(FOREIGN_TYPE, Arc::new(foreign_to_float)),
            Value::Str(_) => set.insert(FOREIGN_TYPE, Arc::new(foreign_to_str)),
            Value::Foreign(_) => {
                set.insert("bool", Arc::new(primitive_to_foreign));
                set.insert("i64", Arc::new(primitive_to_foreign));
                set.insert("f64", Arc::new(primitive_to_foreign));
                set.insert("str", Arc::new(primitive_to_foreign));
            }
            Value::None | Value::Opaque(_) => {}
        }
        set
    }

    pub fn insert(&mut self, source: &'static str, f: ConvertFn) {
        self.by_source.insert(source, f);
    }

    pub fn get(&self, source: &str) -> Option<&ConvertFn> {
        self.by_source.get(source)
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Run the converter registered for `src`'s type, or fail with the
    /// pair of type names involved.
    pub fn convert(&self, src: &Value, dst_type: &str) -> Result<Value> {
        let conv = self.get(src.type_name()).ok_or_else(|| Error::TypeMismatch {
            from: src.type_name().to_string(),
            to: dst_type.to_string(),
        })?;
        conv(src)
    }
}

impl std::fmt::Debug for ConverterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.by_source.keys())
            .finish()
    }
}

fn mismatch(src: &Value, to: &str) -> Error {
    Error::TypeMismatch {
        from: src.type_name().to_string(),
        to: to.to_string(),
    }
}

fn foreign_payload<'v>(v: &'v Value, to: &str) -> Result<&'v serde_json::Value> {
    match v {
        Value::Foreign(j) => Ok(j),
        other => Err(mismatch(other, to)),
    }
}

fn foreign_to_bool(v: &Value) -> Result<Value> {
    match foreign_payload(v, "bool")? {
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        _ => Err(mismatch(v, "bool")),
    }
}

fn foreign_to_int(v: &Value) -> Result<Value> {
    match foreign_payload(v, "i64")? {
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int).ok_or_else(|| mismatch(v, "i64")),
        _ => Err(mismatch(v, "i64")),
    }
}

fn foreign_to_float(v: &Value) -> Result<Value> {
    match foreign_payload(v, "f64")? {
        serde_json::Value::Number(n) => {
            n.as_f64().map(Value::Float).ok_or_else(|| mismatch(v, "f64"))
        }
        _ => Err(mismatch(v, "f64")),
    }
}

fn foreign_to_str(v: &Value) -> Result<Value> {
    match foreign_payload(v, "str")? {
        serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
        _ => Err(mismatch(v, "str")),
    }
}

fn primitive_to_foreign(v: &Value) -> Result<Value> {
    let json = match v {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(*i),
        Value::Float(f) => serde_json::json!(*f),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        other => return Err(mismatch(other, FOREIGN_TYPE)),
    };
    Ok(Value::Foreign(json))
}
