//! Dynamically typed socket values.
//!
//! A [`Value`] is the storage behind every socket: a sum of the primitive
//! types the engine knows natively, the generic foreign-object payload
//! ([`serde_json::Value`]), and a boxed opaque branch for arbitrary user
//! types. The opaque branch carries a small vtable so values stay
//! cloneable and comparable without knowing the concrete type.

use std::any::{Any, TypeId};

/// Marker for everything that can live inside a socket.
///
/// Blanket-implemented; user types only need the usual derives
/// (`Clone`, `PartialEq`, `Default`).
pub trait SocketValue: Any + Clone + PartialEq + Default + Send + Sync {}

impl<T: Any + Clone + PartialEq + Default + Send + Sync> SocketValue for T {}

/// Runtime name of the `none` pseudo-type.
pub const NONE_TYPE: &str = "none";

/// Runtime name of the generic foreign-object type.
pub const FOREIGN_TYPE: &str = "json";

/// A value of dynamic type.
pub enum Value {
    /// Unset and untyped.
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Generic foreign object; auto-converts to and from primitives
    /// when the payload is compatible.
    Foreign(serde_json::Value),
    /// Anything else, boxed with a clone/eq vtable.
    Opaque(Opaque),
}

impl Value {
    /// Wrap a typed value, routing known types into their dedicated
    /// branches and everything else into the opaque branch.
    pub fn from_typed<T: SocketValue>(v: T) -> Value {
        let id = TypeId::of::<T>();
        if id == TypeId::of::<bool>() {
            Value::Bool(unbox(v))
        } else if id == TypeId::of::<i64>() {
            Value::Int(unbox(v))
        } else if id == TypeId::of::<f64>() {
            Value::Float(unbox(v))
        } else if id == TypeId::of::<String>() {
            Value::Str(unbox(v))
        } else if id == TypeId::of::<serde_json::Value>() {
            Value::Foreign(unbox(v))
        } else {
            Value::Opaque(Opaque::new(v))
        }
    }

    /// Exact-typed read; `None` when the stored type is not `T`.
    /// No conversion happens here: conversion lives in the socket
    /// insertion path, not in typed access.
    pub fn to_typed<T: SocketValue>(&self) -> Option<T> {
        self.as_any().and_then(|any| any.downcast_ref::<T>().cloned())
    }

    /// Exact-typed in-place access for assignment-through-reference
    /// writes.
    pub fn downcast_mut<T: SocketValue>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = match self {
            Value::None => return None,
            Value::Bool(b) => b,
            Value::Int(i) => i,
            Value::Float(f) => f,
            Value::Str(s) => s,
            Value::Foreign(j) => j,
            Value::Opaque(o) => o.boxed.as_any_mut(),
        };
        any.downcast_mut::<T>()
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(match self {
            Value::None => return None,
            Value::Bool(b) => b,
            Value::Int(i) => i,
            Value::Float(f) => f,
            Value::Str(s) => s,
            Value::Foreign(j) => j,
            Value::Opaque(o) => o.boxed.as_any(),
        })
    }

    /// Runtime type name of the stored value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => NONE_TYPE,
            Value::Bool(_) => "bool",
            Value::Int(_) => "i64",
            Value::Float(_) => "f64",
            Value::Str(_) => "str",
            Value::Foreign(_) => FOREIGN_TYPE,
            Value::Opaque(o) => o.type_name,
        }
    }

    /// Runtime type name a value of type `T` would carry.
    pub fn type_name_of<T: SocketValue>() -> &'static str {
        let id = TypeId::of::<T>();
        if id == TypeId::of::<bool>() {
            "bool"
        } else if id == TypeId::of::<i64>() {
            "i64"
        } else if id == TypeId::of::<f64>() {
            "f64"
        } else if id == TypeId::of::<String>() {
            "str"
        } else if id == TypeId::of::<serde_json::Value>() {
            FOREIGN_TYPE
        } else {
            std::any::type_name::<T>()
        }
    }

    /// True for the untyped `none` branch.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// True when both values carry the same runtime type.
    pub fn same_type(&self, other: &Value) -> bool {
        self.type_name() == other.type_name()
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Value::None => Value::None,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::Float(f) => Value::Float(*f),
            Value::Str(s) => Value::Str(s.clone()),
            Value::Foreign(j) => Value::Foreign(j.clone()),
            Value::Opaque(o) => Value::Opaque(o.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Foreign(a), Value::Foreign(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a.eq_opaque(b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "bool({b})"),
            Value::Int(i) => write!(f, "i64({i})"),
            Value::Float(v) => write!(f, "f64({v})"),
            Value::Str(s) => write!(f, "str({s:?})"),
            Value::Foreign(j) => write!(f, "json({j})"),
            Value::Opaque(o) => write!(f, "opaque({})", o.type_name),
        }
    }
}

/// Boxed value of a type the engine does not know natively.
pub struct Opaque {
    type_name: &'static str,
    boxed: Box<dyn OpaqueValue>,
}

impl Opaque {
    fn new<T: SocketValue>(v: T) -> Self {
        Opaque {
            type_name: std::any::type_name::<T>(),
            boxed: Box::new(v),
        }
    }

    fn eq_opaque(&self, other: &Opaque) -> bool {
        self.type_name == other.type_name && self.boxed.eq_boxed(other.boxed.as_any())
    }
}

impl Clone for Opaque {
    fn clone(&self) -> Self {
        Opaque {
            type_name: self.type_name,
            boxed: self.boxed.clone_boxed(),
        }
    }
}

trait OpaqueValue: Any + Send + Sync {
    fn clone_boxed(&self) -> Box<dyn OpaqueValue>;
    fn eq_boxed(&self, other: &dyn Any) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: SocketValue> OpaqueValue for T {
    fn clone_boxed(&self) -> Box<dyn OpaqueValue> {
        Box::new(self.clone())
    }

    fn eq_boxed(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|o| o == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn unbox<T: Any, U: Any>(v: T) -> U {
    match (Box::new(v) as Box<dyn Any>).downcast::<U>() {
        Ok(b) => *b,
        // The caller compared TypeIds before downcasting.
        Err(_) => unreachable!("type id checked before downcast"),
    }
}
