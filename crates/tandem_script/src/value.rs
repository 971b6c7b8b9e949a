//! Host-side values
//!
//! `Value` is what host code sees of anything that crossed the boundary.
//! Primitives and sequences are converted eagerly. Guest objects with no
//! value mapping stay in the guest and are reached through a `GuestRef`.
//! Host objects with no value mapping are `HostObject`s.

use crate::bridge::Bridge;
use crate::handle::GuestRef;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tandem_core::{BigWords, BridgeError};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// No value at all, e.g. a missing argument or a hole in a sequence.
    Absent,
    /// An explicit null.
    Null,
    Bool(bool),
    Int(BigWords),
    Float(f64),
    Text(String),
    Seq(Vec<Value>),
    Guest(GuestRef),
    Host(HostObject),
}

static ABSENT: Value = Value::Absent;

impl Value {
    /// True for both absent states.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Absent | Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&BigWords> {
        match self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_int().and_then(BigWords::to_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_guest(&self) -> Option<&GuestRef> {
        match self {
            Value::Guest(guest) => Some(guest),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<&HostObject> {
        match self {
            Value::Host(host) => Some(host),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Absent => "absent",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Seq(_) => "seq",
            Value::Guest(guest) => guest.type_name(),
            Value::Host(host) => host.type_name(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Int(value.into())
    }
}

impl From<BigWords> for Value {
    fn from(value: BigWords) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Seq(value)
    }
}

impl From<GuestRef> for Value {
    fn from(value: GuestRef) -> Self {
        Value::Guest(value)
    }
}

impl From<HostFunction> for Value {
    fn from(value: HostFunction) -> Self {
        Value::Host(HostObject::Function(value))
    }
}

impl From<HostObject> for Value {
    fn from(value: HostObject) -> Self {
        Value::Host(value)
    }
}

// ============================================================================
// Host objects
// ============================================================================

/// A host-native object that can be handed to the guest by reference.
#[derive(Clone)]
pub enum HostObject {
    Function(HostFunction),
    Opaque(Opaque),
}

/// An arbitrary shared host value the guest can hold but not inspect.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl HostObject {
    pub fn opaque<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        HostObject::Opaque(Opaque {
            type_name: std::any::type_name::<T>(),
            value,
        })
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            HostObject::Opaque(opaque) => Arc::clone(&opaque.value).downcast::<T>().ok(),
            HostObject::Function(_) => None,
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            HostObject::Function(function) => Some(function),
            HostObject::Opaque(_) => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            HostObject::Function(function) => function.name(),
            HostObject::Opaque(opaque) => opaque.type_name,
        }
    }

    /// Identity comparison; two clones of one object are the same object.
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        match (self, other) {
            (HostObject::Function(a), HostObject::Function(b)) => a.ptr_eq(b),
            (HostObject::Opaque(a), HostObject::Opaque(b)) => Arc::ptr_eq(&a.value, &b.value),
            _ => false,
        }
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostObject::Function(function) => function.fmt(f),
            HostObject::Opaque(opaque) => write!(f, "Opaque({})", opaque.type_name),
        }
    }
}

// ============================================================================
// Host functions
// ============================================================================

/// Arguments of one host call.
pub struct HostCall<'a> {
    /// The bridge the call arrived through, for calling back into the guest.
    pub bridge: &'a Bridge,
    pub receiver: Value,
    pub args: Vec<Value>,
}

impl HostCall<'_> {
    /// Argument `index`, or `Value::Absent` when the caller passed fewer.
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&ABSENT)
    }
}

type HostFn = dyn Fn(HostCall<'_>) -> Result<Value, BridgeError> + Send + Sync;

/// A host callable, optionally bound to a receiver.
#[derive(Clone)]
pub struct HostFunction {
    name: Arc<str>,
    arity: Option<usize>,
    func: Arc<HostFn>,
    receiver: Option<Arc<Value>>,
}

impl HostFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(HostCall<'_>) -> Result<Value, BridgeError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            arity: None,
            func: Arc::new(func),
            receiver: None,
        }
    }

    /// Require at least `arity` arguments on every call.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Same function, invoked with `receiver` unless a call supplies one.
    pub fn bind(&self, receiver: Value) -> Self {
        Self {
            receiver: Some(Arc::new(receiver)),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.receiver.as_deref()
    }

    pub(crate) fn call(&self, call: HostCall<'_>) -> Result<Value, BridgeError> {
        (self.func)(call)
    }

    /// Identity comparison on the underlying callable.
    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn test_host_object_identity_and_refcount() {
        let marker = Arc::new(Marker);
        let object = HostObject::opaque(Arc::clone(&marker));
        assert_eq!(Arc::strong_count(&marker), 2);

        let copy = object.clone();
        assert!(copy.ptr_eq(&object));
        assert_eq!(Arc::strong_count(&marker), 3);
        assert!(copy.downcast::<Marker>().is_some());
        assert!(copy.downcast::<String>().is_none());
        assert!(object.type_name().ends_with("Marker"));

        let other = HostObject::opaque(Arc::new(Marker));
        assert_ne!(object, other);
    }

    #[test]
    fn test_bound_function_keeps_identity() {
        let function = HostFunction::new("add", |_| Ok(Value::Null)).with_arity(2);
        let bound = function.bind(Value::from("self"));
        assert!(bound.ptr_eq(&function));
        assert_eq!(bound.receiver(), Some(&Value::from("self")));
        assert_eq!(function.receiver(), None);
        assert_eq!(bound.arity(), Some(2));
        assert_eq!(HostObject::Function(bound).type_name(), "add");
    }

    #[test]
    fn test_value_accessors() {
        assert!(Value::Absent.is_null());
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(false).is_null());
        assert_eq!(Value::from(42i64).as_i64(), Some(42));
        assert_eq!(Value::from(u64::MAX).as_i64(), None);
        assert_eq!(Value::from("a").as_str(), Some("a"));
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
        let seq = Value::from(vec![Value::Null]);
        assert_eq!(seq.as_seq().map(<[_]>::len), Some(1));
        assert_eq!(Value::Seq(Vec::new()).type_name(), "seq");
    }
}
