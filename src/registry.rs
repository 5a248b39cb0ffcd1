//! Per-agent registration table: exposed names mapped to bindings.
//!
//! A binding is either a callable or a plain value. Plain values are
//! addressable like zero/one-argument functions: invoking with no arguments
//! reads the value, invoking with one argument writes it and returns the new
//! value. The arity dispatch itself lives in the dispatcher; the registry
//! only stores the tagged variant.
//!
//! Insertion order is preserved: discovery output enumerates names as
//! declared, and the partition's first-registrant-wins rule depends on
//! deterministic ordering. Replacing an existing name keeps its position;
//! deleting and re-adding moves it to the end.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A callable binding body.
///
/// Receives the (opaque) argument list and returns a value or a failure
/// message. The failure message travels back to the caller as a remote
/// execution error; it never crashes the hosting agent.
pub type Handler = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A registered name's body: a function, or a value exposed as an accessor.
#[derive(Clone)]
pub enum Binding {
    /// Invoked with the request's arguments.
    Callable(Handler),
    /// Read on zero-argument invocation, written on one-argument invocation.
    Value(Value),
}

impl Binding {
    /// Wrap a closure as a callable binding.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Binding::Callable(Arc::new(f))
    }

    /// Expose a plain value as an accessor binding.
    pub fn value(v: impl Into<Value>) -> Self {
        Binding::Value(v.into())
    }

    /// True if this binding is the value variant.
    pub fn is_value(&self) -> bool {
        matches!(self, Binding::Value(_))
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Value(v)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Callable(_) => f.write_str("Binding::Callable(..)"),
            Binding::Value(v) => write!(f, "Binding::Value({v})"),
        }
    }
}

/// Insertion-ordered `name → binding` table owned by one agent.
#[derive(Debug, Default)]
pub struct Registry {
    bindings: HashMap<String, Binding>,
    order: Vec<String>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a binding. Returns `true` if the name is new.
    ///
    /// A replaced name keeps its original position in enumeration order.
    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) -> bool {
        let name = name.into();
        let is_new = self.bindings.insert(name.clone(), binding).is_none();
        if is_new {
            self.order.push(name);
        }
        is_new
    }

    /// Remove a binding. Returns the removed body, if any.
    pub fn remove(&mut self, name: &str) -> Option<Binding> {
        let removed = self.bindings.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }

    /// Look up a binding by name.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Overwrite the stored value of a value binding. Returns `false` if the
    /// name is absent or bound to a callable.
    pub fn write_value(&mut self, name: &str, value: Value) -> bool {
        match self.bindings.get_mut(name) {
            Some(Binding::Value(slot)) => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    /// Membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Exposed names in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_preserves_declaration_order() {
        let mut reg = Registry::new();
        assert!(reg.insert("fn1", Binding::callable(|_| Ok(json!(null)))));
        assert!(reg.insert("var2", Binding::value(json!(111))));
        assert!(reg.insert("fn3", Binding::callable(|_| Ok(json!(null)))));
        assert_eq!(reg.keys(), vec!["fn1", "var2", "fn3"]);
    }

    #[test]
    fn test_replace_keeps_position_delete_reinsert_appends() {
        let mut reg = Registry::new();
        reg.insert("a", Binding::value(json!(1)));
        reg.insert("b", Binding::value(json!(2)));

        assert!(!reg.insert("a", Binding::value(json!(10))));
        assert_eq!(reg.keys(), vec!["a", "b"]);

        assert!(reg.remove("a").is_some());
        reg.insert("a", Binding::value(json!(10)));
        assert_eq!(reg.keys(), vec!["b", "a"]);
    }

    #[test]
    fn test_remove_absent_is_none() {
        let mut reg = Registry::new();
        assert!(reg.remove("ghost").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_write_value_only_touches_value_bindings() {
        let mut reg = Registry::new();
        reg.insert("var", Binding::value(json!(111)));
        reg.insert("fun", Binding::callable(|_| Ok(json!(0))));

        assert!(reg.write_value("var", json!(222)));
        match reg.get("var") {
            Some(Binding::Value(v)) => assert_eq!(v, &json!(222)),
            other => panic!("unexpected binding: {other:?}"),
        }

        assert!(!reg.write_value("fun", json!(1)));
        assert!(!reg.write_value("ghost", json!(1)));
    }

    #[test]
    fn test_value_binding_from_json() {
        let binding: Binding = json!({"k": 1}).into();
        assert!(binding.is_value());
    }
}
