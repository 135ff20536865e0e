//! Lexically chained environments for the tree-walking engine.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::object::Value;

/// A scope mapping names to values, chained to its lexical parent.
#[derive(Debug, Default)]
pub struct Environment {
    store: HashMap<String, Value>,
    parent: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn new_enclosed(parent: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            store: HashMap::new(),
            parent: Some(parent),
        }))
    }

    /// Look a name up, walking outward through enclosing scopes.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.store.get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.borrow().get(name))
    }

    /// Bind a name in this scope, shadowing any outer binding.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.store.insert(name.into(), value);
    }

    /// Overwrite an existing binding, walking outward to find it. Returns
    /// false when the name is not bound anywhere.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.store.get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let env = Environment::new();
        env.borrow_mut().define("x", Value::Integer(1));
        assert_eq!(env.borrow().get("x"), Some(Value::Integer(1)));
        assert_eq!(env.borrow().get("y"), None);
    }

    #[test]
    fn test_enclosed_lookup_walks_outward() {
        let outer = Environment::new();
        outer.borrow_mut().define("x", Value::Integer(1));
        let inner = Environment::new_enclosed(outer.clone());

        assert_eq!(inner.borrow().get("x"), Some(Value::Integer(1)));

        // shadowing in the inner scope leaves the outer binding intact
        inner.borrow_mut().define("x", Value::Integer(2));
        assert_eq!(inner.borrow().get("x"), Some(Value::Integer(2)));
        assert_eq!(outer.borrow().get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn test_assign_updates_the_owning_scope() {
        let outer = Environment::new();
        outer.borrow_mut().define("x", Value::Integer(1));
        let inner = Environment::new_enclosed(outer.clone());

        assert!(inner.borrow_mut().assign("x", Value::Integer(5)));
        assert_eq!(outer.borrow().get("x"), Some(Value::Integer(5)));
        assert!(!inner.borrow_mut().assign("missing", Value::Null));
    }
}
