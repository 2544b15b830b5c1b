use crate::types::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

/// Shared handle to a frame. Closures and child frames hold these; a frame is
/// released once the last holder drops.
pub type Env = Rc<RefCell<Environment>>;

// --- Environment Error ---
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("Unbound variable: '{0}'")]
    UnboundVariable(String),
}

// --- Environment Definition ---

/// One scope frame. Parent links only ever point toward the global frame, so
/// the chain is acyclic.
#[derive(Debug, Default)]
pub struct Environment {
    outer: Option<Env>,
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// Creates a new, top-level (global) environment.
    pub fn new() -> Env {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Env) -> Env {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Looks up a variable's value.
    /// Checks the current frame first, then walks up the outer chain.
    pub fn find(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name) {
            Some(value) => Some(value.clone()),
            None => self
                .outer
                .as_ref()
                .and_then(|outer| outer.borrow().find(name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
            || self
                .outer
                .as_ref()
                .is_some_and(|outer| outer.borrow().contains(name))
    }

    /// Binds a name in the *current* frame, replacing any local binding.
    /// Used for parameter binding.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Binds a name in the *global* frame, however deep this frame is.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        match &self.outer {
            Some(outer) => outer.borrow_mut().define(name, value),
            None => self.bind(name, value),
        }
    }

    /// Sets the value of an *existing* variable in the environment chain.
    /// Updates the first frame, searching outward, where the name is bound.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), EnvError> {
        if let Some(slot) = self.bindings.get_mut(name) {
            *slot = value;
            Ok(())
        } else {
            match &self.outer {
                Some(outer) => outer.borrow_mut().set(name, value),
                None => Err(EnvError::UnboundVariable(name.to_string())),
            }
        }
    }

    /// Removes every binding in this frame.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Gets every name visible from this frame.
    pub fn identifiers(&self) -> HashSet<String> {
        let mut identifiers: HashSet<String> = self.bindings.keys().cloned().collect();
        if let Some(outer) = &self.outer {
            identifiers.extend(outer.borrow().identifiers());
        }
        identifiers
    }
}
