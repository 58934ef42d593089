//! Lexical scope chain.
//!
//! A scope maps names to [`Variable`] cells and links to its enclosing scope.
//! Cells are reference counted: two scopes that hold the same `Rc<Variable>`
//! observe each other's writes, which is what closure capture relies on.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::value::Value;

/// Shared handle to a scope.
pub type Scope = Rc<RefCell<Environment>>;

/// The mutable storage unit behind one bound name.
#[derive(Debug)]
pub struct Variable {
    value: RefCell<Value>,
}

impl Variable {
    pub fn new(value: Value) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(value),
        })
    }

    pub fn get(&self) -> Value {
        self.value.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.value.borrow_mut() = value;
    }
}

/// Name resolution failure inside a scope chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("Undefined variable '{0}'.")]
    Undefined(String),
}

#[derive(Default)]
pub struct Environment {
    values: HashMap<Rc<str>, Rc<Variable>>,
    enclosing: Option<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Scope) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    pub fn into_scope(self) -> Scope {
        Rc::new(RefCell::new(self))
    }

    /// Bind `name` in *this* scope, shadowing any outer binding. Re-declaring a
    /// name already local to this scope overwrites its existing cell.
    pub fn declare(&mut self, name: &str, value: Value) {
        match self.values.get(name) {
            Some(cell) => cell.set(value),
            None => {
                self.values.insert(Rc::from(name), Variable::new(value));
            }
        }
    }

    /// Find the cell bound to `name`, walking outward.
    pub fn lookup(&self, name: &str) -> Option<Rc<Variable>> {
        if let Some(cell) = self.values.get(name) {
            return Some(Rc::clone(cell));
        }

        match &self.enclosing {
            Some(enclosing) => enclosing.borrow().lookup(name),
            None => None,
        }
    }

    pub fn get(&self, name: &str) -> Result<Value, ScopeError> {
        self.lookup(name)
            .map(|cell| cell.get())
            .ok_or_else(|| ScopeError::Undefined(name.to_string()))
    }

    /// Overwrite the nearest existing binding of `name`.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), ScopeError> {
        match self.lookup(name) {
            Some(cell) => {
                cell.set(value);
                Ok(())
            }
            None => {
                debug!("Assignment to undeclared name '{}'", name);
                Err(ScopeError::Undefined(name.to_string()))
            }
        }
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Drop the local binding of `name`. Other scopes holding the same cell
    /// keep it.
    pub fn remove(&mut self, name: &str) {
        self.values.remove(name);
    }

    /// New scope with a fresh top-level mapping whose entries are the *same*
    /// cells as `self`; the parent link is shared.
    pub fn copy_by_reference(&self) -> Environment {
        Environment {
            values: self
                .values
                .iter()
                .map(|(name, cell)| (Rc::clone(name), Rc::clone(cell)))
                .collect(),
            enclosing: self.enclosing.clone(),
        }
    }

    /// New scope whose cells are *new*, initialised with the current values.
    /// Enclosing scopes are value-copied too, so the result is detached from
    /// every later write.
    pub fn copy_by_value(&self) -> Environment {
        Environment {
            values: self
                .values
                .iter()
                .map(|(name, cell)| (Rc::clone(name), Variable::new(cell.get())))
                .collect(),
            enclosing: self
                .enclosing
                .as_ref()
                .map(|enclosing| enclosing.borrow().copy_by_value().into_scope()),
        }
    }

    /// Local `(name, cell)` pairs sorted by name.
    pub fn entries(&self) -> Vec<(Rc<str>, Rc<Variable>)> {
        let mut entries: Vec<(Rc<str>, Rc<Variable>)> = self
            .values
            .iter()
            .map(|(name, cell)| (Rc::clone(name), Rc::clone(cell)))
            .collect();

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of scopes in the chain, this one included.
    pub fn depth(&self) -> usize {
        1 + self
            .enclosing
            .as_ref()
            .map_or(0, |enclosing| enclosing.borrow().depth())
    }
}

// Values can point back into the scope that holds them (a function stored in
// the scope it captured), so only names are printed.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.values.keys().map(|name| &**name).collect();

        f.debug_struct("Environment")
            .field("names", &names)
            .field("depth", &self.depth())
            .finish()
    }
}

/// One `name = value` line per binding, innermost scope first, scopes
/// separated by a dashed rule.
impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, cell) in self.entries() {
            writeln!(f, "  {} = {}", name, cell.get())?;
        }

        if let Some(enclosing) = &self.enclosing {
            writeln!(f, "  ----")?;
            write!(f, "{}", enclosing.borrow())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(env: &Environment, name: &str) -> f64 {
        match env.get(name) {
            Ok(Value::Number(n)) => n,
            other => panic!("expected number for '{}', got {:?}", name, other),
        }
    }

    #[test]
    fn get_walks_outward_and_declare_shadows() {
        let global: Scope = Environment::new().into_scope();
        global.borrow_mut().declare("a", Value::Number(1.0));

        let mut inner = Environment::with_enclosing(Rc::clone(&global));
        assert_eq!(number(&inner, "a"), 1.0);

        inner.declare("a", Value::Number(3.0));
        assert_eq!(number(&inner, "a"), 3.0);
        assert_eq!(number(&global.borrow(), "a"), 1.0);
    }

    #[test]
    fn assign_reaches_enclosing_scope() {
        let global: Scope = Environment::new().into_scope();
        global.borrow_mut().declare("a", Value::Number(1.0));

        let inner = Environment::with_enclosing(Rc::clone(&global));
        inner.assign("a", Value::Number(7.0)).unwrap();

        assert_eq!(number(&global.borrow(), "a"), 7.0);
        assert!(!inner.contains_local("a"));
    }

    #[test]
    fn missing_names_fail() {
        let env = Environment::new();

        assert_eq!(
            env.get("nope").unwrap_err(),
            ScopeError::Undefined("nope".to_string())
        );
        assert!(env.assign("nope", Value::Nil).is_err());
    }

    #[test]
    fn copy_by_reference_shares_cells() {
        let mut original = Environment::new();
        original.declare("i", Value::Number(0.0));

        let copy = original.copy_by_reference();
        copy.assign("i", Value::Number(1.0)).unwrap();
        assert_eq!(number(&original, "i"), 1.0);

        original.assign("i", Value::Number(2.0)).unwrap();
        assert_eq!(number(&copy, "i"), 2.0);
    }

    #[test]
    fn copy_by_reference_has_its_own_mapping() {
        let original = Environment::new();
        let mut copy = original.copy_by_reference();

        copy.declare("param", Value::Bool(true));

        assert!(copy.contains_local("param"));
        assert!(!original.contains_local("param"));
    }

    #[test]
    fn copy_by_value_detaches_cells() {
        let parent: Scope = Environment::new().into_scope();
        parent.borrow_mut().declare("outer", Value::Number(1.0));

        let mut original = Environment::with_enclosing(Rc::clone(&parent));
        original.declare("x", Value::Number(5.0));

        let copy = original.copy_by_value();
        original.assign("x", Value::Number(6.0)).unwrap();
        original.assign("outer", Value::Number(2.0)).unwrap();

        assert_eq!(number(&copy, "x"), 5.0);
        assert_eq!(number(&copy, "outer"), 1.0);
    }

    #[test]
    fn redeclare_reuses_the_cell() {
        let mut original = Environment::new();
        original.declare("a", Value::Number(1.0));

        let copy = original.copy_by_reference();
        original.declare("a", Value::Number(2.0));

        assert_eq!(number(&copy, "a"), 2.0);
    }

    #[test]
    fn remove_only_touches_this_mapping() {
        let mut original = Environment::new();
        original.declare("f", Value::Number(1.0));

        let mut copy = original.copy_by_reference();
        copy.remove("f");

        assert!(!copy.contains_local("f"));
        assert_eq!(number(&original, "f"), 1.0);
    }

    #[test]
    fn depth_counts_the_chain() {
        let global: Scope = Environment::new().into_scope();
        let middle: Scope = Environment::with_enclosing(Rc::clone(&global)).into_scope();
        let inner = Environment::with_enclosing(middle);

        assert_eq!(inner.depth(), 3);
    }
}
