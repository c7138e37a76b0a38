use std::collections::HashMap;

use crate::ast::value::Value;

/// Variable storage seen by a render.
///
/// The host supplies the root context. Tag handlers that introduce
/// bindings of their own (loop variables, captured text) wrap it in a
/// [`Scope`] rather than writing into the host's storage.
///
/// Path segments after the root name (`a.b[0]`) are resolved by the
/// renderer on the returned value; a context only answers for bare names.
pub trait Context {
    /// Look up a top-level variable. `None` means it is not defined.
    fn resolve(&self, name: &str) -> Option<Value>;

    /// Store a top-level variable.
    fn assign(&mut self, name: &str, value: Value);
}

/// A map-backed [`Context`] for hosts and tests.
///
/// ```rust
/// use liquid_lang::{Context, SimpleContext, Value};
///
/// let mut ctx = SimpleContext::new();
/// ctx.set("name", "Alice");
/// ctx.set("visits", 3i64);
/// assert_eq!(ctx.resolve("visits"), Some(Value::Int(3)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimpleContext {
    variables: HashMap<String, Value>,
}

impl SimpleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable. Accepts any type that implements `Into<Value>`.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.variables.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

impl Context for SimpleContext {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    fn assign(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }
}

/// A child scope over another context.
///
/// Names bound with [`bind`](Scope::bind) shadow the parent for reads and
/// vanish when the scope is dropped. [`Context::assign`] goes through to
/// the parent, so `{% assign %}` inside a loop body is still visible after
/// the loop.
///
/// ```rust
/// use liquid_lang::{Context, Scope, SimpleContext, Value};
///
/// let mut root = SimpleContext::new();
/// root.set("item", "outer");
/// {
///     let mut scope = Scope::new(&mut root);
///     scope.bind("item", "inner");
///     assert_eq!(scope.resolve("item"), Some(Value::from("inner")));
///     scope.assign("seen", Value::Bool(true));
/// }
/// assert_eq!(root.resolve("item"), Some(Value::from("outer")));
/// assert_eq!(root.resolve("seen"), Some(Value::Bool(true)));
/// ```
pub struct Scope<'p> {
    parent: &'p mut dyn Context,
    bindings: HashMap<String, Value>,
}

impl<'p> Scope<'p> {
    pub fn new(parent: &'p mut dyn Context) -> Self {
        Self {
            parent,
            bindings: HashMap::new(),
        }
    }

    /// Bind a name local to this scope.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) {
        self.bindings.insert(name.to_string(), value.into());
    }
}

impl Context for Scope<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name) {
            Some(value) => Some(value.clone()),
            None => self.parent.resolve(name),
        }
    }

    fn assign(&mut self, name: &str, value: Value) {
        // A local binding of the same name would otherwise hide the write.
        self.bindings.remove(name);
        self.parent.assign(name, value);
    }
}
