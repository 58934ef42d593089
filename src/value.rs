//! Runtime values and the callable/object model.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::environment::{Environment, Scope, ScopeError};
use crate::error::RuntimeError;
use crate::interpreter::{Flow, Interpreter};

/// A dynamically-typed value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Callable(Callable),
    Instance(Rc<Instance>),
}

impl Value {
    /// nil and `false` are falsy, as are `0` and `""`. Everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Callable(_) | Value::Instance(_) => true,
        }
    }

    /// nil → 0, booleans → 1/0, numbers → themselves. `None` for anything else.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Nil => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(*n),
            Value::Str(_) | Value::Callable(_) | Value::Instance(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Callable(Callable::Class(_)) => "class",
            Value::Callable(_) => "function",
            Value::Instance(_) => "instance",
        }
    }

    /// Display form with strings quoted, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            other => other.to_string(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

/// Same-type value equality; callables and instances compare by identity.
/// Values of different types are never equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a.same_as(b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::Str(s) => write!(f, "{}", s),

            Value::Callable(callable) => write!(f, "{}", callable),

            Value::Instance(instance) => write!(f, "{}", instance),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Callables
// ─────────────────────────────────────────────────────────────────────────────

/// Number of arguments a callable accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "{}+", n),
        }
    }
}

/// Anything that can appear to the left of `(...)`.
#[derive(Debug, Clone)]
pub enum Callable {
    Native(Rc<NativeFunction>),
    Function(Rc<UserFunction>),
    Method(Rc<BoundMethod>),
    Class(Rc<Class>),
}

impl Callable {
    pub fn arity(&self) -> Arity {
        match self {
            Callable::Native(native) => native.arity,
            Callable::Function(function) => function.arity(),
            Callable::Method(method) => method.function.arity(),
            Callable::Class(class) => class.arity(),
        }
    }

    /// Run the callable. Arity and call depth have already been checked by
    /// [`Interpreter::invoke`], which is the only caller.
    pub(crate) fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match self {
            Callable::Native(native) => (native.func)(interpreter, arguments),
            Callable::Function(function) => function.call(interpreter, arguments),
            Callable::Method(method) => method.function.call(interpreter, arguments),
            Callable::Class(class) => Class::instantiate(class, interpreter, arguments),
        }
    }

    fn same_as(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Function(a), Callable::Function(b)) => Rc::ptr_eq(a, b),
            (Callable::Method(a), Callable::Method(b)) => Rc::ptr_eq(a, b),
            (Callable::Class(a), Callable::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(native) => write!(f, "{}", native),
            Callable::Function(function) => write!(f, "{}", function),
            Callable::Method(method) => write!(f, "{}", method),
            Callable::Class(class) => write!(f, "{}", class),
        }
    }
}

pub type NativeFn = fn(&mut Interpreter, Vec<Value>) -> Result<Value, RuntimeError>;

/// Host-provided function with an opaque body.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: Arity,
    pub func: NativeFn,
}

impl fmt::Display for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn: {}>", self.name)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A function declared in source, with the scope it closed over.
pub struct UserFunction {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Scope,

    /// Set for functions declared in a local scope. Their closure does not
    /// hold their own name; each call declares it in the call scope.
    binds_own_name: bool,
}

impl UserFunction {
    pub fn new(declaration: Rc<FunctionDecl>, closure: Scope) -> Self {
        Self {
            declaration,
            closure,
            binds_own_name: false,
        }
    }

    pub fn self_binding(declaration: Rc<FunctionDecl>, closure: Scope) -> Self {
        Self {
            declaration,
            closure,
            binds_own_name: true,
        }
    }

    pub fn name(&self) -> &str {
        if self.declaration.is_anonymous() {
            ""
        } else {
            &self.declaration.name.lexeme
        }
    }

    pub fn arity(&self) -> Arity {
        Arity::Exactly(self.declaration.params.len())
    }

    /// Bind the arguments in a fresh child of the closure scope and run the
    /// body there. A `return` ends the call with its value; falling off the
    /// end yields nil.
    fn call(self: &Rc<Self>, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        let mut scope = Environment::with_enclosing(Rc::clone(&self.closure));

        if self.binds_own_name {
            scope.declare(self.name(), Value::Callable(Callable::Function(Rc::clone(self))));
        }

        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            scope.declare(&param.lexeme, argument);
        }

        match interpreter.execute_block(&self.declaration.body, scope.into_scope())? {
            Flow::Return(value) => {
                debug!("Function '{}' returned: {}", self.name(), value);
                Ok(value)
            }
            Flow::Normal => Ok(Value::Nil),
        }
    }
}

impl fmt::Display for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.declaration.is_anonymous() {
            write!(f, "<function>")
        } else {
            write!(f, "<function {}>", self.declaration.name.lexeme)
        }
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A function permanently paired with the instance `this` resolves to.
pub struct BoundMethod {
    pub function: Rc<UserFunction>,
    pub receiver: Rc<Instance>,
}

impl fmt::Display for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<method {} bound to {}>",
            self.function.name(),
            self.receiver
        )
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classes and instances
// ─────────────────────────────────────────────────────────────────────────────

/// Name of the constructor method.
pub const INITIALIZER: &str = "init";

pub struct Class {
    pub name: Rc<str>,

    /// Scope the field defaults were evaluated in and the methods closed over.
    pub environment: Scope,

    /// Field defaults, evaluated once when the class statement ran.
    pub fields: Environment,

    /// Methods other than `init`, by name.
    pub methods: BTreeMap<Rc<str>, Rc<UserFunction>>,

    pub initializer: Option<Rc<UserFunction>>,
}

impl Class {
    pub fn arity(&self) -> Arity {
        self.initializer
            .as_ref()
            .map_or(Arity::Exactly(0), |init| init.arity())
    }

    /// Build an instance: value-copy the field defaults, add the methods, mark
    /// every function-valued field as bound to the new instance, then run
    /// `init` (if any) and discard its result.
    fn instantiate(
        class: &Rc<Class>,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        debug!("Constructing instance of '{}'", class.name);

        let mut fields: Environment = class.fields.copy_by_value();

        for (name, method) in &class.methods {
            fields.declare(name, Value::Callable(Callable::Function(Rc::clone(method))));
        }

        let methods: BTreeSet<Rc<str>> = fields
            .entries()
            .into_iter()
            .filter(|(_, cell)| matches!(cell.get(), Value::Callable(Callable::Function(_))))
            .map(|(name, _)| name)
            .collect();

        debug!(
            "Instance of '{}' has {} bound function field(s)",
            class.name,
            methods.len()
        );

        let instance = Rc::new(Instance {
            class: Rc::clone(class),
            fields: RefCell::new(fields),
            methods: RefCell::new(methods),
            constructing: Cell::new(true),
        });

        if let Some(init) = &class.initializer {
            let constructor = Callable::Method(Rc::new(BoundMethod {
                function: Rc::clone(init),
                receiver: Rc::clone(&instance),
            }));

            let result = interpreter.invoke(&constructor, arguments);
            instance.constructing.set(false);
            result?;
        } else {
            instance.constructing.set(false);
        }

        Ok(Value::Instance(instance))
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class {}>", self.name)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// An object created by calling a class.
///
/// The set of fields is fixed once construction finishes: `init` may add
/// fields through `this.x = ...`, later code can only reassign them.
pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<Environment>,

    /// Fields that held a function when the instance was built. Reading one
    /// yields a method bound to this instance; the field table itself keeps
    /// the plain function and so never refers back to its instance.
    methods: RefCell<BTreeSet<Rc<str>>>,

    constructing: Cell<bool>,
}

impl Instance {
    pub fn get(self: &Rc<Self>, name: &str) -> Result<Value, ScopeError> {
        let value = self.fields.borrow().get(name)?;

        match value {
            Value::Callable(Callable::Function(function)) if self.methods.borrow().contains(name) => {
                Ok(Value::Callable(Callable::Method(Rc::new(BoundMethod {
                    function,
                    receiver: Rc::clone(self),
                }))))
            }
            other => Ok(other),
        }
    }

    /// Reassign a field. New fields are only accepted while `init` runs. The
    /// stored value is kept as given, so a function assigned here stays
    /// unbound.
    pub fn set(&self, name: &str, value: Value) -> Result<(), ScopeError> {
        let mut fields = self.fields.borrow_mut();

        if fields.contains_local(name) {
            fields.assign(name, value)?;
        } else if self.constructing.get() {
            fields.declare(name, value);
        } else {
            return Err(ScopeError::Undefined(name.to_string()));
        }

        self.methods.borrow_mut().remove(name);
        Ok(())
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}@{:x}>", self.class.name, self as *const Instance as usize)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
