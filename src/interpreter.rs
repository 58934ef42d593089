//! Tree-walking evaluator.
//!
//! The interpreter owns the live scope pointer, the call stack and the
//! execution trace. Statements return a [`Flow`]: `Flow::Return` carries a
//! `return` value outward until the enclosing call boundary turns it into the
//! call's result. Runtime errors travel on the `Err` side and are caught by
//! [`Interpreter::execute_top_level`].

use std::any::Any;
use std::io::{self, Write};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{AssignTarget, ClassDecl, Expr, LiteralValue, Stmt};
use crate::config::InterpreterConfig;
use crate::debug::{DebugSnapshot, TraceFrame};
use crate::environment::{Environment, Scope};
use crate::error::{ErrorKind, RuntimeError};
use crate::natives;
use crate::stack::ensure_sufficient_stack;
use crate::token::{Token, TokenType};
use crate::value::{Callable, Class, Instance, UserFunction, Value, INITIALIZER};

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,

    /// A `return` is unwinding towards the nearest call boundary.
    Return(Value),
}

/// Convenient alias for evaluation results.
pub type EvalResult<T> = Result<T, RuntimeError>;

pub struct Interpreter {
    globals: Scope,
    environment: Scope,
    call_stack: Vec<Callable>,
    trace: Vec<TraceFrame>,
    config: InterpreterConfig,
    output: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates an interpreter with default limits, printing to stdout, with
    /// the native functions already declared as globals.
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        info!(
            "Initializing Interpreter (max call depth {})",
            config.max_call_depth
        );

        let globals: Scope = Environment::new().into_scope();
        natives::register(&mut globals.borrow_mut());

        Self {
            environment: Rc::clone(&globals),
            globals,
            call_stack: Vec::new(),
            trace: Vec::new(),
            config,
            output: Box::new(io::stdout()),
        }
    }

    /// Redirect `print` output.
    pub fn with_output<W: Write + 'static>(mut self, output: W) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Read a global by name.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).ok()
    }

    /// Number of callables currently active.
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Line of the innermost statement being executed, 0 when idle.
    pub fn current_line(&self) -> usize {
        self.trace.last().map_or(0, |frame| frame.indicator.line)
    }

    /// Capture the current trace, call stack and scope.
    pub fn snapshot(&self) -> DebugSnapshot {
        DebugSnapshot::new(&self.trace, &self.call_stack, &self.environment.borrow())
    }

    /// Build a runtime error carrying a snapshot of the state right now.
    pub fn error(&self, kind: ErrorKind, line: usize) -> RuntimeError {
        RuntimeError::new(kind, line, self.snapshot())
    }

    // ───────────────────────────── statements ──────────────────────────────

    /// Execute a program, stopping at the first runtime error.
    pub fn interpret(&mut self, statements: &[Stmt]) -> EvalResult<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            self.execute_top_level(stmt)?;
        }

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Execute one top-level statement.
    ///
    /// Every failure is returned as a [`RuntimeError`]: errors raised by the
    /// program, a `return` that escaped its function, and Rust panics (as
    /// `HostFault`). On failure the scope, call stack and trace are reset so
    /// the globals stay usable for the next statement.
    pub fn execute_top_level(&mut self, stmt: &Stmt) -> EvalResult<()> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(stmt)));

        let result = match outcome {
            Ok(Ok(Flow::Normal)) => Ok(()),

            Ok(Ok(Flow::Return(_))) => Err(self.error(
                ErrorKind::HostFault("'return' escaped to the top level.".to_string()),
                stmt.indicator().line,
            )),

            Ok(Err(e)) => Err(e),

            Err(payload) => {
                let indicator: &Token = stmt.indicator();
                let message = format!(
                    "{} (while executing {} '{}' at line {})",
                    panic_message(payload.as_ref()),
                    stmt.kind_name(),
                    indicator.lexeme,
                    indicator.line
                );

                Err(self.error(ErrorKind::HostFault(message), self.current_line()))
            }
        };

        if result.is_err() {
            self.reset();
        }

        result
    }

    fn reset(&mut self) {
        debug!(
            "Resetting interpreter state (trace {}, call stack {})",
            self.trace.len(),
            self.call_stack.len()
        );

        self.environment = Rc::clone(&self.globals);
        self.call_stack.clear();
        self.trace.clear();
    }

    /// Execute one statement, recording it on the trace while it runs. An
    /// error passing back out gets this statement's source added to the
    /// matching frame of its snapshot.
    pub fn execute(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        self.trace.push(TraceFrame::new(stmt));

        let mut flow = ensure_sufficient_stack(|| self.run(stmt));
        self.trace.pop();

        if let Err(error) = &mut flow {
            error.snapshot.describe_frame(self.trace.len(), stmt);
        }

        flow
    }

    fn run(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Expression { expr, .. } => {
                debug!("Evaluating expression statement");
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }

            Stmt::Print { keyword, expr } => {
                let value = self.evaluate(expr)?;

                if let Err(e) = writeln!(self.output, "{}", value) {
                    return Err(self.error(ErrorKind::HostFault(e.to_string()), keyword.line));
                }

                debug!("Printed value: {}", value);
                Ok(Flow::Normal)
            }

            Stmt::Var(decl) => {
                let value = self.evaluate(&decl.initializer)?;
                debug!("Declaring variable '{}' = {}", decl.name.lexeme, value);

                self.environment.borrow_mut().declare(&decl.name.lexeme, value);
                Ok(Flow::Normal)
            }

            Stmt::Block { statements, .. } => {
                let scope = Environment::with_enclosing(Rc::clone(&self.environment));
                self.execute_block(statements, scope.into_scope())
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else {
                    self.execute(else_branch)
                }
            }

            Stmt::While {
                condition, body, ..
            } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body)? {
                        return Ok(Flow::Return(value));
                    }
                }

                Ok(Flow::Normal)
            }

            Stmt::Function(decl) => {
                let name: &str = &decl.name.lexeme;
                debug!("Defining function '{}'", name);

                let function = if self.at_top_level() {
                    UserFunction::new(Rc::clone(decl), Rc::clone(&self.globals))
                } else {
                    // The closure leaves out the function's own cell; every
                    // call binds the name again instead.
                    let mut closure = self.environment.borrow().copy_by_reference();
                    closure.remove(name);

                    UserFunction::self_binding(Rc::clone(decl), closure.into_scope())
                };

                self.environment.borrow_mut().declare(
                    name,
                    Value::Callable(Callable::Function(Rc::new(function))),
                );

                info!(
                    "Function '{}' defined with {} parameters",
                    name,
                    decl.params.len()
                );
                Ok(Flow::Normal)
            }

            Stmt::Class(decl) => {
                let class = self.build_class(decl)?;

                self.environment.borrow_mut().declare(
                    &decl.name.lexeme,
                    Value::Callable(Callable::Class(Rc::new(class))),
                );

                Ok(Flow::Normal)
            }

            Stmt::Return { value, .. } => {
                let value = self.evaluate(value)?;
                Ok(Flow::Return(value))
            }
        }
    }

    /// Run `statements` with `scope` as the current scope. The previous scope
    /// is restored whether the block finishes, returns or fails.
    pub fn execute_block(&mut self, statements: &[Stmt], scope: Scope) -> EvalResult<Flow> {
        debug!("Entering block with {} statements", statements.len());

        let previous = mem::replace(&mut self.environment, scope);
        let mut flow = Ok(Flow::Normal);

        for stmt in statements {
            match self.execute(stmt) {
                Ok(Flow::Normal) => {}
                other => {
                    flow = other;
                    break;
                }
            }
        }

        self.environment = previous;
        flow
    }

    fn at_top_level(&self) -> bool {
        Rc::ptr_eq(&self.environment, &self.globals)
    }

    /// Scope a new function closes over.
    ///
    /// At the top level this is the global scope itself, not a copy, so a
    /// top-level function sees globals declared after it (mutual recursion,
    /// later REPL lines). Anywhere else the scope is copied by reference: the
    /// function shares the cells that exist now and never sees names the
    /// scope declares later.
    fn capture(&self) -> Scope {
        if self.at_top_level() {
            Rc::clone(&self.globals)
        } else {
            self.environment.borrow().copy_by_reference().into_scope()
        }
    }

    /// Evaluate field defaults once in a fresh child scope and close the
    /// methods over that same scope.
    fn build_class(&mut self, decl: &ClassDecl) -> EvalResult<Class> {
        debug!("Defining class '{}'", decl.name.lexeme);

        let class_scope: Scope = Environment::with_enclosing(Rc::clone(&self.environment)).into_scope();
        let previous = mem::replace(&mut self.environment, Rc::clone(&class_scope));

        let mut fields = Environment::new();
        let mut failure = None;

        for field in &decl.fields {
            match self.evaluate(&field.initializer) {
                Ok(value) => fields.declare(&field.name.lexeme, value),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        self.environment = previous;

        if let Some(e) = failure {
            return Err(e);
        }

        let mut class = Class {
            name: Rc::clone(&decl.name.lexeme),
            environment: Rc::clone(&class_scope),
            fields,
            methods: Default::default(),
            initializer: None,
        };

        for method in &decl.methods {
            let function = Rc::new(UserFunction::new(Rc::clone(method), Rc::clone(&class_scope)));

            if &*method.name.lexeme == INITIALIZER {
                class.initializer = Some(function);
            } else {
                class.methods.insert(Rc::clone(&method.name.lexeme), function);
            }
        }

        info!(
            "Class '{}' defined with {} field(s) and {} method(s)",
            class.name,
            class.fields.len(),
            decl.methods.len()
        );

        Ok(class)
    }

    // ───────────────────────────── expressions ─────────────────────────────

    pub fn evaluate(&mut self, expr: &Expr) -> EvalResult<Value> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Empty => Ok(Value::Nil),

            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::Str(Rc::clone(s)),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Variable(name) => {
                let found = self.environment.borrow().get(&name.lexeme);

                found.map_err(|_| {
                    self.error(ErrorKind::NameNotFound(name.lexeme.to_string()), name.line)
                })
            }

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;

                match operator.token_type {
                    TokenType::MINUS => Ok(Value::Number(-self.number(operator, &right)?)),
                    TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),
                    _ => Err(self.unsupported(operator)),
                }
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;

                self.binary(operator, left, right)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;

                let decided = match operator.token_type {
                    TokenType::OR => left.is_truthy(),
                    _ => !left.is_truthy(),
                };

                if decided {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Assign { target, value, .. } => self.assign(target, value),

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let callable = match callee {
                    Value::Callable(callable) => callable,
                    other => {
                        return Err(
                            self.error(ErrorKind::NotCallable(other.describe()), paren.line)
                        )
                    }
                };

                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument)?);
                }

                self.call_value(&callable, values, paren.line)
            }

            Expr::Property { object, name } => {
                let instance = self.instance(object, name)?;
                let found = instance.get(&name.lexeme);

                found.map_err(|_| {
                    self.error(ErrorKind::UnknownField(name.lexeme.to_string()), name.line)
                })
            }

            Expr::This(keyword) => self.resolve_this(keyword),

            Expr::Function(decl) => {
                let function = UserFunction::new(Rc::clone(decl), self.capture());
                Ok(Value::Callable(Callable::Function(Rc::new(function))))
            }
        }
    }

    fn binary(&self, operator: &Token, left: Value, right: Value) -> EvalResult<Value> {
        if let (TokenType::PLUS, Value::Str(a), Value::Str(b)) =
            (operator.token_type, &left, &right)
        {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            return Ok(Value::Str(Rc::from(joined)));
        }

        match operator.token_type {
            TokenType::EQUAL_EQUAL => return Ok(Value::Bool(left == right)),
            TokenType::BANG_EQUAL => return Ok(Value::Bool(left != right)),
            _ => {}
        }

        let a = self.number(operator, &left)?;
        let b = self.number(operator, &right)?;

        Ok(match operator.token_type {
            TokenType::PLUS => Value::Number(a + b),
            TokenType::MINUS => Value::Number(a - b),
            TokenType::STAR => Value::Number(a * b),
            TokenType::SLASH => Value::Number(a / b),
            TokenType::GREATER => Value::Bool(a > b),
            TokenType::GREATER_EQUAL => Value::Bool(a >= b),
            TokenType::LESS => Value::Bool(a < b),
            TokenType::LESS_EQUAL => Value::Bool(a <= b),
            _ => return Err(self.unsupported(operator)),
        })
    }

    /// Numeric coercion of an operand, failing with `TypeMismatch`.
    fn number(&self, operator: &Token, operand: &Value) -> EvalResult<f64> {
        operand.to_number().ok_or_else(|| {
            self.error(
                ErrorKind::TypeMismatch {
                    operator: operator.lexeme.to_string(),
                    operand: operand.describe(),
                    type_name: operand.type_name(),
                },
                operator.line,
            )
        })
    }

    fn unsupported(&self, operator: &Token) -> RuntimeError {
        self.error(
            ErrorKind::HostFault(format!("Operator {:?} is not supported.", operator.token_type)),
            operator.line,
        )
    }

    fn assign(&mut self, target: &AssignTarget, value: &Expr) -> EvalResult<Value> {
        match target {
            AssignTarget::Variable(name) => {
                let value = self.evaluate(value)?;
                let assigned = self.environment.borrow().assign(&name.lexeme, value.clone());

                assigned.map_err(|_| {
                    self.error(ErrorKind::NameNotFound(name.lexeme.to_string()), name.line)
                })?;

                Ok(value)
            }

            AssignTarget::Property { object, name } => {
                let instance = self.instance(object, name)?;
                let value = self.evaluate(value)?;

                instance.set(&name.lexeme, value.clone()).map_err(|_| {
                    self.error(ErrorKind::UnknownField(name.lexeme.to_string()), name.line)
                })?;

                Ok(value)
            }
        }
    }

    /// Evaluate `object` and require an instance.
    fn instance(&mut self, object: &Expr, name: &Token) -> EvalResult<Rc<Instance>> {
        match self.evaluate(object)? {
            Value::Instance(instance) => Ok(instance),
            other => Err(self.error(ErrorKind::NotAnObject(other.describe()), name.line)),
        }
    }

    /// `this` is the receiver of the innermost active bound method.
    fn resolve_this(&self, keyword: &Token) -> EvalResult<Value> {
        self.call_stack
            .iter()
            .rev()
            .find_map(|callable| match callable {
                Callable::Method(method) => Some(Value::Instance(Rc::clone(&method.receiver))),
                _ => None,
            })
            .ok_or_else(|| self.error(ErrorKind::NameNotFound("this".to_string()), keyword.line))
    }

    // ──────────────────────────────── calls ────────────────────────────────

    /// Check the argument count, then [`invoke`](Self::invoke).
    pub fn call_value(
        &mut self,
        callable: &Callable,
        arguments: Vec<Value>,
        line: usize,
    ) -> EvalResult<Value> {
        let arity = callable.arity();

        if !arity.accepts(arguments.len()) {
            return Err(self.error(
                ErrorKind::ArityMismatch {
                    callee: callable.to_string(),
                    expected: arity.to_string(),
                    got: arguments.len(),
                },
                line,
            ));
        }

        self.invoke(callable, arguments)
    }

    /// Enforce the depth ceiling and keep `callable` on the call stack for
    /// the duration of the call. Every invocation goes through here.
    pub fn invoke(&mut self, callable: &Callable, arguments: Vec<Value>) -> EvalResult<Value> {
        if self.call_stack.len() >= self.config.max_call_depth {
            return Err(self.error(
                ErrorKind::RecursionLimitExceeded(self.config.max_call_depth),
                self.current_line(),
            ));
        }

        debug!(
            "Calling {} with {} argument(s) at depth {}",
            callable,
            arguments.len(),
            self.call_stack.len()
        );

        self.call_stack.push(callable.clone());
        let result = callable.call(self, arguments);
        self.call_stack.pop();

        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
