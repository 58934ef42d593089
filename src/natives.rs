//! Host functions injected into the global scope.

use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Instant;

use log::debug;

use crate::environment::Environment;
use crate::error::{ErrorKind, RuntimeError};
use crate::interpreter::Interpreter;
use crate::value::{Arity, Callable, NativeFunction, Value};

/// Declare every native function in `globals`.
pub fn register(globals: &mut Environment) {
    let natives = [
        NativeFunction {
            name: "clock",
            arity: Arity::Exactly(0),
            func: clock,
        },
        NativeFunction {
            name: "assert",
            arity: Arity::Exactly(1),
            func: assert,
        },
        NativeFunction {
            name: "assert_raises",
            arity: Arity::AtLeast(1),
            func: assert_raises,
        },
    ];

    for native in natives {
        debug!("Defining native function '{}'", native.name);
        globals.declare(native.name, Value::Callable(Callable::Native(Rc::new(native))));
    }
}

/// Seconds elapsed on a monotonic clock.
fn clock(_interpreter: &mut Interpreter, _arguments: Vec<Value>) -> Result<Value, RuntimeError> {
    static EPOCH: OnceLock<Instant> = OnceLock::new();

    let elapsed: f64 = EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64();
    debug!("Native function 'clock' returned: {}", elapsed);

    Ok(Value::Number(elapsed))
}

fn assert(interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
    if arguments.first().map_or(false, Value::is_truthy) {
        return Ok(Value::Nil);
    }

    Err(interpreter.error(
        ErrorKind::AssertionFailure("Assertion is false.".to_string()),
        interpreter.current_line(),
    ))
}

/// `assert_raises(f, args...)` calls `f(args...)` and succeeds only if that
/// call fails with an error of the language. Host faults are not swallowed.
fn assert_raises(interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
    let line: usize = interpreter.current_line();
    let mut arguments = arguments.into_iter();

    let target: Callable = match arguments.next() {
        Some(Value::Callable(callable)) => callable,
        _ => {
            return Err(interpreter.error(
                ErrorKind::AssertionFailure(
                    "Expect signature: assert_raises(function, args...)".to_string(),
                ),
                line,
            ))
        }
    };

    let rest: Vec<Value> = arguments.collect();
    let arity = target.arity();

    if !arity.accepts(rest.len()) {
        return Err(interpreter.error(
            ErrorKind::AssertionFailure(format!(
                "Expected {} arguments to {}, but got {}.",
                arity,
                target,
                rest.len()
            )),
            line,
        ));
    }

    match interpreter.invoke(&target, rest) {
        Ok(_) => Err(interpreter.error(
            ErrorKind::AssertionFailure("Expected an exception, but none were thrown.".to_string()),
            line,
        )),

        Err(e) if matches!(e.kind, ErrorKind::HostFault(_)) => Err(e),

        Err(e) => {
            debug!("assert_raises caught expected error: {}", e.kind);
            Ok(Value::Nil)
        }
    }
}
