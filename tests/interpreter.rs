use std::io::{self, Write};
use std::rc::Rc;

use rox::ast::{Expr, Stmt};
use rox::config::InterpreterConfig;
use rox::error::ErrorKind;
use rox::interpreter::Interpreter;
use rox::session::RunStatus;
use rox::token::{Token, TokenType};
use rox::value::{Callable, Value};

mod common;
use crate::common::{run, run_with, session_with};

macro_rules! assert_output {
    ($src:expr, $expected:expr) => {{
        let outcome = run($src);
        assert!(
            outcome.static_errors.is_empty() && outcome.runtime_errors.is_empty(),
            "Expected a clean run, got static {:?} / runtime {:?}",
            outcome.static_errors,
            outcome.runtime_errors
        );
        assert_eq!(outcome.output, $expected);
    }};
}

macro_rules! assert_runtime_error {
    ($src:expr, $kind:expr) => {{
        let outcome = run($src);
        assert_eq!(outcome.status, RunStatus::RuntimeError);
        assert_eq!(outcome.runtime_kind(), &$kind);
        outcome
    }};
}

// ───────────────────────────── expressions ─────────────────────────────

#[test]
fn test_arithmetic_precedence() {
    assert_output!("print 1 - 2 - 3; print 2 + 3 * 4;", "-4\n14\n");
    assert_output!("print (2 + 3) * 4; print 7 / 2; print -(1 + 1);", "20\n3.5\n-2\n");
}

#[test]
fn test_string_concatenation() {
    assert_output!("print \"meow \" + \"Tom\";", "meow Tom\n");
}

#[test]
fn test_numeric_coercion() {
    assert_output!("print true + 1; print nil + 1; print false * 3;", "2\n1\n0\n");
    assert_output!("print true > false; print nil < 1;", "true\ntrue\n");
}

#[test]
fn test_string_operands_do_not_coerce() {
    assert_runtime_error!(
        "print \"a\" + 1;",
        ErrorKind::TypeMismatch {
            operator: "+".to_string(),
            operand: "\"a\"".to_string(),
            type_name: "string",
        }
    );

    assert_runtime_error!(
        "print -\"a\";",
        ErrorKind::TypeMismatch {
            operator: "-".to_string(),
            operand: "\"a\"".to_string(),
            type_name: "string",
        }
    );
}

#[test]
fn test_division_by_zero_follows_ieee() {
    assert_output!("print 1 / 0; print -1 / 0;", "inf\n-inf\n");
}

#[test]
fn test_equality_never_fails() {
    assert_output!(
        "print nil == nil; print nil == false; print 1 == true; print \"a\" == \"a\"; print 1 != \"1\";",
        "true\nfalse\nfalse\ntrue\ntrue\n"
    );
}

#[test]
fn test_callables_compare_by_identity() {
    assert_output!(
        "fun f() {} fun g() {} print f == f; print f == g; print clock == clock;",
        "true\nfalse\ntrue\n"
    );
}

#[test]
fn test_logical_operators_return_operands() {
    assert_output!(
        "print nil or \"x\"; print 0 and 1; print 1 and 2; print \"\" or 0;",
        "x\n0\n2\n0\n"
    );
}

#[test]
fn test_logical_operators_short_circuit() {
    assert_output!(
        "var hits = 0; fun hit() { hits = hits + 1; return true; } \
         var a = false and hit(); var b = true or hit(); print hits;",
        "0\n"
    );
}

#[test]
fn test_truthiness() {
    assert_output!(
        "if (0) print \"yes\"; else print \"no\"; \
         if (\"\") print \"yes\"; else print \"no\"; \
         if (\"0\") print \"yes\"; else print \"no\"; \
         if (clock) print \"yes\"; else print \"no\"; \
         print !nil;",
        "no\nno\nyes\nyes\ntrue\n"
    );
}

// ───────────────────────────── variables and scope ─────────────────────

#[test]
fn test_block_shadowing() {
    assert_output!("var a = 1; { var a = a + 2; print a; } print a;", "3\n1\n");
}

#[test]
fn test_assignment_reaches_outer_scope() {
    assert_output!("var a = 1; { a = 5; } print a;", "5\n");
}

#[test]
fn test_undefined_variable() {
    assert_runtime_error!("print nope;", ErrorKind::NameNotFound("nope".to_string()));
    assert_runtime_error!("nope = 1;", ErrorKind::NameNotFound("nope".to_string()));
}

#[test]
fn test_block_scope_ends_with_block() {
    assert_runtime_error!("{ var inner = 1; } print inner;", ErrorKind::NameNotFound("inner".to_string()));
}

#[test]
fn test_while_and_for_loops() {
    assert_output!(
        "var i = 0; while (i < 3) { print i; i = i + 1; }",
        "0\n1\n2\n"
    );
    assert_output!("for (var j = 0; j < 3; j = j + 1) print j;", "0\n1\n2\n");
}

#[test]
fn test_for_variable_is_scoped_to_loop() {
    assert_runtime_error!(
        "for (var j = 0; j < 1; j = j + 1) {} print j;",
        ErrorKind::NameNotFound("j".to_string())
    );
}

// ───────────────────────────── functions ───────────────────────────────

#[test]
fn test_closure_counter_shares_cells() {
    assert_output!(
        "fun makeCounter() { var i = 0; fun inc() { i = i + 1; return i; } return inc; } \
         var c = makeCounter(); print c(); print c();",
        "1\n2\n"
    );
}

#[test]
fn test_independent_closures() {
    assert_output!(
        "fun makeCounter() { var i = 0; fun inc() { i = i + 1; return i; } return inc; } \
         var a = makeCounter(); var b = makeCounter(); a(); a(); print a(); print b();",
        "3\n1\n"
    );
}

#[test]
fn test_closure_sees_later_writes() {
    assert_output!(
        "fun outer() { var v = 1; fun get() { return v; } v = 5; return get; } print outer()();",
        "5\n"
    );
    assert_output!("var x = 1; fun get() { return x; } x = 2; print get();", "2\n");
}

#[test]
fn test_static_scoping() {
    assert_output!(
        "var a = \"global\"; fun show() { print a; } \
         fun caller() { var a = \"local\"; show(); } caller();",
        "global\n"
    );
}

#[test]
fn test_recursion() {
    assert_output!(
        "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(6);",
        "8\n"
    );
}

#[test]
fn test_mutual_recursion_between_globals() {
    assert_output!(
        "fun isEven(n) { if (n == 0) return true; return isOdd(n - 1); } \
         fun isOdd(n) { if (n == 0) return false; return isEven(n - 1); } \
         print isEven(10);",
        "true\n"
    );
}

#[test]
fn test_local_function_does_not_see_later_locals() {
    // A top-level function reads the live global scope ...
    assert_output!("fun show() { return later; } var later = 1; print show();", "1\n");

    // ... a local one only the cells that existed when it was declared.
    assert_runtime_error!(
        "fun outer() { fun show() { return later; } var later = 1; return show(); } outer();",
        ErrorKind::NameNotFound("later".to_string())
    );
}

#[test]
fn test_returned_local_function_is_not_kept_alive_by_its_scope() {
    let (mut session, buffer) = session_with(InterpreterConfig::default());

    session.run_line("fun make() { var n = 0; fun inc() { n = n + 1; return n; } return inc; }");
    session.run_line("var counter = make(); counter(); print counter();");
    assert_eq!(buffer.contents(), "2\n");

    let counter = match session.interpreter().get_global("counter") {
        Some(Value::Callable(Callable::Function(function))) => function,
        other => panic!("expected a function, got {:?}", other),
    };

    // The global cell and this handle.
    assert_eq!(Rc::strong_count(&counter), 2);
}

#[test]
fn test_local_function_recursion() {
    assert_output!(
        "fun outer() { fun count(n) { if (n == 0) return 0; return 1 + count(n - 1); } return count(4); } \
         print outer();",
        "4\n"
    );
}

#[test]
fn test_return_inside_loop_ends_function() {
    assert_output!(
        "fun first() { var i = 0; while (true) { i = i + 1; if (i == 3) return i; } } print first();",
        "3\n"
    );
}

#[test]
fn test_falling_off_end_returns_nil() {
    assert_output!("fun f() { 1; } print f(); fun g() { return; } print g();", "nil\nnil\n");
}

#[test]
fn test_anonymous_functions() {
    assert_output!(
        "var twice = fun (f, x) { return f(f(x)); }; print twice(fun (n) { return n * 3; }, 2);",
        "18\n"
    );
}

#[test]
fn test_arity_mismatch_is_checked_before_the_body() {
    let outcome = assert_runtime_error!(
        "var ran = false; fun f(a) { ran = true; } f(1, 2);",
        ErrorKind::ArityMismatch {
            callee: "<function f>".to_string(),
            expected: "1".to_string(),
            got: 2,
        }
    );
    assert_eq!(outcome.output, "");
}

#[test]
fn test_calling_a_non_callable() {
    assert_runtime_error!("\"x\"();", ErrorKind::NotCallable("\"x\"".to_string()));
    assert_runtime_error!("var n = 3; n();", ErrorKind::NotCallable("3".to_string()));
}

#[test]
fn test_recursion_limit() {
    let config = InterpreterConfig::default().with_max_call_depth(16);

    let outcome = run_with("fun down(n) { return down(n + 1); } down(0);", config);
    assert_eq!(outcome.runtime_kind(), &ErrorKind::RecursionLimitExceeded(16));

    let outcome = run_with(
        "fun depth(n) { if (n == 0) return 0; return depth(n - 1); } print depth(15);",
        config,
    );
    assert_eq!(outcome.output, "0\n");
}

#[test]
fn test_default_recursion_limit_on_small_thread_stack() {
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let outcome = run("fun down(n) { return down(n + 1); } down(0);");
            outcome.runtime_kind().clone()
        })
        .unwrap();

    assert_eq!(handle.join().unwrap(), ErrorKind::RecursionLimitExceeded(255));
}

#[test]
fn test_deeply_nested_source_on_small_thread_stack() {
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let depth = 1000;
            let src = format!(
                "print {}1{};\n{}print 2;{}",
                "(".repeat(depth),
                ")".repeat(depth),
                "{".repeat(depth),
                "}".repeat(depth)
            );
            run(&src).output
        })
        .unwrap();

    assert_eq!(handle.join().unwrap(), "1\n2\n");
}

#[test]
fn test_state_is_reset_after_recursion_error() {
    let (mut session, buffer) = session_with(InterpreterConfig::default().with_max_call_depth(8));

    assert_eq!(
        session.run_line("fun down(n) { return down(n + 1); }"),
        RunStatus::Ok
    );
    assert_eq!(session.run_line("down(0);"), RunStatus::RuntimeError);
    assert_eq!(session.interpreter().call_depth(), 0);

    assert_eq!(session.run_line("print 1 + 1;"), RunStatus::Ok);
    assert_eq!(buffer.contents(), "2\n");
}

// ───────────────────────────── classes ─────────────────────────────────

#[test]
fn test_class_construction_and_methods() {
    assert_output!(
        "class Cat { init(n) { this.name = n; } speak() { return \"meow \" + this.name; } } \
         print Cat(\"Tom\").speak();",
        "meow Tom\n"
    );
}

#[test]
fn test_instances_do_not_share_field_cells() {
    assert_output!(
        "class P { var x = 0; } var a = P(); var b = P(); a.x = 5; print b.x; print a.x;",
        "0\n5\n"
    );
}

#[test]
fn test_field_defaults_evaluated_once() {
    assert_output!(
        "var made = 0; fun next() { made = made + 1; return made; } \
         class C { var id = next(); } var a = C(); var b = C(); print a.id; print b.id; print made;",
        "1\n1\n1\n"
    );
}

#[test]
fn test_extracted_method_keeps_receiver() {
    assert_output!(
        "class Cat { init(n) { this.name = n; } speak() { return \"meow \" + this.name; } } \
         var s = Cat(\"Tom\").speak; print s();",
        "meow Tom\n"
    );
}

#[test]
fn test_function_valued_field_is_bound() {
    assert_output!(
        "class Box { var v = 7; var get = fun () { return this.v; }; } var b = Box(); var g = b.get; print g();",
        "7\n"
    );
}

#[test]
fn test_function_assigned_after_construction_stays_unbound() {
    assert_runtime_error!(
        "class B { m() { return 1; } } var b = B(); b.m = fun () { return this; }; b.m();",
        ErrorKind::NameNotFound("this".to_string())
    );
}

#[test]
fn test_dropped_instances_are_freed() {
    let (mut session, _buffer) = session_with(InterpreterConfig::default());

    assert_eq!(
        session.run_line("class Cat { var lives = 9; speak() { return this.lives; } }"),
        RunStatus::Ok
    );

    let cat = match session.interpreter().get_global("Cat") {
        Some(Value::Callable(Callable::Class(class))) => class,
        other => panic!("expected a class, got {:?}", other),
    };
    let before = Rc::strong_count(&cat);

    assert_eq!(
        session.run_line("for (var i = 0; i < 1000; i = i + 1) { var c = Cat(); c.speak(); }"),
        RunStatus::Ok
    );
    assert_eq!(Rc::strong_count(&cat), before);
}

#[test]
fn test_methods_see_each_other_through_this() {
    assert_output!(
        "class Counter { var n = 0; bump() { this.n = this.n + 1; return this; } } \
         var c = Counter(); c.bump().bump(); print c.n;",
        "2\n"
    );
}

#[test]
fn test_init_return_value_is_discarded() {
    let outcome = run("class A { init() { this.x = 1; return; } } var a = A(); print a.x; print A();");

    assert!(outcome.runtime_errors.is_empty(), "{:?}", outcome.runtime_errors);
    assert!(outcome.output.starts_with("1\n<A@"), "got {:?}", outcome.output);
}

#[test]
fn test_class_arity_follows_init() {
    assert_runtime_error!(
        "class A { init(a, b) {} } A(1);",
        ErrorKind::ArityMismatch {
            callee: "<class A>".to_string(),
            expected: "2".to_string(),
            got: 1,
        }
    );
    assert_runtime_error!(
        "class B {} B(1);",
        ErrorKind::ArityMismatch {
            callee: "<class B>".to_string(),
            expected: "0".to_string(),
            got: 1,
        }
    );
}

#[test]
fn test_fields_cannot_be_added_after_construction() {
    assert_runtime_error!(
        "class P { var x = 0; } var p = P(); p.y = 1;",
        ErrorKind::UnknownField("y".to_string())
    );
}

#[test]
fn test_unknown_field_read() {
    assert_runtime_error!("class P {} print P().nope;", ErrorKind::UnknownField("nope".to_string()));
}

#[test]
fn test_property_on_non_instance() {
    assert_runtime_error!("var a = 1; print a.b;", ErrorKind::NotAnObject("1".to_string()));
    assert_runtime_error!("var a = \"s\"; a.b = 2;", ErrorKind::NotAnObject("\"s\"".to_string()));
}

#[test]
fn test_this_outside_method() {
    assert_runtime_error!("print this;", ErrorKind::NameNotFound("this".to_string()));
    assert_runtime_error!("fun f() { return this; } f();", ErrorKind::NameNotFound("this".to_string()));
}

#[test]
fn test_value_display() {
    let outcome = run(
        "fun f() {} class Cat { meow() {} } var c = Cat(); \
         print clock; print f; print fun () {}; print Cat; print c; print c.meow;",
    );

    let lines: Vec<&str> = outcome.output.lines().collect();
    assert_eq!(lines[0], "<native fn: clock>");
    assert_eq!(lines[1], "<function f>");
    assert_eq!(lines[2], "<function>");
    assert_eq!(lines[3], "<class Cat>");
    assert!(lines[4].starts_with("<Cat@"), "got {}", lines[4]);
    assert_eq!(lines[5], format!("<method meow bound to {}>", lines[4]));
}

// ───────────────────────────── natives ─────────────────────────────────

#[test]
fn test_clock_is_monotonic() {
    assert_output!("var a = clock(); var b = clock(); print b >= a; print a >= 0;", "true\ntrue\n");
}

#[test]
fn test_assert() {
    assert_output!("assert(1 < 2); print \"ok\";", "ok\n");
    assert_runtime_error!("assert(1 > 2);", ErrorKind::AssertionFailure("Assertion is false.".to_string()));
}

#[test]
fn test_assert_raises_accepts_language_errors() {
    assert_output!("assert_raises(fun () { return 1 / \"x\"; }); print \"ok\";", "ok\n");
    assert_output!("assert_raises(fun (a) { return a.b; }, 1); print \"ok\";", "ok\n");
    assert_output!("assert_raises(fun () { assert(false); }); print \"ok\";", "ok\n");
}

#[test]
fn test_assert_raises_without_error_fails() {
    assert_runtime_error!(
        "assert_raises(fun () { return 1; });",
        ErrorKind::AssertionFailure("Expected an exception, but none were thrown.".to_string())
    );
}

#[test]
fn test_assert_raises_checks_its_arguments() {
    assert_runtime_error!(
        "assert_raises(1);",
        ErrorKind::AssertionFailure("Expect signature: assert_raises(function, args...)".to_string())
    );
    assert_runtime_error!(
        "fun f(a) {} assert_raises(f);",
        ErrorKind::AssertionFailure("Expected 1 arguments to <function f>, but got 0.".to_string())
    );
    assert_runtime_error!(
        "assert_raises();",
        ErrorKind::ArityMismatch {
            callee: "<native fn: assert_raises>".to_string(),
            expected: "1+".to_string(),
            got: 0,
        }
    );
}

#[test]
fn test_assert_raises_restores_state() {
    assert_output!(
        "var x = 1; \
         assert_raises(fun () { var x = 2; { var y = 3; return nope; } }); \
         print x;",
        "1\n"
    );
}

#[test]
fn test_assert_raises_catches_recursion_limit() {
    let config = InterpreterConfig::default().with_max_call_depth(12);
    let outcome = run_with(
        "fun down(n) { return down(n + 1); } assert_raises(down, 0); print \"survived\";",
        config,
    );

    assert!(outcome.runtime_errors.is_empty(), "{:?}", outcome.runtime_errors);
    assert_eq!(outcome.output, "survived\n");
}

// ───────────────────────────── diagnostics ─────────────────────────────

#[test]
fn test_error_line() {
    let outcome = run("print 1;\n\nprint nope;");

    assert_eq!(outcome.output, "1\n");
    assert_eq!(outcome.runtime_errors[0].line, 3);
}

#[test]
fn test_snapshot_captures_trace_call_stack_and_scope() {
    let outcome = run("fun f(p) {\n  var local = p + 1;\n  return nope;\n}\nf(41);");
    let snapshot = &outcome.runtime_errors[0].snapshot;

    assert!(snapshot.contains("[line 5] ExprStmt 'f'\n    Expr (call f 41.0)\n"), "{}", snapshot);
    assert!(snapshot.contains("[line 3] ReturnStmt 'return'\n    Return nope\n"), "{}", snapshot);
    assert!(snapshot.contains("Call stack:\n  <function f>\n"), "{}", snapshot);
    assert!(snapshot.contains("  local = 42\n"), "{}", snapshot);
    assert!(snapshot.contains("  p = 41\n"), "{}", snapshot);
}

#[test]
fn test_batch_run_stops_at_first_runtime_error() {
    let outcome = run("print 1; print nope; print 2;");

    assert_eq!(outcome.status, RunStatus::RuntimeError);
    assert_eq!(outcome.output, "1\n");
}

// ───────────────────────────── host faults ─────────────────────────────

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Exploding;

impl Write for Exploding {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        panic!("sink exploded");
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn program(src: &str) -> Vec<Stmt> {
    let (statements, errors) = common::parse(src);
    assert!(errors.is_empty(), "{:?}", errors);
    statements
}

#[test]
fn test_write_failure_is_a_host_fault() {
    let mut interpreter = Interpreter::new().with_output(BrokenPipe);
    let err = interpreter.interpret(&program("print 1;")).unwrap_err();

    assert_eq!(err.kind, ErrorKind::HostFault("sink closed".to_string()));
}

#[test]
fn test_assert_raises_does_not_swallow_host_faults() {
    let mut interpreter = Interpreter::new().with_output(BrokenPipe);
    let err = interpreter
        .interpret(&program("assert_raises(fun () { print 1; });"))
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::HostFault(_)));
}

#[test]
fn test_panic_becomes_host_fault_and_state_is_reset() {
    let mut interpreter = Interpreter::new().with_output(Exploding);
    let statements = program("var kept = 1; fun f() { { print kept; } } f();");

    let err = interpreter.interpret(&statements).unwrap_err();

    match &err.kind {
        ErrorKind::HostFault(message) => {
            assert!(message.contains("sink exploded"), "{}", message);
            assert!(message.contains("ExprStmt 'f'"), "{}", message);
        }
        other => panic!("expected host fault, got {:?}", other),
    }

    assert_eq!(err.snapshot.call_stack.len(), 1);
    assert_eq!(interpreter.call_depth(), 0);
    assert_eq!(interpreter.get_global("kept"), Some(Value::Number(1.0)));

    assert!(interpreter.interpret(&program("var after = kept + 1;")).is_ok());
    assert_eq!(interpreter.get_global("after"), Some(Value::Number(2.0)));
}

#[test]
fn test_return_escaping_to_top_level_is_a_host_fault() {
    let mut interpreter = Interpreter::new();
    let stmt = Stmt::Return {
        keyword: Token::new(TokenType::RETURN, "return", None, 1),
        value: Expr::Literal(rox::ast::LiteralValue::Str(Rc::from("leak"))),
    };

    let err = interpreter.execute_top_level(&stmt).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::HostFault(_)));
}
