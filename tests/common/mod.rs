#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use rox::ast::Stmt;
use rox::config::InterpreterConfig;
use rox::error::ErrorKind;
use rox::interpreter::Interpreter;
use rox::parser::parse_program;
use rox::reporter::{CollectingReporter, RuntimeReport};
use rox::scanner::scan_tokens;
use rox::session::{RunStatus, Session};
use rox::token::Token;

/// `print` sink the test can read back after the interpreter is done with it.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Outcome {
    pub status: RunStatus,
    pub output: String,
    pub static_errors: Vec<String>,
    pub runtime_errors: Vec<RuntimeReport>,
}

impl Outcome {
    /// Kind of the single runtime error the run produced.
    pub fn runtime_kind(&self) -> &ErrorKind {
        assert_eq!(
            self.runtime_errors.len(),
            1,
            "expected exactly one runtime error, got {:?}",
            self.runtime_errors
        );
        &self.runtime_errors[0].kind
    }
}

pub fn session_with(config: InterpreterConfig) -> (Session<CollectingReporter>, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let interpreter = Interpreter::with_config(config).with_output(buffer.clone());

    (
        Session::with_reporter(interpreter, CollectingReporter::new()),
        buffer,
    )
}

pub fn run_with(src: &str, config: InterpreterConfig) -> Outcome {
    let (mut session, buffer) = session_with(config);
    let status = session.run_source(src);

    Outcome {
        status,
        output: buffer.contents(),
        static_errors: session.reporter().static_errors.clone(),
        runtime_errors: session.reporter().runtime_errors.clone(),
    }
}

pub fn run(src: &str) -> Outcome {
    run_with(src, InterpreterConfig::default())
}

pub fn tokens(src: &str) -> Vec<Token> {
    let (tokens, errors) = scan_tokens(src, &mut CollectingReporter::new());
    assert_eq!(errors, 0, "unexpected lexical errors in {:?}", src);
    tokens
}

pub fn parse(src: &str) -> (Vec<Stmt>, Vec<String>) {
    let mut reporter = CollectingReporter::new();
    let (tokens, _) = scan_tokens(src, &mut reporter);
    let (statements, _) = parse_program(&tokens, &mut reporter);

    (statements, reporter.static_errors)
}
