//! Centralised error hierarchy for the interpreter.
//!
//! Two families live here:
//!
//! * [`LoxError`]: *static* failures (scanner, parser, I/O). These are
//!   recovered locally: the scanner and parser report them and keep going.
//! * [`RuntimeError`]: *dynamic* failures raised while evaluating. Each one
//!   carries an [`ErrorKind`] from the language's taxonomy plus the
//!   [`DebugSnapshot`] taken at the throw site.
//!
//! The module **does not** print diagnostics itself; see [`crate::reporter`].

use std::io;
use thiserror::Error;

use log::info;

use crate::debug::DebugSnapshot;

/// Static (pre-evaluation) error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,

        /// `" at 'x'"` or `" at end"`.
        location: String,

        line: usize,
    },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF‑8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(line: usize, location: String, msg: S) -> Self {
        let message: String = msg.into();

        info!(
            "Creating Parse error: line={}, location={}, msg={}",
            line, location, message
        );

        LoxError::Parse {
            message,
            location,
            line,
        }
    }
}

/// Crate‑wide `Result` alias for static errors.
pub type Result<T> = std::result::Result<T, LoxError>;

/// The runtime error taxonomy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("Undefined variable '{0}'.")]
    NameNotFound(String),

    #[error("Operator '{operator}' cannot be applied to {operand} (type: {type_name}).")]
    TypeMismatch {
        operator: String,
        operand: String,
        type_name: &'static str,
    },

    #[error("Expected {expected} arguments to {callee} but got {got}.")]
    ArityMismatch {
        callee: String,
        expected: String,
        got: usize,
    },

    #[error("Can only call functions and classes, not {0}.")]
    NotCallable(String),

    #[error("Only instances have properties, not {0}.")]
    NotAnObject(String),

    #[error("Undefined property '{0}'.")]
    UnknownField(String),

    #[error("Maximum recursion depth of {0} exceeded.")]
    RecursionLimitExceeded(usize),

    #[error("{0}")]
    AssertionFailure(String),

    #[error("Internal fault: {0}")]
    HostFault(String),
}

impl ErrorKind {
    /// Heading the console reporter prints above the snapshot.
    pub fn banner(&self) -> &'static str {
        match self {
            ErrorKind::AssertionFailure(_) => "[ASSERTION ERROR]",
            ErrorKind::HostFault(_) => "[FATAL]",
            _ => "[RUNTIME ERROR]",
        }
    }
}

/// A runtime failure, paired with the interpreter state at the throw site.
#[derive(Debug, Error)]
#[error("{kind}\n[line {line}]")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub line: usize,
    pub snapshot: Box<DebugSnapshot>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, line: usize, snapshot: DebugSnapshot) -> Self {
        info!("Creating Runtime error: line={}, kind={}", line, kind);

        Self {
            kind,
            line,
            snapshot: Box::new(snapshot),
        }
    }
}
