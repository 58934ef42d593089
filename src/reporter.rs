//! Diagnostics sink for static and runtime errors.
//!
//! The scanner, parser and session never print; they hand errors to a
//! [`Reporter`], which decides where they go.

use log::debug;

use crate::error::{ErrorKind, LoxError, RuntimeError};

pub trait Reporter {
    /// A scan or parse error. Static errors never stop the pass that found them.
    fn static_error(&mut self, error: &LoxError);

    /// A runtime, assertion or host failure that aborted a top-level statement.
    fn runtime_error(&mut self, error: &RuntimeError);
}

/// Prints to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn static_error(&mut self, error: &LoxError) {
        eprintln!("{}", error);
    }

    fn runtime_error(&mut self, error: &RuntimeError) {
        eprintln!("\n{}", error.kind.banner());
        eprint!("{}", error.snapshot);
        eprintln!("{}", error);
    }
}

/// A runtime error as recorded by [`CollectingReporter`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeReport {
    pub kind: ErrorKind,
    pub line: usize,

    /// The snapshot, rendered.
    pub snapshot: String,
}

/// Keeps everything it is given.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub static_errors: Vec<String>,
    pub runtime_errors: Vec<RuntimeReport>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.static_errors.is_empty() || !self.runtime_errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.static_errors.clear();
        self.runtime_errors.clear();
    }
}

impl Reporter for CollectingReporter {
    fn static_error(&mut self, error: &LoxError) {
        debug!("Collected static error: {}", error);
        self.static_errors.push(error.to_string());
    }

    fn runtime_error(&mut self, error: &RuntimeError) {
        debug!("Collected runtime error: {}", error.kind);
        self.runtime_errors.push(RuntimeReport {
            kind: error.kind.clone(),
            line: error.line,
            snapshot: error.snapshot.to_string(),
        });
    }
}
