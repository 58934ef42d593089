//! Program entry: whole-file batch runs and line-at-a-time REPL runs over one
//! persistent interpreter.

use log::info;

use crate::interpreter::Interpreter;
use crate::parser::parse_program;
use crate::reporter::{ConsoleReporter, Reporter};
use crate::scanner::scan_tokens;

/// Outcome of running one chunk of source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,

    /// A scan or parse error was reported; nothing was evaluated.
    StaticError,

    /// Evaluation stopped at a runtime error.
    RuntimeError,
}

impl RunStatus {
    /// Process exit code for a batch run (sysexits `EX_DATAERR` /
    /// `EX_SOFTWARE`).
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Ok => 0,
            RunStatus::StaticError => 65,
            RunStatus::RuntimeError => 70,
        }
    }
}

pub struct Session<R: Reporter = ConsoleReporter> {
    interpreter: Interpreter,
    reporter: R,
}

impl Session<ConsoleReporter> {
    pub fn new(interpreter: Interpreter) -> Self {
        Self::with_reporter(interpreter, ConsoleReporter)
    }
}

impl<R: Reporter> Session<R> {
    pub fn with_reporter(interpreter: Interpreter, reporter: R) -> Self {
        Self {
            interpreter,
            reporter,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut R {
        &mut self.reporter
    }

    /// Batch mode: report every static error, evaluate only if there were
    /// none, and stop at the first runtime error.
    pub fn run_source(&mut self, source: &str) -> RunStatus {
        info!("Running source ({} bytes)", source.len());
        self.run(source)
    }

    /// REPL mode: one line through the same pipeline. Globals persist between
    /// lines and a failing line leaves the session usable.
    pub fn run_line(&mut self, line: &str) -> RunStatus {
        self.run(line)
    }

    fn run(&mut self, source: &str) -> RunStatus {
        let (tokens, lex_errors) = scan_tokens(source, &mut self.reporter);
        let (statements, parse_errors) = parse_program(&tokens, &mut self.reporter);

        if lex_errors + parse_errors > 0 {
            info!(
                "Skipping evaluation: {} lexical and {} parse error(s)",
                lex_errors, parse_errors
            );
            return RunStatus::StaticError;
        }

        match self.interpreter.interpret(&statements) {
            Ok(()) => RunStatus::Ok,
            Err(e) => {
                self.reporter.runtime_error(&e);
                RunStatus::RuntimeError
            }
        }
    }
}
