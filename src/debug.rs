//! Point-in-time capture of interpreter state for runtime diagnostics.

use std::fmt;

use crate::ast::Stmt;
use crate::ast_printer::AstPrinter;
use crate::environment::Environment;
use crate::token::Token;
use crate::value::Callable;

/// One statement that was mid-execution.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    /// Statement kind label, e.g. `PrintStmt`.
    pub kind: &'static str,
    pub indicator: Token,

    /// One-line rendering of the statement. Filled in only on the error
    /// path, while the error passes back out through the statement.
    pub statement: Option<String>,
}

impl TraceFrame {
    pub fn new(stmt: &Stmt) -> Self {
        Self {
            kind: stmt.kind_name(),
            indicator: stmt.indicator().clone(),
            statement: None,
        }
    }
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[line {}] {} '{}'",
            self.indicator.line, self.kind, self.indicator.lexeme
        )?;

        if let Some(statement) = &self.statement {
            write!(f, "\n    {}", statement)?;
        }

        Ok(())
    }
}

/// Execution trace, call stack and a value copy of the active scope, all
/// ordered outermost first. Never mutated after capture.
#[derive(Debug)]
pub struct DebugSnapshot {
    pub trace: Vec<TraceFrame>,
    pub call_stack: Vec<Callable>,
    pub environment: Environment,
}

impl DebugSnapshot {
    pub fn new(trace: &[TraceFrame], call_stack: &[Callable], environment: &Environment) -> Self {
        Self {
            trace: trace.to_vec(),
            call_stack: call_stack.to_vec(),
            environment: environment.copy_by_value(),
        }
    }

    /// Record the source of the frame at `depth`, unless it already has it.
    pub fn describe_frame(&mut self, depth: usize, stmt: &Stmt) {
        if let Some(frame) = self.trace.get_mut(depth) {
            if frame.statement.is_none() {
                frame.statement = Some(AstPrinter::summarize(stmt));
            }
        }
    }
}

impl fmt::Display for DebugSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.trace {
            writeln!(f, "{}", frame)?;
        }

        writeln!(f, "Call stack:")?;
        for callable in &self.call_stack {
            writeln!(f, "  {}", callable)?;
        }

        writeln!(f, "Environment:")?;
        write!(f, "{}", self.environment)
    }
}
