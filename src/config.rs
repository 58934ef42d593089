//! Interpreter tuning knobs.

/// Deepest call nesting allowed before a call fails with
/// `RecursionLimitExceeded`.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Maximum number of simultaneously active callables.
    pub max_call_depth: usize,
}

impl InterpreterConfig {
    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
