//! Stack growth for the recursive parser and evaluator.
//!
//! Nested Lox calls recurse through several Rust frames each, so a program
//! near the call-depth ceiling can need more stack than a spawned thread
//! gets by default. Recursive entry points wrap their bodies in
//! [`ensure_sufficient_stack`], which moves onto a freshly allocated segment
//! when the current one runs low.

/// Grow when less than this much stack remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_recursion_does_not_overflow() {
        fn count(n: u64) -> u64 {
            ensure_sufficient_stack(|| if n == 0 { 0 } else { count(n - 1) + 1 })
        }

        assert_eq!(count(100_000), 100_000);
    }

    #[test]
    fn passes_results_through() {
        let result: Result<i32, &str> = ensure_sufficient_stack(|| Ok(7));
        assert_eq!(result, Ok(7));
    }
}
