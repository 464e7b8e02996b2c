//! Stack growth for the recursive stages.
//!
//! Parsing and evaluation recurse on the shape of the input, as do display
//! and comparison of nested values.  Each recursive step goes through
//! [`ensure_sufficient_stack`] so deep input grows the stack onto the heap
//! instead of overflowing.

/// Keep at least this much stack free before recursing.
const RED_ZONE: usize = 64 * 1024;

/// Size of each new stack segment.
const STACK_GROWTH: usize = 1024 * 1024;

/// Run `f`, first moving to a fresh stack segment if less than the red zone
/// remains.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_GROWTH, f)
}
