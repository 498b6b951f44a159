//! Overflow-checked index and size arithmetic.
//!
//! Sizes and indices are `usize` values that must fit the non-negative 32-bit
//! range (`0..=MAX_INDEX`). Every combination is computed in `u64`/`i64` first
//! and only then narrowed; anything out of range becomes [`Error::Overflow`]
//! instead of wrapping.

use crate::error::{Error, Result};

/// Largest representable size or index.
pub const MAX_INDEX: usize = i32::MAX as usize;

/// Sentinel bound meaning "through the end of the upstream, whatever its size".
pub const UNBOUNDED: usize = usize::MAX;

fn narrow(value: u64, what: &str) -> Result<usize> {
    if value > MAX_INDEX as u64 {
        return Err(Error::Overflow(format!("{what} {value} exceeds {MAX_INDEX}")));
    }
    Ok(value as usize)
}

/// `a + b`, failing if the result leaves the representable range.
pub fn checked_sum(a: usize, b: usize) -> Result<usize> {
    narrow(a as u64 + b as u64, "sum")
}

/// `a - b` for sizes; a negative result is an invariant violation, not a wrap.
pub fn checked_difference(a: usize, b: usize) -> Result<usize> {
    a.checked_sub(b)
        .ok_or_else(|| Error::Invariant(format!("size difference {a} - {b} is negative")))
}

/// `a * b`, failing if the result leaves the representable range.
pub fn checked_product(a: usize, b: usize) -> Result<usize> {
    narrow((a as u64).saturating_mul(b as u64), "product")
}

/// Reject indices that could never address an element.
pub fn check_index(index: usize) -> Result<usize> {
    if index > MAX_INDEX {
        return Err(Error::IndexOutOfRange(format!(
            "index {index} exceeds {MAX_INDEX}"
        )));
    }
    Ok(index)
}

/// `ceil(a / b)`; `b` must be positive.
pub fn ceil_div(a: usize, b: usize) -> usize {
    debug_assert!(b > 0);
    a / b + usize::from(a % b != 0)
}

/// Resolve a possibly negative bound against a known `size` and clamp it into
/// `[0, size]`. Negative values count back from the end.
pub fn normalize_bound(bound: i64, size: usize) -> usize {
    let size_i = size as i64;
    let resolved = if bound < 0 { size_i + bound } else { bound };
    resolved.clamp(0, size_i) as usize
}

/// Convert a non-negative bound to an index without knowing the size.
/// Values past [`MAX_INDEX`] mean "unbounded".
pub fn absolute_bound(bound: i64) -> Option<usize> {
    if bound < 0 {
        None
    } else if bound as u64 > MAX_INDEX as u64 {
        Some(UNBOUNDED)
    } else {
        Some(bound as usize)
    }
}
