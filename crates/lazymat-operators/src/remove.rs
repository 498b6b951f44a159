//! Removal of a position range.
//!
//! `[start, end)` is clamped into the list; removing past the end is a no-op
//! and the result then behaves exactly like the upstream.

use lazymat_core::prelude::*;

use crate::splice::{single_span, splice};
use crate::traits::OperatorKind;

pub fn remove<E: Element>(ctx: &Context, list: Materializer<E>, start: i64, end: i64) -> Materializer<E> {
    splice(ctx, OperatorKind::Remove, list, start, end, empty())
}

/// Remove one position; `-1` is the last element.
pub fn remove_at<E: Element>(ctx: &Context, list: Materializer<E>, index: i64) -> Materializer<E> {
    let (start, end) = single_span(index);
    remove(ctx, list, start, end)
}
