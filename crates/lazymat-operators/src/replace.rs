//! Replacement of a position range by another list.

use lazymat_core::prelude::*;

use crate::splice::{single_span, splice};
use crate::traits::OperatorKind;

/// `list[..start] ++ patch ++ list[end..]`, bounds clamped into the list.
pub fn replace<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    start: i64,
    end: i64,
    patch: Materializer<E>,
) -> Materializer<E> {
    splice(ctx, OperatorKind::Replace, list, start, end, patch)
}

/// Replace one position; past the end the element is appended.
pub fn replace_at<E: Element>(ctx: &Context, list: Materializer<E>, index: i64, element: E) -> Materializer<E> {
    let (start, end) = single_span(index);
    replace(ctx, list, start, end, single(element))
}
