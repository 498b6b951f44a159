//! Insertion of a list before a position.
//!
//! Positions past the end append; negative positions count back from the
//! end (`-1` inserts before the last element).

use lazymat_core::prelude::*;

use crate::splice::splice;
use crate::traits::OperatorKind;

pub fn insert<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    index: i64,
    elements: Materializer<E>,
) -> Materializer<E> {
    splice(ctx, OperatorKind::Insert, list, index, index, elements)
}

pub fn insert_at<E: Element>(ctx: &Context, list: Materializer<E>, index: i64, element: E) -> Materializer<E> {
    insert(ctx, list, index, single(element))
}
