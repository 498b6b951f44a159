//! Concatenation: `head ++ tail`, plus single-element append/prepend.

use lazymat_core::prelude::*;

use crate::splice::splice_absolute;
use crate::traits::OperatorKind;

/// `head ++ tail`. Neither size needs to be known.
pub fn concat<E: Element>(ctx: &Context, head: Materializer<E>, tail: Materializer<E>) -> Materializer<E> {
    if head.known_size() == Some(0) {
        return tail;
    }
    splice_absolute(ctx, OperatorKind::Concat, head, UNBOUNDED, UNBOUNDED, tail)
}

/// Concatenate any number of lists left to right.
pub fn concat_all<E: Element>(
    ctx: &Context,
    lists: impl IntoIterator<Item = Materializer<E>>,
) -> Materializer<E> {
    lists
        .into_iter()
        .reduce(|acc, next| concat(ctx, acc, next))
        .unwrap_or_else(empty)
}

pub fn append<E: Element>(ctx: &Context, list: Materializer<E>, element: E) -> Materializer<E> {
    concat(ctx, list, single(element))
}

/// `head ++ list`.
pub fn prepend<E: Element>(ctx: &Context, list: Materializer<E>, head: Materializer<E>) -> Materializer<E> {
    concat(ctx, head, list)
}

pub fn prepend_one<E: Element>(ctx: &Context, list: Materializer<E>, element: E) -> Materializer<E> {
    prepend(ctx, list, single(element))
}
