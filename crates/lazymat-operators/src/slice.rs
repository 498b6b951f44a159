//! Contiguous sub-range `[start, end)` of an upstream.
//!
//! Negative bounds count back from the end and force the upstream size to be
//! resolved first. After normalization the bounds are clamped into
//! `[0, size]`; an empty range collapses to an empty leaf and the full range
//! to the upstream itself, so neither allocates a slice state.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lazymat_core::index::{absolute_bound, check_index, checked_sum, normalize_bound};
use lazymat_core::prelude::*;
use lazymat_core::traverse::{
    next_while_segments, prev_while_segments, BackSegment, Plan, RangeCollector, Segment,
    SegmentEnd,
};

use crate::traits::{settled_size, OpBase, OperatorKind};

pub fn slice<E: Element>(ctx: &Context, list: Materializer<E>, start: i64, end: i64) -> Materializer<E> {
    match (absolute_bound(start), absolute_bound(end)) {
        (Some(start), Some(end)) => slice_absolute(ctx, list, start, end),
        _ => StatefulMaterializer::build(OperatorKind::Slice.name(), |holder| {
            let resolve_ctx = ctx.clone();
            let resolve_holder = holder.clone();
            let upstreams = vec![Rc::clone(&list)];
            Rc::new(ResolvingListMaterializer::new(
                ctx.clone(),
                holder,
                upstreams,
                move |done| {
                    let source = Rc::clone(&list);
                    source.materialize_size(Box::new(move |size| {
                        done(size.map(|n| {
                            let s = normalize_bound(start, n);
                            let e = normalize_bound(end, n);
                            SliceState::initial(&resolve_ctx, resolve_holder, list, s, e)
                        }))
                    }));
                },
            ))
        }),
    }
}

/// The first `count` elements.
pub fn take<E: Element>(ctx: &Context, list: Materializer<E>, count: usize) -> Materializer<E> {
    slice_absolute(ctx, list, 0, bound(count))
}

/// Everything after the first `count` elements.
pub fn skip<E: Element>(ctx: &Context, list: Materializer<E>, count: usize) -> Materializer<E> {
    slice_absolute(ctx, list, bound(count), UNBOUNDED)
}

fn bound(value: usize) -> usize {
    if value > MAX_INDEX {
        UNBOUNDED
    } else {
        value
    }
}

fn slice_absolute<E: Element>(ctx: &Context, list: Materializer<E>, start: usize, end: usize) -> Materializer<E> {
    if end <= start {
        return empty();
    }
    if is_full(&list, start, end) {
        return list;
    }
    StatefulMaterializer::build(OperatorKind::Slice.name(), |holder| {
        SliceState::initial(ctx, holder, list, start, end)
    })
}

fn is_full<E: Element>(list: &Materializer<E>, start: usize, end: usize) -> bool {
    start == 0 && (end == UNBOUNDED || list.known_size().is_some_and(|n| end >= n))
}

struct SliceState<E: Element> {
    inner: Rc<SliceInner<E>>,
}

struct SliceInner<E: Element> {
    base: OpBase<E>,
    wrapped: Materializer<E>,
    start: usize,
    end: usize,
    size: Cell<Option<usize>>,
    weights: QueryWeights,
    list: RefCell<Waiters<Rc<Vec<E>>>>,
}

impl<E: Element> SliceState<E> {
    fn initial(
        ctx: &Context,
        holder: StateRef<E>,
        wrapped: Materializer<E>,
        start: usize,
        end: usize,
    ) -> Materializer<E> {
        if end <= start {
            return empty();
        }
        if is_full(&wrapped, start, end) {
            return wrapped;
        }
        Rc::new(SliceState {
            inner: Rc::new(SliceInner {
                base: OpBase::new(ctx, holder),
                size: Cell::new(wrapped.known_size().map(|n| end.min(n) - start.min(n))),
                weights: wrapped.query_weights(),
                wrapped,
                start,
                end,
                list: RefCell::new(Waiters::new()),
            }),
        })
    }
}

impl<E: Element> SliceInner<E> {
    /// Slice length for an upstream of size `n`.
    fn len_for(&self, n: usize) -> usize {
        let size = self.end.min(n) - self.start.min(n);
        self.size.set(Some(size));
        size
    }

    /// Length when the upstream is known to reach `end`.
    fn full_len(&self) -> usize {
        let size = self.end - self.start;
        self.size.set(Some(size));
        size
    }

    fn known(&self) -> Option<usize> {
        if let Some(size) = self.size.get() {
            return Some(size);
        }
        settled_size(&self.wrapped).map(|n| self.len_for(n))
    }

    fn size(self: &Rc<Self>, callback: ValueCallback<usize>) {
        if let Some(size) = self.known() {
            callback(Ok(size));
            return;
        }
        let this = Rc::clone(self);
        if self.end == UNBOUNDED {
            self.base.size_of(
                &self.wrapped,
                Box::new(move |n| callback(n.map(|n| this.len_for(n)))),
            );
            return;
        }
        self.base.element_of(
            &self.wrapped,
            self.end - 1,
            Box::new(move |answer| {
                callback(answer.map(|answer| match answer {
                    Indexed::Element { .. } => this.full_len(),
                    Indexed::End { size } => this.len_for(size),
                }))
            }),
        );
    }

    fn element(self: &Rc<Self>, index: usize, callback: IndexedCallback<E>) {
        if let Err(error) = check_index(index) {
            callback(Err(error));
            return;
        }
        if let Some(size) = self.size.get().filter(|size| index >= *size) {
            callback(Ok(Indexed::End { size }));
            return;
        }
        let upstream_index = match checked_sum(self.start, index) {
            Ok(i) if i < self.end => i,
            _ => {
                self.size(Box::new(move |size| {
                    callback(size.map(|size| Indexed::End { size }))
                }));
                return;
            }
        };
        let this = Rc::clone(self);
        self.base.element_of(
            &self.wrapped,
            upstream_index,
            Box::new(move |answer| {
                callback(answer.map(|answer| match answer {
                    Indexed::Element { element, .. } => Indexed::Element { index, element },
                    Indexed::End { size } => Indexed::End {
                        size: this.len_for(size),
                    },
                }))
            }),
        );
    }

    fn elements(self: &Rc<Self>, callback: ValueCallback<Rc<Vec<E>>>) {
        if !self.list.borrow_mut().register(callback) {
            return;
        }
        let this = Rc::clone(self);
        self.wrapped.materialize_next_while(
            self.start,
            RangeCollector::boxed(
                self.end,
                Box::new(move |collected| {
                    let outcome = collected.map(|collected| {
                        match collected.size {
                            Some(n) => this.len_for(n),
                            None => this.full_len(),
                        };
                        Rc::new(collected.items)
                    });
                    let outcome = this.base.holder.settle(&this.base.ctx, outcome);
                    let drained = this.list.borrow_mut().take();
                    drained.deliver(outcome);
                }),
            ),
        );
    }

    fn next_while(self: &Rc<Self>, from: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        let upstream_from = self.start.saturating_add(from).min(MAX_INDEX);
        let first = Plan::Next(Segment::new(
            Rc::clone(&self.wrapped),
            upstream_from,
            self.end,
            from,
        ));
        let this = Rc::clone(self);
        next_while_segments(
            &self.base.ctx,
            self.base.chain(),
            first,
            Box::new(move |end| match end {
                SegmentEnd::Crossed => Plan::Finish(this.full_len()),
                SegmentEnd::Exhausted { size } => Plan::Finish(this.len_for(size)),
            }),
            predicate,
        );
    }

    fn prev_while(self: &Rc<Self>, from: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        let this = Rc::clone(self);
        self.size(Box::new(move |size| {
            let size = match size {
                Ok(size) => size,
                Err(error) => return predicate.error(error),
            };
            if size == 0 {
                return predicate.complete(0);
            }
            let top = from.min(size - 1);
            let segment = BackSegment {
                source: Rc::clone(&this.wrapped),
                from: this.start + top,
                down_to: this.start,
                output: top,
            };
            prev_while_segments(&this.base.ctx, this.base.chain(), vec![segment], size, predicate);
        }));
    }
}

impl<E: Element> ListMaterializer<E> for SliceState<E> {
    fn known_size(&self) -> Option<usize> {
        self.inner.known()
    }

    fn status(&self) -> Status {
        Status::Running
    }

    fn materialize_cancel(&self, cause: &Error) {
        self.inner.wrapped.materialize_cancel(cause);
        let drained = self.inner.list.borrow_mut().take();
        drained.deliver(Err(cause.clone()));
    }

    fn materialize_element(&self, index: usize, callback: IndexedCallback<E>) {
        let callback = self.inner.base.ctx.guard(callback);
        self.inner.element(index, callback)
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<E>>>) {
        self.inner.elements(callback)
    }

    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.inner.next_while(index, predicate)
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.inner.prev_while(index, predicate)
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        let callback = self.inner.base.ctx.guard(callback);
        self.inner.size(callback)
    }

    fn weight_element(&self) -> Weight {
        self.inner.weights.element.plus(Weight::ONE)
    }

    fn weight_elements(&self) -> Weight {
        self.inner.weights.next_while
    }

    fn weight_next_while(&self) -> Weight {
        self.inner.weights.next_while
    }

    fn weight_prev_while(&self) -> Weight {
        self.weight_size().plus(self.inner.weights.prev_while)
    }

    fn weight_size(&self) -> Weight {
        let weights = &self.inner.weights;
        weights.element.max(weights.size).plus(Weight::ONE)
    }
}
