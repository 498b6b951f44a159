//! Positional edit engine shared by concat, insert, remove and replace.
//!
//! The result is `wrapped[..s] ++ patch ++ wrapped[e..]` where, for an
//! upstream of size `n`, `s = min(start, n)` and `e = min(max(end, start), n)`.
//! Concatenation is the edit at `start = end = UNBOUNDED`, insertion has
//! `start == end`, removal has an empty patch.
//!
//! Nothing is resolved up front. Element queries translate indices through
//! head, patch and tail lazily; traversals are stitched from up to three
//! upstream segments; the sizes of both operands are cached as soon as any
//! answer reveals them. An edit whose effect turns out to be empty swaps the
//! chassis to the wrapped upstream.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lazymat_core::index::{absolute_bound, check_index, checked_sum, normalize_bound};
use lazymat_core::prelude::*;
use lazymat_core::traverse::{
    next_while_segments, prev_while_segments, BackSegment, Plan, Segment, SegmentEnd,
};
use lazymat_core::waiters::Waiters;

use crate::traits::{settled_size, OpBase, OperatorKind};

/// Build an edit whose bounds may count back from the end. Negative bounds
/// are resolved against the upstream size before any other work happens.
pub(crate) fn splice<E: Element>(
    ctx: &Context,
    kind: OperatorKind,
    wrapped: Materializer<E>,
    start: i64,
    end: i64,
    patch: Materializer<E>,
) -> Materializer<E> {
    match (absolute_bound(start), absolute_bound(end)) {
        (Some(start), Some(end)) => splice_absolute(ctx, kind, wrapped, start, end, patch),
        _ => StatefulMaterializer::build(kind.name(), |holder| {
            let ctx = ctx.clone();
            let upstreams = vec![Rc::clone(&wrapped), Rc::clone(&patch)];
            let resolve_ctx = ctx.clone();
            let resolve_holder = holder.clone();
            Rc::new(ResolvingListMaterializer::new(
                ctx,
                holder,
                upstreams,
                move |done| {
                    let source = Rc::clone(&wrapped);
                    source.materialize_size(Box::new(move |size| {
                        done(size.map(|n| {
                            let s = normalize_bound(start, n);
                            let e = normalize_bound(end, n).max(s);
                            SpliceState::into_state(&resolve_ctx, resolve_holder, wrapped, s, e, patch)
                        }))
                    }));
                },
            ))
        }),
    }
}

/// Build an edit with non-negative bounds; [`UNBOUNDED`] means "through the
/// end of the upstream".
pub(crate) fn splice_absolute<E: Element>(
    ctx: &Context,
    kind: OperatorKind,
    wrapped: Materializer<E>,
    start: usize,
    end: usize,
    patch: Materializer<E>,
) -> Materializer<E> {
    let end = end.max(start);
    if start == end && patch.known_size() == Some(0) {
        return wrapped;
    }
    StatefulMaterializer::build(kind.name(), |holder| {
        SpliceState::into_state(ctx, holder, wrapped, start, end, patch)
    })
}

/// Cached size of `upstream`, filled in once it settles.
fn known<E: Element>(cell: &Cell<Option<usize>>, upstream: &Materializer<E>) -> Option<usize> {
    if let Some(size) = cell.get() {
        return Some(size);
    }
    let size = settled_size(upstream);
    cell.set(size);
    size
}

/// Bounds covering exactly one position; `-1` is the last element.
pub(crate) fn single_span(index: i64) -> (i64, i64) {
    let end = index.saturating_add(1);
    if index < 0 && end == 0 {
        (index, i64::MAX)
    } else {
        (index, end)
    }
}

pub(crate) struct SpliceState<E: Element> {
    inner: Rc<SpliceInner<E>>,
}

struct SpliceInner<E: Element> {
    base: OpBase<E>,
    wrapped: Materializer<E>,
    patch: Materializer<E>,
    start: usize,
    end: usize,
    wrapped_size: Cell<Option<usize>>,
    patch_size: Cell<Option<usize>>,
    weights: QueryWeights,
    list: RefCell<Waiters<Rc<Vec<E>>>>,
}

#[derive(Clone, Copy)]
enum Phase {
    Head,
    Patch { s: usize },
    Tail { p: usize },
}

impl<E: Element> SpliceState<E> {
    /// The state an edit starts in: the wrapped upstream itself when the edit
    /// is known to change nothing.
    pub(crate) fn into_state(
        ctx: &Context,
        holder: StateRef<E>,
        wrapped: Materializer<E>,
        start: usize,
        end: usize,
        patch: Materializer<E>,
    ) -> Materializer<E> {
        let end = end.max(start);
        if start == end && patch.known_size() == Some(0) {
            return wrapped;
        }
        let weights = wrapped.query_weights().plus(patch.query_weights());
        Rc::new(SpliceState {
            inner: Rc::new(SpliceInner {
                base: OpBase::new(ctx, holder),
                wrapped_size: Cell::new(wrapped.known_size()),
                patch_size: Cell::new(patch.known_size()),
                weights,
                wrapped,
                patch,
                start,
                end,
                list: RefCell::new(Waiters::new()),
            }),
        })
    }
}

impl<E: Element> SpliceInner<E> {
    fn n(&self) -> Option<usize> {
        known(&self.wrapped_size, &self.wrapped)
    }

    fn p(&self) -> Option<usize> {
        known(&self.patch_size, &self.patch)
    }

    fn observe_wrapped(&self, n: usize) {
        self.wrapped_size.set(Some(n));
        self.maybe_unwrap();
    }

    fn observe_patch(&self, p: usize) {
        self.patch_size.set(Some(p));
        self.maybe_unwrap();
    }

    /// Zero-effect edit: hand every later query straight to the upstream.
    fn maybe_unwrap(&self) {
        if let (Some(n), Some(0)) = (self.n(), self.p()) {
            if self.end.min(n) == self.start.min(n) {
                self.base.holder.set_state(Rc::clone(&self.wrapped));
            }
        }
    }

    fn combined(&self, n: usize, p: usize) -> Result<usize> {
        let s = self.start.min(n);
        let e = self.end.min(n);
        checked_sum(n - (e - s), p)
    }

    fn wrapped_size(self: &Rc<Self>, callback: ValueCallback<usize>) {
        if let Some(n) = self.n() {
            callback(Ok(n));
            return;
        }
        let this = Rc::clone(self);
        self.base.size_of(
            &self.wrapped,
            Box::new(move |size| {
                if let Ok(n) = size {
                    this.observe_wrapped(n);
                }
                callback(size)
            }),
        );
    }

    fn patch_size(self: &Rc<Self>, callback: ValueCallback<usize>) {
        if let Some(p) = self.p() {
            callback(Ok(p));
            return;
        }
        let this = Rc::clone(self);
        self.base.size_of(
            &self.patch,
            Box::new(move |size| {
                if let Ok(p) = size {
                    this.observe_patch(p);
                }
                callback(size)
            }),
        );
    }

    fn sizes(self: &Rc<Self>, callback: ValueCallback<(usize, usize)>) {
        let this = Rc::clone(self);
        self.wrapped_size(Box::new(move |n| match n {
            Ok(n) => this.patch_size(Box::new(move |p| callback(p.map(|p| (n, p))))),
            Err(error) => callback(Err(error)),
        }));
    }

    /// Resolve `s`, the number of head elements, without resolving `n` when
    /// the upstream is long enough.
    fn head_len(self: &Rc<Self>, callback: ValueCallback<usize>) {
        let start = self.start;
        if let Some(n) = self.n() {
            callback(Ok(start.min(n)));
            return;
        }
        if start == 0 {
            callback(Ok(0));
            return;
        }
        if check_index(start).is_err() {
            self.wrapped_size(callback);
            return;
        }
        let this = Rc::clone(self);
        self.base.element_of(
            &self.wrapped,
            start - 1,
            Box::new(move |answer| match answer {
                Ok(Indexed::Element { .. }) => callback(Ok(start)),
                Ok(Indexed::End { size }) => {
                    this.observe_wrapped(size);
                    callback(Ok(size.min(start)))
                }
                Err(error) => callback(Err(error)),
            }),
        );
    }

    fn element(self: &Rc<Self>, index: usize, callback: IndexedCallback<E>) {
        if let Err(error) = check_index(index) {
            callback(Err(error));
            return;
        }
        if let Some(n) = self.n() {
            let s = self.start.min(n);
            if index < s {
                self.base.element_of(&self.wrapped, index, callback);
            } else {
                self.patch_element(s, index, callback);
            }
            return;
        }
        let this = Rc::clone(self);
        if index < self.start {
            self.base.element_of(
                &self.wrapped,
                index,
                Box::new(move |answer| match answer {
                    // Upstream ended before `start`: the head is all of it.
                    Ok(Indexed::End { size }) => {
                        this.observe_wrapped(size);
                        this.patch_element(size, index, callback)
                    }
                    other => callback(other),
                }),
            );
            return;
        }
        self.head_len(Box::new(move |s| match s {
            Ok(s) => this.patch_element(s, index, callback),
            Err(error) => callback(Err(error)),
        }));
    }

    /// `index >= s`: the answer lives in the patch or the tail.
    fn patch_element(self: &Rc<Self>, s: usize, index: usize, callback: IndexedCallback<E>) {
        if let Some(p) = self.p() {
            if index - s >= p {
                self.tail_element(s, p, index, callback);
                return;
            }
        }
        let this = Rc::clone(self);
        self.base.element_of(
            &self.patch,
            index - s,
            Box::new(move |answer| match answer {
                Ok(Indexed::Element { element, .. }) => {
                    callback(Ok(Indexed::Element { index, element }))
                }
                Ok(Indexed::End { size: p }) => {
                    this.observe_patch(p);
                    this.tail_element(s, p, index, callback)
                }
                Err(error) => callback(Err(error)),
            }),
        );
    }

    /// `index >= s + p`: the answer lives in `wrapped[e..]`.
    fn tail_element(self: &Rc<Self>, s: usize, p: usize, index: usize, callback: IndexedCallback<E>) {
        if self.end == UNBOUNDED {
            callback(checked_sum(s, p).map(|size| Indexed::End { size }));
            return;
        }
        let offset = index - s - p;
        let this = Rc::clone(self);
        let Ok(upstream_index) = checked_sum(self.end, offset) else {
            // Past any representable upstream index; only the size is left.
            self.wrapped_size(Box::new(move |n| {
                callback(n.and_then(|n| this.combined(n, p)).map(|size| Indexed::End { size }))
            }));
            return;
        };
        if let Some(n) = self.n() {
            if upstream_index >= n {
                callback(self.combined(n, p).map(|size| Indexed::End { size }));
                return;
            }
        }
        self.base.element_of(
            &self.wrapped,
            upstream_index,
            Box::new(move |answer| match answer {
                Ok(Indexed::Element { element, .. }) => {
                    callback(Ok(Indexed::Element { index, element }))
                }
                Ok(Indexed::End { size: n }) => {
                    this.observe_wrapped(n);
                    callback(this.combined(n, p).map(|size| Indexed::End { size }))
                }
                Err(error) => callback(Err(error)),
            }),
        );
    }

    fn size(self: &Rc<Self>, callback: ValueCallback<usize>) {
        let this = Rc::clone(self);
        self.sizes(Box::new(move |sizes| {
            callback(sizes.and_then(|(n, p)| this.combined(n, p)))
        }));
    }

    fn elements(self: &Rc<Self>, callback: ValueCallback<Rc<Vec<E>>>) {
        if !self.list.borrow_mut().register(callback) {
            return;
        }
        let this = Rc::clone(self);
        self.base.elements_of(
            &self.wrapped,
            Box::new(move |wrapped| match wrapped {
                Err(error) => this.finish_list(Err(error)),
                Ok(wrapped) => {
                    this.observe_wrapped(wrapped.len());
                    let next = Rc::clone(&this);
                    this.base.elements_of(
                        &this.patch,
                        Box::new(move |patch| match patch {
                            Err(error) => next.finish_list(Err(error)),
                            Ok(patch) => {
                                next.observe_patch(patch.len());
                                let built = next.build(&wrapped, &patch);
                                next.finish_list(built)
                            }
                        }),
                    );
                }
            }),
        );
    }

    fn build(&self, wrapped: &[E], patch: &[E]) -> Result<Rc<Vec<E>>> {
        let n = wrapped.len();
        let size = self.combined(n, patch.len())?;
        let s = self.start.min(n);
        let e = self.end.min(n);
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&wrapped[..s]);
        out.extend_from_slice(patch);
        out.extend_from_slice(&wrapped[e..]);
        Ok(Rc::new(out))
    }

    fn finish_list(&self, outcome: Result<Rc<Vec<E>>>) {
        let outcome = self.base.holder.settle(&self.base.ctx, outcome);
        let drained = self.list.borrow_mut().take();
        drained.deliver(outcome);
    }

    fn next_while(self: &Rc<Self>, from: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        let head_from = from.min(self.start);
        let first = Plan::Next(Segment::new(
            Rc::clone(&self.wrapped),
            head_from,
            self.start,
            head_from,
        ));
        let this = Rc::clone(self);
        let mut phase = Phase::Head;
        let planner = Box::new(move |end: SegmentEnd| match (phase, end) {
            (Phase::Head, end) => {
                let s = match end {
                    SegmentEnd::Crossed => this.start,
                    SegmentEnd::Exhausted { size } => {
                        this.observe_wrapped(size);
                        size.min(this.start)
                    }
                };
                phase = Phase::Patch { s };
                let skip = from.saturating_sub(s);
                Plan::Next(Segment::to_end(Rc::clone(&this.patch), skip, s + skip))
            }
            (Phase::Patch { s }, SegmentEnd::Exhausted { size: p }) => {
                this.observe_patch(p);
                let mid = match checked_sum(s, p) {
                    Ok(mid) => mid,
                    Err(error) => return Plan::Fail(error),
                };
                if this.end == UNBOUNDED {
                    return Plan::Finish(mid);
                }
                phase = Phase::Tail { p };
                let skip = from.saturating_sub(mid);
                let tail_from = this.end.saturating_add(skip).min(MAX_INDEX);
                Plan::Next(Segment::to_end(Rc::clone(&this.wrapped), tail_from, mid + skip))
            }
            (Phase::Tail { p }, SegmentEnd::Exhausted { size: n }) => {
                this.observe_wrapped(n);
                match this.combined(n, p) {
                    Ok(size) => Plan::Finish(size),
                    Err(error) => Plan::Fail(error),
                }
            }
            (_, SegmentEnd::Crossed) => Plan::Fail(Error::Invariant(
                "unbounded splice segment reported a crossing".into(),
            )),
        });
        next_while_segments(&self.base.ctx, self.base.chain(), first, planner, predicate);
    }

    fn prev_while(self: &Rc<Self>, from: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        let this = Rc::clone(self);
        self.sizes(Box::new(move |sizes| {
            let (n, p) = match sizes {
                Ok(sizes) => sizes,
                Err(error) => return predicate.error(error),
            };
            let total = match this.combined(n, p) {
                Ok(total) => total,
                Err(error) => return predicate.error(error),
            };
            if total == 0 {
                return predicate.complete(0);
            }
            let s = this.start.min(n);
            let e = this.end.min(n);
            let mid = s + p;
            let top = from.min(total - 1);
            let mut segments = Vec::with_capacity(3);
            if top >= mid {
                segments.push(BackSegment {
                    source: Rc::clone(&this.wrapped),
                    from: e + (top - mid),
                    down_to: e,
                    output: top,
                });
            }
            if p > 0 && top >= s {
                let hi = top.min(mid - 1);
                segments.push(BackSegment {
                    source: Rc::clone(&this.patch),
                    from: hi - s,
                    down_to: 0,
                    output: hi,
                });
            }
            if s > 0 {
                let hi = top.min(s - 1);
                segments.push(BackSegment {
                    source: Rc::clone(&this.wrapped),
                    from: hi,
                    down_to: 0,
                    output: hi,
                });
            }
            prev_while_segments(&this.base.ctx, this.base.chain(), segments, total, predicate);
        }));
    }
}

impl<E: Element> ListMaterializer<E> for SpliceState<E> {
    fn known_size(&self) -> Option<usize> {
        let inner = &self.inner;
        match (inner.n(), inner.p()) {
            (Some(n), Some(p)) => inner.combined(n, p).ok(),
            _ => None,
        }
    }

    fn status(&self) -> Status {
        Status::Running
    }

    fn materialize_cancel(&self, cause: &Error) {
        self.inner.wrapped.materialize_cancel(cause);
        self.inner.patch.materialize_cancel(cause);
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
        self.inner.weights.elements.plus(Weight::ONE)
    }

    fn weight_next_while(&self) -> Weight {
        self.inner.weights.next_while
    }

    fn weight_prev_while(&self) -> Weight {
        self.weight_size().plus(self.inner.weights.prev_while)
    }

    fn weight_size(&self) -> Weight {
        self.inner.weights.size.plus(Weight::ONE)
    }
}
