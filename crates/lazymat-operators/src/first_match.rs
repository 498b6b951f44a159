//! Search-and-transform of the first element matching a test.
//!
//! `scanned` is a high-water mark: every upstream index below it has been
//! tested and did not match, so those indices are always answered by the
//! unmodified upstream. A query past the mark drives a forward scan from it.
//! The first match switches the chassis, irreversibly, to a plain positional
//! edit at that index (replace by the transformed element, or remove); a
//! scan that runs off the end switches it to the upstream itself.
//!
//! The test and the transform are fail-fast: an `Err` fails the operator and
//! is never retried.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lazymat_core::prelude::*;

use crate::splice::splice_absolute;
use crate::traits::{MapFn, OpBase, OperatorKind, PredicateFn};

/// Replace the first element passing `test` by `f(element)`.
pub fn map_first_where<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    test: impl Fn(&E) -> bool + 'static,
    f: impl Fn(E) -> E + 'static,
) -> Materializer<E> {
    try_map_first_where(ctx, list, move |e| Ok(test(e)), move |e| Ok(f(e)))
}

pub fn try_map_first_where<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    test: impl Fn(&E) -> Result<bool> + 'static,
    f: impl Fn(E) -> Result<E> + 'static,
) -> Materializer<E> {
    first_match(ctx, list, Rc::new(test), Edit::Map(Rc::new(f)))
}

/// Remove the first element passing `test`.
pub fn remove_first_where<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    test: impl Fn(&E) -> bool + 'static,
) -> Materializer<E> {
    try_remove_first_where(ctx, list, move |e| Ok(test(e)))
}

pub fn try_remove_first_where<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    test: impl Fn(&E) -> Result<bool> + 'static,
) -> Materializer<E> {
    first_match(ctx, list, Rc::new(test), Edit::Remove)
}

enum Edit<E: Element> {
    Map(MapFn<E, E>),
    Remove,
}

impl<E: Element> Edit<E> {
    fn kind(&self) -> OperatorKind {
        match self {
            Edit::Map(_) => OperatorKind::MapFirstWhere,
            Edit::Remove => OperatorKind::RemoveFirstWhere,
        }
    }

    fn preserves_size(&self) -> bool {
        matches!(self, Edit::Map(_))
    }
}

fn first_match<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    test: PredicateFn<E>,
    edit: Edit<E>,
) -> Materializer<E> {
    if list.known_size() == Some(0) {
        return list;
    }
    StatefulMaterializer::build(edit.kind().name(), |holder| {
        Rc::new(FirstMatchState {
            inner: Rc::new(FirstMatchInner {
                base: OpBase::new(ctx, holder),
                wrapped: list,
                test,
                edit,
                scanned: Cell::new(0),
                scanning: Cell::new(false),
                resolved: RefCell::new(None),
                waiting: RefCell::new(Vec::new()),
            }),
        })
    })
}

/// Answer to a scan request: `None` when every index up to the requested
/// target is known to be untouched, otherwise the state to redispatch to.
type ScanOutcome<E> = Result<Option<Materializer<E>>>;

type Then<E> = Box<dyn FnOnce(ScanOutcome<E>)>;

struct FirstMatchState<E: Element> {
    inner: Rc<FirstMatchInner<E>>,
}

struct FirstMatchInner<E: Element> {
    base: OpBase<E>,
    wrapped: Materializer<E>,
    test: PredicateFn<E>,
    edit: Edit<E>,
    scanned: Cell<usize>,
    scanning: Cell<bool>,
    resolved: RefCell<Option<Materializer<E>>>,
    waiting: RefCell<Vec<(usize, Then<E>)>>,
}

impl<E: Element> FirstMatchInner<E> {
    fn resolved(&self) -> Option<Materializer<E>> {
        self.resolved.borrow().clone()
    }

    /// Test upstream element `index` unless it is already known clean.
    /// `Ok(true)` means it is the first match.
    fn classify(&self, index: usize, element: &E) -> Result<bool> {
        if index < self.scanned.get() {
            return Ok(false);
        }
        let matched = (self.test)(element)?;
        if !matched {
            self.scanned.set(index + 1);
        }
        Ok(matched)
    }

    /// Run `then` once every index up to `target` is either known clean or
    /// the operator has switched state.
    fn ensure(self: &Rc<Self>, target: usize, then: Then<E>) {
        if let Some(next) = self.resolved() {
            then(Ok(Some(next)));
            return;
        }
        if target < self.scanned.get() {
            then(Ok(None));
            return;
        }
        self.waiting.borrow_mut().push((target, then));
        self.start_scan();
    }

    fn start_scan(self: &Rc<Self>) {
        if self.scanning.get() || self.resolved().is_some() {
            return;
        }
        let target = self
            .waiting
            .borrow()
            .iter()
            .map(|(target, _)| *target)
            .max();
        let Some(target) = target else {
            return;
        };
        self.scanning.set(true);
        #[cfg(feature = "tracing")]
        tracing::trace!(
            label = self.base.holder.label(),
            from = self.scanned.get(),
            target,
            "first-match scan"
        );
        self.wrapped.materialize_next_while(
            self.scanned.get(),
            Box::new(ScanVisitor {
                inner: Rc::clone(self),
                target,
            }),
        );
    }

    /// The scan reached its target without a match.
    fn scan_paused(self: &Rc<Self>) {
        self.scanning.set(false);
        let scanned = self.scanned.get();
        let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut *self.waiting.borrow_mut())
            .into_iter()
            .partition(|(target, _)| *target < scanned);
        *self.waiting.borrow_mut() = rest;
        for (_, then) in ready {
            then(Ok(None));
        }
        if !self.waiting.borrow().is_empty() {
            let this = Rc::clone(self);
            self.base
                .ctx
                .schedule(self.base.chain(), Weight::ONE, move || this.start_scan());
        }
    }

    fn switch_to(&self, next: Result<Materializer<E>>) {
        self.scanning.set(false);
        let next = match next {
            Ok(state) => {
                *self.resolved.borrow_mut() = Some(Rc::clone(&state));
                self.base.holder.set_state(Rc::clone(&state));
                Ok(Some(state))
            }
            Err(error) => {
                let error = self.base.fail(error);
                *self.resolved.borrow_mut() = Some(failed(error.clone()));
                Err(error)
            }
        };
        let waiting = std::mem::take(&mut *self.waiting.borrow_mut());
        for (_, then) in waiting {
            then(next.clone());
        }
    }

    /// First match at upstream `index`: become a single-position edit.
    fn matched(&self, index: usize, element: E) {
        #[cfg(feature = "tracing")]
        tracing::trace!(label = self.base.holder.label(), index, "first match");
        let patch = match &self.edit {
            Edit::Map(f) => f(element).map(single),
            Edit::Remove => Ok(empty()),
        };
        let next = patch.map(|patch| {
            splice_absolute(
                &self.base.ctx,
                self.edit.kind(),
                Rc::clone(&self.wrapped),
                index,
                index + 1,
                patch,
            )
        });
        self.switch_to(next)
    }

    /// No element matches: the operator is the upstream.
    fn exhausted(&self) {
        self.switch_to(Ok(Rc::clone(&self.wrapped)))
    }

    fn failed(&self, error: Error) {
        self.switch_to(Err(error))
    }

    /// Hand a query over to `next` as a scheduled step of this chain.
    fn redispatch(&self, body: impl FnOnce() + 'static) {
        self.base.ctx.schedule(self.base.chain(), Weight::ONE, body);
    }

    fn element(self: &Rc<Self>, index: usize, callback: IndexedCallback<E>) {
        let this = Rc::clone(self);
        self.ensure(
            index,
            Box::new(move |outcome| match outcome {
                Ok(None) => this.wrapped.materialize_element(index, callback),
                Ok(Some(next)) => {
                    this.redispatch(move || next.materialize_element(index, callback))
                }
                Err(error) => callback(Err(error)),
            }),
        );
    }

    /// Queries that depend on the whole list resolve the match first.
    fn resolve_fully(self: &Rc<Self>, then: impl FnOnce(Result<Materializer<E>>) + 'static) {
        let this = Rc::clone(self);
        self.ensure(
            UNBOUNDED,
            Box::new(move |outcome| match outcome {
                Ok(Some(next)) => this.redispatch(move || then(Ok(next))),
                Ok(None) => then(Err(Error::Invariant(
                    "unbounded first-match scan paused".into(),
                ))),
                Err(error) => then(Err(error)),
            }),
        );
    }

    fn next_while(self: &Rc<Self>, from: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        if let Some(next) = self.resolved() {
            next.materialize_next_while(from, predicate);
            return;
        }
        if from > self.scanned.get() {
            // Everything before `from` must be known clean first.
            let this = Rc::clone(self);
            self.ensure(
                from - 1,
                Box::new(move |outcome| match outcome {
                    Ok(None) => this.next_while(from, predicate),
                    Ok(Some(next)) => {
                        this.redispatch(move || next.materialize_next_while(from, predicate))
                    }
                    Err(error) => predicate.error(error),
                }),
            );
            return;
        }
        self.wrapped.materialize_next_while(
            from,
            Box::new(NextVisitor {
                inner: Rc::clone(self),
                predicate: Some(predicate),
            }),
        );
    }

    fn prev_while(self: &Rc<Self>, from: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        if !self.edit.preserves_size() {
            self.resolve_fully(move |next| match next {
                Ok(next) => next.materialize_prev_while(from, predicate),
                Err(error) => predicate.error(error),
            });
            return;
        }
        let this = Rc::clone(self);
        self.ensure(
            from,
            Box::new(move |outcome| match outcome {
                Ok(None) => this.wrapped.materialize_prev_while(from, predicate),
                Ok(Some(next)) => {
                    this.redispatch(move || next.materialize_prev_while(from, predicate))
                }
                Err(error) => predicate.error(error),
            }),
        );
    }
}

/// Scan serving [`FirstMatchInner::ensure`] requests up to `target`.
struct ScanVisitor<E: Element> {
    inner: Rc<FirstMatchInner<E>>,
    target: usize,
}

impl<E: Element> IndexedPredicate<E> for ScanVisitor<E> {
    fn test(&mut self, index: usize, element: E) -> bool {
        if self.inner.resolved().is_some() {
            return false;
        }
        match self.inner.classify(index, &element) {
            Ok(false) if index >= self.target => {
                self.inner.scan_paused();
                false
            }
            Ok(false) => true,
            Ok(true) => {
                self.inner.matched(index, element);
                false
            }
            Err(error) => {
                self.inner.failed(error);
                false
            }
        }
    }

    fn complete(self: Box<Self>, _size: usize) {
        if self.inner.resolved().is_none() {
            self.inner.exhausted();
        }
    }

    fn error(self: Box<Self>, error: Error) {
        if self.inner.resolved().is_none() {
            self.inner.failed(error);
        }
    }
}

/// Forward traversal that scans as it goes and hands over to the switched
/// state as soon as a match appears.
struct NextVisitor<E: Element> {
    inner: Rc<FirstMatchInner<E>>,
    predicate: Option<Box<dyn IndexedPredicate<E>>>,
}

impl<E: Element> NextVisitor<E> {
    /// Continue the traversal from `index` against the state the operator
    /// just switched to.
    fn hand_over(&mut self, index: usize) {
        let Some(predicate) = self.predicate.take() else {
            return;
        };
        match self.inner.resolved() {
            Some(next) => self
                .inner
                .redispatch(move || next.materialize_next_while(index, predicate)),
            None => predicate.error(Error::Invariant(
                "first-match traversal lost its switched state".into(),
            )),
        }
    }
}

impl<E: Element> IndexedPredicate<E> for NextVisitor<E> {
    fn test(&mut self, index: usize, element: E) -> bool {
        if self.inner.resolved().is_some() {
            self.hand_over(index);
            return false;
        }
        match self.inner.classify(index, &element) {
            Ok(false) => match self.predicate.as_mut() {
                Some(predicate) => predicate.test(index, element),
                None => false,
            },
            Ok(true) => {
                self.inner.matched(index, element);
                self.hand_over(index);
                false
            }
            Err(error) => {
                self.inner.failed(error);
                self.hand_over(index);
                false
            }
        }
    }

    fn complete(mut self: Box<Self>, size: usize) {
        if self.inner.resolved().is_none() {
            self.inner.exhausted();
        }
        if let Some(predicate) = self.predicate.take() {
            predicate.complete(size);
        }
    }

    fn error(mut self: Box<Self>, error: Error) {
        if let Some(predicate) = self.predicate.take() {
            predicate.error(error);
        }
    }
}

impl<E: Element> ListMaterializer<E> for FirstMatchState<E> {
    fn known_size(&self) -> Option<usize> {
        if self.inner.edit.preserves_size() {
            self.inner.wrapped.known_size()
        } else {
            None
        }
    }

    fn status(&self) -> Status {
        Status::Running
    }

    fn materialize_cancel(&self, cause: &Error) {
        self.inner.wrapped.materialize_cancel(cause);
        let waiting = std::mem::take(&mut *self.inner.waiting.borrow_mut());
        for (_, then) in waiting {
            then(Err(cause.clone()));
        }
    }

    fn materialize_element(&self, index: usize, callback: IndexedCallback<E>) {
        let callback = self.inner.base.ctx.guard(callback);
        self.inner.element(index, callback)
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<E>>>) {
        let callback = self.inner.base.ctx.guard(callback);
        self.inner.resolve_fully(move |next| match next {
            Ok(next) => next.materialize_elements(callback),
            Err(error) => callback(Err(error)),
        });
    }

    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.inner.next_while(index, predicate)
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.inner.prev_while(index, predicate)
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        let callback = self.inner.base.ctx.guard(callback);
        if self.inner.edit.preserves_size() {
            self.inner.wrapped.materialize_size(callback);
            return;
        }
        self.inner.resolve_fully(move |next| match next {
            Ok(next) => next.materialize_size(callback),
            Err(error) => callback(Err(error)),
        });
    }

    fn weight_element(&self) -> Weight {
        self.inner.wrapped.weight_next_while()
    }

    fn weight_elements(&self) -> Weight {
        self.inner
            .wrapped
            .weight_next_while()
            .plus(self.inner.wrapped.weight_elements())
    }

    fn weight_next_while(&self) -> Weight {
        self.inner.wrapped.weight_next_while()
    }

    fn weight_prev_while(&self) -> Weight {
        self.inner
            .wrapped
            .weight_next_while()
            .plus(self.inner.wrapped.weight_prev_while())
    }

    fn weight_size(&self) -> Weight {
        if self.inner.edit.preserves_size() {
            self.inner.wrapped.weight_size()
        } else {
            self.inner.wrapped.weight_next_while()
        }
    }
}
