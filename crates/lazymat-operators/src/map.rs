//! Element-wise transform.
//!
//! Indices and size pass straight through to the upstream. Each index is
//! transformed at most once; results are memoized per index so repeated
//! element queries and traversals never call the transform again.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use lazymat_core::prelude::*;

use crate::traits::{settled_size, MapFn, OpBase, OperatorKind};

pub fn map<E: Element, F: Element>(
    ctx: &Context,
    list: Materializer<E>,
    f: impl Fn(E) -> F + 'static,
) -> Materializer<F> {
    try_map(ctx, list, move |e| Ok(f(e)))
}

/// Like [`map`], with a fallible transform. The first `Err` fails the operator.
pub fn try_map<E: Element, F: Element>(
    ctx: &Context,
    list: Materializer<E>,
    f: impl Fn(E) -> Result<F> + 'static,
) -> Materializer<F> {
    let f: MapFn<E, F> = Rc::new(f);
    StatefulMaterializer::build(OperatorKind::Map.name(), |holder| {
        Rc::new(MapState {
            inner: Rc::new(MapInner {
                base: OpBase::new(ctx, holder),
                size: Cell::new(list.known_size()),
                weights: list.query_weights(),
                wrapped: list,
                f,
                memo: RefCell::new(BTreeMap::new()),
                list: RefCell::new(Waiters::new()),
            }),
        })
    })
}

struct MapState<E: Element, F: Element> {
    inner: Rc<MapInner<E, F>>,
}

struct MapInner<E: Element, F: Element> {
    base: OpBase<F>,
    wrapped: Materializer<E>,
    size: Cell<Option<usize>>,
    weights: QueryWeights,
    f: MapFn<E, F>,
    memo: RefCell<BTreeMap<usize, F>>,
    list: RefCell<Waiters<Rc<Vec<F>>>>,
}

impl<E: Element, F: Element> MapInner<E, F> {
    fn known_size(&self) -> Option<usize> {
        if let Some(n) = self.size.get() {
            return Some(n);
        }
        let n = settled_size(&self.wrapped);
        self.size.set(n);
        n
    }

    fn size(self: &Rc<Self>, callback: ValueCallback<usize>) {
        if let Some(n) = self.known_size() {
            callback(Ok(n));
            return;
        }
        let this = Rc::clone(self);
        self.base.size_of(
            &self.wrapped,
            Box::new(move |size| {
                if let Ok(n) = size {
                    this.size.set(Some(n));
                }
                callback(size)
            }),
        );
    }

    fn apply(&self, index: usize, element: E) -> Result<F> {
        if let Some(done) = self.memo.borrow().get(&index) {
            return Ok(done.clone());
        }
        match (self.f)(element) {
            Ok(mapped) => {
                self.memo.borrow_mut().insert(index, mapped.clone());
                Ok(mapped)
            }
            Err(error) => Err(self.base.fail(error)),
        }
    }

    fn element(self: &Rc<Self>, index: usize, callback: IndexedCallback<F>) {
        let cached = self.memo.borrow().get(&index).cloned();
        if let Some(element) = cached {
            callback(Ok(Indexed::Element { index, element }));
            return;
        }
        if let Some(size) = self.size.get().filter(|size| index >= *size) {
            callback(Ok(Indexed::End { size }));
            return;
        }
        let this = Rc::clone(self);
        self.base.element_of(
            &self.wrapped,
            index,
            Box::new(move |answer| {
                callback(answer.and_then(|answer| match answer {
                    Indexed::Element { index, element } => this
                        .apply(index, element)
                        .map(|element| Indexed::Element { index, element }),
                    Indexed::End { size } => {
                        this.size.set(Some(size));
                        Ok(Indexed::End { size })
                    }
                }))
            }),
        );
    }

    fn elements(self: &Rc<Self>, callback: ValueCallback<Rc<Vec<F>>>) {
        if !self.list.borrow_mut().register(callback) {
            return;
        }
        let this = Rc::clone(self);
        self.base.elements_of(&self.wrapped, Box::new(move |elements| {
            let outcome = elements.and_then(|elements| {
                elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| this.apply(index, element.clone()))
                    .collect::<Result<Vec<_>>>()
                    .map(Rc::new)
            });
            let outcome = this.base.holder.settle(&this.base.ctx, outcome);
            let drained = this.list.borrow_mut().take();
            drained.deliver(outcome);
        }));
    }

    fn traversal(self: &Rc<Self>, predicate: Box<dyn IndexedPredicate<F>>) -> Box<dyn IndexedPredicate<E>> {
        Box::new(MapVisitor {
            inner: Rc::clone(self),
            predicate: Some(predicate),
        })
    }
}

/// Forwards an upstream traversal through the transform.
struct MapVisitor<E: Element, F: Element> {
    inner: Rc<MapInner<E, F>>,
    predicate: Option<Box<dyn IndexedPredicate<F>>>,
}

impl<E: Element, F: Element> IndexedPredicate<E> for MapVisitor<E, F> {
    fn test(&mut self, index: usize, element: E) -> bool {
        let Some(predicate) = self.predicate.as_mut() else {
            return false;
        };
        match self.inner.apply(index, element) {
            Ok(mapped) => predicate.test(index, mapped),
            Err(error) => {
                if let Some(predicate) = self.predicate.take() {
                    predicate.error(error);
                }
                false
            }
        }
    }

    fn complete(self: Box<Self>, size: usize) {
        if let Some(predicate) = self.predicate {
            predicate.complete(size);
        }
    }

    fn error(self: Box<Self>, error: Error) {
        if let Some(predicate) = self.predicate {
            predicate.error(error);
        }
    }
}

impl<E: Element, F: Element> ListMaterializer<F> for MapState<E, F> {
    fn known_size(&self) -> Option<usize> {
        self.inner.known_size()
    }

    fn status(&self) -> Status {
        Status::Running
    }

    fn materialize_cancel(&self, cause: &Error) {
        self.inner.wrapped.materialize_cancel(cause);
        let drained = self.inner.list.borrow_mut().take();
        drained.deliver(Err(cause.clone()));
    }

    fn materialize_element(&self, index: usize, callback: IndexedCallback<F>) {
        let callback = self.inner.base.ctx.guard(callback);
        self.inner.element(index, callback)
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<F>>>) {
        self.inner.elements(callback)
    }

    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<F>>) {
        let visitor = self.inner.traversal(predicate);
        self.inner.wrapped.materialize_next_while(index, visitor)
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<F>>) {
        let visitor = self.inner.traversal(predicate);
        self.inner.wrapped.materialize_prev_while(index, visitor)
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
        self.inner.weights.prev_while
    }

    fn weight_size(&self) -> Weight {
        self.inner.weights.size.plus(Weight::ONE)
    }
}
