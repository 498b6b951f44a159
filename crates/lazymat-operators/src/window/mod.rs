//! Sliding windows and fixed-size chunks.
//!
//! Window `i` covers upstream `[i * step, min(n, i * step + max_size))`, and
//! there are `ceil(n / step)` windows. Windows are computed on demand through
//! a bounded upstream traversal, cached, and never recomputed; concurrent
//! requests for the same window share one traversal.

mod cache;

pub use cache::SparseCache;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use lazymat_core::index::{ceil_div, check_index, checked_product};
use lazymat_core::prelude::*;
use lazymat_core::traverse::{next_while_by_element, prev_while_by_element, Fetch, RangeCollector};

use crate::traits::{OpBase, OperatorKind};

/// One window of upstream elements.
pub type Window<E> = Rc<[E]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Largest number of elements in one window.
    pub max_size: usize,
    /// Distance between the starts of consecutive windows.
    pub step: usize,
}

impl WindowSpec {
    pub fn sliding(max_size: usize, step: usize) -> Self {
        Self { max_size, step }
    }

    pub fn chunks(size: usize) -> Self {
        Self {
            max_size: size,
            step: size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Config("window max_size must be positive".into()));
        }
        if self.step == 0 {
            return Err(Error::Config("window step must be positive".into()));
        }
        Ok(())
    }

    /// Number of windows over `n` upstream elements.
    pub fn count(&self, n: usize) -> usize {
        ceil_div(n, self.step)
    }
}

pub fn window<E: Element>(ctx: &Context, list: Materializer<E>, spec: WindowSpec) -> Materializer<Window<E>> {
    if let Err(error) = spec.validate() {
        return failed(error);
    }
    if list.known_size() == Some(0) {
        return empty();
    }
    StatefulMaterializer::build(OperatorKind::Window.name(), |holder| {
        Rc::new(WindowState {
            inner: Rc::new(WindowInner {
                base: OpBase::new(ctx, holder),
                wrapped: list,
                spec,
                cache: RefCell::new(SparseCache::new()),
                pending: RefCell::new(HashMap::new()),
                count: Cell::new(None),
                list: RefCell::new(Waiters::new()),
            }),
        })
    })
}

pub fn sliding<E: Element>(ctx: &Context, list: Materializer<E>, max_size: usize, step: usize) -> Materializer<Window<E>> {
    window(ctx, list, WindowSpec::sliding(max_size, step))
}

pub fn chunks<E: Element>(ctx: &Context, list: Materializer<E>, size: usize) -> Materializer<Window<E>> {
    window(ctx, list, WindowSpec::chunks(size))
}

struct WindowState<E: Element> {
    inner: Rc<WindowInner<E>>,
}

struct WindowInner<E: Element> {
    base: OpBase<Window<E>>,
    wrapped: Materializer<E>,
    spec: WindowSpec,
    cache: RefCell<SparseCache<Window<E>>>,
    /// Callbacks waiting on a window whose traversal is in flight.
    pending: RefCell<HashMap<usize, Vec<IndexedCallback<Window<E>>>>>,
    count: Cell<Option<usize>>,
    list: RefCell<Waiters<Rc<Vec<Window<E>>>>>,
}

impl<E: Element> WindowInner<E> {
    fn known_count(&self) -> Option<usize> {
        self.count.get().or_else(|| {
            self.wrapped
                .known_size()
                .map(|n| self.observe_size(n))
        })
    }

    fn observe_size(&self, n: usize) -> usize {
        let count = self.spec.count(n);
        self.count.set(Some(count));
        count
    }

    fn size(self: &Rc<Self>, callback: ValueCallback<usize>) {
        if let Some(count) = self.known_count() {
            callback(Ok(count));
            return;
        }
        let this = Rc::clone(self);
        self.wrapped
            .materialize_size(Box::new(move |n| callback(n.map(|n| this.observe_size(n)))));
    }

    fn element(self: &Rc<Self>, index: usize, callback: IndexedCallback<Window<E>>) {
        if let Err(error) = check_index(index) {
            callback(Err(error));
            return;
        }
        let cached = self.cache.borrow().get(index);
        if let Some(element) = cached {
            callback(Ok(Indexed::Element { index, element }));
            return;
        }
        if let Some(count) = self.known_count() {
            if index >= count {
                callback(Ok(Indexed::End { size: count }));
                return;
            }
        }
        let Ok(start) = checked_product(index, self.spec.step) else {
            // Starts past any representable upstream index.
            self.size(Box::new(move |size| {
                callback(size.map(|size| Indexed::End { size }))
            }));
            return;
        };
        let first = {
            let mut pending = self.pending.borrow_mut();
            let waiting = pending.entry(index).or_default();
            waiting.push(callback);
            waiting.len() == 1
        };
        if !first {
            return;
        }
        let this = Rc::clone(self);
        self.wrapped.materialize_next_while(
            start,
            RangeCollector::boxed(
                start.saturating_add(self.spec.max_size),
                Box::new(move |collected| this.on_collected(index, collected)),
            ),
        );
    }

    fn on_collected(&self, index: usize, collected: Result<lazymat_core::traverse::Collected<E>>) {
        let answer = collected.and_then(|collected| {
            let count = collected.size.map(|n| self.observe_size(n));
            if collected.items.is_empty() {
                return count
                    .map(|size| Indexed::End { size })
                    .ok_or_else(|| Error::Invariant("empty window without upstream size".into()));
            }
            let element: Window<E> = Rc::from(collected.items);
            self.cache.borrow_mut().set(index, Rc::clone(&element));
            Ok(Indexed::Element { index, element })
        });
        let answer = self.base.ctx.resolve(answer);
        let waiting = self.pending.borrow_mut().remove(&index);
        for callback in waiting.into_iter().flatten() {
            callback(answer.clone());
        }
    }

    fn elements(self: &Rc<Self>, callback: ValueCallback<Rc<Vec<Window<E>>>>) {
        if !self.list.borrow_mut().register(callback) {
            return;
        }
        let this = Rc::clone(self);
        self.wrapped.materialize_elements(Box::new(move |elements| {
            let outcome = elements.map(|elements| this.build(&elements));
            let outcome = this.base.holder.settle(&this.base.ctx, outcome);
            let drained = this.list.borrow_mut().take();
            drained.deliver(outcome);
        }));
    }

    fn build(&self, elements: &[E]) -> Rc<Vec<Window<E>>> {
        let n = elements.len();
        let count = self.observe_size(n);
        let cache = self.cache.borrow();
        let windows = (0..count)
            .map(|i| {
                cache.get(i).unwrap_or_else(|| {
                    let start = i * self.spec.step;
                    let end = n.min(start.saturating_add(self.spec.max_size));
                    Rc::from(&elements[start..end])
                })
            })
            .collect();
        Rc::new(windows)
    }

    fn fetch(self: &Rc<Self>) -> Fetch<Window<E>> {
        let this = Rc::clone(self);
        Rc::new(move |index, callback| this.element(index, callback))
    }
}

impl<E: Element> ListMaterializer<Window<E>> for WindowState<E> {
    fn known_size(&self) -> Option<usize> {
        self.inner.known_count()
    }

    fn status(&self) -> Status {
        Status::Running
    }

    fn materialize_cancel(&self, cause: &Error) {
        self.inner.wrapped.materialize_cancel(cause);
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        for callback in pending.into_values().flatten() {
            callback(Err(cause.clone()));
        }
        let drained = self.inner.list.borrow_mut().take();
        drained.deliver(Err(cause.clone()));
    }

    fn materialize_element(&self, index: usize, callback: IndexedCallback<Window<E>>) {
        self.inner.element(index, callback)
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<Window<E>>>>) {
        self.inner.elements(callback)
    }

    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<Window<E>>>) {
        let inner = &self.inner;
        next_while_by_element(&inner.base.ctx, inner.base.chain(), inner.fetch(), index, predicate)
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<Window<E>>>) {
        let inner = Rc::clone(&self.inner);
        self.inner.size(Box::new(move |size| match size {
            Ok(size) => prev_while_by_element(
                &inner.base.ctx,
                inner.base.chain(),
                inner.fetch(),
                index,
                size,
                predicate,
            ),
            Err(error) => predicate.error(error),
        }));
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        let callback = self.inner.base.ctx.guard(callback);
        self.inner.size(callback)
    }

    fn weight_element(&self) -> Weight {
        self.inner
            .wrapped
            .weight_next_while()
            .max(Weight::of_elements(self.inner.spec.max_size))
    }

    fn weight_elements(&self) -> Weight {
        self.inner.wrapped.weight_elements().plus(Weight::ONE)
    }

    fn weight_next_while(&self) -> Weight {
        self.inner.wrapped.weight_next_while()
    }

    fn weight_prev_while(&self) -> Weight {
        self.inner
            .wrapped
            .weight_size()
            .plus(self.inner.wrapped.weight_next_while())
    }

    fn weight_size(&self) -> Weight {
        self.inner.wrapped.weight_size()
    }
}
