//! Filter operator.
//!
//! Delegates to the upstream's forward traversal and re-indexes it with a
//! running output counter. Every upstream element is tested at most once:
//! the operator remembers, for the classified upstream prefix, which upstream
//! index each emitted output index came from, and later queries resume from
//! that point instead of testing again.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lazymat_core::index::check_index;
use lazymat_core::prelude::*;
use lazymat_core::traverse::{prev_while_by_element, Fetch, RangeCollector};

use crate::traits::{OpBase, OperatorKind, PredicateFn};

/// Keep the elements for which `keep` returns `true`.
pub fn filter<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    keep: impl Fn(&E) -> bool + 'static,
) -> Materializer<E> {
    try_filter(ctx, list, move |e| Ok(keep(e)))
}

/// Like [`filter`], with a fallible test. The first `Err` fails the operator.
pub fn try_filter<E: Element>(
    ctx: &Context,
    list: Materializer<E>,
    keep: impl Fn(&E) -> Result<bool> + 'static,
) -> Materializer<E> {
    if list.known_size() == Some(0) {
        return list;
    }
    let keep: PredicateFn<E> = Rc::new(keep);
    StatefulMaterializer::build(OperatorKind::Filter.name(), |holder| {
        Rc::new(FilterState {
            inner: Rc::new(FilterInner {
                base: OpBase::new(ctx, holder),
                wrapped: list,
                keep,
                positions: RefCell::new(Vec::new()),
                scanned: Cell::new(0),
                size: Cell::new(None),
                list: RefCell::new(Waiters::new()),
            }),
        })
    })
}

struct FilterState<E: Element> {
    inner: Rc<FilterInner<E>>,
}

struct FilterInner<E: Element> {
    base: OpBase<E>,
    wrapped: Materializer<E>,
    keep: PredicateFn<E>,
    /// `positions[k]` is the upstream index of output element `k`.
    positions: RefCell<Vec<usize>>,
    /// Upstream indices below this have been tested.
    scanned: Cell<usize>,
    size: Cell<Option<usize>>,
    list: RefCell<Waiters<Rc<Vec<E>>>>,
}

/// What a traversal of the upstream is answering.
enum Sink<E: Element> {
    Element {
        index: usize,
        callback: Option<IndexedCallback<E>>,
    },
    Traverse {
        from: usize,
        predicate: Box<dyn IndexedPredicate<E>>,
    },
    Size(ValueCallback<usize>),
}

struct FilterVisitor<E: Element> {
    inner: Rc<FilterInner<E>>,
    counter: usize,
    sink: Sink<E>,
}

impl<E: Element> FilterInner<E> {
    /// Start a scan able to serve output index `from` onwards.
    fn scan(self: &Rc<Self>, from: usize, sink: Sink<E>) {
        let (upstream_from, counter) = {
            let positions = self.positions.borrow();
            match positions.get(from) {
                Some(&upstream) => (upstream, from),
                None => (self.scanned.get(), positions.len()),
            }
        };
        self.wrapped.materialize_next_while(
            upstream_from,
            Box::new(FilterVisitor {
                inner: Rc::clone(self),
                counter,
                sink,
            }),
        );
    }

    /// Whether upstream element `index` passes, testing it only once.
    fn classify(&self, index: usize, output: usize, element: &E) -> Result<bool> {
        if index < self.scanned.get() {
            return Ok(self.positions.borrow().get(output) == Some(&index));
        }
        let keep = (self.keep)(element)?;
        if keep {
            self.positions.borrow_mut().push(index);
        }
        self.scanned.set(index + 1);
        Ok(keep)
    }

    fn element(self: &Rc<Self>, index: usize, callback: IndexedCallback<E>) {
        if let Err(error) = check_index(index) {
            callback(Err(error));
            return;
        }
        let known = self.positions.borrow().get(index).copied();
        if let Some(upstream) = known {
            self.wrapped.materialize_element(
                upstream,
                Box::new(move |answer| {
                    callback(answer.map(|answer| lazymat_core::materializer::reindex(answer, index)))
                }),
            );
            return;
        }
        if let Some(size) = self.size.get() {
            callback(Ok(Indexed::End { size }));
            return;
        }
        self.scan(
            index,
            Sink::Element {
                index,
                callback: Some(callback),
            },
        );
    }

    fn size(self: &Rc<Self>, callback: ValueCallback<usize>) {
        match self.size.get() {
            Some(size) => callback(Ok(size)),
            None => self.scan(UNBOUNDED, Sink::Size(callback)),
        }
    }

    fn elements(self: &Rc<Self>, callback: ValueCallback<Rc<Vec<E>>>) {
        if !self.list.borrow_mut().register(callback) {
            return;
        }
        let this = Rc::clone(self);
        let collector = RangeCollector::boxed(
            UNBOUNDED,
            Box::new(move |collected| {
                let outcome = collected.map(|collected| Rc::new(collected.items));
                let outcome = this.base.holder.settle(&this.base.ctx, outcome);
                let drained = this.list.borrow_mut().take();
                drained.deliver(outcome);
            }),
        );
        self.scan(
            0,
            Sink::Traverse {
                from: 0,
                predicate: collector,
            },
        );
    }

    fn prev_while(self: &Rc<Self>, from: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        let this = Rc::clone(self);
        self.size(Box::new(move |size| match size {
            Ok(size) => {
                let source = Rc::clone(&this);
                let fetch: Fetch<E> =
                    Rc::new(move |index, callback| source.element(index, callback));
                prev_while_by_element(&this.base.ctx, this.base.chain(), fetch, from, size, predicate)
            }
            Err(error) => predicate.error(error),
        }));
    }
}

impl<E: Element> IndexedPredicate<E> for FilterVisitor<E> {
    fn test(&mut self, index: usize, element: E) -> bool {
        let output = self.counter;
        match self.inner.classify(index, output, &element) {
            Ok(false) => true,
            Ok(true) => {
                self.counter += 1;
                match &mut self.sink {
                    Sink::Element {
                        index: wanted,
                        callback,
                    } => {
                        if output < *wanted {
                            return true;
                        }
                        if let Some(callback) = callback.take() {
                            callback(Ok(Indexed::Element {
                                index: output,
                                element,
                            }));
                        }
                        false
                    }
                    Sink::Traverse { from, predicate } => {
                        output < *from || predicate.test(output, element)
                    }
                    Sink::Size(_) => true,
                }
            }
            Err(error) => {
                let error = self.inner.base.fail(error);
                let sink = std::mem::replace(&mut self.sink, Sink::Size(Box::new(|_| {})));
                deliver_error(sink, error);
                false
            }
        }
    }

    fn complete(self: Box<Self>, _upstream_size: usize) {
        let size = self.counter;
        self.inner.size.set(Some(size));
        match self.sink {
            Sink::Element { callback, .. } => {
                if let Some(callback) = callback {
                    callback(Ok(Indexed::End { size }));
                }
            }
            Sink::Traverse { predicate, .. } => predicate.complete(size),
            Sink::Size(callback) => callback(Ok(size)),
        }
    }

    fn error(self: Box<Self>, error: Error) {
        deliver_error(self.sink, error);
    }
}

fn deliver_error<E: Element>(sink: Sink<E>, error: Error) {
    match sink {
        Sink::Element { callback, .. } => {
            if let Some(callback) = callback {
                callback(Err(error));
            }
        }
        Sink::Traverse { predicate, .. } => predicate.error(error),
        Sink::Size(callback) => callback(Err(error)),
    }
}

impl<E: Element> ListMaterializer<E> for FilterState<E> {
    fn known_size(&self) -> Option<usize> {
        self.inner.size.get()
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
        if let Some(size) = self.inner.size.get() {
            if index >= size {
                predicate.complete(size);
                return;
            }
        }
        self.inner.scan(
            index,
            Sink::Traverse {
                from: index,
                predicate,
            },
        )
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.inner.prev_while(index, predicate)
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        let callback = self.inner.base.ctx.guard(callback);
        self.inner.size(callback)
    }

    fn weight_element(&self) -> Weight {
        self.inner.wrapped.weight_next_while()
    }

    fn weight_elements(&self) -> Weight {
        self.inner.wrapped.weight_next_while()
    }

    fn weight_next_while(&self) -> Weight {
        self.inner.wrapped.weight_next_while()
    }

    fn weight_prev_while(&self) -> Weight {
        self.inner
            .wrapped
            .weight_next_while()
            .plus(self.inner.wrapped.weight_element())
    }

    fn weight_size(&self) -> Weight {
        self.inner.wrapped.weight_next_while()
    }
}
