//! Flat-map: every upstream element expands into a (possibly lazy,
//! possibly empty) sub-list; the output is their concatenation.
//!
//! Output indices are only known once every earlier expansion was pulled, so
//! the operator runs on the pull pump: one step pulls either the next
//! element of the current sub-list or, when that is exhausted, the next
//! upstream element.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lazymat_core::prelude::*;

use crate::pump::{pumped, Producer, Pulled};
use crate::traits::{ExpandFn, OperatorKind};

pub fn flat_map<E: Element, F: Element>(
    ctx: &Context,
    list: Materializer<E>,
    expand: impl Fn(E) -> Materializer<F> + 'static,
) -> Materializer<F> {
    try_flat_map(ctx, list, move |e| Ok(expand(e)))
}

/// Like [`flat_map`], with a fallible expansion. The first `Err` fails the
/// operator.
pub fn try_flat_map<E: Element, F: Element>(
    ctx: &Context,
    list: Materializer<E>,
    expand: impl Fn(E) -> Result<Materializer<F>> + 'static,
) -> Materializer<F> {
    if list.known_size() == Some(0) {
        return empty();
    }
    let expand: ExpandFn<E, F> = Rc::new(expand);
    let producer = FlatMapProducer {
        shared: Rc::new(FlatMapShared {
            wrapped: list,
            expand,
            next_upstream: Cell::new(0),
            current: RefCell::new(None),
        }),
    };
    pumped(ctx, OperatorKind::FlatMap, Rc::new(producer))
}

/// Sub-list being drained and the next index to pull from it.
struct Expansion<F: Element> {
    list: Materializer<F>,
    next: usize,
}

struct FlatMapProducer<E: Element, F: Element> {
    shared: Rc<FlatMapShared<E, F>>,
}

struct FlatMapShared<E: Element, F: Element> {
    wrapped: Materializer<E>,
    expand: ExpandFn<E, F>,
    next_upstream: Cell<usize>,
    current: RefCell<Option<Expansion<F>>>,
}

impl<E: Element, F: Element> FlatMapShared<E, F> {
    fn pull_expansion(self: &Rc<Self>, list: Materializer<F>, next: usize, done: ValueCallback<Pulled<F>>) {
        let this = Rc::clone(self);
        list.materialize_element(
            next,
            Box::new(move |answer| match answer {
                Ok(Indexed::Element { element, .. }) => {
                    if let Some(current) = this.current.borrow_mut().as_mut() {
                        current.next = next + 1;
                    }
                    done(Ok(Pulled::Element(element)))
                }
                Ok(Indexed::End { .. }) => {
                    this.current.borrow_mut().take();
                    done(Ok(Pulled::Nothing))
                }
                Err(error) => done(Err(error)),
            }),
        );
    }

    fn pull_upstream(self: &Rc<Self>, done: ValueCallback<Pulled<F>>) {
        let index = self.next_upstream.get();
        let this = Rc::clone(self);
        self.wrapped.materialize_element(
            index,
            Box::new(move |answer| match answer {
                Ok(Indexed::Element { element, .. }) => {
                    this.next_upstream.set(index + 1);
                    match (this.expand)(element) {
                        Ok(list) => {
                            if list.known_size() != Some(0) {
                                *this.current.borrow_mut() = Some(Expansion { list, next: 0 });
                            }
                            done(Ok(Pulled::Nothing))
                        }
                        Err(error) => done(Err(error)),
                    }
                }
                Ok(Indexed::End { .. }) => done(Ok(Pulled::Exhausted)),
                Err(error) => done(Err(error)),
            }),
        );
    }
}

impl<E: Element, F: Element> Producer<F> for FlatMapProducer<E, F> {
    fn pull(&self, done: ValueCallback<Pulled<F>>) {
        let current = self
            .shared
            .current
            .borrow()
            .as_ref()
            .map(|expansion| (Rc::clone(&expansion.list), expansion.next));
        match current {
            Some((list, next)) => self.shared.pull_expansion(list, next, done),
            None => self.shared.pull_upstream(done),
        }
    }

    fn cancel(&self, cause: &Error) {
        self.shared.wrapped.materialize_cancel(cause);
        let current = self
            .shared
            .current
            .borrow()
            .as_ref()
            .map(|expansion| Rc::clone(&expansion.list));
        if let Some(list) = current {
            list.materialize_cancel(cause);
        }
    }

    fn weight(&self) -> Weight {
        self.shared.wrapped.weight_element().plus(Weight::ONE)
    }
}
