//! Pull engine behind operators whose output index space can only be learned
//! by producing elements in order (flat-map, symmetric difference, iterator
//! sources).
//!
//! A [`Producer`] yields one step at a time. The pump keeps every produced
//! element in a growing cache and a map from requested output index to the
//! callbacks waiting for it. While anyone is waiting, the pump pulls the next
//! step and then re-arms itself through the scheduler, so one scheduled task
//! does at most `pump_batch` pulls. Once the producer is exhausted the
//! chassis swaps to the cached snapshot.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use lazymat_core::index::{check_index, MAX_INDEX};
use lazymat_core::prelude::*;
use lazymat_core::traverse::{next_while_by_element, prev_while_by_element, Fetch};

use crate::traits::{OpBase, OperatorKind};

/// Outcome of one producer step.
#[derive(Debug, Clone, PartialEq)]
pub enum Pulled<F> {
    /// The next output element.
    Element(F),
    /// Progress without output; pull again.
    Nothing,
    /// No more output.
    Exhausted,
}

/// Incremental source of output elements, pulled one step at a time.
pub trait Producer<F: Element> {
    /// Produce the next step. Must answer exactly once and must not be called
    /// again before it answers.
    fn pull(&self, done: ValueCallback<Pulled<F>>);

    /// Cancel every upstream the producer holds.
    fn cancel(&self, cause: &Error);

    /// Cost hint for one pull.
    fn weight(&self) -> Weight;
}

/// Wrap `producer` in a chassis driven by a pump.
pub fn pumped<F: Element>(ctx: &Context, kind: OperatorKind, producer: Rc<dyn Producer<F>>) -> Materializer<F> {
    StatefulMaterializer::build(kind.name(), |holder| {
        Rc::new(PumpState {
            inner: Rc::new(PumpInner {
                base: OpBase::new(ctx, holder),
                producer,
                cache: RefCell::new(Vec::new()),
                element_waiters: RefCell::new(BTreeMap::new()),
                size_waiters: RefCell::new(Waiters::new()),
                list_waiters: RefCell::new(Waiters::new()),
                running: Cell::new(false),
                in_pull: Cell::new(false),
                inline: RefCell::new(None),
                outcome: RefCell::new(None),
            }),
        })
    })
}

struct PumpState<F: Element> {
    inner: Rc<PumpInner<F>>,
}

struct PumpInner<F: Element> {
    base: OpBase<F>,
    producer: Rc<dyn Producer<F>>,
    cache: RefCell<Vec<F>>,
    element_waiters: RefCell<BTreeMap<usize, Vec<IndexedCallback<F>>>>,
    size_waiters: RefCell<Waiters<usize>>,
    list_waiters: RefCell<Waiters<Rc<Vec<F>>>>,
    running: Cell<bool>,
    in_pull: Cell<bool>,
    inline: RefCell<Option<Result<Pulled<F>>>>,
    /// Final size or error once the producer stopped.
    outcome: RefCell<Option<Result<Rc<Vec<F>>>>>,
}

impl<F: Element> PumpInner<F> {
    fn finished(&self) -> Option<Result<Rc<Vec<F>>>> {
        self.outcome.borrow().clone()
    }

    fn has_waiters(&self) -> bool {
        !self.element_waiters.borrow().is_empty()
            || !self.size_waiters.borrow().is_empty()
            || !self.list_waiters.borrow().is_empty()
    }

    /// Start pumping unless a pump is already armed or the producer stopped.
    fn ensure_running(self: &Rc<Self>) {
        if self.running.get() || self.outcome.borrow().is_some() {
            return;
        }
        self.running.set(true);
        self.arm();
    }

    fn arm(self: &Rc<Self>) {
        let this = Rc::clone(self);
        let weight = self.producer.weight();
        self.base
            .ctx
            .schedule(self.base.chain(), weight, move || this.pump());
    }

    /// One scheduled task: up to `pump_batch` pulls answered synchronously.
    fn pump(self: Rc<Self>) {
        if let Some(cause) = self.base.ctx.token().cause() {
            self.finish(Err(cause));
            return;
        }
        let batch = self.base.ctx.config().pump_batch.max(1);
        for _ in 0..batch {
            if !self.has_waiters() {
                self.running.set(false);
                return;
            }
            self.in_pull.set(true);
            let this = Rc::clone(&self);
            self.producer.pull(Box::new(move |step| {
                if this.in_pull.get() {
                    *this.inline.borrow_mut() = Some(step);
                } else if this.on_pulled(step) {
                    this.arm();
                }
            }));
            self.in_pull.set(false);
            let step = self.inline.borrow_mut().take();
            match step {
                Some(step) => {
                    if !self.on_pulled(step) {
                        return;
                    }
                }
                // The producer answers later and re-arms the pump.
                None => return,
            }
        }
        self.arm();
    }

    /// Apply one step; `true` means keep pumping.
    fn on_pulled(self: &Rc<Self>, step: Result<Pulled<F>>) -> bool {
        match step {
            Ok(Pulled::Element(element)) => {
                let index = {
                    let mut cache = self.cache.borrow_mut();
                    cache.push(element.clone());
                    cache.len() - 1
                };
                #[cfg(feature = "tracing")]
                tracing::trace!(label = self.base.holder.label(), index, "pump produced element");
                if index >= MAX_INDEX {
                    self.finish(Err(Error::Overflow(format!(
                        "{} produced more than {MAX_INDEX} elements",
                        self.base.holder.label()
                    ))));
                    return false;
                }
                let waiting = self.element_waiters.borrow_mut().remove(&index);
                for callback in waiting.into_iter().flatten() {
                    callback(Ok(Indexed::Element {
                        index,
                        element: element.clone(),
                    }));
                }
                true
            }
            Ok(Pulled::Nothing) => true,
            Ok(Pulled::Exhausted) => {
                let snapshot = Rc::new(self.cache.borrow().clone());
                self.finish(Ok(snapshot));
                false
            }
            Err(error) => {
                self.finish(Err(error));
                false
            }
        }
    }

    fn finish(&self, outcome: Result<Rc<Vec<F>>>) {
        if self.outcome.borrow().is_some() {
            return;
        }
        self.running.set(false);
        let outcome = self.base.holder.settle(&self.base.ctx, outcome);
        *self.outcome.borrow_mut() = Some(outcome.clone());
        #[cfg(feature = "tracing")]
        tracing::debug!(label = self.base.holder.label(), ok = outcome.is_ok(), "pump finished");

        let waiting = std::mem::take(&mut *self.element_waiters.borrow_mut());
        let sizes = self.size_waiters.borrow_mut().take();
        let lists = self.list_waiters.borrow_mut().take();
        match &outcome {
            Ok(elements) => {
                let size = elements.len();
                for callback in waiting.into_values().flatten() {
                    callback(Ok(Indexed::End { size }));
                }
            }
            Err(error) => {
                for callback in waiting.into_values().flatten() {
                    callback(Err(error.clone()));
                }
            }
        }
        sizes.deliver(outcome.clone().map(|elements| elements.len()));
        lists.deliver(outcome);
    }

    fn element(self: &Rc<Self>, index: usize, callback: IndexedCallback<F>) {
        if let Err(error) = check_index(index) {
            callback(Err(error));
            return;
        }
        let cached = self.cache.borrow().get(index).cloned();
        if let Some(element) = cached {
            callback(Ok(Indexed::Element { index, element }));
            return;
        }
        match self.finished() {
            Some(Ok(elements)) => callback(Ok(Indexed::End {
                size: elements.len(),
            })),
            Some(Err(error)) => callback(Err(error)),
            None => {
                self.element_waiters
                    .borrow_mut()
                    .entry(index)
                    .or_default()
                    .push(callback);
                self.ensure_running();
            }
        }
    }

    fn size(self: &Rc<Self>, callback: ValueCallback<usize>) {
        match self.finished() {
            Some(outcome) => callback(outcome.map(|elements| elements.len())),
            None => {
                self.size_waiters.borrow_mut().register(callback);
                self.ensure_running();
            }
        }
    }

    fn elements(self: &Rc<Self>, callback: ValueCallback<Rc<Vec<F>>>) {
        match self.finished() {
            Some(outcome) => callback(outcome),
            None => {
                self.list_waiters.borrow_mut().register(callback);
                self.ensure_running();
            }
        }
    }

    fn fetch(self: &Rc<Self>) -> Fetch<F> {
        let this = Rc::clone(self);
        Rc::new(move |index, callback| this.element(index, callback))
    }
}

impl<F: Element> ListMaterializer<F> for PumpState<F> {
    fn known_size(&self) -> Option<usize> {
        match &*self.inner.outcome.borrow() {
            Some(Ok(elements)) => Some(elements.len()),
            _ => None,
        }
    }

    fn status(&self) -> Status {
        Status::Running
    }

    fn materialize_cancel(&self, cause: &Error) {
        self.inner.producer.cancel(cause);
        self.inner.finish(Err(cause.clone()));
    }

    fn materialize_element(&self, index: usize, callback: IndexedCallback<F>) {
        self.inner.element(index, callback)
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<F>>>) {
        self.inner.elements(callback)
    }

    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<F>>) {
        let inner = &self.inner;
        next_while_by_element(&inner.base.ctx, inner.base.chain(), inner.fetch(), index, predicate)
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<F>>) {
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
        self.inner.size(callback)
    }

    fn weight_element(&self) -> Weight {
        self.inner.producer.weight()
    }

    fn weight_elements(&self) -> Weight {
        self.inner.producer.weight()
    }

    fn weight_next_while(&self) -> Weight {
        self.inner.producer.weight()
    }

    fn weight_prev_while(&self) -> Weight {
        self.inner.producer.weight()
    }

    fn weight_size(&self) -> Weight {
        self.inner.producer.weight()
    }
}
