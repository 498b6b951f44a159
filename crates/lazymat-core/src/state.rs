//! Lifecycle chassis shared by every derived materializer.
//!
//! A [`StatefulMaterializer`] owns exactly one active state delegate and
//! forwards every query to it. States start immaterial (operator specific),
//! and swap themselves (through a weak [`StateRef`]) to a pass-through
//! upstream, a full snapshot, or a terminal error. A terminal state is never
//! replaced.
//!
//! Queries clone the current delegate out of the cell before calling it, so
//! no borrow is held while control flows into another materializer.
//!
//! Dropping a chassis releases its delegate through a per-thread queue, so
//! tearing down an arbitrarily deep operator chain uses constant stack.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::callback::{IndexedCallback, IndexedPredicate, ValueCallback};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::leaf::{empty, from_rc, FailedListMaterializer};
use crate::materializer::{Element, ListMaterializer, Materializer, Status};
use crate::weight::Weight;

pub struct StatefulMaterializer<E: Element> {
    label: &'static str,
    state: RefCell<Materializer<E>>,
}

impl<E: Element> StatefulMaterializer<E> {
    /// Build a chassis whose initial state is produced by `init`. The state
    /// receives a [`StateRef`] to swap itself later; it must not use it
    /// during construction.
    pub fn build(
        label: &'static str,
        init: impl FnOnce(StateRef<E>) -> Materializer<E>,
    ) -> Materializer<E> {
        let holder: Rc<Self> = Rc::new_cyclic(|weak| Self {
            label,
            state: RefCell::new(init(StateRef {
                holder: weak.clone(),
                label,
            })),
        });
        holder
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> Materializer<E> {
        Rc::clone(&self.state.borrow())
    }

    fn swap(&self, next: Materializer<E>) -> bool {
        let current = self.state();
        if current.status().is_terminal() || Rc::ptr_eq(&current, &next) {
            return false;
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(
            label = self.label,
            from = ?current.status(),
            to = ?next.status(),
            "materializer state swap"
        );
        *self.state.borrow_mut() = next;
        true
    }
}

impl<E: Element> ListMaterializer<E> for StatefulMaterializer<E> {
    fn known_size(&self) -> Option<usize> {
        self.state().known_size()
    }

    fn status(&self) -> Status {
        self.state().status()
    }

    fn materialize_cancel(&self, cause: &Error) {
        let current = self.state();
        if current.status().is_terminal() {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(label = self.label, %cause, "materializer cancelled");
        *self.state.borrow_mut() = Rc::new(FailedListMaterializer::new(cause.clone()));
        current.materialize_cancel(cause);
    }

    fn materialize_element(&self, index: usize, callback: IndexedCallback<E>) {
        self.state().materialize_element(index, callback)
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<E>>>) {
        self.state().materialize_elements(callback)
    }

    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.state().materialize_next_while(index, predicate)
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.state().materialize_prev_while(index, predicate)
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        self.state().materialize_size(callback)
    }

    fn materialize_contains(&self, element: E, callback: ValueCallback<bool>) {
        self.state().materialize_contains(element, callback)
    }

    fn materialize_empty(&self, callback: ValueCallback<bool>) {
        self.state().materialize_empty(callback)
    }

    fn materialize_has_element(&self, index: usize, callback: ValueCallback<bool>) {
        self.state().materialize_has_element(index, callback)
    }

    fn weight_element(&self) -> Weight {
        self.state().weight_element()
    }

    fn weight_elements(&self) -> Weight {
        self.state().weight_elements()
    }

    fn weight_next_while(&self) -> Weight {
        self.state().weight_next_while()
    }

    fn weight_prev_while(&self) -> Weight {
        self.state().weight_prev_while()
    }

    fn weight_size(&self) -> Weight {
        self.state().weight_size()
    }

    fn weight_contains(&self) -> Weight {
        self.state().weight_contains()
    }

    fn weight_empty(&self) -> Weight {
        self.state().weight_empty()
    }

    fn weight_has_element(&self) -> Weight {
        self.state().weight_has_element()
    }
}

thread_local! {
    static RELEASING: Cell<bool> = Cell::new(false);
    static RELEASED: RefCell<Vec<Box<dyn Any>>> = RefCell::new(Vec::new());
}

/// Drop `state` after the outermost release on this thread returns. Nested
/// releases only enqueue; the outermost one drains the queue in a loop.
fn release(state: Box<dyn Any>) {
    let nested = RELEASING.try_with(|flag| flag.replace(true)).unwrap_or(false);
    if nested {
        // During thread teardown the closure drops `state` in place.
        let _ = RELEASED.try_with(|queue| queue.borrow_mut().push(state));
        return;
    }
    drop(state);
    while let Some(next) = RELEASED
        .try_with(|queue| queue.borrow_mut().pop())
        .ok()
        .flatten()
    {
        drop(next);
    }
    let _ = RELEASING.try_with(|flag| flag.set(false));
}

impl<E: Element> Drop for StatefulMaterializer<E> {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), empty());
        release(Box::new(state));
    }
}

/// Weak handle a state uses to replace itself.
pub struct StateRef<E: Element> {
    holder: Weak<StatefulMaterializer<E>>,
    label: &'static str,
}

impl<E: Element> Clone for StateRef<E> {
    fn clone(&self) -> Self {
        Self {
            holder: Weak::clone(&self.holder),
            label: self.label,
        }
    }
}

impl<E: Element> StateRef<E> {
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// The chassis itself, while anyone still holds it.
    pub fn materializer(&self) -> Option<Materializer<E>> {
        self.holder
            .upgrade()
            .map(|holder| holder as Materializer<E>)
    }

    /// The active delegate, while the chassis is alive.
    pub fn current(&self) -> Option<Materializer<E>> {
        self.holder.upgrade().map(|holder| holder.state())
    }

    /// Replace the active delegate unless the chassis already reached a
    /// terminal state. Returns `true` if the swap happened.
    pub fn set_state(&self, next: Materializer<E>) -> bool {
        match self.holder.upgrade() {
            Some(holder) => holder.swap(next),
            None => false,
        }
    }

    /// Swap to a full snapshot.
    pub fn succeed(&self, elements: Rc<Vec<E>>) -> bool {
        self.set_state(from_rc(elements))
    }

    /// Swap to the terminal error state.
    pub fn fail(&self, error: Error) -> bool {
        #[cfg(feature = "tracing")]
        tracing::debug!(label = self.label, %error, "materializer failed");
        self.set_state(Rc::new(FailedListMaterializer::new(error)))
    }

    /// Settle a full-list outcome: cancellation first, then success or
    /// failure. Returns the outcome waiters should observe.
    pub fn settle(&self, ctx: &Context, outcome: Result<Rc<Vec<E>>>) -> Result<Rc<Vec<E>>> {
        match ctx.resolve(outcome) {
            Ok(elements) => {
                self.succeed(Rc::clone(&elements));
                Ok(elements)
            }
            Err(error) => {
                self.fail(error.clone());
                Err(error)
            }
        }
    }
}

type Replay<E> = Box<dyn FnOnce(Result<Materializer<E>>)>;
type Resolver<E> = Box<dyn FnOnce(ValueCallback<Materializer<E>>)>;

/// Immaterial state that must learn something (typically an upstream size)
/// before it knows which state to become.
///
/// The first query runs the resolver; every query that arrives before the
/// resolver answers is queued and replayed, in arrival order, against the
/// resolved state.
pub struct ResolvingListMaterializer<E: Element> {
    inner: Rc<ResolvingInner<E>>,
}

struct ResolvingInner<E: Element> {
    ctx: Context,
    holder: StateRef<E>,
    upstreams: Vec<Materializer<E>>,
    resolver: RefCell<Option<Resolver<E>>>,
    pending: RefCell<Vec<Replay<E>>>,
    settled: Cell<bool>,
}

impl<E: Element> ResolvingListMaterializer<E> {
    pub fn new(
        ctx: Context,
        holder: StateRef<E>,
        upstreams: Vec<Materializer<E>>,
        resolver: impl FnOnce(ValueCallback<Materializer<E>>) + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(ResolvingInner {
                ctx,
                holder,
                upstreams,
                resolver: RefCell::new(Some(Box::new(resolver))),
                pending: RefCell::new(Vec::new()),
                settled: Cell::new(false),
            }),
        }
    }

    fn enqueue(&self, replay: Replay<E>) {
        self.inner.pending.borrow_mut().push(replay);
        let resolver = self.inner.resolver.borrow_mut().take();
        if let Some(resolver) = resolver {
            let inner = Rc::clone(&self.inner);
            resolver(Box::new(move |outcome| inner.on_resolved(outcome)));
        }
    }

    fn resolution_weight(&self) -> Weight {
        self.inner.upstreams.iter().map(|u| u.weight_size()).sum()
    }

    fn first_weight(&self, f: impl Fn(&Materializer<E>) -> Weight) -> Weight {
        self.inner.upstreams.first().map(f).unwrap_or(Weight::ONE)
    }
}

impl<E: Element> ResolvingInner<E> {
    fn on_resolved(&self, outcome: Result<Materializer<E>>) {
        if self.settled.replace(true) {
            return;
        }
        let outcome = self.ctx.resolve(outcome);
        match &outcome {
            Ok(state) => {
                self.holder.set_state(Rc::clone(state));
            }
            Err(error) => {
                self.holder.fail(error.clone());
            }
        }
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        for replay in pending {
            replay(outcome.clone());
        }
    }
}

impl<E: Element> ListMaterializer<E> for ResolvingListMaterializer<E> {
    fn known_size(&self) -> Option<usize> {
        None
    }

    fn status(&self) -> Status {
        Status::Running
    }

    fn materialize_cancel(&self, cause: &Error) {
        if self.inner.settled.replace(true) {
            return;
        }
        self.inner.resolver.borrow_mut().take();
        for upstream in &self.inner.upstreams {
            upstream.materialize_cancel(cause);
        }
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        for replay in pending {
            replay(Err(cause.clone()));
        }
    }

    fn materialize_element(&self, index: usize, callback: IndexedCallback<E>) {
        self.enqueue(Box::new(move |state| match state {
            Ok(state) => state.materialize_element(index, callback),
            Err(error) => callback(Err(error)),
        }));
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<E>>>) {
        self.enqueue(Box::new(move |state| match state {
            Ok(state) => state.materialize_elements(callback),
            Err(error) => callback(Err(error)),
        }));
    }

    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.enqueue(Box::new(move |state| match state {
            Ok(state) => state.materialize_next_while(index, predicate),
            Err(error) => predicate.error(error),
        }));
    }

    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        self.enqueue(Box::new(move |state| match state {
            Ok(state) => state.materialize_prev_while(index, predicate),
            Err(error) => predicate.error(error),
        }));
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        self.enqueue(Box::new(move |state| match state {
            Ok(state) => state.materialize_size(callback),
            Err(error) => callback(Err(error)),
        }));
    }

    fn materialize_contains(&self, element: E, callback: ValueCallback<bool>) {
        self.enqueue(Box::new(move |state| match state {
            Ok(state) => state.materialize_contains(element, callback),
            Err(error) => callback(Err(error)),
        }));
    }

    fn materialize_empty(&self, callback: ValueCallback<bool>) {
        self.enqueue(Box::new(move |state| match state {
            Ok(state) => state.materialize_empty(callback),
            Err(error) => callback(Err(error)),
        }));
    }

    fn materialize_has_element(&self, index: usize, callback: ValueCallback<bool>) {
        self.enqueue(Box::new(move |state| match state {
            Ok(state) => state.materialize_has_element(index, callback),
            Err(error) => callback(Err(error)),
        }));
    }

    fn weight_element(&self) -> Weight {
        self.resolution_weight()
            .plus(self.first_weight(|u| u.weight_element()))
    }

    fn weight_elements(&self) -> Weight {
        self.resolution_weight()
            .plus(self.first_weight(|u| u.weight_elements()))
    }

    fn weight_next_while(&self) -> Weight {
        self.resolution_weight()
            .plus(self.first_weight(|u| u.weight_next_while()))
    }

    fn weight_prev_while(&self) -> Weight {
        self.resolution_weight()
            .plus(self.first_weight(|u| u.weight_prev_while()))
    }

    fn weight_size(&self) -> Weight {
        self.resolution_weight()
    }
}
