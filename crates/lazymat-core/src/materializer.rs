//! The capability contract implemented by every node of a pipeline.
//!
//! Leaves and derived operators expose the same trait, so any materializer is
//! a valid upstream for another one. All queries are continuation-based: an
//! implementation either answers synchronously from what it already knows or
//! registers the callback and returns immediately. Callers must not assume
//! either.
//!
//! Invariants:
//! - `known_size` is `None` until the size is determined, then only grows
//!   toward (and finally equals) the true size.
//! - `status` leaves `Running` at most once and never returns to it.
//! - After a terminal status every query replays the cached outcome.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::callback::{Indexed, IndexedCallback, IndexedPredicate, ValueCallback};
use crate::error::Error;
use crate::weight::{QueryWeights, Weight};

/// Bound shared by every element type flowing through a pipeline.
pub trait Element: Clone + PartialEq + fmt::Debug + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> Element for T {}

/// Lifecycle phase observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Running)
    }
}

/// Shared handle to any materializer.
pub type Materializer<E> = Rc<dyn ListMaterializer<E>>;

pub trait ListMaterializer<E: Element> {
    /// Size determined so far, `None` while undetermined.
    fn known_size(&self) -> Option<usize>;

    fn status(&self) -> Status;

    /// Cancel this node and, recursively, every upstream it holds. Pending
    /// callbacks observe `cause`.
    fn materialize_cancel(&self, cause: &Error);

    fn materialize_element(&self, index: usize, callback: IndexedCallback<E>);

    /// Full snapshot. Concurrent callers share one upstream computation.
    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<E>>>);

    /// Visit `[index, size)` in ascending order while `predicate` returns `true`.
    fn materialize_next_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>);

    /// Visit `[0, index]` in descending order while `predicate` returns `true`.
    /// An index at or past the end starts from the last element.
    fn materialize_prev_while(&self, index: usize, predicate: Box<dyn IndexedPredicate<E>>);

    fn materialize_size(&self, callback: ValueCallback<usize>);

    fn materialize_contains(&self, element: E, callback: ValueCallback<bool>) {
        self.materialize_next_while(0, Box::new(ContainsPredicate::new(element, callback)));
    }

    fn materialize_empty(&self, callback: ValueCallback<bool>) {
        self.materialize_element(
            0,
            Box::new(move |res| callback(res.map(|indexed| indexed.is_end()))),
        );
    }

    fn materialize_has_element(&self, index: usize, callback: ValueCallback<bool>) {
        self.materialize_element(
            index,
            Box::new(move |res| callback(res.map(|indexed| !indexed.is_end()))),
        );
    }

    fn weight_element(&self) -> Weight;

    fn weight_elements(&self) -> Weight;

    fn weight_next_while(&self) -> Weight;

    fn weight_prev_while(&self) -> Weight;

    fn weight_size(&self) -> Weight;

    fn weight_contains(&self) -> Weight {
        self.weight_next_while()
    }

    fn weight_empty(&self) -> Weight {
        self.weight_element()
    }

    fn weight_has_element(&self) -> Weight {
        self.weight_element()
    }

    /// Snapshot of the five primitive query weights.
    fn query_weights(&self) -> QueryWeights {
        QueryWeights {
            element: self.weight_element(),
            elements: self.weight_elements(),
            next_while: self.weight_next_while(),
            prev_while: self.weight_prev_while(),
            size: self.weight_size(),
        }
    }

    fn is_done(&self) -> bool {
        self.status() == Status::Succeeded
    }

    fn is_failed(&self) -> bool {
        self.status() == Status::Failed
    }

    fn is_cancelled(&self) -> bool {
        self.status() == Status::Cancelled
    }
}

/// Stops at the first element equal to `target`.
struct ContainsPredicate<E> {
    target: E,
    callback: Option<ValueCallback<bool>>,
}

impl<E> ContainsPredicate<E> {
    fn new(target: E, callback: ValueCallback<bool>) -> Self {
        Self {
            target,
            callback: Some(callback),
        }
    }
}

impl<E: Element> IndexedPredicate<E> for ContainsPredicate<E> {
    fn test(&mut self, _index: usize, element: E) -> bool {
        if element != self.target {
            return true;
        }
        if let Some(callback) = self.callback.take() {
            callback(Ok(true));
        }
        false
    }

    fn complete(mut self: Box<Self>, _size: usize) {
        if let Some(callback) = self.callback.take() {
            callback(Ok(false));
        }
    }

    fn error(mut self: Box<Self>, error: Error) {
        if let Some(callback) = self.callback.take() {
            callback(Err(error));
        }
    }
}

/// Convenience used by operators to forward an `Indexed` answer whose index
/// lives in another index space.
pub fn reindex<E>(indexed: Indexed<E>, index: usize) -> Indexed<E> {
    match indexed {
        Indexed::Element { element, .. } => Indexed::Element { index, element },
        end => end,
    }
}
