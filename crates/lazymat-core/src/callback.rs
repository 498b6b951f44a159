//! The three callback shapes every query answers through.
//!
//! - [`ValueCallback`]: a single value or an error.
//! - [`IndexedCallback`]: an element at an index, the end of the sequence with
//!   its resolved size, or an error.
//! - [`IndexedPredicate`]: called once per visited element during a bounded
//!   traversal; returning `false` ends the traversal without further calls.

use crate::error::{Error, Result};

pub type ValueCallback<T> = Box<dyn FnOnce(Result<T>)>;

/// Answer to a per-index element query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indexed<E> {
    Element { index: usize, element: E },
    /// The requested index is past the end; `size` is the resolved size.
    End { size: usize },
}

impl<E> Indexed<E> {
    pub fn element(self) -> Option<E> {
        match self {
            Indexed::Element { element, .. } => Some(element),
            Indexed::End { .. } => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Indexed::End { .. })
    }

    pub fn map<F>(self, f: impl FnOnce(E) -> F) -> Indexed<F> {
        match self {
            Indexed::Element { index, element } => Indexed::Element {
                index,
                element: f(element),
            },
            Indexed::End { size } => Indexed::End { size },
        }
    }
}

pub type IndexedCallback<E> = Box<dyn FnOnce(Result<Indexed<E>>)>;

/// Visitor driven by `materialize_next_while` / `materialize_prev_while`.
///
/// `test` is invoked in strict index order. After it returns `false` the
/// traversal stops and neither `complete` nor `error` is called.
pub trait IndexedPredicate<E> {
    fn test(&mut self, index: usize, element: E) -> bool;

    /// Natural end of the traversal; `size` is the resolved size.
    fn complete(self: Box<Self>, size: usize);

    fn error(self: Box<Self>, error: Error);
}

/// Closure-backed predicate.
pub struct FnPredicate<T, C, X> {
    test: T,
    complete: C,
    error: X,
}

impl<E, T, C, X> IndexedPredicate<E> for FnPredicate<T, C, X>
where
    T: FnMut(usize, E) -> bool,
    C: FnOnce(usize),
    X: FnOnce(Error),
{
    fn test(&mut self, index: usize, element: E) -> bool {
        (self.test)(index, element)
    }

    fn complete(self: Box<Self>, size: usize) {
        (self.complete)(size)
    }

    fn error(self: Box<Self>, error: Error) {
        (self.error)(error)
    }
}

/// Build a boxed predicate out of three closures.
pub fn predicate<E, T, C, X>(test: T, complete: C, error: X) -> Box<dyn IndexedPredicate<E>>
where
    E: 'static,
    T: FnMut(usize, E) -> bool + 'static,
    C: FnOnce(usize) + 'static,
    X: FnOnce(Error) + 'static,
{
    Box::new(FnPredicate {
        test,
        complete,
        error,
    })
}

/// Predicate that visits every element and reports only how the traversal
/// ended: the resolved size, or the error.
pub struct CompletionPredicate {
    callback: ValueCallback<usize>,
}

impl CompletionPredicate {
    pub fn boxed<E>(callback: ValueCallback<usize>) -> Box<dyn IndexedPredicate<E>> {
        Box::new(Self { callback })
    }
}

impl<E> IndexedPredicate<E> for CompletionPredicate {
    fn test(&mut self, _index: usize, _element: E) -> bool {
        true
    }

    fn complete(self: Box<Self>, size: usize) {
        (self.callback)(Ok(size))
    }

    fn error(self: Box<Self>, error: Error) {
        (self.callback)(Err(error))
    }
}
