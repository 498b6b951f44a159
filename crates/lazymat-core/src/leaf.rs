//! Leaf and terminal materializers.
//!
//! [`ArrayListMaterializer`] is both the simplest leaf and the `Succeeded`
//! state every derived operator swaps to once it holds a full snapshot.
//! [`FailedListMaterializer`] is the `Failed` / `Cancelled` terminal state.

use std::rc::Rc;

use crate::callback::{Indexed, IndexedCallback, IndexedPredicate, ValueCallback};
use crate::error::Error;
use crate::materializer::{Element, ListMaterializer, Materializer, Status};
use crate::weight::Weight;

/// Materializer over elements that are already in memory.
pub struct ArrayListMaterializer<E> {
    elements: Rc<Vec<E>>,
}

impl<E: Element> ArrayListMaterializer<E> {
    pub fn new(elements: Rc<Vec<E>>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &Rc<Vec<E>> {
        &self.elements
    }
}

impl<E: Element> ListMaterializer<E> for ArrayListMaterializer<E> {
    fn known_size(&self) -> Option<usize> {
        Some(self.elements.len())
    }

    fn status(&self) -> Status {
        Status::Succeeded
    }

    fn materialize_cancel(&self, _cause: &Error) {}

    fn materialize_element(&self, index: usize, callback: IndexedCallback<E>) {
        let answer = match self.elements.get(index) {
            Some(element) => Indexed::Element {
                index,
                element: element.clone(),
            },
            None => Indexed::End {
                size: self.elements.len(),
            },
        };
        callback(Ok(answer));
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<E>>>) {
        callback(Ok(Rc::clone(&self.elements)));
    }

    fn materialize_next_while(&self, index: usize, mut predicate: Box<dyn IndexedPredicate<E>>) {
        let len = self.elements.len();
        for i in index..len {
            if !predicate.test(i, self.elements[i].clone()) {
                return;
            }
        }
        predicate.complete(len);
    }

    fn materialize_prev_while(&self, index: usize, mut predicate: Box<dyn IndexedPredicate<E>>) {
        let len = self.elements.len();
        if len > 0 {
            let start = index.min(len - 1);
            for i in (0..=start).rev() {
                if !predicate.test(i, self.elements[i].clone()) {
                    return;
                }
            }
        }
        predicate.complete(len);
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        callback(Ok(self.elements.len()));
    }

    fn materialize_contains(&self, element: E, callback: ValueCallback<bool>) {
        callback(Ok(self.elements.contains(&element)));
    }

    fn materialize_empty(&self, callback: ValueCallback<bool>) {
        callback(Ok(self.elements.is_empty()));
    }

    fn materialize_has_element(&self, index: usize, callback: ValueCallback<bool>) {
        callback(Ok(index < self.elements.len()));
    }

    fn weight_element(&self) -> Weight {
        Weight::ONE
    }

    fn weight_elements(&self) -> Weight {
        Weight::ONE
    }

    fn weight_next_while(&self) -> Weight {
        Weight::of_elements(self.elements.len())
    }

    fn weight_prev_while(&self) -> Weight {
        Weight::of_elements(self.elements.len())
    }

    fn weight_size(&self) -> Weight {
        Weight::ONE
    }

    fn weight_contains(&self) -> Weight {
        Weight::of_elements(self.elements.len())
    }
}

/// Terminal state replaying one error to every query.
///
/// The status is `Cancelled` when the error is a cancellation and `Failed`
/// otherwise.
pub struct FailedListMaterializer {
    error: Error,
}

impl FailedListMaterializer {
    pub fn new(error: Error) -> Self {
        Self { error }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }
}

impl<E: Element> ListMaterializer<E> for FailedListMaterializer {
    fn known_size(&self) -> Option<usize> {
        None
    }

    fn status(&self) -> Status {
        if self.error.is_cancelled() {
            Status::Cancelled
        } else {
            Status::Failed
        }
    }

    fn materialize_cancel(&self, _cause: &Error) {}

    fn materialize_element(&self, _index: usize, callback: IndexedCallback<E>) {
        callback(Err(self.error.clone()));
    }

    fn materialize_elements(&self, callback: ValueCallback<Rc<Vec<E>>>) {
        callback(Err(self.error.clone()));
    }

    fn materialize_next_while(&self, _index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        predicate.error(self.error.clone());
    }

    fn materialize_prev_while(&self, _index: usize, predicate: Box<dyn IndexedPredicate<E>>) {
        predicate.error(self.error.clone());
    }

    fn materialize_size(&self, callback: ValueCallback<usize>) {
        callback(Err(self.error.clone()));
    }

    fn materialize_contains(&self, _element: E, callback: ValueCallback<bool>) {
        callback(Err(self.error.clone()));
    }

    fn materialize_empty(&self, callback: ValueCallback<bool>) {
        callback(Err(self.error.clone()));
    }

    fn materialize_has_element(&self, _index: usize, callback: ValueCallback<bool>) {
        callback(Err(self.error.clone()));
    }

    fn weight_element(&self) -> Weight {
        Weight::ONE
    }

    fn weight_elements(&self) -> Weight {
        Weight::ONE
    }

    fn weight_next_while(&self) -> Weight {
        Weight::ONE
    }

    fn weight_prev_while(&self) -> Weight {
        Weight::ONE
    }

    fn weight_size(&self) -> Weight {
        Weight::ONE
    }
}

pub fn from_vec<E: Element>(elements: Vec<E>) -> Materializer<E> {
    Rc::new(ArrayListMaterializer::new(Rc::new(elements)))
}

pub fn from_rc<E: Element>(elements: Rc<Vec<E>>) -> Materializer<E> {
    Rc::new(ArrayListMaterializer::new(elements))
}

pub fn empty<E: Element>() -> Materializer<E> {
    from_vec(Vec::new())
}

pub fn single<E: Element>(element: E) -> Materializer<E> {
    from_vec(vec![element])
}

pub fn failed<E: Element>(error: Error) -> Materializer<E> {
    Rc::new(FailedListMaterializer::new(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::predicate;
    use std::cell::RefCell;

    fn capture<T: 'static>() -> (Rc<RefCell<Option<crate::error::Result<T>>>>, ValueCallback<T>) {
        let slot = Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        (slot, Box::new(move |res| *out.borrow_mut() = Some(res)))
    }

    #[test]
    fn element_past_end_reports_size() {
        let list = from_vec(vec![1, 2, 3]);
        let seen = Rc::new(RefCell::new(None));
        let out = Rc::clone(&seen);
        list.materialize_element(5, Box::new(move |res| *out.borrow_mut() = Some(res)));
        assert_eq!(*seen.borrow(), Some(Ok(Indexed::End { size: 3 })));
    }

    #[test]
    fn prev_while_clamps_to_last_index() {
        let list = from_vec(vec![10, 20, 30]);
        let visited = Rc::new(RefCell::new(Vec::new()));
        let done = Rc::new(RefCell::new(None));
        let (v, d) = (Rc::clone(&visited), Rc::clone(&done));
        list.materialize_prev_while(
            99,
            predicate(
                move |i, e| {
                    v.borrow_mut().push((i, e));
                    true
                },
                move |size| *d.borrow_mut() = Some(size),
                |_| {},
            ),
        );
        assert_eq!(*visited.borrow(), vec![(2, 30), (1, 20), (0, 10)]);
        assert_eq!(*done.borrow(), Some(3));
    }

    #[test]
    fn next_while_stops_silently() {
        let list = from_vec(vec![1, 2, 3, 4]);
        let done = Rc::new(RefCell::new(false));
        let d = Rc::clone(&done);
        list.materialize_next_while(
            1,
            predicate(|i, _| i < 2, move |_| *d.borrow_mut() = true, |_| {}),
        );
        assert!(!*done.borrow());
    }

    #[test]
    fn failed_replays_error_and_reports_cancelled_status() {
        let list: Materializer<u8> = failed(Error::cancelled("stop"));
        assert_eq!(list.status(), Status::Cancelled);
        let (slot, cb) = capture();
        list.materialize_size(cb);
        assert_eq!(*slot.borrow(), Some(Err(Error::cancelled("stop"))));

        let list: Materializer<u8> = failed(Error::upstream("boom"));
        assert_eq!(list.status(), Status::Failed);
    }
}
