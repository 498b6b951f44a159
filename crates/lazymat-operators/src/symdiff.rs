//! Multiset symmetric difference.
//!
//! `other` is materialized once into a bag of remaining counts. The wrapped
//! list is then streamed: an element with a remaining count consumes one and
//! is dropped (it occurs in both), anything else is emitted. Whatever is left
//! in the bag afterwards occurs only in `other` and is emitted in `other`'s
//! order. Output positions settle only as the stream advances, so the
//! operator runs on the pull pump.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use lazymat_core::prelude::*;

use crate::pump::{pumped, Producer, Pulled};
use crate::traits::OperatorKind;

pub fn symmetric_difference<E>(ctx: &Context, list: Materializer<E>, other: Materializer<E>) -> Materializer<E>
where
    E: Element + Hash + Eq,
{
    if other.known_size() == Some(0) {
        return list;
    }
    if list.known_size() == Some(0) {
        return other;
    }
    let producer = SymDiffProducer {
        shared: Rc::new(SymDiffShared {
            wrapped: list,
            other,
            bag: RefCell::new(None),
            phase: Cell::new(Phase::Bag),
        }),
    };
    pumped(ctx, OperatorKind::SymmetricDifference, Rc::new(producer))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// `other` not materialized yet.
    Bag,
    /// Streaming the wrapped list from this index.
    Stream(usize),
    /// Emitting the bag's leftovers, walking `other` from this index.
    Leftover(usize),
    Done,
}

/// Remaining counts plus `other` itself, kept to emit leftovers in order.
struct Bag<E> {
    counts: HashMap<E, usize>,
    order: Rc<Vec<E>>,
}

impl<E: Hash + Eq + Clone> Bag<E> {
    fn new(order: Rc<Vec<E>>) -> Self {
        let mut counts = HashMap::with_capacity(order.len());
        for element in order.iter() {
            *counts.entry(element.clone()).or_insert(0) += 1;
        }
        Self { counts, order }
    }

    /// Consume one occurrence; `false` if none is left.
    fn take(&mut self, element: &E) -> bool {
        match self.counts.get_mut(element) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }
}

struct SymDiffProducer<E: Element + Hash + Eq> {
    shared: Rc<SymDiffShared<E>>,
}

struct SymDiffShared<E: Element + Hash + Eq> {
    wrapped: Materializer<E>,
    other: Materializer<E>,
    bag: RefCell<Option<Bag<E>>>,
    phase: Cell<Phase>,
}

impl<E: Element + Hash + Eq> SymDiffShared<E> {
    fn build_bag(self: &Rc<Self>, done: ValueCallback<Pulled<E>>) {
        let this = Rc::clone(self);
        self.other.materialize_elements(Box::new(move |other| match other {
            Ok(other) => {
                *this.bag.borrow_mut() = Some(Bag::new(other));
                this.phase.set(Phase::Stream(0));
                done(Ok(Pulled::Nothing))
            }
            Err(error) => done(Err(error)),
        }));
    }

    fn stream(self: &Rc<Self>, index: usize, done: ValueCallback<Pulled<E>>) {
        let this = Rc::clone(self);
        self.wrapped.materialize_element(
            index,
            Box::new(move |answer| match answer {
                Ok(Indexed::Element { element, .. }) => {
                    this.phase.set(Phase::Stream(index + 1));
                    let shared = this
                        .bag
                        .borrow_mut()
                        .as_mut()
                        .is_some_and(|bag| bag.take(&element));
                    if shared {
                        done(Ok(Pulled::Nothing))
                    } else {
                        done(Ok(Pulled::Element(element)))
                    }
                }
                Ok(Indexed::End { .. }) => {
                    this.phase.set(Phase::Leftover(0));
                    done(Ok(Pulled::Nothing))
                }
                Err(error) => done(Err(error)),
            }),
        );
    }

    fn leftover(&self, index: usize, done: ValueCallback<Pulled<E>>) {
        let step = {
            let mut bag = self.bag.borrow_mut();
            match bag.as_mut() {
                None => Err(Error::Invariant("symmetric difference bag missing".into())),
                Some(bag) => match bag.order.get(index).cloned() {
                    None => Ok(None),
                    Some(element) => Ok(Some(bag.take(&element).then_some(element))),
                },
            }
        };
        match step {
            Err(error) => done(Err(error)),
            Ok(None) => {
                self.phase.set(Phase::Done);
                self.bag.borrow_mut().take();
                done(Ok(Pulled::Exhausted))
            }
            Ok(Some(element)) => {
                self.phase.set(Phase::Leftover(index + 1));
                match element {
                    Some(element) => done(Ok(Pulled::Element(element))),
                    None => done(Ok(Pulled::Nothing)),
                }
            }
        }
    }
}

impl<E: Element + Hash + Eq> Producer<E> for SymDiffProducer<E> {
    fn pull(&self, done: ValueCallback<Pulled<E>>) {
        match self.shared.phase.get() {
            Phase::Bag => self.shared.build_bag(done),
            Phase::Stream(index) => self.shared.stream(index, done),
            Phase::Leftover(index) => self.shared.leftover(index, done),
            Phase::Done => done(Ok(Pulled::Exhausted)),
        }
    }

    fn cancel(&self, cause: &Error) {
        self.shared.wrapped.materialize_cancel(cause);
        self.shared.other.materialize_cancel(cause);
    }

    fn weight(&self) -> Weight {
        self.shared.wrapped.weight_element().plus(Weight::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_consumes_one_occurrence_at_a_time() {
        let mut bag = Bag::new(Rc::new(vec![2, 3, 3]));
        assert!(bag.take(&3));
        assert!(bag.take(&3));
        assert!(!bag.take(&3));
        assert!(!bag.take(&1));
        assert!(bag.take(&2));
    }
}
