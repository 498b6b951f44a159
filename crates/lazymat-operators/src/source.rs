//! Iterator-backed leaf whose size is only known once the iterator runs dry.
//!
//! Elements are pulled lazily through the pump, so an operator stacked on a
//! source sees an upstream with undetermined size until it was fully read.

use std::cell::RefCell;
use std::rc::Rc;

use lazymat_core::prelude::*;

use crate::pump::{pumped, Producer, Pulled};
use crate::traits::OperatorKind;

pub fn from_iter<E, I>(ctx: &Context, iter: I) -> Materializer<E>
where
    E: Element,
    I: IntoIterator<Item = E>,
    I::IntoIter: 'static,
{
    try_from_iter(ctx, iter.into_iter().map(Ok))
}

/// Like [`from_iter`]; an `Err` item fails the source.
pub fn try_from_iter<E, I>(ctx: &Context, iter: I) -> Materializer<E>
where
    E: Element,
    I: IntoIterator<Item = Result<E>>,
    I::IntoIter: 'static,
{
    let producer = IterProducer {
        iter: RefCell::new(Some(Box::new(iter.into_iter()))),
    };
    pumped(ctx, OperatorKind::Source, Rc::new(producer))
}

struct IterProducer<E> {
    iter: RefCell<Option<Box<dyn Iterator<Item = Result<E>>>>>,
}

impl<E: Element> Producer<E> for IterProducer<E> {
    fn pull(&self, done: ValueCallback<Pulled<E>>) {
        let next = match self.iter.borrow_mut().as_mut() {
            Some(iter) => iter.next(),
            None => None,
        };
        match next {
            Some(Ok(element)) => done(Ok(Pulled::Element(element))),
            Some(Err(error)) => {
                self.iter.borrow_mut().take();
                done(Err(error))
            }
            None => {
                self.iter.borrow_mut().take();
                done(Ok(Pulled::Exhausted))
            }
        }
    }

    fn cancel(&self, _cause: &Error) {
        self.iter.borrow_mut().take();
    }

    fn weight(&self) -> Weight {
        Weight::ONE
    }
}
