//! Memoized multi-waiter completion.
//!
//! Callbacks registered against one in-flight computation. Only the first
//! registration reports `true`, which is the caller's cue to start the
//! upstream work; every later caller just waits. Completion drains the queue
//! before delivering, so callbacks that re-enter the owner never see a
//! half-drained queue.

use crate::callback::ValueCallback;
use crate::error::Result;

pub struct Waiters<T> {
    callbacks: Vec<ValueCallback<T>>,
}

impl<T> Default for Waiters<T> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }
}

impl<T: Clone> Waiters<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `callback`; returns `true` if the queue was empty.
    pub fn register(&mut self, callback: ValueCallback<T>) -> bool {
        self.callbacks.push(callback);
        self.callbacks.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Empty the queue. Pair with [`Waiters::deliver`] once no borrow of the
    /// owner is held anymore.
    pub fn take(&mut self) -> Drained<T> {
        Drained {
            callbacks: std::mem::take(&mut self.callbacks),
        }
    }
}

/// Callbacks detached from their queue, ready to receive one shared outcome.
#[must_use]
pub struct Drained<T> {
    callbacks: Vec<ValueCallback<T>>,
}

impl<T: Clone> Drained<T> {
    pub fn deliver(self, outcome: Result<T>) {
        for callback in self.callbacks {
            callback(outcome.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn only_first_registration_starts_work() {
        let mut waiters: Waiters<u32> = Waiters::new();
        assert!(waiters.register(Box::new(|_| {})));
        assert!(!waiters.register(Box::new(|_| {})));
        assert_eq!(waiters.len(), 2);
    }

    #[test]
    fn every_waiter_sees_the_same_outcome() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut waiters: Waiters<u32> = Waiters::new();
        for _ in 0..3 {
            let seen = Rc::clone(&seen);
            waiters.register(Box::new(move |res| seen.borrow_mut().push(res)));
        }
        let drained = waiters.take();
        assert!(waiters.is_empty());
        drained.deliver(Err(Error::upstream("boom")));
        assert_eq!(seen.borrow().len(), 3);
        assert!(seen
            .borrow()
            .iter()
            .all(|r| *r == Err(Error::upstream("boom"))));
    }
}
