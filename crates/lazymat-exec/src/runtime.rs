//! Runtime: owns a [`QueueScheduler`] and a [`Context`] and drives queries
//! to completion.
//!
//! A blocking helper issues the query, then runs scheduler turns until the
//! answer arrives. If the scheduler goes idle first the query can never be
//! answered and the helper returns [`ExecError::Stalled`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thiserror::Error;

use lazymat_core::callback::{predicate, Indexed, ValueCallback};
use lazymat_core::cancel::CancellationToken;
use lazymat_core::config::EngineConfig;
use lazymat_core::context::Context;
use lazymat_core::materializer::{Element, Materializer};
use lazymat_core::Error;

use crate::metrics::SchedulerStats;
use crate::scheduler::QueueScheduler;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] Error),
    #[error("scheduler went idle before `{0}` was answered")]
    Stalled(&'static str),
    #[error("`{0}` called from inside a running task")]
    Reentrant(&'static str),
    #[error("`{query}` exceeded the task limit of {limit}")]
    TaskLimit { query: &'static str, limit: usize },
}

impl ExecError {
    /// The core error, if this is one.
    pub fn core(&self) -> Option<&Error> {
        match self {
            ExecError::Core(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.core().is_some_and(Error::is_cancelled)
    }
}

/// Elements visited by a bounded traversal, with the size if the traversal
/// reached the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Visited<E> {
    pub items: Vec<(usize, E)>,
    pub size: Option<usize>,
}

pub struct Runtime {
    scheduler: Rc<QueueScheduler>,
    ctx: Context,
    driving: Cell<bool>,
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Result<Self, ExecError> {
        Self::with_token(config, CancellationToken::new())
    }

    /// Build a runtime whose pipelines share `token`.
    pub fn with_token(config: EngineConfig, token: CancellationToken) -> Result<Self, ExecError> {
        config.validate()?;
        let scheduler = Rc::new(QueueScheduler::new(config.turn_weight));
        let ctx = Context::new(scheduler.clone())
            .with_token(token)
            .with_config(config);
        #[cfg(feature = "tracing")]
        tracing::debug!(config = ?ctx.config(), "runtime created");
        Ok(Self {
            scheduler,
            ctx,
            driving: Cell::new(false),
        })
    }

    pub fn from_env() -> Result<Self, ExecError> {
        Self::new(EngineConfig::from_env())
    }

    /// Context to build pipelines with.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn scheduler(&self) -> &Rc<QueueScheduler> {
        &self.scheduler
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Run queued work until the scheduler is idle. Returns the tasks run.
    pub fn run_until_idle(&self) -> usize {
        self.scheduler
            .run_until_idle(self.ctx.config().max_tasks_per_drive)
    }

    /// Issue a query through `start` and drive the scheduler until it answers.
    fn drive<T: 'static>(
        &self,
        query: &'static str,
        start: impl FnOnce(ValueCallback<T>),
    ) -> Result<T, ExecError> {
        if self.driving.get() || self.scheduler.is_running() {
            return Err(ExecError::Reentrant(query));
        }
        self.driving.set(true);
        let outcome = self.drive_inner(query, start);
        self.driving.set(false);
        outcome
    }

    fn drive_inner<T: 'static>(
        &self,
        query: &'static str,
        start: impl FnOnce(ValueCallback<T>),
    ) -> Result<T, ExecError> {
        let slot: Rc<RefCell<Option<lazymat_core::Result<T>>>> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        start(Box::new(move |outcome| {
            *sink.borrow_mut() = Some(outcome);
        }));
        let limit = self.ctx.config().max_tasks_per_drive;
        let mut tasks = 0usize;
        loop {
            let answered = slot.borrow_mut().take();
            if let Some(outcome) = answered {
                #[cfg(feature = "tracing")]
                tracing::trace!(query, tasks, ok = outcome.is_ok(), "query answered");
                return outcome.map_err(ExecError::from);
            }
            if let Some(limit) = limit {
                if tasks >= limit {
                    return Err(ExecError::TaskLimit { query, limit });
                }
            }
            let ran = self.scheduler.run_turn();
            if ran == 0 {
                #[cfg(feature = "tracing")]
                tracing::debug!(query, tasks, "scheduler idle before answer");
                return Err(ExecError::Stalled(query));
            }
            tasks += ran;
        }
    }

    pub fn size<E: Element>(&self, list: &Materializer<E>) -> Result<usize, ExecError> {
        self.drive("size", |done| list.materialize_size(done))
    }

    /// Element at `index`, or `None` past the end.
    pub fn element<E: Element>(&self, list: &Materializer<E>, index: usize) -> Result<Option<E>, ExecError> {
        self.drive("element", |done| {
            list.materialize_element(
                index,
                Box::new(move |answer| done(answer.map(Indexed::element))),
            )
        })
    }

    pub fn elements<E: Element>(&self, list: &Materializer<E>) -> Result<Vec<E>, ExecError> {
        let shared = self.drive("elements", |done| list.materialize_elements(done))?;
        Ok(Rc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone()))
    }

    pub fn is_empty<E: Element>(&self, list: &Materializer<E>) -> Result<bool, ExecError> {
        self.drive("is_empty", |done| list.materialize_empty(done))
    }

    pub fn contains<E: Element>(&self, list: &Materializer<E>, element: E) -> Result<bool, ExecError> {
        self.drive("contains", |done| list.materialize_contains(element, done))
    }

    pub fn has_element<E: Element>(&self, list: &Materializer<E>, index: usize) -> Result<bool, ExecError> {
        self.drive("has_element", |done| list.materialize_has_element(index, done))
    }

    /// Visit ascending from `from` while `keep` returns `true`.
    pub fn collect_next_while<E: Element>(
        &self,
        list: &Materializer<E>,
        from: usize,
        keep: impl FnMut(usize, &E) -> bool + 'static,
    ) -> Result<Visited<E>, ExecError> {
        self.drive("collect_next_while", |done| {
            list.materialize_next_while(from, visit_predicate(keep, done))
        })
    }

    /// Visit descending from `from` while `keep` returns `true`.
    pub fn collect_prev_while<E: Element>(
        &self,
        list: &Materializer<E>,
        from: usize,
        keep: impl FnMut(usize, &E) -> bool + 'static,
    ) -> Result<Visited<E>, ExecError> {
        self.drive("collect_prev_while", |done| {
            list.materialize_prev_while(from, visit_predicate(keep, done))
        })
    }

    /// Cancel the whole pipeline `list` belongs to. The first cause wins;
    /// pending work is drained so every waiter observes it.
    pub fn cancel<E: Element>(&self, list: &Materializer<E>, reason: &str) -> Error {
        self.ctx.token().cancel(reason);
        let cause = self
            .ctx
            .token()
            .cause()
            .unwrap_or_else(|| Error::cancelled(reason));
        #[cfg(feature = "tracing")]
        tracing::debug!(%cause, "cancel pipeline");
        list.materialize_cancel(&cause);
        if !self.scheduler.is_running() {
            self.run_until_idle();
        }
        cause
    }
}

/// Records visited elements; a stop by `keep` still answers with what was
/// collected so far.
fn visit_predicate<E: Element>(
    keep: impl FnMut(usize, &E) -> bool + 'static,
    done: ValueCallback<Visited<E>>,
) -> Box<dyn lazymat_core::callback::IndexedPredicate<E>> {
    struct Shared<E, K> {
        keep: K,
        items: Vec<(usize, E)>,
        done: Option<ValueCallback<Visited<E>>>,
    }

    let shared = Rc::new(RefCell::new(Shared {
        keep,
        items: Vec::new(),
        done: Some(done),
    }));
    let (on_complete, on_error) = (Rc::clone(&shared), Rc::clone(&shared));
    predicate(
        move |index, element: E| {
            let mut state = shared.borrow_mut();
            if (state.keep)(index, &element) {
                state.items.push((index, element));
                return true;
            }
            let items = std::mem::take(&mut state.items);
            let done = state.done.take();
            drop(state);
            if let Some(done) = done {
                done(Ok(Visited { items, size: None }));
            }
            false
        },
        move |size| {
            let mut state = on_complete.borrow_mut();
            let items = std::mem::take(&mut state.items);
            let done = state.done.take();
            drop(state);
            if let Some(done) = done {
                done(Ok(Visited {
                    items,
                    size: Some(size),
                }));
            }
        },
        move |error| {
            let done = on_error.borrow_mut().done.take();
            if let Some(done) = done {
                done(Err(error));
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use lazymat_core::leaf::{from_vec, ArrayListMaterializer};
    use lazymat_core::materializer::ListMaterializer;

    fn runtime() -> Runtime {
        Runtime::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn answers_leaf_queries() {
        let rt = runtime();
        let list = from_vec(vec![1, 2, 3]);
        assert_eq!(rt.size(&list).unwrap(), 3);
        assert_eq!(rt.element(&list, 1).unwrap(), Some(2));
        assert_eq!(rt.element(&list, 9).unwrap(), None);
        assert!(rt.contains(&list, 3).unwrap());
        assert!(!rt.is_empty(&list).unwrap());
        assert!(!rt.has_element(&list, 3).unwrap());
        assert_eq!(rt.elements(&list).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn collects_bounded_traversals() {
        let rt = runtime();
        let list = from_vec(vec![10, 20, 30, 40]);
        let forward = rt.collect_next_while(&list, 1, |_, e| *e < 40).unwrap();
        assert_eq!(forward.items, vec![(1, 20), (2, 30)]);
        assert_eq!(forward.size, None);
        let backward = rt.collect_prev_while(&list, 99, |_, _| true).unwrap();
        assert_eq!(backward.items, vec![(3, 40), (2, 30), (1, 20), (0, 10)]);
        assert_eq!(backward.size, Some(4));
    }

    #[test]
    fn unanswered_query_stalls() {
        struct Silent;
        impl ListMaterializer<i32> for Silent {
            fn known_size(&self) -> Option<usize> {
                None
            }
            fn status(&self) -> lazymat_core::materializer::Status {
                lazymat_core::materializer::Status::Running
            }
            fn materialize_cancel(&self, _cause: &Error) {}
            fn materialize_element(&self, _index: usize, _callback: lazymat_core::callback::IndexedCallback<i32>) {}
            fn materialize_elements(&self, _callback: ValueCallback<Rc<Vec<i32>>>) {}
            fn materialize_next_while(&self, _index: usize, _p: Box<dyn lazymat_core::callback::IndexedPredicate<i32>>) {}
            fn materialize_prev_while(&self, _index: usize, _p: Box<dyn lazymat_core::callback::IndexedPredicate<i32>>) {}
            fn materialize_size(&self, _callback: ValueCallback<usize>) {}
            fn weight_element(&self) -> lazymat_core::weight::Weight {
                lazymat_core::weight::Weight::ONE
            }
            fn weight_elements(&self) -> lazymat_core::weight::Weight {
                lazymat_core::weight::Weight::ONE
            }
            fn weight_next_while(&self) -> lazymat_core::weight::Weight {
                lazymat_core::weight::Weight::ONE
            }
            fn weight_prev_while(&self) -> lazymat_core::weight::Weight {
                lazymat_core::weight::Weight::ONE
            }
            fn weight_size(&self) -> lazymat_core::weight::Weight {
                lazymat_core::weight::Weight::ONE
            }
        }
        let rt = runtime();
        let list: Materializer<i32> = Rc::new(Silent);
        assert_eq!(rt.size(&list), Err(ExecError::Stalled("size")));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EngineConfig {
            pump_batch: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Runtime::new(config),
            Err(ExecError::Core(Error::Config(_)))
        ));
    }

    #[test]
    fn cancel_returns_first_cause() {
        let rt = runtime();
        let list: Materializer<i32> = Rc::new(ArrayListMaterializer::new(Rc::new(vec![1])));
        let first = rt.cancel(&list, "first");
        let second = rt.cancel(&list, "second");
        assert_eq!(first, Error::cancelled("first"));
        assert_eq!(second, first);
    }
}
