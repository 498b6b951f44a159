//! Deterministic single-threaded scheduler.
//!
//! One FIFO per chain (`TaskId`) and a ring of chains with pending work. A
//! turn takes the chain at the head of the ring and runs its tasks in
//! submission order until the chain's queue is empty or the weight spent in
//! this turn reaches `turn_weight`; a chain with work left goes to the back
//! of the ring. Every turn runs at least one task, so a single heavy task
//! cannot starve the queue.
//!
//! Tasks may schedule more tasks while running. No borrow of the queues is
//! held across `Task::run`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use lazymat_core::id::TaskId;
use lazymat_core::scheduler::{Scheduler, Task};

use crate::metrics::SchedulerStats;

#[derive(Default)]
struct Queues {
    /// A chain has an entry here exactly while it is in `ring` or running.
    chains: HashMap<TaskId, VecDeque<Box<dyn Task>>>,
    ring: VecDeque<TaskId>,
}

pub struct QueueScheduler {
    queues: RefCell<Queues>,
    current: Cell<Option<TaskId>>,
    turn_weight: u64,
    stats: Cell<SchedulerStats>,
}

impl QueueScheduler {
    pub fn new(turn_weight: u32) -> Self {
        Self {
            queues: RefCell::new(Queues::default()),
            current: Cell::new(None),
            turn_weight: u64::from(turn_weight.max(1)),
            stats: Cell::new(SchedulerStats::default()),
        }
    }

    /// Number of tasks waiting across all chains.
    pub fn pending(&self) -> usize {
        self.queues
            .borrow()
            .chains
            .values()
            .map(VecDeque::len)
            .sum()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Whether a task is running right now.
    pub fn is_running(&self) -> bool {
        self.current.get().is_some()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.get()
    }

    fn update_stats(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn pop(&self, chain: TaskId) -> Option<Box<dyn Task>> {
        self.queues
            .borrow_mut()
            .chains
            .get_mut(&chain)
            .and_then(VecDeque::pop_front)
    }

    /// Run one turn. Returns the number of tasks run (zero when idle).
    pub fn run_turn(&self) -> usize {
        let next = self.queues.borrow_mut().ring.pop_front();
        let Some(chain) = next else {
            return 0;
        };
        let mut spent = 0u64;
        let mut ran = 0usize;
        while let Some(task) = self.pop(chain) {
            let weight = u64::from(task.weight().get());
            #[cfg(feature = "tracing")]
            tracing::trace!(task = %chain, weight, "run task");
            let previous = self.current.replace(Some(task.task_id()));
            task.run();
            self.current.set(previous);
            ran += 1;
            spent = spent.saturating_add(weight);
            self.update_stats(|s| {
                s.tasks_run += 1;
                s.weight_consumed = s.weight_consumed.saturating_add(weight);
            });
            if spent >= self.turn_weight {
                break;
            }
        }
        {
            let mut queues = self.queues.borrow_mut();
            let has_more = queues
                .chains
                .get(&chain)
                .is_some_and(|queue| !queue.is_empty());
            if has_more {
                queues.ring.push_back(chain);
            } else {
                queues.chains.remove(&chain);
            }
        }
        self.update_stats(|s| s.turns += 1);
        ran
    }

    /// Run turns until no work is left or `limit` tasks have run. Returns the
    /// number of tasks run.
    pub fn run_until_idle(&self, limit: Option<usize>) -> usize {
        let mut total = 0;
        loop {
            if limit.is_some_and(|limit| total >= limit) {
                return total;
            }
            let ran = self.run_turn();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Default for QueueScheduler {
    fn default() -> Self {
        Self::new(lazymat_core::config::EngineConfig::default().turn_weight)
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(&self, task: Box<dyn Task>) {
        let chain = task.task_id();
        let ready = {
            let mut queues = self.queues.borrow_mut();
            let queues = &mut *queues;
            let fresh = !queues.chains.contains_key(&chain);
            queues.chains.entry(chain).or_default().push_back(task);
            if fresh {
                queues.ring.push_back(chain);
            }
            queues.ring.len()
        };
        self.update_stats(|s| {
            s.tasks_scheduled += 1;
            s.max_ready_chains = s.max_ready_chains.max(ready);
        });
    }

    fn current_task_id(&self) -> Option<TaskId> {
        self.current.get()
    }
}

#[cfg(feature = "async-scheduler")]
pub use async_impl::AsyncDriver;

/// Tokio-driven driver (requires the `async-scheduler` feature).
///
/// Materializers are `Rc`-based, so the driver runs on the current thread:
/// it alternates one scheduler turn with `yield_now`, which lets other local
/// futures (timers, I/O feeding a source) make progress between turns.
/// Answers travel back through a `oneshot` channel; a callback dropped
/// without being called closes the channel and surfaces as `Stalled`.
#[cfg(feature = "async-scheduler")]
mod async_impl {
    use std::rc::Rc;

    use tokio::sync::oneshot;

    use lazymat_core::callback::{Indexed, ValueCallback};
    use lazymat_core::context::Context;
    use lazymat_core::materializer::{Element, Materializer};

    use super::QueueScheduler;
    use crate::runtime::{ExecError, Runtime};

    pub struct AsyncDriver {
        scheduler: Rc<QueueScheduler>,
        ctx: Context,
    }

    impl AsyncDriver {
        /// Drive the same queue and context as `runtime`.
        pub fn new(runtime: &Runtime) -> Self {
            Self {
                scheduler: Rc::clone(runtime.scheduler()),
                ctx: runtime.context().clone(),
            }
        }

        pub fn context(&self) -> &Context {
            &self.ctx
        }

        async fn drive<T: 'static>(
            &self,
            query: &'static str,
            start: impl FnOnce(ValueCallback<T>),
        ) -> Result<T, ExecError> {
            let (tx, mut rx) = oneshot::channel();
            start(Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }));
            let limit = self.ctx.config().max_tasks_per_drive;
            let mut tasks = 0usize;
            loop {
                match rx.try_recv() {
                    Ok(outcome) => return outcome.map_err(ExecError::from),
                    Err(oneshot::error::TryRecvError::Closed) => {
                        return Err(ExecError::Stalled(query))
                    }
                    Err(oneshot::error::TryRecvError::Empty) => {}
                }
                if let Some(limit) = limit {
                    if tasks >= limit {
                        return Err(ExecError::TaskLimit { query, limit });
                    }
                }
                let ran = self.scheduler.run_turn();
                if ran == 0 {
                    return Err(ExecError::Stalled(query));
                }
                tasks += ran;
                tokio::task::yield_now().await;
            }
        }

        pub async fn size<E: Element>(&self, list: &Materializer<E>) -> Result<usize, ExecError> {
            self.drive("size", |done| list.materialize_size(done)).await
        }

        pub async fn element<E: Element>(
            &self,
            list: &Materializer<E>,
            index: usize,
        ) -> Result<Option<E>, ExecError> {
            self.drive("element", |done| {
                list.materialize_element(
                    index,
                    Box::new(move |answer| done(answer.map(Indexed::element))),
                )
            })
            .await
        }

        pub async fn elements<E: Element>(&self, list: &Materializer<E>) -> Result<Vec<E>, ExecError> {
            let shared = self
                .drive("elements", |done| list.materialize_elements(done))
                .await?;
            Ok(Rc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::rc::Rc;

    use lazymat_core::scheduler::FnTask;
    use lazymat_core::weight::Weight;

    fn push(
        scheduler: &Rc<QueueScheduler>,
        log: &Rc<RefCell<Vec<&'static str>>>,
        chain: TaskId,
        weight: u32,
        name: &'static str,
    ) {
        let log = Rc::clone(log);
        scheduler.schedule(Box::new(FnTask::new(chain, Weight::new(weight), move || {
            log.borrow_mut().push(name)
        })));
    }

    #[test]
    fn chains_keep_submission_order() {
        let scheduler = Rc::new(QueueScheduler::new(100));
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = TaskId::fresh();
        push(&scheduler, &log, a, 1, "a1");
        push(&scheduler, &log, a, 1, "a2");
        push(&scheduler, &log, a, 1, "a3");
        assert_eq!(scheduler.run_until_idle(None), 3);
        assert_eq!(*log.borrow(), vec!["a1", "a2", "a3"]);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn turns_rotate_once_budget_is_spent() {
        let scheduler = Rc::new(QueueScheduler::new(2));
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (TaskId::fresh(), TaskId::fresh());
        push(&scheduler, &log, a, 1, "a1");
        push(&scheduler, &log, a, 1, "a2");
        push(&scheduler, &log, a, 1, "a3");
        push(&scheduler, &log, b, 1, "b1");
        scheduler.run_until_idle(None);
        assert_eq!(*log.borrow(), vec!["a1", "a2", "b1", "a3"]);
        let stats = scheduler.stats();
        assert_eq!(stats.tasks_run, 4);
        assert_eq!(stats.turns, 3);
        assert_eq!(stats.max_ready_chains, 2);
    }

    #[test]
    fn heavy_task_still_runs_alone() {
        let scheduler = Rc::new(QueueScheduler::new(1));
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = TaskId::fresh();
        push(&scheduler, &log, a, 50, "heavy");
        assert_eq!(scheduler.run_turn(), 1);
        assert_eq!(scheduler.run_turn(), 0);
    }

    #[test]
    fn reports_current_chain_and_accepts_nested_tasks() {
        let scheduler = Rc::new(QueueScheduler::new(10));
        let seen = Rc::new(Cell::new(None));
        let chain = TaskId::fresh();
        let (inner, seen_inner) = (Rc::clone(&scheduler), Rc::clone(&seen));
        scheduler.schedule(Box::new(FnTask::new(chain, Weight::ONE, move || {
            seen_inner.set(inner.current_task_id());
            let again = Rc::clone(&inner);
            inner.schedule(Box::new(FnTask::new(chain, Weight::ONE, move || {
                assert!(again.is_running());
            })));
        })));
        assert_eq!(scheduler.current_task_id(), None);
        assert_eq!(scheduler.run_until_idle(None), 2);
        assert_eq!(seen.get(), Some(chain));
        assert_eq!(scheduler.current_task_id(), None);
    }

    #[test]
    fn limit_stops_draining() {
        let scheduler = Rc::new(QueueScheduler::new(1));
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = TaskId::fresh();
        for _ in 0..5 {
            push(&scheduler, &log, a, 1, "x");
        }
        assert_eq!(scheduler.run_until_idle(Some(2)), 2);
        assert_eq!(scheduler.pending(), 3);
    }
}
