//! Scheduling contract consumed by materializers.
//!
//! Materializers never own threads. Long synchronous chains (pumps, boundary
//! crossings) are broken into tasks handed to a [`Scheduler`]. Concrete
//! schedulers live in `lazymat-exec`; this module fixes only the observable
//! contract:
//!
//! - tasks sharing a [`TaskId`] run in submission order;
//! - `weight` is a hint the scheduler may use to decide how long one chain
//!   runs before another gets a turn;
//! - `current_task_id` reports the chain of the task being run, if any.

use crate::id::TaskId;
use crate::weight::Weight;

pub trait Task {
    fn task_id(&self) -> TaskId;

    fn weight(&self) -> Weight;

    fn run(self: Box<Self>);
}

pub trait Scheduler {
    fn schedule(&self, task: Box<dyn Task>);

    fn current_task_id(&self) -> Option<TaskId>;
}

/// Task wrapping a closure.
pub struct FnTask {
    id: TaskId,
    weight: Weight,
    body: Box<dyn FnOnce()>,
}

impl FnTask {
    pub fn new(id: TaskId, weight: Weight, body: impl FnOnce() + 'static) -> Self {
        Self {
            id,
            weight,
            body: Box::new(body),
        }
    }
}

impl Task for FnTask {
    fn task_id(&self) -> TaskId {
        self.id
    }

    fn weight(&self) -> Weight {
        self.weight
    }

    fn run(self: Box<Self>) {
        (self.body)()
    }
}
