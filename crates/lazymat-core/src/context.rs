//! Per-pipeline execution context handed to every operator.

use std::rc::Rc;

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::callback::ValueCallback;
use crate::error::Result;
use crate::id::TaskId;
use crate::scheduler::{FnTask, Scheduler};
use crate::weight::Weight;

/// Scheduler, shared cancellation token, and config. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    scheduler: Rc<dyn Scheduler>,
    token: CancellationToken,
    config: Rc<EngineConfig>,
}

impl Context {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            token: CancellationToken::new(),
            config: Rc::new(EngineConfig::default()),
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Rc::new(config);
        self
    }

    pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Chain of the running task, or `fallback` when called outside a task.
    pub fn chain_id(&self, fallback: TaskId) -> TaskId {
        self.scheduler.current_task_id().unwrap_or(fallback)
    }

    /// Hand a continuation to the scheduler under chain `id`.
    pub fn schedule(&self, id: TaskId, weight: Weight, body: impl FnOnce() + 'static) {
        #[cfg(feature = "tracing")]
        tracing::trace!(task = %id, weight = weight.get(), "schedule continuation");
        self.scheduler
            .schedule(Box::new(FnTask::new(id, weight, body)));
    }

    /// Whether a hop into an upstream of `weight` should leave the caller's
    /// stack and run as a scheduled task.
    pub fn defers(&self, weight: Weight) -> bool {
        weight.get() > self.config.inline_weight
    }

    /// Wrap `callback` so its outcome is delivered from a fresh task on chain
    /// `id` rather than on the stack that produced it.
    pub fn deferred<T: 'static>(&self, id: TaskId, callback: ValueCallback<T>) -> ValueCallback<T> {
        let ctx = self.clone();
        Box::new(move |outcome| ctx.schedule(id, Weight::ONE, move || callback(outcome)))
    }

    /// Cancellation wins over any outcome that arrives after it was requested.
    pub fn resolve<T>(&self, outcome: Result<T>) -> Result<T> {
        self.token.resolve(outcome)
    }

    /// Wrap `callback` so a cancellation recorded before it fires replaces
    /// whatever outcome it was about to receive.
    pub fn guard<T: 'static>(&self, callback: ValueCallback<T>) -> ValueCallback<T> {
        let token = self.token.clone();
        Box::new(move |outcome| callback(token.resolve(outcome)))
    }
}
