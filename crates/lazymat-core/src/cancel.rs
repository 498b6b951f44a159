//! Shared cancellation cell.
//!
//! One token is shared by every materializer of a pipeline. Once set, the
//! cause takes priority over any success or failure that arrives afterwards.

use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub struct CancellationToken {
    cause: Rc<OnceCell<Error>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the cancellation cause. Only the first call has an effect;
    /// returns `true` if this call set it.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.cause.set(Error::cancelled(reason)).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause.get().is_some()
    }

    pub fn cause(&self) -> Option<Error> {
        self.cause.get().cloned()
    }

    /// Let a pending cancellation override `outcome`.
    pub fn resolve<T>(&self, outcome: Result<T>) -> Result<T> {
        match self.cause.get() {
            Some(cause) => Err(cause.clone()),
            None => outcome,
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cause", &self.cause.get())
            .finish()
    }
}
