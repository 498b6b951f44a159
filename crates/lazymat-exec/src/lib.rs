#![forbid(unsafe_code)]
//! lazymat-exec: schedulers and drivers for lazymat pipelines.
//!
//! `QueueScheduler` is the deterministic per-chain round-robin queue every
//! pipeline can run on; `Runtime` pairs it with a context and answers queries
//! by running turns until the answer arrives. With `async-scheduler`,
//! `AsyncDriver` runs the same queue from a tokio task.

pub mod metrics;
pub mod runtime;
pub mod scheduler;

pub use metrics::SchedulerStats;
pub use runtime::{ExecError, Runtime, Visited};
pub use scheduler::QueueScheduler;

#[cfg(feature = "async-scheduler")]
pub use scheduler::AsyncDriver;
