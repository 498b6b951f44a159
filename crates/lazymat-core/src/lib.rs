#![forbid(unsafe_code)]
//! lazymat-core: the materializer contract and everything operators share.
//!
//! - `materializer` / `callback`: the capability trait and its three
//!   continuation shapes.
//! - `state` / `leaf` / `waiters`: lifecycle chassis, terminal states, and
//!   the memoized multi-waiter queue.
//! - `index` / `weight`: overflow-checked arithmetic and cost hints.
//! - `scheduler` / `context` / `cancel`: the scheduling contract consumed
//!   (not implemented) here, plus the shared cancellation token.
//! - `traverse`: bounded forward/backward traversal drivers.

pub mod callback;
pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod id;
pub mod index;
pub mod leaf;
pub mod materializer;
pub mod metrics;
pub mod prelude;
pub mod scheduler;
pub mod state;
pub mod traverse;
pub mod waiters;
pub mod weight;

pub use error::{Error, Result};
