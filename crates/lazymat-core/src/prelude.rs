//! Convenient re-exports for downstream crates.

pub use crate::callback::{
    predicate, CompletionPredicate, Indexed, IndexedCallback, IndexedPredicate, ValueCallback,
};
pub use crate::cancel::CancellationToken;
pub use crate::config::EngineConfig;
pub use crate::context::Context;
pub use crate::error::{Error, Result};
pub use crate::id::TaskId;
pub use crate::index::{MAX_INDEX, UNBOUNDED};
pub use crate::leaf::{empty, failed, from_rc, from_vec, single};
pub use crate::materializer::{Element, ListMaterializer, Materializer, Status};
pub use crate::scheduler::{FnTask, Scheduler, Task};
pub use crate::state::{ResolvingListMaterializer, StateRef, StatefulMaterializer};
pub use crate::waiters::Waiters;
pub use crate::weight::{QueryWeights, Weight};
