#![forbid(unsafe_code)]
//! lazymat-operators: lazy memoizing list operators.
//!
//! Design intent:
//! - Every operator is a free function returning a new materializer; nothing
//!   is computed until a query arrives, and nothing is computed twice.
//! - Positional edits (concat, insert, remove, replace) share one splice
//!   engine; operators whose output positions are only learned by producing
//!   elements in order (flat-map, symmetric difference, iterator sources) run
//!   on the pull pump.
//! - Operators that learn their final contents swap their chassis to a
//!   snapshot, so later queries are answered without touching upstreams.

pub mod traits;

pub mod concat;
pub mod insert;
pub mod remove;
pub mod replace;
mod splice;

pub mod filter;
pub mod first_match;
pub mod map;
pub mod slice;

pub mod flat_map;
pub mod pump;
pub mod source;
pub mod symdiff;

pub mod window;

pub use concat::{append, concat, concat_all, prepend, prepend_one};
pub use filter::{filter, try_filter};
pub use first_match::{
    map_first_where, remove_first_where, try_map_first_where, try_remove_first_where,
};
pub use flat_map::{flat_map, try_flat_map};
pub use insert::{insert, insert_at};
pub use map::{map, try_map};
pub use pump::{pumped, Producer, Pulled};
pub use remove::{remove, remove_at};
pub use replace::{replace, replace_at};
pub use slice::{skip, slice, take};
pub use source::{from_iter, try_from_iter};
pub use symdiff::symmetric_difference;
pub use traits::OperatorKind;
pub use window::{chunks, sliding, window, Window, WindowSpec};
