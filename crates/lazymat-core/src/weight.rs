//! Per-operation cost hints consumed by schedulers.
//!
//! A weight is a rough estimate of how much synchronous work a query will do
//! before it either answers or suspends. Schedulers use it to decide whether to
//! keep running a chain inline or rotate to another one. Weights saturate at
//! [`Weight::MAX`] instead of wrapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Weight(u32);

impl Weight {
    pub const ZERO: Weight = Weight(0);
    pub const ONE: Weight = Weight(1);
    pub const MAX: Weight = Weight(i32::MAX as u32);

    pub const fn new(v: u32) -> Self {
        if v > Self::MAX.0 {
            Self::MAX
        } else {
            Self(v)
        }
    }

    /// Weight proportional to a number of elements.
    pub fn of_elements(count: usize) -> Self {
        Self::new(u32::try_from(count).unwrap_or(u32::MAX))
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Combine two estimates (for chaining operators).
    pub fn plus(self, other: Weight) -> Weight {
        Weight::new(self.0.saturating_add(other.0))
    }

    pub fn max(self, other: Weight) -> Weight {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

/// Weights of the five primitive queries, captured once when an operator
/// is built so a deep chain never re-walks its upstreams to answer them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWeights {
    pub element: Weight,
    pub elements: Weight,
    pub next_while: Weight,
    pub prev_while: Weight,
    pub size: Weight,
}

impl QueryWeights {
    /// Field-wise sum, for operators that consult two upstreams in turn.
    pub fn plus(self, other: QueryWeights) -> QueryWeights {
        QueryWeights {
            element: self.element.plus(other.element),
            elements: self.elements.plus(other.elements),
            next_while: self.next_while.plus(other.next_while),
            prev_while: self.prev_while.plus(other.prev_while),
            size: self.size.plus(other.size),
        }
    }
}

impl Sum for Weight {
    fn sum<I: Iterator<Item = Weight>>(iter: I) -> Self {
        iter.fold(Weight::ZERO, Weight::plus)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
