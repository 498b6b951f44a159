//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upstream pulls a pump performs inside one scheduled task.
    pub pump_batch: usize,

    /// Element-wise traversal steps that may complete synchronously before the
    /// traversal yields back to the scheduler.
    pub traversal_batch: usize,

    /// Weight budget a single chain may consume per scheduler turn before the
    /// scheduler rotates to the next chain.
    pub turn_weight: u32,

    /// Largest upstream weight an element or size query follows on the
    /// caller's stack. Heavier hops run as scheduled tasks, so deep operator
    /// chains answer without exhausting the stack.
    pub inline_weight: u32,

    /// Optional cap on the number of tasks one blocking drive may run.
    pub max_tasks_per_drive: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pump_batch: 1,
            traversal_batch: 64,
            turn_weight: 256,
            inline_weight: 64,
            max_tasks_per_drive: None,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `LAZYMAT_PUMP_BATCH`: pulls per pump task
    /// - `LAZYMAT_TRAVERSAL_BATCH`: synchronous traversal steps per task
    /// - `LAZYMAT_TURN_WEIGHT`: per-chain weight budget per scheduler turn
    /// - `LAZYMAT_INLINE_WEIGHT`: heaviest upstream hop answered inline
    /// - `LAZYMAT_MAX_TASKS`: cap on tasks per blocking drive
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("LAZYMAT_PUMP_BATCH") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.pump_batch = v;
            }
        }

        if let Ok(s) = std::env::var("LAZYMAT_TRAVERSAL_BATCH") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.traversal_batch = v;
            }
        }

        if let Ok(s) = std::env::var("LAZYMAT_TURN_WEIGHT") {
            if let Ok(v) = s.parse::<u32>() {
                cfg.turn_weight = v;
            }
        }

        if let Ok(s) = std::env::var("LAZYMAT_INLINE_WEIGHT") {
            if let Ok(v) = s.parse::<u32>() {
                cfg.inline_weight = v;
            }
        }

        if let Ok(s) = std::env::var("LAZYMAT_MAX_TASKS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_tasks_per_drive = Some(v);
            }
        }

        cfg
    }

    /// Parse a JSON config document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pump_batch == 0 {
            return Err(Error::Config("pump_batch must be positive".into()));
        }
        if self.traversal_batch == 0 {
            return Err(Error::Config("traversal_batch must be positive".into()));
        }
        if self.turn_weight == 0 {
            return Err(Error::Config("turn_weight must be positive".into()));
        }
        if self.inline_weight == 0 {
            return Err(Error::Config("inline_weight must be positive".into()));
        }
        if self.max_tasks_per_drive == Some(0) {
            return Err(Error::Config("max_tasks_per_drive must be positive".into()));
        }
        Ok(())
    }
}
