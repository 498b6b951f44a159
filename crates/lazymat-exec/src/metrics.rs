//! Scheduler counters.
//!
//! Kept dependency-light on purpose: the counters serialize to JSON and can be
//! forwarded to whatever telemetry the embedding binary uses.

use serde::{Deserialize, Serialize};

use lazymat_core::metrics::emit_event;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Tasks accepted by `schedule`.
    pub tasks_scheduled: u64,
    /// Tasks that have run to completion.
    pub tasks_run: u64,
    /// Sum of the weights of every task run.
    pub weight_consumed: u64,
    /// Scheduler turns (one chain, up to its weight budget).
    pub turns: u64,
    /// Largest number of chains waiting at once.
    pub max_ready_chains: usize,
}

impl SchedulerStats {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Forward the counters as one trace event.
    pub fn emit(&self, event: &str) {
        emit_event(
            event,
            &[
                ("tasks_scheduled", self.tasks_scheduled.to_string()),
                ("tasks_run", self.tasks_run.to_string()),
                ("weight_consumed", self.weight_consumed.to_string()),
                ("turns", self.turns.to_string()),
                ("max_ready_chains", self.max_ready_chains.to_string()),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_with_field_names() {
        let stats = SchedulerStats {
            tasks_run: 3,
            turns: 2,
            ..SchedulerStats::default()
        };
        let json = stats.to_json().unwrap();
        assert!(json.contains("\"tasks_run\":3"));
        assert!(json.contains("\"turns\":2"));
        let back: SchedulerStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
