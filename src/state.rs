use std::time::Duration;

use serde::Serialize;

/// Per-worker cap on annotated images. Not persisted; a new worker starts at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingBudget {
    pub count_this_session: u32,
    pub limit: Option<u32>,
}

impl IndexingBudget {
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            count_this_session: 0,
            limit,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.count_this_session >= limit)
    }

    pub fn record_annotation(&mut self) {
        self.count_this_session = self.count_this_session.saturating_add(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Waiting,
    Armed,
    PermanentlyFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexerStatus {
    pub gate: GateState,
    /// Items waiting, including the one in flight.
    pub queued: usize,
    pub in_flight: bool,
    pub processed: u64,
    pub annotated: u64,
    pub removed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub budget_used: u32,
    /// Times the queue has drained to empty.
    pub drains: u64,
    pub last_drain: Option<Duration>,
}

impl Default for IndexerStatus {
    fn default() -> Self {
        Self {
            gate: GateState::Waiting,
            queued: 0,
            in_flight: false,
            processed: 0,
            annotated: 0,
            removed: 0,
            skipped: 0,
            failed: 0,
            timed_out: 0,
            budget_used: 0,
            drains: 0,
            last_drain: None,
        }
    }
}

impl IndexerStatus {
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && !self.in_flight
    }
}
