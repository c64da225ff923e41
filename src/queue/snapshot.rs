//! Snapshot state for process-restart continuity.
//!
//! The snapshot is best-effort: it captures queue records, counters, the
//! similarity corpus, and the spend ledger, but not open batches (grouping
//! is ephemeral and rebuilt from new traffic). No schema version is
//! defined; an undecodable snapshot is rejected as a validation error and
//! leaves current state untouched.

use crate::queue::record::PromptRecord;
use crate::routing::CostLedger;
use crate::similarity::TextSimilarityIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serializable queue state, produced by export and consumed by import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Pending records in queue order.
    pub pending: Vec<PromptRecord>,
    /// In-flight records, in arrival-sequence order.
    pub in_flight: Vec<PromptRecord>,
    /// Terminal history, oldest first.
    pub terminal: Vec<PromptRecord>,
    /// Completion counts per backend id.
    pub per_backend: HashMap<String, u64>,
    /// Completion counts per complexity level name.
    pub per_complexity: HashMap<String, u64>,
    /// Total completions, including entries aged out of the history.
    pub completed_total: u64,
    /// Total failures, including entries aged out of the history.
    pub failed_total: u64,
    /// Sum of pending-to-start waits across completions, milliseconds.
    pub total_wait_ms: u64,
    /// Sum of start-to-finish durations across completions, milliseconds.
    pub total_process_ms: u64,
    /// Last assigned arrival sequence number.
    pub sequence: u64,
    /// Similarity corpus statistics.
    pub corpus: TextSimilarityIndex,
    /// Spend ledger, including its bounded history.
    pub ledger: CostLedger,
}
