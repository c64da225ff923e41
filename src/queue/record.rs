//! Prompt record lifecycle data.

use crate::routing::Route;
use crate::scoring::ComplexityLevel;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a queued prompt.
///
/// Transitions only move forward: Pending to Processing to Completed or
/// Failed. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    /// Waiting in the pending set.
    Pending,
    /// Dequeued and handed to a backend.
    Processing,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

impl PromptStatus {
    /// Stable lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One queued prompt request and everything decided about it.
///
/// Created by enqueue with its route already attached, mutated by
/// dequeue/complete/fail, and retained in the capped terminal history after
/// it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    /// Unique record id.
    pub id: String,
    /// The raw prompt text.
    pub text: String,
    /// Priority; lower values are more urgent.
    pub priority: u8,
    /// Monotone arrival sequence, the final ordering tie-break.
    pub sequence: u64,
    /// Arrival time in unix milliseconds.
    pub created_at_ms: u64,
    /// Current lifecycle status.
    pub status: PromptStatus,
    /// The route chosen at enqueue. Exactly one per record.
    pub route: Route,
    /// Complexity bucket assigned at enqueue.
    pub level: ComplexityLevel,
    /// Estimated cost of the chosen route in USD.
    pub estimated_cost: f64,
    /// Batch this record was grouped into, if any.
    pub batch_id: Option<String>,
    /// When processing started, unix milliseconds.
    pub started_at_ms: Option<u64>,
    /// When the record reached a terminal state, unix milliseconds.
    pub completed_at_ms: Option<u64>,
    /// Completion result, verbatim from the caller.
    pub result: Option<String>,
    /// Failure error, verbatim from the caller.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names_and_terminality() {
        assert_eq!(PromptStatus::Pending.as_str(), "pending");
        assert_eq!(PromptStatus::Processing.as_str(), "processing");
        assert!(!PromptStatus::Pending.is_terminal());
        assert!(!PromptStatus::Processing.is_terminal());
        assert!(PromptStatus::Completed.is_terminal());
        assert!(PromptStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&PromptStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
