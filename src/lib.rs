//! # prompt-router
//!
//! A cost-aware prompt routing and queueing engine for heterogeneous LLM
//! backends.
//!
//! ## Architecture
//!
//! Leaf-first components feeding a single orchestrator:
//! ```text
//! TextSimilarityIndex ─┐
//! ComplexityScorer ────┼─> CandidateSelector ─> WorkQueue <─ BatchAccumulator
//! CostModel ───────────┘                         (lifecycle + stats)
//! ```
//!
//! Every mutation is a synchronous, non-suspending operation on a single
//! logical owner: calls made serially from one execution context are
//! race-free by construction, and the engine takes no internal locks.
//! Embedders that drive the queue from several tasks wrap it in
//! [`SharedWorkQueue`].

// ── Lint policy (aerospace-grade) ─────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod backend;
pub mod queue;
pub mod routing;
pub mod scoring;
pub mod similarity;

// Re-exports for convenience
pub use backend::{Backend, EchoBackend, Generation};
pub use queue::{
    EnqueueOptions, EnqueueReceipt, PromptRecord, PromptStatus, QueueConfig, QueueObserver,
    QueueStatus, WorkQueue,
};
pub use routing::{
    CandidateSelector, CostModel, CostModelConfig, PricingTable, Route, SelectOptions, Selection,
    SpeedClass,
};
pub use scoring::{ComplexityLevel, ComplexityReport, ComplexityScorer};
pub use similarity::TextSimilarityIndex;

/// A [`WorkQueue`] behind a shared async mutex.
///
/// The queue itself takes no internal locks; this alias is the supported
/// way for embedders with multiple execution contexts to serialize access,
/// which also closes the budget check-then-act window described in
/// [`routing::cost`].
pub type SharedWorkQueue = std::sync::Arc<tokio::sync::Mutex<WorkQueue>>;

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// `"json"` for structured output suitable for log aggregators, anything
/// else (including unset) for human-readable pretty output. Filter level
/// is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`RouterError::Other`] if a global subscriber has already been
/// set (e.g. by a previous call or a test harness).
pub fn init_tracing() -> Result<(), RouterError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| RouterError::Other(format!("tracing init failed: {e}")))
}

/// Errors surfaced by the routing engine.
///
/// Routing itself never raises a "no candidate" error; it degrades to a
/// fallback route and callers inspect `Route::fallback`. Backend failures
/// are the embedder's concern and flow back through `fail(id, error)`
/// verbatim.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Malformed caller input, e.g. empty prompt text or a duplicate
    /// record id. Also covers undecodable snapshots on import.
    #[error("validation error: {0}")]
    Validation(String),

    /// A record id that is unknown to the queue.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Malformed configuration (pricing table, thresholds, batch limits).
    /// Raised at construction time so misconfiguration surfaces
    /// immediately rather than in a hot path.
    #[error("configuration error: {0}")]
    Config(String),

    /// A backend transport or generation failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

/// Milliseconds since the unix epoch; zero if the system clock is broken.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
