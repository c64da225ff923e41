//! # Stage: Cost-Aware Route Selection
//!
//! ## Responsibility
//! Decide which (backend, model) pair should serve each prompt and at what
//! estimated cost. Combines the complexity scorer, a validated pricing
//! table, a budget-checked spend ledger, and a multi-criteria ranking into
//! a single [`CandidateSelector::select`] entry point.
//!
//! ## Guarantees
//! - Deterministic: the same prompt, options, table, and ledger state
//!   always produce the same selection.
//! - Total: selection never fails for non-empty text; it degrades to the
//!   designated free fallback route, flagged `fallback: true`.
//! - Fail-fast: malformed pricing or thresholds reject at construction.
//! - Ranking contract: candidates order by (cost ascending, quality
//!   descending, speed ascending), exactly.
//!
//! ## NOT Responsible For
//! - Calling backends (that belongs to the embedder via
//!   [`crate::backend::Backend`])
//! - Queue ordering and lifecycle (that belongs to [`crate::queue`])
//! - Exact billing reconciliation (all costs are estimates)

pub mod cost;
pub mod pricing;
pub mod selector;

// Re-exports for convenience
pub use cost::{CostLedger, CostModel, CostModelConfig, LedgerEntry, LedgerSnapshot};
pub use pricing::{ModelRate, PricingTable, SpeedClass};
pub use selector::{CandidateSelector, QualityThresholds, Route, SelectOptions, Selection};
