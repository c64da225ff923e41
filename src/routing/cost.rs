//! Cost estimation and the spend ledger.
//!
//! Token counts are approximations, not measurements: input tokens are
//! `ceil(chars / 4)` and output tokens are a configurable multiple of the
//! input (1.5 by default). Ledger amounts are therefore estimates; exact
//! billing reconciliation is out of scope.
//!
//! ## Budget semantics
//!
//! [`CostModel::within_budget`] evaluates the ceiling fresh at call time
//! with no reservation. Under concurrent callers, the gap between
//! `within_budget` (check) and [`CostModel::record_actual`] (act) can admit
//! spend past the ceiling. That gap is part of the contract: a caller that
//! needs a hard ceiling under concurrency must serialize access externally
//! (for example behind `SharedWorkQueue`).

use crate::routing::pricing::{
    default_entries, default_fallback_backend, default_fallback_model, ModelRate, PricingTable,
};
use crate::{now_ms, RouterError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

// ── Default value functions ────────────────────────────────────────────

/// Default estimated output tokens per input token.
fn default_output_input_ratio() -> f64 {
    1.5
}

/// Default bound on the ledger entry history.
fn default_ledger_history_cap() -> usize {
    256
}

// ── Configuration ──────────────────────────────────────────────────────

/// Configuration for [`CostModel`].
///
/// All fields have defaults, so an empty config section yields the stock
/// pricing table with no budget ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostModelConfig {
    /// Backend of the fallback route. Must name a local table entry.
    #[serde(default = "default_fallback_backend")]
    pub fallback_backend: String,
    /// Model of the fallback route.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    /// Optional spend ceiling in USD. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_ceiling: Option<f64>,
    /// Estimated output tokens per input token. A documented heuristic
    /// constant, not a measured value; tune per workload.
    #[serde(default = "default_output_input_ratio")]
    pub output_input_ratio: f64,
    /// Maximum retained ledger entries; oldest are dropped first.
    #[serde(default = "default_ledger_history_cap")]
    pub ledger_history_cap: usize,
    /// Price table entries. Defaults to the built-in table. Declared last
    /// so the TOML rendering keys scalars before the entry tables.
    #[serde(default = "default_entries")]
    pub entries: Vec<ModelRate>,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            fallback_backend: default_fallback_backend(),
            fallback_model: default_fallback_model(),
            budget_ceiling: None,
            output_input_ratio: default_output_input_ratio(),
            ledger_history_cap: default_ledger_history_cap(),
            entries: default_entries(),
        }
    }
}

/// Validate a [`CostModelConfig`], returning one error per violation.
///
/// Pricing entries are validated separately by [`PricingTable::new`].
pub fn validate(config: &CostModelConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.output_input_ratio <= 0.0 || !config.output_input_ratio.is_finite() {
        errors.push(format!(
            "output_input_ratio must be finite and > 0, got {}",
            config.output_input_ratio
        ));
    }

    if let Some(ceiling) = config.budget_ceiling {
        if ceiling < 0.0 || !ceiling.is_finite() {
            errors.push(format!(
                "budget_ceiling must be finite and >= 0, got {ceiling}"
            ));
        }
    }

    if config.ledger_history_cap == 0 {
        errors.push("ledger_history_cap must be >= 1".to_string());
    }

    errors
}

// ── Ledger ─────────────────────────────────────────────────────────────

/// One recorded spend event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Estimated cost in USD.
    pub cost: f64,
    /// Caller-supplied context (record id, backend, model, ...).
    pub metadata: HashMap<String, String>,
    /// Unix milliseconds when the entry was recorded.
    pub timestamp_ms: u64,
}

/// Running spend ledger with an optional budget ceiling.
///
/// `total_spent` is monotonically non-decreasing: entries can only add to
/// it, and negative or non-finite amounts are ignored with a warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLedger {
    total_spent: f64,
    ceiling: Option<f64>,
    history: VecDeque<LedgerEntry>,
    history_cap: usize,
}

impl CostLedger {
    /// Create an empty ledger.
    pub fn new(ceiling: Option<f64>, history_cap: usize) -> Self {
        Self {
            total_spent: 0.0,
            ceiling,
            history: VecDeque::new(),
            history_cap: history_cap.max(1),
        }
    }

    /// Append a spend event and increase the running total irreversibly.
    pub fn record(&mut self, amount: f64, metadata: HashMap<String, String>) {
        if amount < 0.0 || !amount.is_finite() {
            warn!(amount, "ignoring non-positive or non-finite spend amount");
            return;
        }
        self.total_spent += amount;
        if self.history.len() >= self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(LedgerEntry {
            cost: amount,
            metadata,
            timestamp_ms: now_ms(),
        });
        debug!(amount, total = self.total_spent, "spend recorded");
    }

    /// Whether spending `candidate` more would stay at or under the ceiling.
    ///
    /// Always true when no ceiling is configured. Evaluated fresh, with no
    /// reservation (see the module docs for the concurrency caveat).
    pub fn within_budget(&self, candidate: f64) -> bool {
        match self.ceiling {
            None => true,
            Some(ceiling) => self.total_spent + candidate <= ceiling,
        }
    }

    /// Cumulative recorded spend in USD.
    pub fn total_spent(&self) -> f64 {
        self.total_spent
    }

    /// The configured ceiling, if any.
    pub fn ceiling(&self) -> Option<f64> {
        self.ceiling
    }

    /// Retained history entries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.history.iter()
    }

    /// Point-in-time summary for status reporting.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            total_spent: self.total_spent,
            ceiling: self.ceiling,
            history_len: self.history.len(),
        }
    }
}

/// Summary of ledger state, embedded in queue status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Cumulative recorded spend in USD.
    pub total_spent: f64,
    /// The configured ceiling, if any.
    pub ceiling: Option<f64>,
    /// Number of retained history entries.
    pub history_len: usize,
}

// ── Cost model ─────────────────────────────────────────────────────────

/// Price table, token-count heuristics, and the spend ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    pricing: PricingTable,
    ledger: CostLedger,
    output_input_ratio: f64,
}

impl CostModel {
    /// Build a cost model from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] when the config or the pricing table
    /// is malformed, so misconfiguration fails at construction time.
    pub fn new(config: CostModelConfig) -> Result<Self, RouterError> {
        let errors = validate(&config);
        if !errors.is_empty() {
            return Err(RouterError::Config(errors.join("; ")));
        }
        let pricing = PricingTable::new(
            config.entries,
            config.fallback_backend,
            config.fallback_model,
        )?;
        Ok(Self {
            pricing,
            ledger: CostLedger::new(config.budget_ceiling, config.ledger_history_cap),
            output_input_ratio: config.output_input_ratio,
        })
    }

    /// The validated pricing table.
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// The spend ledger.
    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    /// Replace the ledger wholesale (snapshot import path).
    pub(crate) fn restore_ledger(&mut self, ledger: CostLedger) {
        self.ledger = ledger;
    }

    /// Estimate the cost of routing `text` to a (backend, model) pair.
    ///
    /// `None` when the pair is not in the pricing table.
    pub fn estimate(&self, text: &str, backend: &str, model: &str) -> Option<f64> {
        let rate = self.pricing.get(backend, model)?;
        Some(self.estimate_for_rate(text, rate))
    }

    /// Estimate against a known rate entry.
    pub(crate) fn estimate_for_rate(&self, text: &str, rate: &ModelRate) -> f64 {
        let input_tokens = estimated_input_tokens(text);
        let output_tokens = (input_tokens as f64 * self.output_input_ratio).ceil();
        (input_tokens as f64 / 1000.0) * rate.input_rate_per_1k
            + (output_tokens / 1000.0) * rate.output_rate_per_1k
    }

    /// Record actual (estimated) spend into the ledger.
    pub fn record_actual(&mut self, amount: f64, metadata: HashMap<String, String>) {
        self.ledger.record(amount, metadata);
    }

    /// Whether `candidate` more spend stays within the budget ceiling.
    pub fn within_budget(&self, candidate: f64) -> bool {
        self.ledger.within_budget(candidate)
    }
}

/// Approximate input tokens as `ceil(chars / 4)`.
///
/// A fixed heuristic shared with the spend estimates; not a tokenizer.
pub fn estimated_input_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

// ── Tests ──────────────────────────────────────────────────────────────
