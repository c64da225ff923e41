//! Pricing table types.
//!
//! Provides the static per-(backend, model) price/quality/speed table that
//! makes backends visible to routing. Backends outside the table cannot be
//! auto-discovered; they must be added to configuration. Malformed tables
//! are rejected at construction time, never deep in a hot path.

use crate::RouterError;
use serde::{Deserialize, Serialize};

/// Latency class of a route, ranked `Fast < Medium < Slow` for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedClass {
    /// Sub-second class endpoints.
    Fast,
    /// Typical interactive latency.
    Medium,
    /// Large or heavily loaded endpoints.
    Slow,
}

impl SpeedClass {
    /// Sort rank: lower is faster.
    pub fn rank(self) -> u8 {
        match self {
            Self::Fast => 0,
            Self::Medium => 1,
            Self::Slow => 2,
        }
    }
}

/// Price, quality, and speed attributes for one (backend, model) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRate {
    /// Backend identifier (e.g. "llama_cpp", "anthropic").
    pub backend: String,
    /// Model identifier within the backend.
    pub model: String,
    /// USD per 1 000 input tokens. Zero for local/free backends.
    pub input_rate_per_1k: f64,
    /// USD per 1 000 output tokens. Zero for local/free backends.
    pub output_rate_per_1k: f64,
    /// Latency class used as the final ranking tie-break.
    pub speed: SpeedClass,
    /// Quality score in `[0.0, 1.0]` matched against the level floor.
    pub quality: f64,
    /// Whether this endpoint runs locally (free, always enumerable).
    #[serde(default)]
    pub local: bool,
}

/// Validated routing price table plus the designated fallback route.
///
/// The fallback must name a local entry of the table; selection degrades to
/// it (flagged `fallback: true`) instead of ever failing.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    entries: Vec<ModelRate>,
    fallback_backend: String,
    fallback_model: String,
}

impl PricingTable {
    /// Build a table from entries and a fallback (backend, model) pair.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] listing every violated constraint:
    /// empty table, negative rates, quality outside `[0.0, 1.0]`, duplicate
    /// (backend, model) pairs, or a fallback that is missing or not local.
    pub fn new(
        entries: Vec<ModelRate>,
        fallback_backend: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Result<Self, RouterError> {
        let table = Self {
            entries,
            fallback_backend: fallback_backend.into(),
            fallback_model: fallback_model.into(),
        };
        let errors = table.validate();
        if errors.is_empty() {
            Ok(table)
        } else {
            Err(RouterError::Config(errors.join("; ")))
        }
    }

    /// Validate the table, returning one human-readable error per violation.
    pub fn validate(&self) -> Vec<String> {
        validate_entries(&self.entries, &self.fallback_backend, &self.fallback_model)
    }

    /// Look up the rate for a (backend, model) pair.
    pub fn get(&self, backend: &str, model: &str) -> Option<&ModelRate> {
        self.entries
            .iter()
            .find(|r| r.backend == backend && r.model == model)
    }

    /// All entries, in configuration order.
    pub fn entries(&self) -> &[ModelRate] {
        &self.entries
    }

    /// The designated fallback entry.
    pub fn fallback(&self) -> &ModelRate {
        match self.get(&self.fallback_backend, &self.fallback_model) {
            Some(rate) => rate,
            // Validation guarantees the fallback entry exists.
            None => &self.entries[0],
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty. Validated tables never are.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            entries: default_entries(),
            fallback_backend: default_fallback_backend(),
            fallback_model: default_fallback_model(),
        }
    }
}

/// Validate pricing entries plus the fallback designation, returning one
/// human-readable error per violation.
pub fn validate_entries(
    entries: &[ModelRate],
    fallback_backend: &str,
    fallback_model: &str,
) -> Vec<String> {
    let mut errors = Vec::new();

    if entries.is_empty() {
        errors.push("pricing table must contain at least one entry".to_string());
    }

    for rate in entries {
        if rate.backend.trim().is_empty() || rate.model.trim().is_empty() {
            errors.push("backend and model identifiers must be non-empty".to_string());
        }
        if rate.input_rate_per_1k < 0.0 || rate.output_rate_per_1k < 0.0 {
            errors.push(format!(
                "rates for {}/{} must be >= 0",
                rate.backend, rate.model
            ));
        }
        if !(0.0..=1.0).contains(&rate.quality) {
            errors.push(format!(
                "quality for {}/{} must be in [0.0, 1.0], got {}",
                rate.backend, rate.model, rate.quality
            ));
        }
    }

    for (i, a) in entries.iter().enumerate() {
        if entries[..i]
            .iter()
            .any(|b| b.backend == a.backend && b.model == a.model)
        {
            errors.push(format!("duplicate entry {}/{}", a.backend, a.model));
        }
    }

    match entries
        .iter()
        .find(|r| r.backend == fallback_backend && r.model == fallback_model)
    {
        None => errors.push(format!(
            "fallback {fallback_backend}/{fallback_model} is not in the table"
        )),
        Some(rate) if !rate.local => errors.push(format!(
            "fallback {fallback_backend}/{fallback_model} must be a local entry"
        )),
        Some(_) => {}
    }

    errors
}

// ── Default table ──────────────────────────────────────────────────────

/// Default backend for the fallback route.
pub fn default_fallback_backend() -> String {
    "llama_cpp".to_string()
}

/// Default model for the fallback route.
pub fn default_fallback_model() -> String {
    "mistral-7b-instruct".to_string()
}

/// Built-in price table covering the stock local and cloud backends.
pub fn default_entries() -> Vec<ModelRate> {
    vec![
        ModelRate {
            backend: "llama_cpp".to_string(),
            model: "mistral-7b-instruct".to_string(),
            input_rate_per_1k: 0.0,
            output_rate_per_1k: 0.0,
            speed: SpeedClass::Fast,
            quality: 0.55,
            local: true,
        },
        ModelRate {
            backend: "vllm".to_string(),
            model: "qwen2.5-14b-instruct".to_string(),
            input_rate_per_1k: 0.0,
            output_rate_per_1k: 0.0,
            speed: SpeedClass::Medium,
            quality: 0.7,
            local: true,
        },
        ModelRate {
            backend: "open_ai".to_string(),
            model: "gpt-4o-mini".to_string(),
            input_rate_per_1k: 0.00015,
            output_rate_per_1k: 0.0006,
            speed: SpeedClass::Fast,
            quality: 0.78,
            local: false,
        },
        ModelRate {
            backend: "open_ai".to_string(),
            model: "gpt-4o".to_string(),
            input_rate_per_1k: 0.0025,
            output_rate_per_1k: 0.01,
            speed: SpeedClass::Medium,
            quality: 0.93,
            local: false,
        },
        ModelRate {
            backend: "anthropic".to_string(),
            model: "claude-3-haiku".to_string(),
            input_rate_per_1k: 0.00025,
            output_rate_per_1k: 0.00125,
            speed: SpeedClass::Fast,
            quality: 0.82,
            local: false,
        },
        ModelRate {
            backend: "anthropic".to_string(),
            model: "claude-3-5-sonnet".to_string(),
            input_rate_per_1k: 0.003,
            output_rate_per_1k: 0.015,
            speed: SpeedClass::Medium,
            quality: 0.95,
            local: false,
        },
    ]
}

// ── Tests ──────────────────────────────────────────────────────────────
