//! Similarity-gated batch grouping.
//!
//! Groups pending records whose texts are mutually similar into size- and
//! time-bounded batches. Batches only group: members always stay in the
//! main queue, and whether a ready batch becomes a single backend call or
//! stays per-item analytics is the caller's dispatch decision. Dropping a
//! batch never deletes its members; it only discards the grouping.

use crate::similarity::TextSimilarityIndex;
use crate::RouterError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

// ── Default value functions ────────────────────────────────────────────

/// Default maximum members per batch.
fn default_max_batch_size() -> usize {
    5
}

/// Default open-batch lifetime in milliseconds.
fn default_batch_timeout_ms() -> u64 {
    30_000
}

/// Default member count at which a batch becomes ready.
fn default_min_ready_size() -> usize {
    3
}

/// Default similarity a text must exceed to join a batch.
fn default_similarity_threshold() -> f64 {
    0.6
}

// ── Configuration ──────────────────────────────────────────────────────

/// Configuration for [`BatchAccumulator`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Maximum members per batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Open-batch lifetime in milliseconds. A batch past this age stops
    /// accepting members and becomes ready regardless of size.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Member count at which a batch becomes ready before its timeout.
    #[serde(default = "default_min_ready_size")]
    pub min_ready_size: usize,
    /// Similarity a text must strictly exceed against a batch
    /// representative to join that batch.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            min_ready_size: default_min_ready_size(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Validate a [`BatchConfig`], returning one error per violation.
pub fn validate(config: &BatchConfig) -> Vec<String> {
    let mut errors = Vec::new();
    if config.max_batch_size == 0 {
        errors.push("max_batch_size must be >= 1".to_string());
    }
    if config.min_ready_size == 0 {
        errors.push("min_ready_size must be >= 1".to_string());
    }
    if config.min_ready_size > config.max_batch_size {
        errors.push(format!(
            "min_ready_size ({}) must be <= max_batch_size ({})",
            config.min_ready_size, config.max_batch_size
        ));
    }
    if config.batch_timeout_ms == 0 {
        errors.push("batch_timeout_ms must be >= 1".to_string());
    }
    if !(0.0..=1.0).contains(&config.similarity_threshold) {
        errors.push(format!(
            "similarity_threshold must be in [0.0, 1.0], got {}",
            config.similarity_threshold
        ));
    }
    errors
}

// ── Batch ──────────────────────────────────────────────────────────────

/// A group of semantically similar pending records.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Unique batch id.
    pub id: String,
    /// The first member's text; similarity is measured against it.
    pub representative: String,
    /// Member record ids, in arrival order.
    pub member_ids: Vec<String>,
    created_at: Instant,
}

impl Batch {
    /// Time elapsed since the batch was opened.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    /// Whether the batch has no members. Never true in practice; a batch
    /// is created with its first member.
    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }
}

// ── Accumulator ────────────────────────────────────────────────────────

/// Accumulates similar pending items into bounded batches.
#[derive(Debug)]
pub struct BatchAccumulator {
    batches: Vec<Batch>,
    config: BatchConfig,
}

impl BatchAccumulator {
    /// Create an accumulator.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] for invalid configuration.
    pub fn new(config: BatchConfig) -> Result<Self, RouterError> {
        let errors = validate(&config);
        if !errors.is_empty() {
            return Err(RouterError::Config(errors.join("; ")));
        }
        Ok(Self {
            batches: Vec::new(),
            config,
        })
    }

    /// Assign a record to a batch, opening a new one when nothing fits.
    ///
    /// Open batches (younger than the timeout and below the size cap) are
    /// scanned in insertion order; the record joins the first whose
    /// representative clears the similarity threshold. Returns the batch
    /// id either way.
    pub fn add(
        &mut self,
        record_id: &str,
        text: &str,
        index: &TextSimilarityIndex,
    ) -> String {
        let timeout = self.timeout();
        for batch in self.batches.iter_mut() {
            if batch.age() >= timeout || batch.member_ids.len() >= self.config.max_batch_size {
                continue;
            }
            if index.similarity(text, &batch.representative) > self.config.similarity_threshold {
                batch.member_ids.push(record_id.to_string());
                debug!(
                    batch_id = batch.id.as_str(),
                    members = batch.member_ids.len(),
                    "record joined batch"
                );
                return batch.id.clone();
            }
        }

        let batch = Batch {
            id: Uuid::new_v4().to_string(),
            representative: text.to_string(),
            member_ids: vec![record_id.to_string()],
            created_at: Instant::now(),
        };
        let id = batch.id.clone();
        debug!(batch_id = id.as_str(), "opened new batch");
        self.batches.push(batch);
        id
    }

    /// Remove and return a batch once it is ready.
    ///
    /// A batch is ready when it holds at least `min_ready_size` members or
    /// its age has reached the timeout. Returns `None` for unknown ids and
    /// for batches that are still accumulating.
    pub fn ready(&mut self, batch_id: &str) -> Option<Batch> {
        let idx = self.batches.iter().position(|b| b.id == batch_id)?;
        let batch = &self.batches[idx];
        if batch.member_ids.len() >= self.config.min_ready_size || batch.age() >= self.timeout() {
            Some(self.batches.remove(idx))
        } else {
            None
        }
    }

    /// Drop batches older than twice the timeout, ready or not.
    ///
    /// Returns the dropped batches so the caller can clear the grouping
    /// from its records. Members are never deleted from the main queue.
    pub fn cleanup(&mut self) -> Vec<Batch> {
        let cutoff = self.timeout() * 2;
        let mut dropped = Vec::new();
        let mut kept = Vec::new();
        for batch in self.batches.drain(..) {
            if batch.age() > cutoff {
                debug!(batch_id = batch.id.as_str(), "dropped expired batch");
                dropped.push(batch);
            } else {
                kept.push(batch);
            }
        }
        self.batches = kept;
        dropped
    }

    /// Force-close and return every open batch. Used at shutdown/drain.
    pub fn flush_all(&mut self) -> Vec<Batch> {
        std::mem::take(&mut self.batches)
    }

    /// Number of open batches.
    pub fn open_batches(&self) -> usize {
        self.batches.len()
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.batch_timeout_ms)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
