//! # Stage: Work Queue Orchestration
//!
//! ## Responsibility
//! Own the pending/in-flight/terminal record sets and the prompt lifecycle.
//! Enqueue resolves a route through the candidate selector, registers the
//! text with the similarity corpus, optionally groups non-urgent items into
//! batches, and keeps the pending set ordered by (priority, estimated cost,
//! arrival). Dequeue/complete/fail drive the forward-only state machine and
//! maintain per-backend and per-complexity statistics plus the spend
//! ledger.
//!
//! ## Guarantees
//! - Forward-only lifecycle: Pending to Processing to Completed or Failed,
//!   never backward; exactly one route is attached before a record leaves
//!   Pending.
//! - Deterministic ordering: pending order is (priority ascending,
//!   estimated cost ascending, arrival sequence ascending).
//! - Exactly-once notifications: completion/failure observers fire once per
//!   record regardless of the terminal history cap.
//! - Fail-fast configuration: a malformed pricing table or config rejects
//!   at construction, never in a hot path.
//!
//! ## NOT Responsible For
//! - Calling backends (the embedder drives [`crate::backend::Backend`]
//!   after dequeueing)
//! - Retries or backend-failure classification (`fail` stores the error
//!   verbatim)
//! - Internal locking: every mutator takes `&mut self`. Calls made serially
//!   from one execution context are race-free by construction; concurrent
//!   embedders must serialize externally, e.g. behind
//!   [`crate::SharedWorkQueue`]. In particular the budget check and the
//!   ledger write form a check-then-act pair across enqueue and complete.
//! - Bounding the pending set: overload protection belongs to the embedder.

pub mod batch;
pub mod events;
pub mod record;
pub mod snapshot;

pub use batch::{Batch, BatchAccumulator, BatchConfig};
pub use events::QueueObserver;
pub use record::{PromptRecord, PromptStatus};
pub use snapshot::QueueSnapshot;

use crate::routing::{
    CandidateSelector, CostModel, CostModelConfig, LedgerSnapshot, QualityThresholds, Route,
    SelectOptions,
};
use crate::similarity::TextSimilarityIndex;
use crate::{now_ms, RouterError, SharedWorkQueue};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ── Default value functions ────────────────────────────────────────────

/// Default cap on the terminal record history.
fn default_terminal_history_cap() -> usize {
    1000
}

/// Default priority for enqueues that do not specify one.
fn default_priority() -> u8 {
    5
}

/// Default priority at or above which items are considered non-urgent and
/// eligible for batching.
fn default_batch_priority_cutoff() -> u8 {
    3
}

// ── Configuration ──────────────────────────────────────────────────────

/// Configuration for [`WorkQueue`].
///
/// Every field defaults, so `QueueConfig::default()` yields a working queue
/// over the stock pricing table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Cap on retained terminal records; oldest drop first.
    #[serde(default = "default_terminal_history_cap")]
    pub terminal_history_cap: usize,
    /// Priority assigned when an enqueue does not specify one.
    #[serde(default = "default_priority")]
    pub default_priority: u8,
    /// Priority at or above which items are batched (lower = more urgent).
    #[serde(default = "default_batch_priority_cutoff")]
    pub batch_priority_cutoff: u8,
    /// Cost model: pricing table, budget ceiling, token heuristics.
    #[serde(default)]
    pub cost: CostModelConfig,
    /// Per-level quality floors for candidate selection.
    #[serde(default)]
    pub thresholds: QualityThresholds,
    /// Batch accumulator settings.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            terminal_history_cap: default_terminal_history_cap(),
            default_priority: default_priority(),
            batch_priority_cutoff: default_batch_priority_cutoff(),
            cost: CostModelConfig::default(),
            thresholds: QualityThresholds::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Validate a [`QueueConfig`], aggregating errors from every section.
pub fn validate(config: &QueueConfig) -> Vec<String> {
    let mut errors = crate::routing::cost::validate(&config.cost);
    errors.extend(crate::routing::pricing::validate_entries(
        &config.cost.entries,
        &config.cost.fallback_backend,
        &config.cost.fallback_model,
    ));
    errors.extend(config.thresholds.validate());
    errors.extend(batch::validate(&config.batch));
    if config.terminal_history_cap == 0 {
        errors.push("terminal_history_cap must be >= 1".to_string());
    }
    errors
}

// ── Call options and results ───────────────────────────────────────────

/// Per-enqueue options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnqueueOptions {
    /// Priority for this record; lower is more urgent. Defaults to the
    /// queue's `default_priority`.
    pub priority: Option<u8>,
    /// Skip batch grouping for this record.
    pub no_batch: bool,
    /// Consider paid backends regardless of complexity level.
    pub force_cloud: bool,
    /// Explicit record id. Must be unique; autogenerated when absent.
    pub id: Option<String>,
}

/// What enqueue hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueReceipt {
    /// The record id.
    pub id: String,
    /// The chosen route. Inspect `route.fallback` rather than expecting an
    /// error when nothing qualified.
    pub route: Route,
    /// Position in the pending set at enqueue time (0 = next out).
    pub position: usize,
}

/// Point-in-time queue statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Records waiting in the pending set.
    pub pending_count: usize,
    /// Records currently processing.
    pub in_flight_count: usize,
    /// Total completions since construction (or import).
    pub completed_count: u64,
    /// Total failures since construction (or import).
    pub failed_count: u64,
    /// Completion counts per backend id.
    pub per_backend: HashMap<String, u64>,
    /// Completion counts per complexity level name.
    pub per_complexity: HashMap<String, u64>,
    /// Mean pending-to-start wait across completions, milliseconds.
    pub average_wait_ms: u64,
    /// Mean start-to-finish duration across completions, milliseconds.
    pub average_process_ms: u64,
    /// Spend ledger summary.
    pub ledger: LedgerSnapshot,
}

/// One pending record ranked by similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarItem {
    /// The pending record id.
    pub id: String,
    /// Similarity against the query text, in `[0.0, 1.0]`.
    pub similarity: f64,
}

// ── WorkQueue ──────────────────────────────────────────────────────────

/// The cost-aware prompt work queue.
///
/// Single logical owner, cooperative model: no internal threads, no
/// internal locking. See the module docs for the concurrency contract.
pub struct WorkQueue {
    terminal_history_cap: usize,
    default_priority: u8,
    batch_priority_cutoff: u8,

    selector: CandidateSelector,
    cost_model: CostModel,
    similarity: TextSimilarityIndex,
    batches: BatchAccumulator,

    pending: Vec<PromptRecord>,
    in_flight: HashMap<String, PromptRecord>,
    terminal: VecDeque<PromptRecord>,

    per_backend: HashMap<String, u64>,
    per_complexity: HashMap<String, u64>,
    completed_total: u64,
    failed_total: u64,
    total_wait_ms: u64,
    total_process_ms: u64,
    sequence: u64,

    observers: Vec<Arc<dyn QueueObserver>>,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("pending", &self.pending.len())
            .field("in_flight", &self.in_flight.len())
            .field("terminal", &self.terminal.len())
            .field("completed_total", &self.completed_total)
            .field("failed_total", &self.failed_total)
            .finish()
    }
}

impl WorkQueue {
    /// Build a queue from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] listing every violated constraint
    /// across the cost, threshold, and batch sections.
    pub fn new(config: QueueConfig) -> Result<Self, RouterError> {
        let errors = validate(&config);
        if !errors.is_empty() {
            return Err(RouterError::Config(errors.join("; ")));
        }
        let cost_model = CostModel::new(config.cost)?;
        let selector = CandidateSelector::new(config.thresholds)?;
        let batches = BatchAccumulator::new(config.batch)?;
        Ok(Self {
            terminal_history_cap: config.terminal_history_cap,
            default_priority: config.default_priority,
            batch_priority_cutoff: config.batch_priority_cutoff,
            selector,
            cost_model,
            similarity: TextSimilarityIndex::new(),
            batches,
            pending: Vec::new(),
            in_flight: HashMap::new(),
            terminal: VecDeque::new(),
            per_backend: HashMap::new(),
            per_complexity: HashMap::new(),
            completed_total: 0,
            failed_total: 0,
            total_wait_ms: 0,
            total_process_ms: 0,
            sequence: 0,
            observers: Vec::new(),
        })
    }

    /// Build a queue wrapped for shared async access.
    ///
    /// # Errors
    ///
    /// Same as [`WorkQueue::new`].
    pub fn shared(config: QueueConfig) -> Result<SharedWorkQueue, RouterError> {
        Ok(Arc::new(tokio::sync::Mutex::new(Self::new(config)?)))
    }

    /// Register a lifecycle observer. Handlers run synchronously on the
    /// calling thread and must not block.
    pub fn subscribe(&mut self, observer: Arc<dyn QueueObserver>) {
        self.observers.push(observer);
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Enqueue a prompt.
    ///
    /// Resolves a route, registers the text with the similarity corpus,
    /// optionally assigns the record to a batch, and inserts it into the
    /// ordered pending set.
    ///
    /// # Errors
    ///
    /// [`RouterError::Validation`] for empty/whitespace text or a duplicate
    /// explicit id. Route selection itself never fails; a fallback decision
    /// is reported through `route.fallback`, not an error.
    pub fn enqueue(
        &mut self,
        text: &str,
        options: EnqueueOptions,
    ) -> Result<EnqueueReceipt, RouterError> {
        if text.trim().is_empty() {
            return Err(RouterError::Validation(
                "prompt text must be non-empty".to_string(),
            ));
        }
        let id = match options.id {
            Some(id) => {
                if self.known_id(&id) {
                    return Err(RouterError::Validation(format!(
                        "record id already in use: {id}"
                    )));
                }
                id
            }
            None => Uuid::new_v4().to_string(),
        };
        let priority = options.priority.unwrap_or(self.default_priority);

        let select_options = SelectOptions {
            prefer_local: true,
            force_cloud: options.force_cloud,
            quality_floor: None,
        };
        let selection = self.selector.select(text, &select_options, &self.cost_model);
        if selection.route.fallback {
            warn!(id = id.as_str(), "enqueued with fallback route");
        }

        self.similarity.add_document(text);

        self.sequence += 1;
        let mut record = PromptRecord {
            id: id.clone(),
            text: text.to_string(),
            priority,
            sequence: self.sequence,
            created_at_ms: now_ms(),
            status: PromptStatus::Pending,
            route: selection.route.clone(),
            level: selection.complexity.level,
            estimated_cost: selection.route.estimated_cost,
            batch_id: None,
            started_at_ms: None,
            completed_at_ms: None,
            result: None,
            error: None,
        };

        if !options.no_batch && priority >= self.batch_priority_cutoff {
            record.batch_id = Some(self.batches.add(&id, text, &self.similarity));
        }

        self.pending.push(record);
        self.sort_pending();
        let position = self
            .pending
            .iter()
            .position(|r| r.id == id)
            .unwrap_or(self.pending.len() - 1);

        debug!(
            id = id.as_str(),
            priority,
            position,
            backend = selection.route.backend.as_str(),
            model = selection.route.model.as_str(),
            "prompt enqueued"
        );
        for observer in &self.observers {
            observer.on_enqueue(&self.pending[position]);
        }

        Ok(EnqueueReceipt {
            id,
            route: selection.route,
            position,
        })
    }

    /// Pop the pending head, or `None` when the queue is empty.
    ///
    /// The record transitions to Processing and moves to the in-flight map
    /// until `complete` or `fail` is called for it. There is no in-flight
    /// cancellation; see [`WorkQueue::fail_stale`] for the optional sweep.
    pub fn dequeue(&mut self) -> Option<PromptRecord> {
        if self.pending.is_empty() {
            return None;
        }
        let mut record = self.pending.remove(0);
        record.status = PromptStatus::Processing;
        record.started_at_ms = Some(now_ms());
        self.in_flight.insert(record.id.clone(), record.clone());

        debug!(
            id = record.id.as_str(),
            backend = record.route.backend.as_str(),
            "prompt dequeued"
        );
        for observer in &self.observers {
            observer.on_dequeue(&record);
        }
        Some(record)
    }

    /// Mark an in-flight record completed.
    ///
    /// Stores the result, updates the per-backend and per-complexity
    /// counters, and records the estimated cost into the ledger. Returns
    /// false for unknown ids, leaving all statistics unchanged.
    pub fn complete(&mut self, id: &str, result: &str) -> bool {
        let Some(mut record) = self.in_flight.remove(id) else {
            return false;
        };
        let now = now_ms();
        record.status = PromptStatus::Completed;
        record.completed_at_ms = Some(now);
        record.result = Some(result.to_string());

        if let Some(started) = record.started_at_ms {
            self.total_process_ms += now.saturating_sub(started);
            self.total_wait_ms += started.saturating_sub(record.created_at_ms);
        }
        self.completed_total += 1;
        *self
            .per_backend
            .entry(record.route.backend.clone())
            .or_insert(0) += 1;
        *self
            .per_complexity
            .entry(record.level.as_str().to_string())
            .or_insert(0) += 1;

        let mut metadata = HashMap::new();
        metadata.insert("record_id".to_string(), record.id.clone());
        metadata.insert("backend".to_string(), record.route.backend.clone());
        metadata.insert("model".to_string(), record.route.model.clone());
        self.cost_model.record_actual(record.estimated_cost, metadata);

        info!(
            id = id,
            backend = record.route.backend.as_str(),
            estimated_cost = record.estimated_cost,
            "prompt completed"
        );
        for observer in &self.observers {
            observer.on_complete(&record);
        }
        self.push_terminal(record);
        true
    }

    /// Mark an in-flight record failed, storing the error verbatim.
    ///
    /// No retry, no classification. Returns false for unknown ids, leaving
    /// all statistics unchanged.
    pub fn fail(&mut self, id: &str, error: &str) -> bool {
        let Some(mut record) = self.in_flight.remove(id) else {
            return false;
        };
        record.status = PromptStatus::Failed;
        record.completed_at_ms = Some(now_ms());
        record.error = Some(error.to_string());
        self.failed_total += 1;

        warn!(id = id, error = error, "prompt failed");
        for observer in &self.observers {
            observer.on_fail(&record);
        }
        self.push_terminal(record);
        true
    }

    /// Force-fail in-flight records processing longer than `max_age`.
    ///
    /// An optional sweep for embedders that want stuck backends off the
    /// books; not part of the base lifecycle. Returns the failed ids.
    pub fn fail_stale(&mut self, max_age: Duration) -> Vec<String> {
        let now = now_ms();
        let cutoff = max_age.as_millis() as u64;
        let stale: Vec<String> = self
            .in_flight
            .values()
            .filter(|r| {
                r.started_at_ms
                    .is_some_and(|started| now.saturating_sub(started) > cutoff)
            })
            .map(|r| r.id.clone())
            .collect();
        for id in &stale {
            warn!(id = id.as_str(), "force-failing stale in-flight record");
            self.fail(id, "in-flight record exceeded the configured maximum age");
        }
        stale
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Current statistics.
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            pending_count: self.pending.len(),
            in_flight_count: self.in_flight.len(),
            completed_count: self.completed_total,
            failed_count: self.failed_total,
            per_backend: self.per_backend.clone(),
            per_complexity: self.per_complexity.clone(),
            average_wait_ms: average(self.total_wait_ms, self.completed_total),
            average_process_ms: average(self.total_process_ms, self.completed_total),
            ledger: self.cost_model.ledger().snapshot(),
        }
    }

    /// Pending records ranked by similarity to `text`, at or above
    /// `threshold`, most similar first.
    pub fn find_similar(&self, text: &str, threshold: f64) -> Vec<SimilarItem> {
        let mut items: Vec<SimilarItem> = self
            .pending
            .iter()
            .map(|record| SimilarItem {
                id: record.id.clone(),
                similarity: self.similarity.similarity(text, &record.text),
            })
            .filter(|item| item.similarity >= threshold)
            .collect();
        items.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        items
    }

    /// Current position of a pending record (0 = next out).
    pub fn position(&self, id: &str) -> Option<usize> {
        self.pending.iter().position(|r| r.id == id)
    }

    /// Look up a record anywhere in the queue.
    ///
    /// # Errors
    ///
    /// [`RouterError::NotFound`] when the id is unknown (including records
    /// aged out of the terminal history).
    pub fn record(&self, id: &str) -> Result<&PromptRecord, RouterError> {
        self.pending
            .iter()
            .find(|r| r.id == id)
            .or_else(|| self.in_flight.get(id))
            .or_else(|| self.terminal.iter().find(|r| r.id == id))
            .ok_or_else(|| RouterError::NotFound(id.to_string()))
    }

    /// Number of pending records.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of in-flight records.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// The cost model, for budget inspection.
    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    /// The similarity corpus.
    pub fn similarity_index(&self) -> &TextSimilarityIndex {
        &self.similarity
    }

    // ── Batch access ───────────────────────────────────────────────────

    /// Remove and return a ready batch, or `None` while it accumulates.
    pub fn ready_batch(&mut self, batch_id: &str) -> Option<Batch> {
        self.batches.ready(batch_id)
    }

    /// Drop expired batches and clear the grouping from their pending
    /// members. Returns the number of batches dropped.
    pub fn cleanup_batches(&mut self) -> usize {
        let dropped = self.batches.cleanup();
        for batch in &dropped {
            for record in self.pending.iter_mut() {
                if record.batch_id.as_deref() == Some(batch.id.as_str()) {
                    record.batch_id = None;
                }
            }
        }
        dropped.len()
    }

    /// Force-close every open batch (shutdown/drain path).
    pub fn flush_batches(&mut self) -> Vec<Batch> {
        self.batches.flush_all()
    }

    /// Number of open batches.
    pub fn open_batches(&self) -> usize {
        self.batches.open_batches()
    }

    // ── Snapshot ───────────────────────────────────────────────────────

    /// Serialize the queue state to a JSON snapshot.
    ///
    /// # Errors
    ///
    /// [`RouterError::Validation`] when serialization fails.
    pub fn export(&self) -> Result<String, RouterError> {
        let mut in_flight: Vec<PromptRecord> = self.in_flight.values().cloned().collect();
        in_flight.sort_by_key(|r| r.sequence);
        let snapshot = QueueSnapshot {
            pending: self.pending.clone(),
            in_flight,
            terminal: self.terminal.iter().cloned().collect(),
            per_backend: self.per_backend.clone(),
            per_complexity: self.per_complexity.clone(),
            completed_total: self.completed_total,
            failed_total: self.failed_total,
            total_wait_ms: self.total_wait_ms,
            total_process_ms: self.total_process_ms,
            sequence: self.sequence,
            corpus: self.similarity.clone(),
            ledger: self.cost_model.ledger().clone(),
        };
        serde_json::to_string(&snapshot)
            .map_err(|e| RouterError::Validation(format!("snapshot serialization failed: {e}")))
    }

    /// Replace the queue state from a JSON snapshot produced by `export`.
    ///
    /// Best-effort continuity: records, counters, corpus, and ledger are
    /// restored; open batches are not part of the snapshot. On error the
    /// current state is left untouched.
    ///
    /// # Errors
    ///
    /// [`RouterError::Validation`] when the snapshot does not decode.
    pub fn import(&mut self, state: &str) -> Result<(), RouterError> {
        let snapshot: QueueSnapshot = serde_json::from_str(state)
            .map_err(|e| RouterError::Validation(format!("snapshot deserialization failed: {e}")))?;

        self.pending = snapshot.pending;
        self.sort_pending();
        self.in_flight = snapshot
            .in_flight
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        self.terminal = snapshot.terminal.into();
        while self.terminal.len() > self.terminal_history_cap {
            self.terminal.pop_front();
        }
        self.per_backend = snapshot.per_backend;
        self.per_complexity = snapshot.per_complexity;
        self.completed_total = snapshot.completed_total;
        self.failed_total = snapshot.failed_total;
        self.total_wait_ms = snapshot.total_wait_ms;
        self.total_process_ms = snapshot.total_process_ms;
        self.sequence = snapshot.sequence;
        self.similarity = snapshot.corpus;
        self.cost_model.restore_ledger(snapshot.ledger);

        info!(
            pending = self.pending.len(),
            in_flight = self.in_flight.len(),
            "queue state imported"
        );
        Ok(())
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn sort_pending(&mut self) {
        self.pending.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.estimated_cost.total_cmp(&b.estimated_cost))
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
    }

    fn push_terminal(&mut self, record: PromptRecord) {
        if self.terminal.len() >= self.terminal_history_cap {
            self.terminal.pop_front();
        }
        self.terminal.push_back(record);
    }

    fn known_id(&self, id: &str) -> bool {
        self.pending.iter().any(|r| r.id == id)
            || self.in_flight.contains_key(id)
            || self.terminal.iter().any(|r| r.id == id)
    }
}

/// Integer mean, zero when there are no samples.
fn average(total: u64, samples: u64) -> u64 {
    if samples == 0 {
        0
    } else {
        total / samples
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
