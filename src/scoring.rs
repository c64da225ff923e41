//! Prompt complexity scoring.
//!
//! Analyses a prompt string and produces a difficulty score in `0.0..=10.0`
//! plus a coarse level bucket. The score drives the quality floor used by
//! candidate selection:
//!
//! | Score     | Level    |
//! |-----------|----------|
//! | `<= 2.0`  | simple   |
//! | `<= 5.0`  | moderate |
//! | `<= 8.0`  | complex  |
//! | otherwise | advanced |
//!
//! ## Heuristics
//!
//! Five deterministic pattern-match counts feed a weighted sum:
//! code markers (+0.5 each), multi-step/list markers (+1.5 each),
//! technical terms (+0.3 each), reasoning verbs (+0.8 each), and
//! simplicity markers (-0.5 each), on top of a length term
//! `min(word_count / 20, 3)`. The raw sum is clamped to `[0.0, 10.0]`.
//!
//! Analysis is pure: identical input always yields identical output, and
//! extra technical or reasoning matches can never lower the score.

use serde::{Deserialize, Serialize};

/// Markers that suggest the prompt contains or asks about code.
const CODE_MARKERS: [&str; 9] = [
    "```", "fn ", "def ", "class ", "function ", "import ", "#include", "();", "=>",
];

/// Inline markers that suggest a sequenced, multi-step request.
const SEQUENCE_MARKERS: [&str; 4] = ["first,", "then ", "after that", "finally"];

/// Technical vocabulary counted toward difficulty.
const TECHNICAL_TERMS: [&str; 16] = [
    "algorithm",
    "architecture",
    "asynchronous",
    "cache",
    "compiler",
    "concurrency",
    "database",
    "distributed",
    "encryption",
    "kernel",
    "latency",
    "protocol",
    "recursion",
    "runtime",
    "schema",
    "throughput",
];

/// Verbs that ask for analysis or synthesis rather than recall.
const REASONING_VERBS: [&str; 14] = [
    "analyze",
    "compare",
    "debug",
    "derive",
    "design",
    "evaluate",
    "explain",
    "justify",
    "optimize",
    "prove",
    "reason",
    "refactor",
    "summarize",
    "synthesize",
];

/// Phrasing that signals the caller wants a short, easy answer.
const SIMPLICITY_MARKERS: [&str; 8] = [
    "hello",
    "what is",
    "who is",
    "define",
    "briefly",
    "one sentence",
    "short answer",
    "yes or no",
];

/// Coarse prompt-difficulty bucket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    /// Trivial lookups and short questions.
    Simple,
    /// Everyday requests with some structure.
    Moderate,
    /// Multi-part or technical work.
    Complex,
    /// Long, dense, heavily structured tasks.
    Advanced,
}

impl ComplexityLevel {
    /// Stable lowercase name, used as a counter key and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw pattern-match counts behind a score, kept for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureCounts {
    /// Matches against code markers.
    pub code_markers: usize,
    /// Numbered/bulleted list lines plus inline sequence markers.
    pub multi_step_markers: usize,
    /// Matches against the technical vocabulary.
    pub technical_terms: usize,
    /// Matches against the reasoning verb list.
    pub reasoning_verbs: usize,
    /// Matches against the simplicity phrasing list.
    pub simplicity_markers: usize,
}

/// Result of analysing one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityReport {
    /// Clamped difficulty score in `[0.0, 10.0]`.
    pub score: f64,
    /// Bucketed difficulty level.
    pub level: ComplexityLevel,
    /// Whitespace-delimited word count.
    pub word_count: usize,
    /// The individual pattern-match counts.
    pub features: FeatureCounts,
}

/// Stateless prompt complexity scorer.
///
/// Cheap to construct; all analysis is a few O(n) scans over the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityScorer;

impl ComplexityScorer {
    /// Create a scorer.
    pub fn new() -> Self {
        Self
    }

    /// Analyse a prompt.
    ///
    /// Pure and deterministic; never panics, including on empty input.
    pub fn analyze(&self, text: &str) -> ComplexityReport {
        let lower = text.to_lowercase();
        let word_count = text.split_whitespace().count();

        let features = FeatureCounts {
            code_markers: count_matches(&lower, &CODE_MARKERS),
            multi_step_markers: multi_step_count(text, &lower),
            technical_terms: count_matches(&lower, &TECHNICAL_TERMS),
            reasoning_verbs: count_matches(&lower, &REASONING_VERBS),
            simplicity_markers: count_matches(&lower, &SIMPLICITY_MARKERS),
        };

        let raw = (word_count as f64 / 20.0).min(3.0)
            + 0.5 * features.code_markers as f64
            + 1.5 * features.multi_step_markers as f64
            + 0.3 * features.technical_terms as f64
            + 0.8 * features.reasoning_verbs as f64
            - 0.5 * features.simplicity_markers as f64;
        let score = raw.clamp(0.0, 10.0);

        ComplexityReport {
            score,
            level: bucket(score),
            word_count,
            features,
        }
    }
}

/// Map a clamped score onto its level bucket.
fn bucket(score: f64) -> ComplexityLevel {
    if score <= 2.0 {
        ComplexityLevel::Simple
    } else if score <= 5.0 {
        ComplexityLevel::Moderate
    } else if score <= 8.0 {
        ComplexityLevel::Complex
    } else {
        ComplexityLevel::Advanced
    }
}

/// Total occurrences of any pattern in the (already lowercased) text.
fn count_matches(lower: &str, patterns: &[&str]) -> usize {
    patterns.iter().map(|p| lower.matches(p).count()).sum()
}

/// Count list-shaped lines ("1.", "- ", "* ") plus inline sequence markers.
fn multi_step_count(text: &str, lower: &str) -> usize {
    let mut count = 0;
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("- ") || trimmed.starts_with("* ") {
            count += 1;
            continue;
        }
        if let Some(dot) = trimmed.find('.') {
            let head = &trimmed[..dot];
            if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) {
                count += 1;
            }
        }
    }
    count + count_matches(lower, &SEQUENCE_MARKERS)
}

// ── Tests ──────────────────────────────────────────────────────────────
