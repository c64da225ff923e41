//! TF-IDF text similarity.
//!
//! Maintains append-only corpus statistics (per-term document frequency and
//! a total document count) and computes a TF-IDF-weighted cosine similarity
//! between any two texts. Documents are never removed, so term weights only
//! drift as new documents arrive.
//!
//! ## Guarantees
//! - Symmetric: `similarity(a, b) == similarity(b, a)` for all pairs.
//! - Bounded: results always fall in `[0.0, 1.0]`; an empty or all-stopword
//!   text has a zero vector and scores `0.0` against everything.
//! - Self-similar: `similarity(x, x)` is `1.0` within float tolerance once
//!   `x` produces a non-zero vector.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Append-only TF-IDF similarity index over a growing text corpus.
///
/// Cheap to clone (the state is two flat maps) and fully serializable so the
/// corpus statistics can ride inside a queue snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextSimilarityIndex {
    /// Term to number-of-documents-containing-it. Never decremented.
    doc_freq: HashMap<String, u64>,
    /// Total documents ever indexed. Never decremented.
    total_docs: u64,
}

impl TextSimilarityIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document with the corpus statistics.
    ///
    /// Lowercases, maps non-alphanumeric characters to whitespace, splits,
    /// and drops tokens of length two or shorter. Each distinct surviving
    /// token bumps its document frequency once; the document count always
    /// increments, even for texts that yield no tokens.
    pub fn add_document(&mut self, text: &str) {
        let distinct: HashSet<String> = tokenize(text).into_iter().collect();
        for token in &distinct {
            *self.doc_freq.entry(token.clone()).or_insert(0) += 1;
        }
        self.total_docs += 1;
        debug!(
            tokens = distinct.len(),
            total_docs = self.total_docs,
            "document indexed"
        );
    }

    /// Number of documents indexed so far.
    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    /// Number of distinct terms tracked.
    pub fn vocabulary_len(&self) -> usize {
        self.doc_freq.len()
    }

    /// Build the TF-IDF weighted vector for a text.
    ///
    /// Term frequency is normalized by the token count of the text; each
    /// term is weighted by `ln((N + 1) / (df + 1)) + 1` where `N` is the
    /// total document count. The smoothing keeps weights strictly positive
    /// and defined even for unseen terms.
    pub fn vector(&self, text: &str) -> HashMap<String, f64> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return HashMap::new();
        }
        let count = tokens.len() as f64;
        let mut weights: HashMap<String, f64> = HashMap::new();
        for token in tokens {
            *weights.entry(token).or_insert(0.0) += 1.0;
        }
        for (term, weight) in weights.iter_mut() {
            let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
            let idf = ((self.total_docs as f64 + 1.0) / (df + 1.0)).ln() + 1.0;
            *weight = (*weight / count) * idf;
        }
        weights
    }

    /// Cosine similarity between two texts under the current corpus weights.
    ///
    /// Returns `0.0` when either vector has zero norm (empty text, or text
    /// reduced to nothing by tokenization).
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let va = self.vector(a);
        let vb = self.vector(b);
        let norm_a = norm(&va);
        let norm_b = norm(&vb);
        if norm_a < f64::EPSILON || norm_b < f64::EPSILON {
            return 0.0;
        }
        let dot: f64 = va
            .iter()
            .filter_map(|(term, wa)| vb.get(term).map(|wb| wa * wb))
            .sum();
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }

    /// Filter `candidates` to those with similarity to `query` at or above
    /// `threshold`, sorted descending by similarity.
    pub fn find_similar<'a>(
        &self,
        query: &str,
        candidates: &[&'a str],
        threshold: f64,
    ) -> Vec<(&'a str, f64)> {
        let mut matches: Vec<(&'a str, f64)> = candidates
            .iter()
            .map(|candidate| (*candidate, self.similarity(query, candidate)))
            .filter(|(_, sim)| *sim >= threshold)
            .collect();
        matches.sort_by(|a, b| b.1.total_cmp(&a.1));
        matches
    }
}

/// Lowercase, strip non-alphanumeric characters, split on whitespace, and
/// drop tokens of length two or shorter.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|token| token.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Euclidean norm of a sparse vector.
fn norm(vector: &HashMap<String, f64>) -> f64 {
    vector.values().map(|w| w * w).sum::<f64>().sqrt()
}

// ── Tests ──────────────────────────────────────────────────────────────
