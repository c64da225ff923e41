//! Candidate enumeration and ranking.
//!
//! [`CandidateSelector`] turns a prompt into a concrete [`Route`]: it scores
//! the prompt, maps the level to a minimum acceptable quality, enumerates
//! the feasible (backend, model) pairs from the pricing table, and ranks
//! them by (cost ascending, quality descending, speed ascending). That
//! exact ordering is a reproducibility contract, not an implementation
//! detail.
//!
//! Selection never fails for non-empty text: when nothing qualifies it
//! degrades to the table's designated free route, flagged `fallback: true`
//! and logged as a non-fatal warning. Callers inspect the flag instead of
//! catching an error.

use crate::routing::cost::CostModel;
use crate::routing::pricing::{ModelRate, SpeedClass};
use crate::scoring::{ComplexityLevel, ComplexityReport, ComplexityScorer};
use crate::RouterError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

// ── Default value functions ────────────────────────────────────────────

/// Default quality floor for simple prompts.
fn default_simple_floor() -> f64 {
    0.5
}

/// Default quality floor for moderate prompts.
fn default_moderate_floor() -> f64 {
    0.65
}

/// Default quality floor for complex prompts.
fn default_complex_floor() -> f64 {
    0.8
}

/// Default quality floor for advanced prompts.
fn default_advanced_floor() -> f64 {
    0.9
}

// ── Quality thresholds ─────────────────────────────────────────────────

/// Minimum acceptable route quality per complexity level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityThresholds {
    /// Floor for [`ComplexityLevel::Simple`].
    #[serde(default = "default_simple_floor")]
    pub simple: f64,
    /// Floor for [`ComplexityLevel::Moderate`].
    #[serde(default = "default_moderate_floor")]
    pub moderate: f64,
    /// Floor for [`ComplexityLevel::Complex`].
    #[serde(default = "default_complex_floor")]
    pub complex: f64,
    /// Floor for [`ComplexityLevel::Advanced`].
    #[serde(default = "default_advanced_floor")]
    pub advanced: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            simple: default_simple_floor(),
            moderate: default_moderate_floor(),
            complex: default_complex_floor(),
            advanced: default_advanced_floor(),
        }
    }
}

impl QualityThresholds {
    /// The floor for a given level.
    pub fn floor(&self, level: ComplexityLevel) -> f64 {
        match level {
            ComplexityLevel::Simple => self.simple,
            ComplexityLevel::Moderate => self.moderate,
            ComplexityLevel::Complex => self.complex,
            ComplexityLevel::Advanced => self.advanced,
        }
    }

    /// Validate all floors, returning one error per violation.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, value) in [
            ("simple", self.simple),
            ("moderate", self.moderate),
            ("complex", self.complex),
            ("advanced", self.advanced),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!(
                    "quality floor `{name}` must be in [0.0, 1.0], got {value}"
                ));
            }
        }
        errors
    }
}

// ── Route ──────────────────────────────────────────────────────────────

/// A fully-typed routing decision for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Backend identifier from the pricing table.
    pub backend: String,
    /// Model identifier within the backend.
    pub model: String,
    /// Quality score of the chosen entry, in `[0.0, 1.0]`.
    pub quality: f64,
    /// Latency class of the chosen entry.
    pub speed: SpeedClass,
    /// Whether the endpoint runs locally.
    pub local: bool,
    /// Estimated cost in USD for this prompt on this route.
    pub estimated_cost: f64,
    /// True when selection degraded to the designated fallback route.
    pub fallback: bool,
}

impl Route {
    fn from_rate(rate: &ModelRate, estimated_cost: f64, fallback: bool) -> Self {
        Self {
            backend: rate.backend.clone(),
            model: rate.model.clone(),
            quality: rate.quality,
            speed: rate.speed,
            local: rate.local,
            estimated_cost,
            fallback,
        }
    }
}

// ── Options and result ─────────────────────────────────────────────────

/// Per-call knobs for [`CandidateSelector::select`].
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOptions {
    /// Enumerate local/free backends. On by default; disabling it restricts
    /// selection to paid candidates (or the fallback).
    pub prefer_local: bool,
    /// Consider paid backends regardless of complexity level.
    pub force_cloud: bool,
    /// Override the level-derived quality floor for this call.
    pub quality_floor: Option<f64>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            prefer_local: true,
            force_cloud: false,
            quality_floor: None,
        }
    }
}

/// Result of a selection: the chosen route, the complexity analysis that
/// drove it, and up to three ranked runners-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// The top-ranked route.
    pub route: Route,
    /// The complexity analysis of the prompt.
    pub complexity: ComplexityReport,
    /// Up to three runners-up in ranking order.
    pub alternatives: Vec<Route>,
}

// ── Selector ───────────────────────────────────────────────────────────

/// Enumerates and ranks feasible routes for a prompt.
#[derive(Debug, Clone)]
pub struct CandidateSelector {
    scorer: ComplexityScorer,
    thresholds: QualityThresholds,
}

impl CandidateSelector {
    /// Create a selector with the given quality thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] when any floor is outside `[0, 1]`.
    pub fn new(thresholds: QualityThresholds) -> Result<Self, RouterError> {
        let errors = thresholds.validate();
        if !errors.is_empty() {
            return Err(RouterError::Config(errors.join("; ")));
        }
        Ok(Self {
            scorer: ComplexityScorer::new(),
            thresholds,
        })
    }

    /// The underlying scorer, for external breakdown queries.
    pub fn scorer(&self) -> &ComplexityScorer {
        &self.scorer
    }

    /// Select a route for `text`.
    ///
    /// Local candidates are enumerated when `prefer_local` is on; paid
    /// candidates join only when the level is complex/advanced or
    /// `force_cloud` is set, and only while their estimate passes the
    /// budget check. Candidates are ranked by (cost asc, quality desc,
    /// speed asc). When nothing qualifies, the table's fallback route is
    /// returned with `fallback: true` instead of an error.
    pub fn select(
        &self,
        text: &str,
        options: &SelectOptions,
        cost_model: &CostModel,
    ) -> Selection {
        let complexity = self.scorer.analyze(text);
        let floor = options
            .quality_floor
            .unwrap_or_else(|| self.thresholds.floor(complexity.level));

        let mut candidates: Vec<Route> = Vec::new();

        if options.prefer_local {
            for rate in cost_model
                .pricing()
                .entries()
                .iter()
                .filter(|r| r.local && r.quality >= floor)
            {
                let cost = cost_model.estimate_for_rate(text, rate);
                candidates.push(Route::from_rate(rate, cost, false));
            }
        }

        let consider_paid = options.force_cloud
            || matches!(
                complexity.level,
                ComplexityLevel::Complex | ComplexityLevel::Advanced
            );
        if consider_paid {
            for rate in cost_model
                .pricing()
                .entries()
                .iter()
                .filter(|r| !r.local && r.quality >= floor)
            {
                let cost = cost_model.estimate_for_rate(text, rate);
                if cost_model.within_budget(cost) {
                    candidates.push(Route::from_rate(rate, cost, false));
                }
            }
        }

        candidates.sort_by(rank_routes);

        let (route, alternatives) = match candidates.split_first() {
            Some((best, rest)) => (best.clone(), rest.iter().take(3).cloned().collect()),
            None => {
                let rate = cost_model.pricing().fallback();
                let cost = cost_model.estimate_for_rate(text, rate);
                warn!(
                    backend = rate.backend.as_str(),
                    model = rate.model.as_str(),
                    level = complexity.level.as_str(),
                    quality_floor = floor,
                    "no candidate qualified, degrading to fallback route"
                );
                (Route::from_rate(rate, cost, true), Vec::new())
            }
        };

        debug!(
            backend = route.backend.as_str(),
            model = route.model.as_str(),
            score = complexity.score,
            level = complexity.level.as_str(),
            estimated_cost = route.estimated_cost,
            fallback = route.fallback,
            "route selected"
        );

        Selection {
            route,
            complexity,
            alternatives,
        }
    }
}

/// The ranking contract: cost ascending, then quality descending, then
/// speed rank ascending (`Fast < Medium < Slow`).
fn rank_routes(a: &Route, b: &Route) -> Ordering {
    a.estimated_cost
        .total_cmp(&b.estimated_cost)
        .then_with(|| b.quality.total_cmp(&a.quality))
        .then_with(|| a.speed.rank().cmp(&b.speed.rank()))
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::cost::CostModelConfig;
    use crate::routing::pricing::default_entries;

    fn selector() -> CandidateSelector {
        CandidateSelector::new(QualityThresholds::default()).unwrap()
    }

    fn cost_model() -> CostModel {
        CostModel::new(CostModelConfig::default()).unwrap()
    }

    fn rate(
        backend: &str,
        model: &str,
        cost_per_1k: f64,
        quality: f64,
        speed: SpeedClass,
        local: bool,
    ) -> ModelRate {
        ModelRate {
            backend: backend.to_string(),
            model: model.to_string(),
            input_rate_per_1k: cost_per_1k,
            output_rate_per_1k: cost_per_1k,
            speed,
            quality,
            local,
        }
    }

    // -- totality --------------------------------------------------------

    #[test]
    fn test_select_never_fails_for_non_empty_text() {
        let selector = selector();
        let cost_model = cost_model();
        let prompts = [
            "hi",
            "explain recursion",
            "a very long and complicated request about distributed systems",
            "!!!",
        ];
        for prompt in prompts {
            let selection = selector.select(prompt, &SelectOptions::default(), &cost_model);
            assert!(!selection.route.backend.is_empty(), "no route for {prompt:?}");
        }
    }

    #[test]
    fn test_simple_prompt_routes_local_not_fallback() {
        let selection = selector().select(
            "explain recursion",
            &SelectOptions::default(),
            &cost_model(),
        );
        assert!(selection.route.local);
        assert!(!selection.route.fallback);
        assert_eq!(selection.route.estimated_cost, 0.0);
        assert_eq!(selection.complexity.level, ComplexityLevel::Simple);
    }

    #[test]
    fn test_simple_prompt_does_not_consider_paid_backends() {
        let selection = selector().select(
            "explain recursion",
            &SelectOptions::default(),
            &cost_model(),
        );
        assert!(selection.route.local);
        for alt in &selection.alternatives {
            assert!(alt.local, "paid backends must not appear for simple prompts");
        }
    }

    // -- ranking contract ------------------------------------------------

    #[test]
    fn test_equal_cost_and_quality_prefers_faster_route() {
        let entries = vec![
            rate("local", "slow-model", 0.0, 0.6, SpeedClass::Slow, true),
            rate("local", "fast-model", 0.0, 0.6, SpeedClass::Fast, true),
            rate("local", "medium-model", 0.0, 0.6, SpeedClass::Medium, true),
        ];
        let config = CostModelConfig {
            entries,
            fallback_backend: "local".to_string(),
            fallback_model: "fast-model".to_string(),
            ..CostModelConfig::default()
        };
        let cost_model = CostModel::new(config).unwrap();
        let selection = selector().select("hello there", &SelectOptions::default(), &cost_model);
        assert_eq!(selection.route.model, "fast-model");
        assert_eq!(selection.alternatives[0].model, "medium-model");
        assert_eq!(selection.alternatives[1].model, "slow-model");
    }

    #[test]
    fn test_equal_cost_prefers_higher_quality() {
        let entries = vec![
            rate("local", "okay", 0.0, 0.6, SpeedClass::Fast, true),
            rate("local", "better", 0.0, 0.9, SpeedClass::Fast, true),
        ];
        let config = CostModelConfig {
            entries,
            fallback_backend: "local".to_string(),
            fallback_model: "okay".to_string(),
            ..CostModelConfig::default()
        };
        let cost_model = CostModel::new(config).unwrap();
        let selection = selector().select("hello there", &SelectOptions::default(), &cost_model);
        assert_eq!(selection.route.model, "better");
    }

    #[test]
    fn test_cheaper_route_wins_over_higher_quality() {
        let entries = vec![
            rate("local", "free", 0.0, 0.55, SpeedClass::Fast, true),
            rate("cloud", "premium", 0.01, 0.99, SpeedClass::Fast, false),
        ];
        let config = CostModelConfig {
            entries,
            fallback_backend: "local".to_string(),
            fallback_model: "free".to_string(),
            ..CostModelConfig::default()
        };
        let cost_model = CostModel::new(config).unwrap();
        let options = SelectOptions {
            force_cloud: true,
            quality_floor: Some(0.5),
            ..SelectOptions::default()
        };
        let selection = selector().select("hello there", &options, &cost_model);
        assert_eq!(selection.route.model, "free");
    }

    // -- paid enumeration --------------------------------------------------

    #[test]
    fn test_complex_prompt_considers_paid_backends() {
        let prompt = "Debug the distributed cache protocol:\n1. reproduce the failure\n2. analyze the logs\n3. design a fix";
        let selection = selector().select(prompt, &SelectOptions::default(), &cost_model());
        assert!(
            matches!(
                selection.complexity.level,
                ComplexityLevel::Complex | ComplexityLevel::Advanced
            ),
            "test prompt should be complex, got {:?}",
            selection.complexity.level
        );
        // No local entry reaches the 0.8 floor, so a paid route wins
        assert!(!selection.route.local);
        assert!(!selection.route.fallback);
        assert!(selection.route.quality >= 0.8);
    }

    #[test]
    fn test_force_cloud_admits_paid_for_simple_prompts() {
        let options = SelectOptions {
            force_cloud: true,
            ..SelectOptions::default()
        };
        let selection = selector().select("explain recursion", &options, &cost_model());
        let considered_paid = !selection.route.local
            || selection.alternatives.iter().any(|r| !r.local);
        assert!(considered_paid, "force_cloud should enumerate paid routes");
    }

    #[test]
    fn test_budget_ceiling_excludes_paid_candidates() {
        let config = CostModelConfig {
            budget_ceiling: Some(0.0),
            ..CostModelConfig::default()
        };
        let cost_model = CostModel::new(config).unwrap();
        let prompt = "Debug the distributed cache protocol:\n1. reproduce the failure\n2. analyze the logs\n3. design a fix";
        let selection = selector().select(prompt, &SelectOptions::default(), &cost_model);
        // Paid candidates cost more than the zero ceiling; only the free
        // fallback remains once no local entry clears the complex floor.
        assert!(selection.route.fallback);
        assert!(selection.route.local);
    }

    // -- fallback --------------------------------------------------------

    #[test]
    fn test_unreachable_floor_degrades_to_fallback() {
        let options = SelectOptions {
            quality_floor: Some(1.0),
            ..SelectOptions::default()
        };
        let selection = selector().select("explain recursion", &options, &cost_model());
        assert!(selection.route.fallback);
        assert!(selection.alternatives.is_empty());
        assert_eq!(selection.route.backend, "llama_cpp");
    }

    #[test]
    fn test_prefer_local_disabled_simple_prompt_falls_back() {
        let options = SelectOptions {
            prefer_local: false,
            ..SelectOptions::default()
        };
        // Simple level never enumerates paid routes, and locals are off
        let selection = selector().select("explain recursion", &options, &cost_model());
        assert!(selection.route.fallback);
    }

    // -- alternatives ----------------------------------------------------

    #[test]
    fn test_alternatives_capped_at_three() {
        let mut entries = default_entries();
        entries.push(rate("local", "extra-a", 0.0, 0.95, SpeedClass::Fast, true));
        entries.push(rate("local", "extra-b", 0.0, 0.96, SpeedClass::Fast, true));
        let config = CostModelConfig {
            entries,
            ..CostModelConfig::default()
        };
        let cost_model = CostModel::new(config).unwrap();
        let options = SelectOptions {
            force_cloud: true,
            quality_floor: Some(0.0),
            ..SelectOptions::default()
        };
        let selection = selector().select("hello there friend", &options, &cost_model);
        assert!(selection.alternatives.len() <= 3);
    }

    #[test]
    fn test_alternatives_follow_ranking_order() {
        let selection = selector().select(
            "hello there friend",
            &SelectOptions {
                force_cloud: true,
                quality_floor: Some(0.0),
                ..SelectOptions::default()
            },
            &cost_model(),
        );
        let mut previous = selection.route.clone();
        for alt in &selection.alternatives {
            assert_ne!(rank_routes(&previous, alt), Ordering::Greater);
            previous = alt.clone();
        }
    }

    // -- thresholds ------------------------------------------------------

    #[test]
    fn test_threshold_defaults() {
        let thresholds = QualityThresholds::default();
        assert_eq!(thresholds.floor(ComplexityLevel::Simple), 0.5);
        assert_eq!(thresholds.floor(ComplexityLevel::Moderate), 0.65);
        assert_eq!(thresholds.floor(ComplexityLevel::Complex), 0.8);
        assert_eq!(thresholds.floor(ComplexityLevel::Advanced), 0.9);
    }

    #[test]
    fn test_invalid_threshold_rejected_at_construction() {
        let thresholds = QualityThresholds {
            complex: 1.5,
            ..QualityThresholds::default()
        };
        assert!(matches!(
            CandidateSelector::new(thresholds),
            Err(RouterError::Config(_))
        ));
    }

    #[test]
    fn test_thresholds_toml_round_trip() {
        let thresholds = QualityThresholds::default();
        let text = toml::to_string(&thresholds).unwrap();
        let parsed: QualityThresholds = toml::from_str(&text).unwrap();
        assert_eq!(thresholds, parsed);
    }
}
