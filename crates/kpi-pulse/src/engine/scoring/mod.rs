//! Composite KPI scoring.
//!
//! Pure and deterministic: identical raw inputs and configuration always
//! yield the identical outcome, with a per-metric component trail kept for
//! audit display.

pub mod config;
pub mod rules;

use serde::{Deserialize, Serialize};

use crate::engine::domain::{MetricKind, RawMetrics, Rating};
use config::{EngineConfig, EngineConfigError};

/// Discrete contribution of one metric to the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub metric: MetricKind,
    pub raw: f64,
    pub normalized: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// Scoring result persisted onto the KPI score record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub overall: f64,
    pub rating: Rating,
    pub components: Vec<ScoreComponent>,
}

/// Compute the weighted composite score and rating for a submission.
///
/// Weights arrive renormalized from config validation; the only failure
/// mode is a band table that no longer covers the score domain, which is
/// surfaced as a configuration error rather than a silently wrong rating.
pub fn score(metrics: &RawMetrics, config: &EngineConfig) -> Result<ScoreOutcome, EngineConfigError> {
    let mut components = Vec::with_capacity(MetricKind::ALL.len());
    let mut overall = 0.0;

    for metric in MetricKind::ALL {
        let raw = metrics.value(metric);
        let normalized = normalize(metric, raw, config);
        let weight = config.weights.get(&metric).copied().unwrap_or(0.0);
        let contribution = normalized * weight;
        overall += contribution;
        components.push(ScoreComponent {
            metric,
            raw,
            normalized,
            weight,
            contribution,
        });
    }

    let overall = overall.clamp(0.0, 100.0);
    let rating = config.classify(overall)?;

    Ok(ScoreOutcome {
        overall,
        rating,
        components,
    })
}

/// Map a raw metric value onto the 0-100 contribution scale.
fn normalize(metric: MetricKind, raw: f64, config: &EngineConfig) -> f64 {
    match metric {
        // Higher-is-better rates are already on the contribution scale.
        MetricKind::Tat
        | MetricKind::Quality
        | MetricKind::AppUsage
        | MetricKind::NeighborCheck => raw.clamp(0.0, 100.0),
        // A negativity rate is inverted: 5% negative feedback scores 95.
        MetricKind::GeneralNegativity => (100.0 - raw).clamp(0.0, 100.0),
        // Counts subtract configured points per event, floored at zero.
        MetricKind::MajorNegativity => {
            (100.0 - raw * config.penalties.major_negativity_points).max(0.0)
        }
        MetricKind::Insufficiency => {
            (100.0 - raw * config.penalties.insufficiency_points).max(0.0)
        }
    }
}
