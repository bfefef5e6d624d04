use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::domain::{
    AuditType, EmailTemplate, MetricKind, NotificationKind, Rating, TrainingType,
};

/// Inclusive score band mapping onto a rating. Bands must be contiguous and
/// together cover 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingBand {
    pub min: u8,
    pub max: u8,
    pub rating: Rating,
}

/// Actions a rule contributes when it fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    #[serde(default)]
    pub training: BTreeSet<TrainingType>,
    #[serde(default)]
    pub audits: BTreeSet<AuditType>,
    #[serde(default)]
    pub emails: BTreeSet<EmailTemplate>,
    #[serde(default)]
    pub notifications: BTreeSet<NotificationKind>,
}

/// Primary classification rule: the action set owed to a rating band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRule {
    pub rating: Rating,
    pub actions: ActionSet,
}

/// Threshold comparison for a secondary metric rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricPredicate {
    AtLeast(f64),
    Below(f64),
}

/// Secondary, additive rule over a single raw metric, evaluated
/// independently of the rating band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    pub metric: MetricKind,
    pub predicate: MetricPredicate,
    pub actions: ActionSet,
}

/// Points subtracted per event when normalizing the count metrics, floored
/// at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyCurve {
    pub major_negativity_points: f64,
    pub insufficiency_points: f64,
}

/// Raw, not-yet-validated configuration parts as accepted from update
/// requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfigParts {
    pub weights: BTreeMap<MetricKind, f64>,
    pub penalties: PenaltyCurve,
    pub rating_bands: Vec<RatingBand>,
    pub rating_rules: Vec<RatingRule>,
    pub metric_rules: Vec<MetricRule>,
}

/// Validated active configuration. Construct through [`EngineConfig::new`];
/// weights are stored already renormalized to sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub weights: BTreeMap<MetricKind, f64>,
    pub penalties: PenaltyCurve,
    pub rating_bands: Vec<RatingBand>,
    pub rating_rules: Vec<RatingRule>,
    pub metric_rules: Vec<MetricRule>,
}

impl EngineConfig {
    /// Validate the parts wholesale. An invalid update is rejected without
    /// any partial apply.
    pub fn new(parts: EngineConfigParts) -> Result<Self, EngineConfigError> {
        let EngineConfigParts {
            weights,
            penalties,
            rating_bands,
            rating_rules,
            metric_rules,
        } = parts;

        let weights = validate_weights(weights)?;
        validate_penalties(&penalties)?;
        let rating_bands = validate_bands(rating_bands)?;
        validate_rating_rules(&rating_rules)?;
        validate_metric_rules(&metric_rules)?;

        Ok(Self {
            weights,
            penalties,
            rating_bands,
            rating_rules,
            metric_rules,
        })
    }

    /// Built-in defaults restored by `reset_to_defaults`.
    pub fn default_config() -> Self {
        Self::new(default_parts()).expect("built-in default configuration is valid")
    }

    pub fn parts(&self) -> EngineConfigParts {
        EngineConfigParts {
            weights: self.weights.clone(),
            penalties: self.penalties,
            rating_bands: self.rating_bands.clone(),
            rating_rules: self.rating_rules.clone(),
            metric_rules: self.metric_rules.clone(),
        }
    }

    /// Locate the rating band containing the (floored, clamped) score.
    /// Validation guarantees coverage; a miss means the invariant was
    /// bypassed and is surfaced loudly rather than scored silently wrong.
    pub fn classify(&self, score: f64) -> Result<Rating, EngineConfigError> {
        let bucket = score.clamp(0.0, 100.0).floor() as u8;
        self.rating_bands
            .iter()
            .find(|band| band.min <= bucket && bucket <= band.max)
            .map(|band| band.rating)
            .ok_or(EngineConfigError::UncoveredScore { score: bucket })
    }

    /// Primary action set for a rating, empty when no rule targets it.
    pub fn actions_for_rating(&self, rating: Rating) -> ActionSet {
        self.rating_rules
            .iter()
            .find(|rule| rule.rating == rating)
            .map(|rule| rule.actions.clone())
            .unwrap_or_default()
    }
}

fn validate_weights(
    weights: BTreeMap<MetricKind, f64>,
) -> Result<BTreeMap<MetricKind, f64>, EngineConfigError> {
    for metric in MetricKind::ALL {
        let weight = weights
            .get(&metric)
            .copied()
            .ok_or(EngineConfigError::MissingMetricWeight { metric })?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(EngineConfigError::InvalidWeight { metric, weight });
        }
    }

    let sum: f64 = weights.values().sum();
    if sum <= 0.0 {
        return Err(EngineConfigError::ZeroWeightSum);
    }

    // Proportional renormalization so a sum other than 1.0 cannot silently
    // distort scores.
    Ok(weights
        .into_iter()
        .map(|(metric, weight)| (metric, weight / sum))
        .collect())
}

fn validate_penalties(penalties: &PenaltyCurve) -> Result<(), EngineConfigError> {
    for points in [
        penalties.major_negativity_points,
        penalties.insufficiency_points,
    ] {
        if !points.is_finite() || points < 0.0 {
            return Err(EngineConfigError::InvalidPenalty { points });
        }
    }
    Ok(())
}

fn validate_bands(mut bands: Vec<RatingBand>) -> Result<Vec<RatingBand>, EngineConfigError> {
    if bands.is_empty() {
        return Err(EngineConfigError::NoRatingBands);
    }

    bands.sort_by_key(|band| band.min);

    for band in &bands {
        if band.min > band.max || band.max > 100 {
            return Err(EngineConfigError::MalformedBand {
                min: band.min,
                max: band.max,
            });
        }
    }

    if bands[0].min != 0 {
        return Err(EngineConfigError::BandGap { from: 0, to: bands[0].min });
    }

    for pair in bands.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.min <= prev.max {
            return Err(EngineConfigError::BandOverlap {
                first_max: prev.max,
                second_min: next.min,
            });
        }
        if next.min != prev.max + 1 {
            return Err(EngineConfigError::BandGap {
                from: prev.max + 1,
                to: next.min,
            });
        }
    }

    let last = bands.last().map(|band| band.max).unwrap_or(0);
    if last != 100 {
        return Err(EngineConfigError::BandGap { from: last + 1, to: 100 });
    }

    Ok(bands)
}

fn validate_rating_rules(rules: &[RatingRule]) -> Result<(), EngineConfigError> {
    let mut seen = BTreeSet::new();
    for rule in rules {
        if !seen.insert(rule.rating) {
            return Err(EngineConfigError::DuplicateRatingRule { rating: rule.rating });
        }
    }
    Ok(())
}

fn validate_metric_rules(rules: &[MetricRule]) -> Result<(), EngineConfigError> {
    for rule in rules {
        let threshold = match rule.predicate {
            MetricPredicate::AtLeast(value) | MetricPredicate::Below(value) => value,
        };
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(EngineConfigError::InvalidThreshold {
                metric: rule.metric,
                threshold,
            });
        }
    }
    Ok(())
}

fn default_parts() -> EngineConfigParts {
    let weights = BTreeMap::from([
        (MetricKind::Tat, 0.15),
        (MetricKind::Quality, 0.15),
        (MetricKind::AppUsage, 0.10),
        (MetricKind::NeighborCheck, 0.10),
        (MetricKind::GeneralNegativity, 0.15),
        (MetricKind::MajorNegativity, 0.25),
        (MetricKind::Insufficiency, 0.10),
    ]);

    let rating_bands = vec![
        RatingBand { min: 0, max: 39, rating: Rating::Poor },
        RatingBand { min: 40, max: 59, rating: Rating::BelowAverage },
        RatingBand { min: 60, max: 74, rating: Rating::Average },
        RatingBand { min: 75, max: 89, rating: Rating::Good },
        RatingBand { min: 90, max: 100, rating: Rating::Excellent },
    ];

    let rating_rules = vec![
        RatingRule {
            rating: Rating::Excellent,
            actions: ActionSet {
                emails: BTreeSet::from([EmailTemplate::KpiNotification]),
                notifications: BTreeSet::from([NotificationKind::KpiRecorded]),
                ..ActionSet::default()
            },
        },
        RatingRule {
            rating: Rating::Good,
            actions: ActionSet {
                emails: BTreeSet::from([EmailTemplate::KpiNotification]),
                notifications: BTreeSet::from([NotificationKind::KpiRecorded]),
                ..ActionSet::default()
            },
        },
        RatingRule {
            rating: Rating::Average,
            actions: ActionSet {
                training: BTreeSet::from([TrainingType::Basic]),
                emails: BTreeSet::from([
                    EmailTemplate::KpiNotification,
                    EmailTemplate::TrainingAssignment,
                ]),
                notifications: BTreeSet::from([
                    NotificationKind::KpiRecorded,
                    NotificationKind::TrainingAssigned,
                ]),
                ..ActionSet::default()
            },
        },
        RatingRule {
            rating: Rating::BelowAverage,
            actions: ActionSet {
                training: BTreeSet::from([
                    TrainingType::Basic,
                    TrainingType::NegativityHandling,
                    TrainingType::AppUsage,
                ]),
                audits: BTreeSet::from([AuditType::AuditCall, AuditType::CrossCheck]),
                emails: BTreeSet::from([
                    EmailTemplate::KpiNotification,
                    EmailTemplate::TrainingAssignment,
                    EmailTemplate::AuditNotification,
                ]),
                notifications: BTreeSet::from([
                    NotificationKind::KpiRecorded,
                    NotificationKind::TrainingAssigned,
                    NotificationKind::AuditScheduled,
                ]),
            },
        },
        RatingRule {
            rating: Rating::Poor,
            actions: ActionSet {
                training: BTreeSet::from([
                    TrainingType::Basic,
                    TrainingType::NegativityHandling,
                    TrainingType::AppUsage,
                    TrainingType::CustomerHandling,
                ]),
                audits: BTreeSet::from([
                    AuditType::AuditCall,
                    AuditType::CrossCheck,
                    AuditType::DataVerification,
                ]),
                emails: BTreeSet::from([
                    EmailTemplate::KpiNotification,
                    EmailTemplate::TrainingAssignment,
                    EmailTemplate::AuditNotification,
                    EmailTemplate::PerformanceWarning,
                ]),
                notifications: BTreeSet::from([
                    NotificationKind::KpiRecorded,
                    NotificationKind::TrainingAssigned,
                    NotificationKind::AuditScheduled,
                    NotificationKind::WarningIssued,
                ]),
            },
        },
    ];

    let metric_rules = vec![
        MetricRule {
            metric: MetricKind::MajorNegativity,
            predicate: MetricPredicate::AtLeast(4.0),
            actions: ActionSet {
                training: BTreeSet::from([TrainingType::NegativityHandling]),
                audits: BTreeSet::from([AuditType::AuditCall]),
                ..ActionSet::default()
            },
        },
        MetricRule {
            metric: MetricKind::Insufficiency,
            predicate: MetricPredicate::AtLeast(3.0),
            actions: ActionSet {
                training: BTreeSet::from([TrainingType::Basic]),
                ..ActionSet::default()
            },
        },
        MetricRule {
            metric: MetricKind::AppUsage,
            predicate: MetricPredicate::Below(70.0),
            actions: ActionSet {
                training: BTreeSet::from([TrainingType::AppUsage]),
                ..ActionSet::default()
            },
        },
        MetricRule {
            metric: MetricKind::NeighborCheck,
            predicate: MetricPredicate::Below(50.0),
            actions: ActionSet {
                audits: BTreeSet::from([AuditType::CrossCheck]),
                ..ActionSet::default()
            },
        },
    ];

    EngineConfigParts {
        weights,
        penalties: PenaltyCurve {
            major_negativity_points: 20.0,
            insufficiency_points: 15.0,
        },
        rating_bands,
        rating_rules,
        metric_rules,
    }
}

/// Configuration rejected at update time, or an active-configuration
/// invariant found broken at evaluation time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineConfigError {
    #[error("no weight configured for metric {}", metric.label())]
    MissingMetricWeight { metric: MetricKind },
    #[error("weight {weight} for metric {} is not a non-negative finite number", metric.label())]
    InvalidWeight { metric: MetricKind, weight: f64 },
    #[error("metric weights sum to zero; nothing to renormalize")]
    ZeroWeightSum,
    #[error("penalty of {points} points per event is not a non-negative finite number")]
    InvalidPenalty { points: f64 },
    #[error("no rating bands configured")]
    NoRatingBands,
    #[error("rating band {min}-{max} is malformed")]
    MalformedBand { min: u8, max: u8 },
    #[error("rating bands leave scores {from}-{to} uncovered")]
    BandGap { from: u8, to: u8 },
    #[error("rating bands overlap: one ends at {first_max}, the next starts at {second_min}")]
    BandOverlap { first_max: u8, second_min: u8 },
    #[error("more than one trigger rule targets rating {}", rating.label())]
    DuplicateRatingRule { rating: Rating },
    #[error("threshold {threshold} for metric {} is invalid", metric.label())]
    InvalidThreshold { metric: MetricKind, threshold: f64 },
    #[error("score {score} falls outside every configured rating band")]
    UncoveredScore { score: u8 },
}

/// Partial update for the scoring sub-section (weights, penalties, bands).
/// Omitted fields keep their active values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsUpdate {
    #[serde(default)]
    pub weights: Option<BTreeMap<MetricKind, f64>>,
    #[serde(default)]
    pub penalties: Option<PenaltyCurve>,
    #[serde(default)]
    pub rating_bands: Option<Vec<RatingBand>>,
}

/// Partial update for the trigger sub-section (rating and metric rules).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggersUpdate {
    #[serde(default)]
    pub rating_rules: Option<Vec<RatingRule>>,
    #[serde(default)]
    pub metric_rules: Option<Vec<MetricRule>>,
}

/// Owner of the single active configuration. Readers take a cheap `Arc`
/// snapshot; writers validate a candidate built from the active snapshot
/// and swap it in atomically, so no evaluation can observe a stale or
/// half-applied configuration.
pub struct ConfigStore {
    inner: RwLock<(u64, Arc<EngineConfig>)>,
}

impl ConfigStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: RwLock::new((1, Arc::new(config))),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default_config())
    }

    /// Active configuration snapshot.
    pub fn active(&self) -> Arc<EngineConfig> {
        self.inner.read().expect("config lock poisoned").1.clone()
    }

    /// Monotonic version, bumped on every accepted update or reset.
    pub fn version(&self) -> u64 {
        self.inner.read().expect("config lock poisoned").0
    }

    pub fn update_metrics(
        &self,
        update: MetricsUpdate,
    ) -> Result<Arc<EngineConfig>, EngineConfigError> {
        self.swap(|parts| {
            if let Some(weights) = update.weights.clone() {
                parts.weights = weights;
            }
            if let Some(penalties) = update.penalties {
                parts.penalties = penalties;
            }
            if let Some(bands) = update.rating_bands.clone() {
                parts.rating_bands = bands;
            }
        })
    }

    pub fn update_triggers(
        &self,
        update: TriggersUpdate,
    ) -> Result<Arc<EngineConfig>, EngineConfigError> {
        self.swap(|parts| {
            if let Some(rules) = update.rating_rules.clone() {
                parts.rating_rules = rules;
            }
            if let Some(rules) = update.metric_rules.clone() {
                parts.metric_rules = rules;
            }
        })
    }

    /// Restore the built-in defaults. Idempotent.
    pub fn reset_to_defaults(&self) -> Arc<EngineConfig> {
        let config = Arc::new(EngineConfig::default_config());
        let mut guard = self.inner.write().expect("config lock poisoned");
        guard.0 += 1;
        guard.1 = config.clone();
        config
    }

    fn swap(
        &self,
        apply: impl FnOnce(&mut EngineConfigParts),
    ) -> Result<Arc<EngineConfig>, EngineConfigError> {
        let mut guard = self.inner.write().expect("config lock poisoned");
        let mut parts = guard.1.parts();
        apply(&mut parts);
        let config = Arc::new(EngineConfig::new(parts)?);
        guard.0 += 1;
        guard.1 = config.clone();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_normalized() {
        let config = EngineConfig::default_config();
        let sum: f64 = config.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(config.rating_bands.len(), 5);
    }

    #[test]
    fn weights_are_renormalized_proportionally() {
        let mut parts = default_parts();
        for weight in parts.weights.values_mut() {
            *weight *= 4.0;
        }
        let config = EngineConfig::new(parts).expect("renormalizes");
        let sum: f64 = config.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((config.weights[&MetricKind::MajorNegativity] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn zero_weight_sum_is_a_configuration_error() {
        let mut parts = default_parts();
        for weight in parts.weights.values_mut() {
            *weight = 0.0;
        }
        assert_eq!(
            EngineConfig::new(parts).unwrap_err(),
            EngineConfigError::ZeroWeightSum
        );
    }

    #[test]
    fn missing_weight_is_rejected() {
        let mut parts = default_parts();
        parts.weights.remove(&MetricKind::Quality);
        assert_eq!(
            EngineConfig::new(parts).unwrap_err(),
            EngineConfigError::MissingMetricWeight { metric: MetricKind::Quality }
        );
    }

    #[test]
    fn band_gap_is_rejected() {
        let mut parts = default_parts();
        parts.rating_bands = vec![
            RatingBand { min: 0, max: 40, rating: Rating::Poor },
            RatingBand { min: 51, max: 100, rating: Rating::Excellent },
        ];
        assert_eq!(
            EngineConfig::new(parts).unwrap_err(),
            EngineConfigError::BandGap { from: 41, to: 51 }
        );
    }

    #[test]
    fn band_overlap_is_rejected() {
        let mut parts = default_parts();
        parts.rating_bands = vec![
            RatingBand { min: 0, max: 50, rating: Rating::Poor },
            RatingBand { min: 50, max: 100, rating: Rating::Excellent },
        ];
        assert_eq!(
            EngineConfig::new(parts).unwrap_err(),
            EngineConfigError::BandOverlap { first_max: 50, second_min: 50 }
        );
    }

    #[test]
    fn bands_must_reach_one_hundred() {
        let mut parts = default_parts();
        parts.rating_bands = vec![RatingBand { min: 0, max: 90, rating: Rating::Poor }];
        assert_eq!(
            EngineConfig::new(parts).unwrap_err(),
            EngineConfigError::BandGap { from: 91, to: 100 }
        );
    }

    #[test]
    fn classify_uses_inclusive_lower_bounds() {
        let config = EngineConfig::default_config();
        assert_eq!(config.classify(0.0).unwrap(), Rating::Poor);
        assert_eq!(config.classify(39.9).unwrap(), Rating::Poor);
        assert_eq!(config.classify(40.0).unwrap(), Rating::BelowAverage);
        assert_eq!(config.classify(90.0).unwrap(), Rating::Excellent);
        assert_eq!(config.classify(100.0).unwrap(), Rating::Excellent);
    }

    #[test]
    fn store_rejects_invalid_update_wholesale() {
        let store = ConfigStore::with_defaults();
        let before = store.version();

        let result = store.update_metrics(MetricsUpdate {
            rating_bands: Some(vec![
                RatingBand { min: 0, max: 40, rating: Rating::Poor },
                RatingBand { min: 51, max: 100, rating: Rating::Excellent },
            ]),
            ..MetricsUpdate::default()
        });

        assert!(result.is_err());
        assert_eq!(store.version(), before, "rejected update must not bump version");
        assert_eq!(store.active().rating_bands.len(), 5);
    }

    #[test]
    fn store_swaps_snapshot_on_accepted_update() {
        let store = ConfigStore::with_defaults();
        let stale = store.active();

        store
            .update_triggers(TriggersUpdate {
                metric_rules: Some(Vec::new()),
                ..TriggersUpdate::default()
            })
            .expect("valid update");

        assert!(store.active().metric_rules.is_empty());
        // The old snapshot is unchanged; readers holding it finish against
        // the version they started with.
        assert!(!stale.metric_rules.is_empty());
    }

    #[test]
    fn reset_restores_defaults_idempotently() {
        let store = ConfigStore::with_defaults();
        store
            .update_triggers(TriggersUpdate {
                metric_rules: Some(Vec::new()),
                ..TriggersUpdate::default()
            })
            .expect("valid update");

        store.reset_to_defaults();
        let first = store.active();
        store.reset_to_defaults();
        let second = store.active();

        assert_eq!(*first, EngineConfig::default_config());
        assert_eq!(*first, *second);
    }
}
