//! Trigger rule evaluation.
//!
//! Pure function of (rating, raw metrics, configuration): the rating band
//! rule selects the primary action set, then every metric rule whose
//! predicate holds adds its actions on top. Re-evaluating the same inputs
//! always yields the same sets, which is what makes reprocessing safe.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::engine::domain::{
    AuditType, EmailTemplate, NotificationKind, RawMetrics, Rating, TrainingType,
};
use super::config::{EngineConfig, MetricPredicate};

/// Deduplicated, deterministically ordered actions owed for a score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredActions {
    pub training: BTreeSet<TrainingType>,
    pub audits: BTreeSet<AuditType>,
    pub emails: BTreeSet<EmailTemplate>,
    pub notifications: BTreeSet<NotificationKind>,
}

impl RequiredActions {
    pub fn is_empty(&self) -> bool {
        self.training.is_empty()
            && self.audits.is_empty()
            && self.emails.is_empty()
            && self.notifications.is_empty()
    }
}

/// Derive the required downstream actions for a scored submission.
pub fn evaluate(rating: Rating, metrics: &RawMetrics, config: &EngineConfig) -> RequiredActions {
    let mut required = RequiredActions::default();

    let primary = config.actions_for_rating(rating);
    extend(&mut required, &primary);

    for rule in &config.metric_rules {
        let value = metrics.value(rule.metric);
        let fires = match rule.predicate {
            MetricPredicate::AtLeast(threshold) => value >= threshold,
            MetricPredicate::Below(threshold) => value < threshold,
        };
        if fires {
            extend(&mut required, &rule.actions);
        }
    }

    required
}

fn extend(required: &mut RequiredActions, actions: &super::config::ActionSet) {
    required.training.extend(actions.training.iter().copied());
    required.audits.extend(actions.audits.iter().copied());
    required.emails.extend(actions.emails.iter().copied());
    required
        .notifications
        .extend(actions.notifications.iter().copied());
}
