//! Trigger orchestration.
//!
//! Takes a persisted KPI score from `pending` through rule evaluation and
//! downstream fan-out. Every action is dispatched in isolation: one failed
//! email never rolls back a created training assignment, and each outcome
//! is captured on the automation result so a reprocess can target exactly
//! what failed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;

use super::audits::{AuditService, ScheduleOutcome};
use super::domain::{
    ActionSource, AuditType, AutomationStatus, EmailStatus, EmailTemplate, KpiScoreId,
    KpiScoreRecord, LifecycleKind, NotificationKind, Rating, TrainingType, UserId,
};
use super::lifecycle::LifecycleRecorder;
use super::messaging::{DispatchOutcome, EmailDispatcher, NotificationService, NotifyOutcome};
use super::repository::{ClaimDecision, KpiScoreRepository, RepositoryError};
use super::scoring::config::ConfigStore;
use super::scoring::rules;
use super::training::{AssignOutcome, TrainingService};

/// Caller knobs for a processing run.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    pub send_email: bool,
    /// Explicit re-run for an already-processed score. Trainings and audits
    /// stay duplicate-checked; emails go out as fresh, attempt-numbered
    /// sends even when the last attempt succeeded. Without it, only
    /// templates whose latest attempt failed or never ran are dispatched.
    pub reprocess: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            send_email: true,
            reprocess: false,
        }
    }
}

/// The downstream action an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRef {
    Training(TrainingType),
    Audit(AuditType),
    Email(EmailTemplate),
    Notification(NotificationKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An open assignment/schedule of the same type already exists.
    OpenDuplicate,
    /// A notification of this kind was already created for the score.
    AlreadyNotified,
    /// The latest email attempt for this template already succeeded.
    AlreadySent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Created,
    Skipped(SkipReason),
    Failed(String),
}

impl ActionStatus {
    fn is_failure(&self) -> bool {
        matches!(self, ActionStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub action: ActionRef,
    pub status: ActionStatus,
}

/// Structured per-action report returned to the caller and aggregated into
/// the record's automation status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutomationResult {
    pub kpi_score: KpiScoreId,
    pub user: UserId,
    pub rating: Rating,
    pub overall_score: f64,
    pub overall: AutomationStatus,
    pub actions: Vec<ActionOutcome>,
}

/// What a processing request amounted to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AutomationOutcome {
    Dispatched(AutomationResult),
    /// Another worker holds the claim. Benign skip.
    AlreadyProcessing,
    /// The score completed earlier and this was not a reprocess request.
    AlreadyCompleted,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("kpi score {} not found", .0 .0)]
    ScoreNotFound(KpiScoreId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Days between dispatch and the default training due date / audit date.
const TRAINING_DUE_DAYS: i64 = 14;
const AUDIT_LEAD_DAYS: i64 = 7;

pub struct TriggerOrchestrator {
    scores: Arc<dyn KpiScoreRepository>,
    training: Arc<TrainingService>,
    audits: Arc<AuditService>,
    email: Arc<EmailDispatcher>,
    notifications: Arc<NotificationService>,
    lifecycle: Arc<LifecycleRecorder>,
    config: Arc<ConfigStore>,
    stale_after: Duration,
}

impl TriggerOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scores: Arc<dyn KpiScoreRepository>,
        training: Arc<TrainingService>,
        audits: Arc<AuditService>,
        email: Arc<EmailDispatcher>,
        notifications: Arc<NotificationService>,
        lifecycle: Arc<LifecycleRecorder>,
        config: Arc<ConfigStore>,
        stale_after: Duration,
    ) -> Self {
        Self {
            scores,
            training,
            audits,
            email,
            notifications,
            lifecycle,
            config,
            stale_after,
        }
    }

    /// Run trigger automation for a persisted KPI score.
    pub fn process(
        &self,
        id: &KpiScoreId,
        options: ProcessOptions,
    ) -> Result<AutomationOutcome, OrchestratorError> {
        let now = Utc::now();

        let record = match self.scores.claim_for_processing(
            id,
            options.reprocess,
            self.stale_after,
            now,
        ) {
            Ok(ClaimDecision::Claimed(record)) => record,
            Ok(ClaimDecision::AlreadyProcessing) => {
                return Ok(AutomationOutcome::AlreadyProcessing)
            }
            Ok(ClaimDecision::AlreadyCompleted) => {
                return Ok(AutomationOutcome::AlreadyCompleted)
            }
            Err(RepositoryError::NotFound) => {
                return Err(OrchestratorError::ScoreNotFound(id.clone()))
            }
            Err(err) => return Err(err.into()),
        };

        // Always the currently active rules, also on reprocess: an auditor
        // asking "what would happen now" gets exactly that.
        let config = self.config.active();
        let required = rules::evaluate(record.rating, &record.metrics, &config);

        let mut actions = Vec::new();

        for training in &required.training {
            actions.push(self.assign_training(&record, *training, now));
        }
        for audit in &required.audits {
            actions.push(self.schedule_audit(&record, *audit, now));
        }
        for kind in &required.notifications {
            actions.push(self.create_notification(&record, *kind, now));
        }
        if options.send_email {
            for template in &required.emails {
                actions.push(self.dispatch_email(&record, *template, options.reprocess, now));
            }
        }

        let overall = aggregate(&actions);
        self.scores.finish_processing(id, overall, now)?;

        Ok(AutomationOutcome::Dispatched(AutomationResult {
            kpi_score: record.id,
            user: record.user,
            rating: record.rating,
            overall_score: record.overall_score,
            overall,
            actions,
        }))
    }

    fn assign_training(
        &self,
        record: &KpiScoreRecord,
        training: TrainingType,
        now: DateTime<Utc>,
    ) -> ActionOutcome {
        let due = now.date_naive() + Duration::days(TRAINING_DUE_DAYS);
        let status = match self.training.assign(
            record.user.clone(),
            training,
            Some(due),
            ActionSource::KpiTrigger,
            Some(record.id.clone()),
            now,
        ) {
            Ok(AssignOutcome::Created(assignment)) => {
                self.lifecycle.record(
                    &record.user,
                    LifecycleKind::TrainingAssigned,
                    "Training assigned",
                    format!(
                        "{} training assigned for period {}",
                        training.label(),
                        record.period
                    ),
                    json!({
                        "assignment_id": assignment.id.0,
                        "kpi_score_id": record.id.0,
                        "training": training.label(),
                    }),
                    now,
                );
                ActionStatus::Created
            }
            Ok(AssignOutcome::SkippedOpenDuplicate) => {
                ActionStatus::Skipped(SkipReason::OpenDuplicate)
            }
            Err(err) => ActionStatus::Failed(err.to_string()),
        };

        ActionOutcome {
            action: ActionRef::Training(training),
            status,
        }
    }

    fn schedule_audit(
        &self,
        record: &KpiScoreRecord,
        audit: AuditType,
        now: DateTime<Utc>,
    ) -> ActionOutcome {
        let date = now.date_naive() + Duration::days(AUDIT_LEAD_DAYS);
        let status = match self.audits.schedule(
            record.user.clone(),
            audit,
            date,
            ActionSource::KpiTrigger,
            Some(record.id.clone()),
            now,
        ) {
            Ok(ScheduleOutcome::Created(schedule)) => {
                self.lifecycle.record(
                    &record.user,
                    LifecycleKind::AuditScheduled,
                    "Audit scheduled",
                    format!(
                        "{} audit scheduled for {} after period {}",
                        audit.label(),
                        schedule.scheduled_for,
                        record.period
                    ),
                    json!({
                        "audit_id": schedule.id.0,
                        "kpi_score_id": record.id.0,
                        "audit": audit.label(),
                    }),
                    now,
                );
                ActionStatus::Created
            }
            Ok(ScheduleOutcome::SkippedOpenDuplicate) => {
                ActionStatus::Skipped(SkipReason::OpenDuplicate)
            }
            Err(err) => ActionStatus::Failed(err.to_string()),
        };

        ActionOutcome {
            action: ActionRef::Audit(audit),
            status,
        }
    }

    fn create_notification(
        &self,
        record: &KpiScoreRecord,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> ActionOutcome {
        let message = match kind {
            NotificationKind::KpiRecorded => format!(
                "Your KPI score for {} is {:.1} ({})",
                record.period,
                record.overall_score,
                record.rating.label()
            ),
            NotificationKind::TrainingAssigned => {
                format!("Training has been assigned from your {} review", record.period)
            }
            NotificationKind::AuditScheduled => {
                format!("An audit has been scheduled from your {} review", record.period)
            }
            NotificationKind::WarningIssued => {
                format!("A performance warning was issued for {}", record.period)
            }
        };

        let status = match self
            .notifications
            .notify(&record.user, kind, message, &record.id, now)
        {
            Ok(NotifyOutcome::Created(_)) => ActionStatus::Created,
            Ok(NotifyOutcome::SkippedExisting) => {
                ActionStatus::Skipped(SkipReason::AlreadyNotified)
            }
            Err(err) => ActionStatus::Failed(err.to_string()),
        };

        ActionOutcome {
            action: ActionRef::Notification(kind),
            status,
        }
    }

    fn dispatch_email(
        &self,
        record: &KpiScoreRecord,
        template: EmailTemplate,
        resend: bool,
        now: DateTime<Utc>,
    ) -> ActionOutcome {
        let data = BTreeMap::from([
            ("period".to_string(), record.period.to_string()),
            ("score".to_string(), format!("{:.1}", record.overall_score)),
            ("rating".to_string(), record.rating.label().to_string()),
        ]);

        let status = match self
            .email
            .dispatch(&record.user, template, &record.id, data, resend, now)
        {
            Ok(DispatchOutcome::SkippedAlreadySent) => {
                ActionStatus::Skipped(SkipReason::AlreadySent)
            }
            Ok(DispatchOutcome::Dispatched(log)) if log.status == EmailStatus::Sent => {
                self.lifecycle.record(
                    &record.user,
                    LifecycleKind::EmailSent,
                    "Email sent",
                    format!("{} email sent (attempt {})", template.label(), log.attempt),
                    json!({
                        "kpi_score_id": record.id.0,
                        "template": template.label(),
                        "attempt": log.attempt,
                    }),
                    now,
                );
                ActionStatus::Created
            }
            Ok(DispatchOutcome::Dispatched(log)) => {
                let error = log.error.clone().unwrap_or_else(|| "send failed".to_string());
                self.lifecycle.record(
                    &record.user,
                    LifecycleKind::EmailFailed,
                    "Email failed",
                    format!(
                        "{} email failed on attempt {}: {}",
                        template.label(),
                        log.attempt,
                        error
                    ),
                    json!({
                        "kpi_score_id": record.id.0,
                        "template": template.label(),
                        "attempt": log.attempt,
                    }),
                    now,
                );
                ActionStatus::Failed(error)
            }
            Err(err) => ActionStatus::Failed(err.to_string()),
        };

        ActionOutcome {
            action: ActionRef::Email(template),
            status,
        }
    }
}

/// Fold per-action outcomes into the record-level status: all good (or
/// benign skips) is `completed`, a mix is `partially_failed`, and `failed`
/// is reserved for a run where nothing succeeded.
fn aggregate(actions: &[ActionOutcome]) -> AutomationStatus {
    let failed = actions.iter().filter(|a| a.status.is_failure()).count();
    if failed == 0 {
        AutomationStatus::Completed
    } else if failed < actions.len() {
        AutomationStatus::PartiallyFailed
    } else {
        AutomationStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(action: ActionRef, status: ActionStatus) -> ActionOutcome {
        ActionOutcome { action, status }
    }

    #[test]
    fn aggregate_treats_skips_as_success() {
        let actions = vec![
            outcome(ActionRef::Training(TrainingType::Basic), ActionStatus::Created),
            outcome(
                ActionRef::Training(TrainingType::AppUsage),
                ActionStatus::Skipped(SkipReason::OpenDuplicate),
            ),
        ];
        assert_eq!(aggregate(&actions), AutomationStatus::Completed);
    }

    #[test]
    fn aggregate_mixed_is_partially_failed() {
        let actions = vec![
            outcome(ActionRef::Training(TrainingType::Basic), ActionStatus::Created),
            outcome(
                ActionRef::Email(EmailTemplate::KpiNotification),
                ActionStatus::Failed("smtp down".to_string()),
            ),
        ];
        assert_eq!(aggregate(&actions), AutomationStatus::PartiallyFailed);
    }

    #[test]
    fn aggregate_all_failed_is_failed() {
        let actions = vec![outcome(
            ActionRef::Email(EmailTemplate::KpiNotification),
            ActionStatus::Failed("smtp down".to_string()),
        )];
        assert_eq!(aggregate(&actions), AutomationStatus::Failed);
    }

    #[test]
    fn aggregate_empty_run_completes() {
        assert_eq!(aggregate(&[]), AutomationStatus::Completed);
    }
}
