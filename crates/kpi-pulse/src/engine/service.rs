use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::audits::{AuditError, AuditService, ScheduleOutcome};
use super::domain::{
    ActionSource, AuditOutcome, AuditSchedule, AuditScheduleId, AuditType, AutomationStatus,
    KpiScoreId, KpiScoreRecord, LifecycleEvent, LifecycleKind, Period, Rating, RawMetrics,
    ScoreOverride, TrainingAssignment, TrainingAssignmentId, TrainingCompletion, TrainingType,
    UserId, ValidationError,
};
use super::lifecycle::LifecycleRecorder;
use super::memory::MemoryStores;
use super::messaging::{EmailDispatcher, NotificationService};
use super::orchestrator::{
    AutomationOutcome, OrchestratorError, ProcessOptions, TriggerOrchestrator,
};
use super::repository::{
    AuditRepository, EmailLogRepository, EmailTransport, KpiScoreRepository, LifecycleStore,
    NotificationRepository, RepositoryError, TrainingRepository,
};
use super::scoring::config::{ConfigStore, EngineConfigError};
use super::scoring::{self, ScoreComponent};
use super::training::{AssignOutcome, TrainingError, TrainingService};

static SCORE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_score_id() -> KpiScoreId {
    let id = SCORE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    KpiScoreId(format!("kpi-{id:06}"))
}

/// Storage and transport collaborators wired into the engine.
pub struct EngineStores {
    pub scores: Arc<dyn KpiScoreRepository>,
    pub training: Arc<dyn TrainingRepository>,
    pub audits: Arc<dyn AuditRepository>,
    pub email_log: Arc<dyn EmailLogRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub lifecycle: Arc<dyn LifecycleStore>,
    pub email_transport: Arc<dyn EmailTransport>,
}

impl From<&MemoryStores> for EngineStores {
    fn from(stores: &MemoryStores) -> Self {
        Self {
            scores: stores.scores.clone(),
            training: stores.training.clone(),
            audits: stores.audits.clone(),
            email_log: stores.email_log.clone(),
            notifications: stores.notifications.clone(),
            lifecycle: stores.lifecycle.clone(),
            email_transport: stores.transport.clone(),
        }
    }
}

/// A raw KPI submission for one (user, period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSubmission {
    pub user: UserId,
    pub period: Period,
    pub metrics: RawMetrics,
}

/// Admin override request. Supersedes the derived values for display and
/// reporting only.
#[derive(Debug, Clone, Deserialize)]
pub struct OverrideRequest {
    pub score: f64,
    pub rating: Rating,
    pub reason: String,
}

/// Sanitized representation of a score record for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct KpiScoreView {
    pub id: KpiScoreId,
    pub user: UserId,
    pub period: Period,
    pub score: f64,
    pub rating: &'static str,
    pub automation_status: &'static str,
    pub processed_at: Option<DateTime<Utc>>,
    pub overridden: bool,
}

impl KpiScoreView {
    pub fn from_record(record: &KpiScoreRecord) -> Self {
        Self {
            id: record.id.clone(),
            user: record.user.clone(),
            period: record.period,
            score: record.display_score(),
            rating: record.display_rating().label(),
            automation_status: record.automation_status.label(),
            processed_at: record.processed_at,
            overridden: record.score_override.is_some(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KpiServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] EngineConfigError),
    #[error("a kpi score already exists for {user} in {period}")]
    DuplicatePeriod { user: String, period: Period },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Facade composing the scorer, configuration store, orchestrator, and the
/// four downstream services behind one submission/processing surface.
pub struct KpiService {
    scores: Arc<dyn KpiScoreRepository>,
    training: Arc<TrainingService>,
    audits: Arc<AuditService>,
    notifications: Arc<NotificationService>,
    lifecycle: Arc<LifecycleRecorder>,
    config: Arc<ConfigStore>,
    orchestrator: Arc<TriggerOrchestrator>,
}

impl KpiService {
    pub fn new(stores: EngineStores, config: Arc<ConfigStore>, stale_after: Duration) -> Self {
        let training = Arc::new(TrainingService::new(stores.training));
        let audits = Arc::new(AuditService::new(stores.audits));
        let notifications = Arc::new(NotificationService::new(stores.notifications));
        let email = Arc::new(EmailDispatcher::new(
            stores.email_log,
            stores.email_transport,
        ));
        let lifecycle = Arc::new(LifecycleRecorder::new(stores.lifecycle));

        let orchestrator = Arc::new(TriggerOrchestrator::new(
            stores.scores.clone(),
            training.clone(),
            audits.clone(),
            email,
            notifications.clone(),
            lifecycle.clone(),
            config.clone(),
            stale_after,
        ));

        Self {
            scores: stores.scores,
            training,
            audits,
            notifications,
            lifecycle,
            config,
            orchestrator,
        }
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    /// Score and persist a submission. The caller gets a definitive score
    /// and rating immediately; automation runs as a separate step.
    pub fn submit(&self, submission: KpiSubmission) -> Result<KpiScoreRecord, KpiServiceError> {
        submission.metrics.validate()?;

        let config = self.config.active();
        let outcome = scoring::score(&submission.metrics, &config)?;
        let now = Utc::now();

        let record = KpiScoreRecord {
            id: next_score_id(),
            user: submission.user,
            period: submission.period,
            metrics: submission.metrics,
            overall_score: outcome.overall,
            rating: outcome.rating,
            automation_status: AutomationStatus::Pending,
            submitted_at: now,
            processing_started_at: None,
            processed_at: None,
            score_override: None,
        };

        let user = record.user.0.clone();
        let period = record.period;
        let stored = self.scores.insert(record).map_err(|err| match err {
            RepositoryError::Conflict => KpiServiceError::DuplicatePeriod { user, period },
            other => KpiServiceError::Repository(other),
        })?;

        self.lifecycle.record(
            &stored.user,
            LifecycleKind::KpiRecorded,
            "KPI recorded",
            format!(
                "Score {:.1} ({}) recorded for {}",
                stored.overall_score,
                stored.rating.label(),
                stored.period
            ),
            json!({
                "kpi_score_id": stored.id.0,
                "score": stored.overall_score,
                "rating": stored.rating.label(),
            }),
            now,
        );

        Ok(stored)
    }

    /// Score breakdown for a submission without persisting anything.
    pub fn preview_components(
        &self,
        metrics: &RawMetrics,
    ) -> Result<Vec<ScoreComponent>, KpiServiceError> {
        metrics.validate()?;
        let config = self.config.active();
        Ok(scoring::score(metrics, &config)?.components)
    }

    pub fn process_trigger(
        &self,
        id: &KpiScoreId,
        options: ProcessOptions,
    ) -> Result<AutomationOutcome, KpiServiceError> {
        Ok(self.orchestrator.process(id, options)?)
    }

    pub fn get(&self, id: &KpiScoreId) -> Result<KpiScoreRecord, KpiServiceError> {
        self.scores
            .fetch(id)?
            .ok_or(KpiServiceError::Repository(RepositoryError::NotFound))
    }

    /// Attach an admin override. Never re-triggers automation.
    pub fn apply_override(
        &self,
        id: &KpiScoreId,
        request: OverrideRequest,
    ) -> Result<KpiScoreRecord, KpiServiceError> {
        if !request.score.is_finite() || !(0.0..=100.0).contains(&request.score) {
            return Err(ValidationError::OverrideScoreOutOfRange { value: request.score }.into());
        }

        let now = Utc::now();
        let record = self.scores.apply_override(
            id,
            ScoreOverride {
                score: request.score,
                rating: request.rating,
                reason: request.reason.clone(),
                applied_at: now,
            },
        )?;

        self.lifecycle.record(
            &record.user,
            LifecycleKind::OverrideApplied,
            "Score override applied",
            format!(
                "Score for {} overridden to {:.1} ({}): {}",
                record.period,
                request.score,
                request.rating.label(),
                request.reason
            ),
            json!({ "kpi_score_id": record.id.0 }),
            now,
        );

        Ok(record)
    }

    pub fn timeline(&self, user: &UserId) -> Result<Vec<LifecycleEvent>, KpiServiceError> {
        Ok(self.lifecycle.timeline(user)?)
    }

    /// Manual training assignment on behalf of an admin.
    pub fn assign_training(
        &self,
        user: UserId,
        training: TrainingType,
        due_date: Option<NaiveDate>,
    ) -> Result<AssignOutcome, KpiServiceError> {
        let now = Utc::now();
        let outcome = self
            .training
            .assign(user.clone(), training, due_date, ActionSource::Manual, None, now)?;

        if let AssignOutcome::Created(assignment) = &outcome {
            self.lifecycle.record(
                &user,
                LifecycleKind::TrainingAssigned,
                "Training assigned",
                format!("{} training assigned manually", training.label()),
                json!({ "assignment_id": assignment.id.0, "training": training.label() }),
                now,
            );
        }

        Ok(outcome)
    }

    pub fn complete_training(
        &self,
        id: &TrainingAssignmentId,
        completion: TrainingCompletion,
    ) -> Result<TrainingAssignment, KpiServiceError> {
        let assignment = self.training.complete(id, completion)?;
        self.lifecycle.record(
            &assignment.user,
            LifecycleKind::TrainingCompleted,
            "Training completed",
            format!("{} training completed", assignment.training.label()),
            json!({ "assignment_id": assignment.id.0 }),
            Utc::now(),
        );
        Ok(assignment)
    }

    pub fn cancel_training(
        &self,
        id: &TrainingAssignmentId,
    ) -> Result<TrainingAssignment, KpiServiceError> {
        let assignment = self.training.cancel(id)?;
        self.lifecycle.record(
            &assignment.user,
            LifecycleKind::TrainingCancelled,
            "Training cancelled",
            format!("{} training cancelled", assignment.training.label()),
            json!({ "assignment_id": assignment.id.0 }),
            Utc::now(),
        );
        Ok(assignment)
    }

    pub fn trainings_for(&self, user: &UserId) -> Result<Vec<TrainingAssignment>, KpiServiceError> {
        Ok(self.training.for_user(user)?)
    }

    /// Manual audit scheduling on behalf of an admin.
    pub fn schedule_audit(
        &self,
        user: UserId,
        audit: AuditType,
        scheduled_for: NaiveDate,
    ) -> Result<ScheduleOutcome, KpiServiceError> {
        let now = Utc::now();
        let outcome = self.audits.schedule(
            user.clone(),
            audit,
            scheduled_for,
            ActionSource::Manual,
            None,
            now,
        )?;

        if let ScheduleOutcome::Created(schedule) = &outcome {
            self.lifecycle.record(
                &user,
                LifecycleKind::AuditScheduled,
                "Audit scheduled",
                format!("{} audit scheduled manually for {}", audit.label(), scheduled_for),
                json!({ "audit_id": schedule.id.0, "audit": audit.label() }),
                now,
            );
        }

        Ok(outcome)
    }

    pub fn complete_audit(
        &self,
        id: &AuditScheduleId,
        outcome: AuditOutcome,
    ) -> Result<AuditSchedule, KpiServiceError> {
        let schedule = self.audits.complete(id, outcome)?;
        self.lifecycle.record(
            &schedule.user,
            LifecycleKind::AuditCompleted,
            "Audit completed",
            format!("{} audit completed", schedule.audit.label()),
            json!({ "audit_id": schedule.id.0 }),
            Utc::now(),
        );
        Ok(schedule)
    }

    pub fn cancel_audit(&self, id: &AuditScheduleId) -> Result<AuditSchedule, KpiServiceError> {
        let schedule = self.audits.cancel(id)?;
        self.lifecycle.record(
            &schedule.user,
            LifecycleKind::AuditCancelled,
            "Audit cancelled",
            format!("{} audit cancelled", schedule.audit.label()),
            json!({ "audit_id": schedule.id.0 }),
            Utc::now(),
        );
        Ok(schedule)
    }

    pub fn audits_for(&self, user: &UserId) -> Result<Vec<AuditSchedule>, KpiServiceError> {
        Ok(self.audits.for_user(user)?)
    }
}
