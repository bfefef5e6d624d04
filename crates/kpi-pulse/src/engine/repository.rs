//! Storage and transport contracts consumed by the engine.
//!
//! Every trait here is object-safe so the orchestrator and facade can hold
//! `Arc<dyn ...>` collaborators. Implementations enforce the uniqueness and
//! back-reference invariants at the storage boundary; the in-memory stores
//! in [`crate::engine::memory`] are the reference implementations.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::domain::{
    AuditSchedule, AuditScheduleId, AuditType, AutomationStatus, EmailLog, EmailTemplate,
    KpiScoreId, KpiScoreRecord, LifecycleEvent, Notification, NotificationKind,
    NotificationStatus, Period, ScoreOverride, TrainingAssignment, TrainingAssignmentId,
    TrainingType, UserId,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of attempting to claim a KPI score for processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimDecision {
    /// Caller owns the record; it is now in `processing`.
    Claimed(KpiScoreRecord),
    /// Another worker holds a fresh claim. Benign skip, not an error.
    AlreadyProcessing,
    /// The record completed earlier and this was not a reprocess request.
    AlreadyCompleted,
}

/// Durable store for KPI score records. Enforces the one-per-(user, period)
/// uniqueness invariant on insert.
pub trait KpiScoreRepository: Send + Sync {
    fn insert(&self, record: KpiScoreRecord) -> Result<KpiScoreRecord, RepositoryError>;

    fn fetch(&self, id: &KpiScoreId) -> Result<Option<KpiScoreRecord>, RepositoryError>;

    fn find_by_user_period(
        &self,
        user: &UserId,
        period: &Period,
    ) -> Result<Option<KpiScoreRecord>, RepositoryError>;

    /// Conditionally transition the record into `processing`.
    ///
    /// Contract: `pending`, `failed`, and `partially_failed` records are
    /// claimable; `completed` is claimable only when `reprocess` is set; a
    /// `processing` record is claimable only once its claim is older than
    /// `stale_after` (crash recovery), otherwise the caller gets
    /// [`ClaimDecision::AlreadyProcessing`]. The check and the transition
    /// are atomic with respect to concurrent claims.
    fn claim_for_processing(
        &self,
        id: &KpiScoreId,
        reprocess: bool,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Result<ClaimDecision, RepositoryError>;

    /// Record the terminal automation status and `processed_at` stamp.
    fn finish_processing(
        &self,
        id: &KpiScoreId,
        status: AutomationStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Attach an admin override. Display-only; automation state untouched.
    fn apply_override(
        &self,
        id: &KpiScoreId,
        score_override: ScoreOverride,
    ) -> Result<KpiScoreRecord, RepositoryError>;
}

/// Store for training assignments, indexed by user for the open-duplicate
/// check the orchestrator relies on.
pub trait TrainingRepository: Send + Sync {
    fn insert(&self, assignment: TrainingAssignment)
        -> Result<TrainingAssignment, RepositoryError>;

    fn update(&self, assignment: TrainingAssignment) -> Result<(), RepositoryError>;

    fn fetch(
        &self,
        id: &TrainingAssignmentId,
    ) -> Result<Option<TrainingAssignment>, RepositoryError>;

    /// Whether the user already has an open (assigned or in-progress)
    /// assignment of this type.
    fn has_open(&self, user: &UserId, training: TrainingType) -> Result<bool, RepositoryError>;

    fn for_user(&self, user: &UserId) -> Result<Vec<TrainingAssignment>, RepositoryError>;
}

/// Store for audit schedules, same shape as [`TrainingRepository`].
pub trait AuditRepository: Send + Sync {
    fn insert(&self, schedule: AuditSchedule) -> Result<AuditSchedule, RepositoryError>;

    fn update(&self, schedule: AuditSchedule) -> Result<(), RepositoryError>;

    fn fetch(&self, id: &AuditScheduleId) -> Result<Option<AuditSchedule>, RepositoryError>;

    fn has_open(&self, user: &UserId, audit: AuditType) -> Result<bool, RepositoryError>;

    fn for_user(&self, user: &UserId) -> Result<Vec<AuditSchedule>, RepositoryError>;
}

/// Append-only dispatch log keyed by (kpi score, template).
pub trait EmailLogRepository: Send + Sync {
    fn append(&self, log: EmailLog) -> Result<EmailLog, RepositoryError>;

    /// All attempts for the key, oldest first. Failure records are
    /// preserved; a retry appends rather than rewrites.
    fn attempts(
        &self,
        kpi_score: &KpiScoreId,
        template: EmailTemplate,
    ) -> Result<Vec<EmailLog>, RepositoryError>;
}

/// Store for in-app notifications.
pub trait NotificationRepository: Send + Sync {
    fn insert(&self, notification: Notification) -> Result<Notification, RepositoryError>;

    /// Whether a notification of this kind already exists for the score,
    /// regardless of read state. Used for reprocess dedupe.
    fn exists_for(
        &self,
        kpi_score: &KpiScoreId,
        kind: NotificationKind,
    ) -> Result<bool, RepositoryError>;

    fn set_status(
        &self,
        user: &UserId,
        kind: NotificationKind,
        kpi_score: &KpiScoreId,
        status: NotificationStatus,
    ) -> Result<(), RepositoryError>;

    fn for_user(&self, user: &UserId) -> Result<Vec<Notification>, RepositoryError>;
}

/// Append-only lifecycle event log.
pub trait LifecycleStore: Send + Sync {
    fn append(&self, event: LifecycleEvent) -> Result<(), RepositoryError>;

    fn for_user(&self, user: &UserId) -> Result<Vec<LifecycleEvent>, RepositoryError>;
}

/// Rendered message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub template: EmailTemplate,
    pub recipient: UserId,
    pub subject: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("email transport unavailable: {0}")]
    Transport(String),
}

/// Outbound email delivery port (SMTP adapter, provider API, or a recording
/// fake in tests).
pub trait EmailTransport: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}
