//! KPI trigger automation engine.
//!
//! A submission is scored against the active configuration, classified into
//! a rating, and persisted as a pending KPI score; the orchestrator then
//! claims the record and fans out the configured downstream actions
//! (training, audits, notifications, emails), recording every outcome so
//! partial failures stay individually retryable.

pub mod audits;
pub mod bulk;
pub mod domain;
pub mod lifecycle;
pub mod memory;
pub mod messaging;
pub mod orchestrator;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod training;

#[cfg(test)]
mod tests;

pub use domain::{
    ActionSource, AuditOutcome, AuditSchedule, AuditScheduleId, AuditStatus, AuditType,
    AutomationStatus, ComplianceStatus, EmailLog, EmailStatus, EmailTemplate, KpiScoreId,
    KpiScoreRecord, LifecycleEvent, LifecycleKind, MetricKind, Notification, NotificationKind,
    NotificationStatus, Period, Rating, RawMetrics, RiskLevel, ScoreOverride,
    TrainingAssignment, TrainingAssignmentId, TrainingCompletion, TrainingStatus, TrainingType,
    UserId, ValidationError,
};
pub use orchestrator::{
    ActionOutcome, ActionRef, ActionStatus, AutomationOutcome, AutomationResult,
    OrchestratorError, ProcessOptions, SkipReason, TriggerOrchestrator,
};
pub use router::engine_router;
pub use scoring::config::{
    ActionSet, ConfigStore, EngineConfig, EngineConfigError, EngineConfigParts, MetricPredicate,
    MetricRule, MetricsUpdate, PenaltyCurve, RatingBand, RatingRule, TriggersUpdate,
};
pub use scoring::rules::RequiredActions;
pub use scoring::{ScoreComponent, ScoreOutcome};
pub use service::{
    EngineStores, KpiScoreView, KpiService, KpiServiceError, KpiSubmission, OverrideRequest,
};
