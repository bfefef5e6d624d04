pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;

pub use engine::engine_router;
pub use engine::{
    ActionOutcome, ActionRef, ActionSet, ActionSource, ActionStatus, AuditOutcome, AuditSchedule,
    AuditScheduleId, AuditStatus, AuditType, AutomationOutcome, AutomationResult,
    AutomationStatus, ComplianceStatus, ConfigStore, EmailLog, EmailStatus, EmailTemplate,
    EngineConfig, EngineConfigError, EngineConfigParts, EngineStores, KpiScoreId, KpiScoreRecord,
    KpiScoreView, KpiService, KpiServiceError, KpiSubmission, LifecycleEvent, LifecycleKind,
    MetricKind, MetricPredicate, MetricRule, MetricsUpdate, Notification, NotificationKind,
    NotificationStatus, OrchestratorError, OverrideRequest, PenaltyCurve, Period, ProcessOptions,
    Rating, RatingBand, RatingRule, RawMetrics, RequiredActions, RiskLevel, ScoreComponent,
    ScoreOutcome, ScoreOverride, SkipReason, TrainingAssignment, TrainingAssignmentId,
    TrainingCompletion, TrainingStatus, TrainingType, TriggerOrchestrator, TriggersUpdate, UserId,
    ValidationError,
};
