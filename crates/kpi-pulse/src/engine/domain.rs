use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for employees tracked by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for persisted KPI score records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KpiScoreId(pub String);

/// Identifier wrapper for training assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingAssignmentId(pub String);

/// Identifier wrapper for audit schedules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditScheduleId(pub String);

/// Year-month granularity period a KPI score covers, carried on the wire
/// as a `YYYY-MM` string. At most one non-superseded score exists per
/// (user, period).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Period::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) || !(2000..=2100).contains(&year) {
            return Err(ValidationError::InvalidPeriod {
                value: format!("{year:04}-{month:02}"),
            });
        }
        Ok(Self { year, month })
    }

    /// Parse a `YYYY-MM` string.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidPeriod {
            value: value.to_string(),
        };
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Raw per-metric submission values. Rates are 0-100 percentages; the two
/// count metrics are small non-negative event counts mapped through the
/// configured penalty curve during scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub tat: f64,
    pub quality: f64,
    pub app_usage: f64,
    pub neighbor_check: f64,
    pub general_negativity: f64,
    pub major_negativity: u32,
    pub insufficiency: u32,
}

impl RawMetrics {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (metric, value) in [
            (MetricKind::Tat, self.tat),
            (MetricKind::Quality, self.quality),
            (MetricKind::AppUsage, self.app_usage),
            (MetricKind::NeighborCheck, self.neighbor_check),
            (MetricKind::GeneralNegativity, self.general_negativity),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ValidationError::RateOutOfRange { metric, value });
            }
        }
        Ok(())
    }

    /// Raw value for a metric, counts widened to f64 for predicate checks.
    pub fn value(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Tat => self.tat,
            MetricKind::Quality => self.quality,
            MetricKind::AppUsage => self.app_usage,
            MetricKind::NeighborCheck => self.neighbor_check,
            MetricKind::GeneralNegativity => self.general_negativity,
            MetricKind::MajorNegativity => f64::from(self.major_negativity),
            MetricKind::Insufficiency => f64::from(self.insufficiency),
        }
    }
}

/// Closed set of scored metrics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Tat,
    Quality,
    AppUsage,
    NeighborCheck,
    GeneralNegativity,
    MajorNegativity,
    Insufficiency,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Tat,
        MetricKind::Quality,
        MetricKind::AppUsage,
        MetricKind::NeighborCheck,
        MetricKind::GeneralNegativity,
        MetricKind::MajorNegativity,
        MetricKind::Insufficiency,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            MetricKind::Tat => "tat",
            MetricKind::Quality => "quality",
            MetricKind::AppUsage => "app_usage",
            MetricKind::NeighborCheck => "neighbor_check",
            MetricKind::GeneralNegativity => "general_negativity",
            MetricKind::MajorNegativity => "major_negativity",
            MetricKind::Insufficiency => "insufficiency",
        }
    }
}

/// Discrete rating derived from the composite score via the configured bands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Poor,
    BelowAverage,
    Average,
    Good,
    Excellent,
}

impl Rating {
    pub const fn label(self) -> &'static str {
        match self {
            Rating::Poor => "poor",
            Rating::BelowAverage => "below_average",
            Rating::Average => "average",
            Rating::Good => "good",
            Rating::Excellent => "excellent",
        }
    }
}

/// Closed set of assignable training programs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrainingType {
    Basic,
    NegativityHandling,
    AppUsage,
    CustomerHandling,
}

impl TrainingType {
    pub const fn label(self) -> &'static str {
        match self {
            TrainingType::Basic => "basic",
            TrainingType::NegativityHandling => "negativity_handling",
            TrainingType::AppUsage => "app_usage",
            TrainingType::CustomerHandling => "customer_handling",
        }
    }
}

/// Closed set of schedulable audit kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    AuditCall,
    CrossCheck,
    DataVerification,
}

impl AuditType {
    pub const fn label(self) -> &'static str {
        match self {
            AuditType::AuditCall => "audit_call",
            AuditType::CrossCheck => "cross_check",
            AuditType::DataVerification => "data_verification",
        }
    }
}

/// Closed set of outbound email templates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    KpiNotification,
    TrainingAssignment,
    AuditNotification,
    PerformanceWarning,
}

impl EmailTemplate {
    pub const fn label(self) -> &'static str {
        match self {
            EmailTemplate::KpiNotification => "kpi_notification",
            EmailTemplate::TrainingAssignment => "training_assignment",
            EmailTemplate::AuditNotification => "audit_notification",
            EmailTemplate::PerformanceWarning => "performance_warning",
        }
    }
}

/// Closed set of in-app notification kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    KpiRecorded,
    TrainingAssigned,
    AuditScheduled,
    WarningIssued,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::KpiRecorded => "kpi_recorded",
            NotificationKind::TrainingAssigned => "training_assigned",
            NotificationKind::AuditScheduled => "audit_scheduled",
            NotificationKind::WarningIssued => "warning_issued",
        }
    }
}

/// Automation lifecycle of a KPI score record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    Pending,
    Processing,
    Completed,
    PartiallyFailed,
    Failed,
}

impl AutomationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AutomationStatus::Pending => "pending",
            AutomationStatus::Processing => "processing",
            AutomationStatus::Completed => "completed",
            AutomationStatus::PartiallyFailed => "partially_failed",
            AutomationStatus::Failed => "failed",
        }
    }
}

/// Admin override superseding the derived score/rating for display and
/// reporting. Applying one never re-triggers automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOverride {
    pub score: f64,
    pub rating: Rating,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
}

/// Persisted KPI score, one per (user, period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiScoreRecord {
    pub id: KpiScoreId,
    pub user: UserId,
    pub period: Period,
    pub metrics: RawMetrics,
    pub overall_score: f64,
    pub rating: Rating,
    pub automation_status: AutomationStatus,
    pub submitted_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub score_override: Option<ScoreOverride>,
}

impl KpiScoreRecord {
    /// Score shown to reporting consumers, override winning over the
    /// derived value.
    pub fn display_score(&self) -> f64 {
        self.score_override
            .as_ref()
            .map(|o| o.score)
            .unwrap_or(self.overall_score)
    }

    pub fn display_rating(&self) -> Rating {
        self.score_override
            .as_ref()
            .map(|o| o.rating)
            .unwrap_or(self.rating)
    }
}

/// Who created a training assignment or audit schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    KpiTrigger,
    Manual,
}

impl ActionSource {
    pub const fn label(self) -> &'static str {
        match self {
            ActionSource::KpiTrigger => "kpi_trigger",
            ActionSource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl TrainingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            TrainingStatus::Assigned => "assigned",
            TrainingStatus::InProgress => "in_progress",
            TrainingStatus::Completed => "completed",
            TrainingStatus::Cancelled => "cancelled",
        }
    }

    /// Open assignments block the orchestrator from creating a duplicate.
    pub const fn is_open(self) -> bool {
        matches!(self, TrainingStatus::Assigned | TrainingStatus::InProgress)
    }
}

/// Completion details captured when a training is closed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingCompletion {
    pub score: Option<u8>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingAssignment {
    pub id: TrainingAssignmentId,
    pub user: UserId,
    pub training: TrainingType,
    pub status: TrainingStatus,
    pub source: ActionSource,
    pub kpi_score: Option<KpiScoreId>,
    pub assigned_at: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub completion: Option<TrainingCompletion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl AuditStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AuditStatus::Scheduled => "scheduled",
            AuditStatus::InProgress => "in_progress",
            AuditStatus::Completed => "completed",
            AuditStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(self, AuditStatus::Scheduled | AuditStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    NeedsReview,
}

/// Findings captured when an audit is closed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOutcome {
    pub findings: String,
    pub risk_level: RiskLevel,
    pub compliance: ComplianceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSchedule {
    pub id: AuditScheduleId,
    pub user: UserId,
    pub audit: AuditType,
    pub status: AuditStatus,
    pub source: ActionSource,
    pub kpi_score: Option<KpiScoreId>,
    pub scheduled_for: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub outcome: Option<AuditOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Sent,
    Failed,
}

/// Dispatch attempt record. Attempts for the same (kpi score, template) are
/// numbered so a deliberate resend is distinguishable from a duplicate, and
/// a failure record is never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailLog {
    pub user: UserId,
    pub template: EmailTemplate,
    pub kpi_score: KpiScoreId,
    pub attempt: u32,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Unread,
    Read,
    Acknowledged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user: UserId,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub message: String,
    pub kpi_score: Option<KpiScoreId>,
    pub created_at: DateTime<Utc>,
}

/// Event types recorded on the user timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    KpiRecorded,
    TrainingAssigned,
    TrainingCompleted,
    TrainingCancelled,
    AuditScheduled,
    AuditCompleted,
    AuditCancelled,
    EmailSent,
    EmailFailed,
    OverrideApplied,
}

/// Append-only audit-trail entry correlating automation effects against a
/// user timeline. Never mutated after being written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub user: UserId,
    pub kind: LifecycleKind,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Rejected before any KPI score record is created.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("period '{value}' is not a valid YYYY-MM value")]
    InvalidPeriod { value: String },
    #[error("{} must be a rate between 0 and 100, got {value}", metric.label())]
    RateOutOfRange { metric: MetricKind, value: f64 },
    #[error("override score {value} is outside 0-100")]
    OverrideScoreOutOfRange { value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parses_year_month() {
        let period = Period::parse("2026-03").expect("valid period");
        assert_eq!(period, Period { year: 2026, month: 3 });
        assert_eq!(period.to_string(), "2026-03");
    }

    #[test]
    fn period_rejects_garbage() {
        for raw in ["2026", "2026-13", "03-2026", "garbage", "2026-00"] {
            assert!(Period::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn metrics_validation_flags_out_of_range_rates() {
        let mut metrics = RawMetrics {
            tat: 95.0,
            quality: 95.0,
            app_usage: 98.0,
            neighbor_check: 90.0,
            general_negativity: 5.0,
            major_negativity: 0,
            insufficiency: 0,
        };
        assert!(metrics.validate().is_ok());

        metrics.general_negativity = 130.0;
        match metrics.validate() {
            Err(ValidationError::RateOutOfRange { metric, .. }) => {
                assert_eq!(metric, MetricKind::GeneralNegativity);
            }
            other => panic!("expected out-of-range error, got {other:?}"),
        }
    }

    #[test]
    fn override_wins_for_display_only() {
        let record = KpiScoreRecord {
            id: KpiScoreId("kpi-000001".to_string()),
            user: UserId("emp-1".to_string()),
            period: Period { year: 2026, month: 1 },
            metrics: RawMetrics {
                tat: 50.0,
                quality: 50.0,
                app_usage: 50.0,
                neighbor_check: 50.0,
                general_negativity: 50.0,
                major_negativity: 0,
                insufficiency: 0,
            },
            overall_score: 52.0,
            rating: Rating::BelowAverage,
            automation_status: AutomationStatus::Completed,
            submitted_at: Utc::now(),
            processing_started_at: None,
            processed_at: Some(Utc::now()),
            score_override: Some(ScoreOverride {
                score: 61.0,
                rating: Rating::Average,
                reason: "manual review of disputed call sample".to_string(),
                applied_at: Utc::now(),
            }),
        };

        assert_eq!(record.display_rating(), Rating::Average);
        assert!((record.display_score() - 61.0).abs() < f64::EPSILON);
        // The derived values stay intact underneath.
        assert_eq!(record.rating, Rating::BelowAverage);
    }
}
