//! In-memory reference implementations of the storage and transport
//! contracts. They back the default deployment, the CLI demo, and the test
//! suites; each enforces the same invariants a durable store must.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use super::domain::{
    AuditSchedule, AuditScheduleId, AuditType, AutomationStatus, EmailLog, EmailTemplate,
    KpiScoreId, KpiScoreRecord, LifecycleEvent, Notification, NotificationKind,
    NotificationStatus, Period, ScoreOverride, TrainingAssignment, TrainingAssignmentId,
    TrainingType, UserId,
};
use super::repository::{
    AuditRepository, ClaimDecision, EmailError, EmailLogRepository, EmailMessage,
    EmailTransport, KpiScoreRepository, LifecycleStore, NotificationRepository,
    RepositoryError, TrainingRepository,
};

#[derive(Default)]
pub struct MemoryKpiScoreRepository {
    records: Mutex<HashMap<KpiScoreId, KpiScoreRecord>>,
}

impl KpiScoreRepository for MemoryKpiScoreRepository {
    fn insert(&self, record: KpiScoreRecord) -> Result<KpiScoreRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("score store poisoned");
        let duplicate = guard
            .values()
            .any(|existing| existing.user == record.user && existing.period == record.period);
        if duplicate || guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &KpiScoreId) -> Result<Option<KpiScoreRecord>, RepositoryError> {
        let guard = self.records.lock().expect("score store poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_user_period(
        &self,
        user: &UserId,
        period: &Period,
    ) -> Result<Option<KpiScoreRecord>, RepositoryError> {
        let guard = self.records.lock().expect("score store poisoned");
        Ok(guard
            .values()
            .find(|record| &record.user == user && &record.period == period)
            .cloned())
    }

    fn claim_for_processing(
        &self,
        id: &KpiScoreId,
        reprocess: bool,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Result<ClaimDecision, RepositoryError> {
        // One lock spans the check and the transition, which is what makes
        // the claim atomic against a racing worker.
        let mut guard = self.records.lock().expect("score store poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;

        let claimable = match record.automation_status {
            AutomationStatus::Pending
            | AutomationStatus::Failed
            | AutomationStatus::PartiallyFailed => true,
            AutomationStatus::Completed => {
                if reprocess {
                    true
                } else {
                    return Ok(ClaimDecision::AlreadyCompleted);
                }
            }
            AutomationStatus::Processing => {
                let stale = record
                    .processing_started_at
                    .map(|started| now - started > stale_after)
                    .unwrap_or(true);
                if stale {
                    true
                } else {
                    return Ok(ClaimDecision::AlreadyProcessing);
                }
            }
        };

        debug_assert!(claimable);
        record.automation_status = AutomationStatus::Processing;
        record.processing_started_at = Some(now);
        Ok(ClaimDecision::Claimed(record.clone()))
    }

    fn finish_processing(
        &self,
        id: &KpiScoreId,
        status: AutomationStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("score store poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.automation_status = status;
        record.processed_at = Some(processed_at);
        record.processing_started_at = None;
        Ok(())
    }

    fn apply_override(
        &self,
        id: &KpiScoreId,
        score_override: ScoreOverride,
    ) -> Result<KpiScoreRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("score store poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.score_override = Some(score_override);
        Ok(record.clone())
    }
}

#[derive(Default)]
pub struct MemoryTrainingRepository {
    records: Mutex<HashMap<TrainingAssignmentId, TrainingAssignment>>,
}

impl MemoryTrainingRepository {
    pub fn all(&self) -> Vec<TrainingAssignment> {
        let guard = self.records.lock().expect("training store poisoned");
        guard.values().cloned().collect()
    }
}

impl TrainingRepository for MemoryTrainingRepository {
    fn insert(
        &self,
        assignment: TrainingAssignment,
    ) -> Result<TrainingAssignment, RepositoryError> {
        let mut guard = self.records.lock().expect("training store poisoned");
        if guard.contains_key(&assignment.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(assignment.id.clone(), assignment.clone());
        Ok(assignment)
    }

    fn update(&self, assignment: TrainingAssignment) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("training store poisoned");
        if !guard.contains_key(&assignment.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(assignment.id.clone(), assignment);
        Ok(())
    }

    fn fetch(
        &self,
        id: &TrainingAssignmentId,
    ) -> Result<Option<TrainingAssignment>, RepositoryError> {
        let guard = self.records.lock().expect("training store poisoned");
        Ok(guard.get(id).cloned())
    }

    fn has_open(&self, user: &UserId, training: TrainingType) -> Result<bool, RepositoryError> {
        let guard = self.records.lock().expect("training store poisoned");
        Ok(guard.values().any(|assignment| {
            &assignment.user == user
                && assignment.training == training
                && assignment.status.is_open()
        }))
    }

    fn for_user(&self, user: &UserId) -> Result<Vec<TrainingAssignment>, RepositoryError> {
        let guard = self.records.lock().expect("training store poisoned");
        let mut assignments: Vec<_> = guard
            .values()
            .filter(|assignment| &assignment.user == user)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));
        Ok(assignments)
    }
}

#[derive(Default)]
pub struct MemoryAuditRepository {
    records: Mutex<HashMap<AuditScheduleId, AuditSchedule>>,
}

impl MemoryAuditRepository {
    pub fn all(&self) -> Vec<AuditSchedule> {
        let guard = self.records.lock().expect("audit store poisoned");
        guard.values().cloned().collect()
    }
}

impl AuditRepository for MemoryAuditRepository {
    fn insert(&self, schedule: AuditSchedule) -> Result<AuditSchedule, RepositoryError> {
        let mut guard = self.records.lock().expect("audit store poisoned");
        if guard.contains_key(&schedule.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(schedule.id.clone(), schedule.clone());
        Ok(schedule)
    }

    fn update(&self, schedule: AuditSchedule) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("audit store poisoned");
        if !guard.contains_key(&schedule.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(schedule.id.clone(), schedule);
        Ok(())
    }

    fn fetch(&self, id: &AuditScheduleId) -> Result<Option<AuditSchedule>, RepositoryError> {
        let guard = self.records.lock().expect("audit store poisoned");
        Ok(guard.get(id).cloned())
    }

    fn has_open(&self, user: &UserId, audit: AuditType) -> Result<bool, RepositoryError> {
        let guard = self.records.lock().expect("audit store poisoned");
        Ok(guard.values().any(|schedule| {
            &schedule.user == user && schedule.audit == audit && schedule.status.is_open()
        }))
    }

    fn for_user(&self, user: &UserId) -> Result<Vec<AuditSchedule>, RepositoryError> {
        let guard = self.records.lock().expect("audit store poisoned");
        let mut schedules: Vec<_> = guard
            .values()
            .filter(|schedule| &schedule.user == user)
            .cloned()
            .collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(schedules)
    }
}

#[derive(Default)]
pub struct MemoryEmailLogRepository {
    entries: Mutex<Vec<EmailLog>>,
}

impl MemoryEmailLogRepository {
    pub fn all(&self) -> Vec<EmailLog> {
        self.entries.lock().expect("email log poisoned").clone()
    }
}

impl EmailLogRepository for MemoryEmailLogRepository {
    fn append(&self, log: EmailLog) -> Result<EmailLog, RepositoryError> {
        let mut guard = self.entries.lock().expect("email log poisoned");
        guard.push(log.clone());
        Ok(log)
    }

    fn attempts(
        &self,
        kpi_score: &KpiScoreId,
        template: EmailTemplate,
    ) -> Result<Vec<EmailLog>, RepositoryError> {
        let guard = self.entries.lock().expect("email log poisoned");
        Ok(guard
            .iter()
            .filter(|log| &log.kpi_score == kpi_score && log.template == template)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryNotificationRepository {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationRepository for MemoryNotificationRepository {
    fn insert(&self, notification: Notification) -> Result<Notification, RepositoryError> {
        let mut guard = self.entries.lock().expect("notification store poisoned");
        guard.push(notification.clone());
        Ok(notification)
    }

    fn exists_for(
        &self,
        kpi_score: &KpiScoreId,
        kind: NotificationKind,
    ) -> Result<bool, RepositoryError> {
        let guard = self.entries.lock().expect("notification store poisoned");
        Ok(guard
            .iter()
            .any(|n| n.kpi_score.as_ref() == Some(kpi_score) && n.kind == kind))
    }

    fn set_status(
        &self,
        user: &UserId,
        kind: NotificationKind,
        kpi_score: &KpiScoreId,
        status: NotificationStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.entries.lock().expect("notification store poisoned");
        let notification = guard
            .iter_mut()
            .find(|n| {
                &n.user == user && n.kind == kind && n.kpi_score.as_ref() == Some(kpi_score)
            })
            .ok_or(RepositoryError::NotFound)?;
        notification.status = status;
        Ok(())
    }

    fn for_user(&self, user: &UserId) -> Result<Vec<Notification>, RepositoryError> {
        let guard = self.entries.lock().expect("notification store poisoned");
        Ok(guard.iter().filter(|n| &n.user == user).cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryLifecycleStore {
    events: Mutex<Vec<LifecycleEvent>>,
    unavailable: Mutex<bool>,
}

impl MemoryLifecycleStore {
    pub fn all(&self) -> Vec<LifecycleEvent> {
        self.events.lock().expect("lifecycle store poisoned").clone()
    }

    /// Make appends fail, for exercising the recorder's swallow path.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().expect("lifecycle store poisoned") = unavailable;
    }
}

impl LifecycleStore for MemoryLifecycleStore {
    fn append(&self, event: LifecycleEvent) -> Result<(), RepositoryError> {
        if *self.unavailable.lock().expect("lifecycle store poisoned") {
            return Err(RepositoryError::Unavailable("lifecycle store offline".to_string()));
        }
        let mut guard = self.events.lock().expect("lifecycle store poisoned");
        guard.push(event);
        Ok(())
    }

    fn for_user(&self, user: &UserId) -> Result<Vec<LifecycleEvent>, RepositoryError> {
        let guard = self.events.lock().expect("lifecycle store poisoned");
        Ok(guard.iter().filter(|e| &e.user == user).cloned().collect())
    }
}

/// Transport fake that records every send and can be scripted to fail
/// specific templates.
#[derive(Default)]
pub struct RecordingEmailTransport {
    sent: Mutex<Vec<EmailMessage>>,
    failing: Mutex<BTreeSet<EmailTemplate>>,
}

impl RecordingEmailTransport {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("transport poisoned").clone()
    }

    pub fn fail_template(&self, template: EmailTemplate) {
        self.failing.lock().expect("transport poisoned").insert(template);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().expect("transport poisoned").clear();
    }
}

impl EmailTransport for RecordingEmailTransport {
    fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if self
            .failing
            .lock()
            .expect("transport poisoned")
            .contains(&message.template)
        {
            return Err(EmailError::Transport(format!(
                "{} delivery rejected",
                message.template.label()
            )));
        }
        let mut guard = self.sent.lock().expect("transport poisoned");
        guard.push(message.clone());
        Ok(())
    }
}

/// Bundle of fresh in-memory stores sharing nothing, for wiring a service.
pub struct MemoryStores {
    pub scores: Arc<MemoryKpiScoreRepository>,
    pub training: Arc<MemoryTrainingRepository>,
    pub audits: Arc<MemoryAuditRepository>,
    pub email_log: Arc<MemoryEmailLogRepository>,
    pub notifications: Arc<MemoryNotificationRepository>,
    pub lifecycle: Arc<MemoryLifecycleStore>,
    pub transport: Arc<RecordingEmailTransport>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self {
            scores: Arc::new(MemoryKpiScoreRepository::default()),
            training: Arc::new(MemoryTrainingRepository::default()),
            audits: Arc::new(MemoryAuditRepository::default()),
            email_log: Arc::new(MemoryEmailLogRepository::default()),
            notifications: Arc::new(MemoryNotificationRepository::default()),
            lifecycle: Arc::new(MemoryLifecycleStore::default()),
            transport: Arc::new(RecordingEmailTransport::default()),
        }
    }
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}
