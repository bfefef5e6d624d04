use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    ActionSource, AuditOutcome, AuditSchedule, AuditScheduleId, AuditStatus, AuditType,
    KpiScoreId, UserId,
};
use super::repository::{AuditRepository, RepositoryError};

static SCHEDULE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_schedule_id() -> AuditScheduleId {
    let id = SCHEDULE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AuditScheduleId(format!("aud-{id:06}"))
}

/// Outcome of a schedule request after the open-duplicate check.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Created(AuditSchedule),
    SkippedOpenDuplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("audit is {}, cannot move to {}", from.label(), to.label())]
    IllegalTransition { from: AuditStatus, to: AuditStatus },
}

/// Audit schedule store owner, mirroring the training state machine:
/// scheduled → in-progress → completed/cancelled.
pub struct AuditService {
    repository: Arc<dyn AuditRepository>,
}

impl AuditService {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    pub fn schedule(
        &self,
        user: UserId,
        audit: AuditType,
        scheduled_for: NaiveDate,
        source: ActionSource,
        kpi_score: Option<KpiScoreId>,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, AuditError> {
        if self.repository.has_open(&user, audit)? {
            return Ok(ScheduleOutcome::SkippedOpenDuplicate);
        }

        let schedule = AuditSchedule {
            id: next_schedule_id(),
            user,
            audit,
            status: AuditStatus::Scheduled,
            source,
            kpi_score,
            scheduled_for,
            created_at: now,
            outcome: None,
        };

        let stored = self.repository.insert(schedule)?;
        Ok(ScheduleOutcome::Created(stored))
    }

    pub fn start(&self, id: &AuditScheduleId) -> Result<AuditSchedule, AuditError> {
        self.transition(id, AuditStatus::InProgress, None)
    }

    pub fn complete(
        &self,
        id: &AuditScheduleId,
        outcome: AuditOutcome,
    ) -> Result<AuditSchedule, AuditError> {
        self.transition(id, AuditStatus::Completed, Some(outcome))
    }

    pub fn cancel(&self, id: &AuditScheduleId) -> Result<AuditSchedule, AuditError> {
        self.transition(id, AuditStatus::Cancelled, None)
    }

    pub fn for_user(&self, user: &UserId) -> Result<Vec<AuditSchedule>, AuditError> {
        Ok(self.repository.for_user(user)?)
    }

    fn transition(
        &self,
        id: &AuditScheduleId,
        to: AuditStatus,
        outcome: Option<AuditOutcome>,
    ) -> Result<AuditSchedule, AuditError> {
        let mut schedule = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;

        if !schedule.status.is_open() {
            return Err(AuditError::IllegalTransition {
                from: schedule.status,
                to,
            });
        }

        schedule.status = to;
        schedule.outcome = match to {
            AuditStatus::Completed => outcome,
            _ => None,
        };

        self.repository.update(schedule.clone())?;
        Ok(schedule)
    }
}
