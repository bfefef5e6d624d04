use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    ActionSource, KpiScoreId, TrainingAssignment, TrainingAssignmentId, TrainingCompletion,
    TrainingStatus, TrainingType, UserId,
};
use super::repository::{RepositoryError, TrainingRepository};

static ASSIGNMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_assignment_id() -> TrainingAssignmentId {
    let id = ASSIGNMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TrainingAssignmentId(format!("trn-{id:06}"))
}

/// Outcome of an assign request after the open-duplicate check.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignOutcome {
    Created(TrainingAssignment),
    /// The user already has an open assignment of this type.
    SkippedOpenDuplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("assignment is {}, cannot move to {}", from.label(), to.label())]
    IllegalTransition { from: TrainingStatus, to: TrainingStatus },
}

/// Training assignment store owner: check-or-skip creation and the
/// assigned → in-progress → completed/cancelled state machine.
pub struct TrainingService {
    repository: Arc<dyn TrainingRepository>,
}

impl TrainingService {
    pub fn new(repository: Arc<dyn TrainingRepository>) -> Self {
        Self { repository }
    }

    /// Assign a training unless an open assignment of the same type already
    /// exists for the user.
    pub fn assign(
        &self,
        user: UserId,
        training: TrainingType,
        due_date: Option<NaiveDate>,
        source: ActionSource,
        kpi_score: Option<KpiScoreId>,
        now: DateTime<Utc>,
    ) -> Result<AssignOutcome, TrainingError> {
        if self.repository.has_open(&user, training)? {
            return Ok(AssignOutcome::SkippedOpenDuplicate);
        }

        let assignment = TrainingAssignment {
            id: next_assignment_id(),
            user,
            training,
            status: TrainingStatus::Assigned,
            source,
            kpi_score,
            assigned_at: now,
            due_date,
            completion: None,
        };

        let stored = self.repository.insert(assignment)?;
        Ok(AssignOutcome::Created(stored))
    }

    pub fn start(&self, id: &TrainingAssignmentId) -> Result<TrainingAssignment, TrainingError> {
        self.transition(id, TrainingStatus::InProgress, None)
    }

    pub fn complete(
        &self,
        id: &TrainingAssignmentId,
        completion: TrainingCompletion,
    ) -> Result<TrainingAssignment, TrainingError> {
        self.transition(id, TrainingStatus::Completed, Some(completion))
    }

    pub fn cancel(&self, id: &TrainingAssignmentId) -> Result<TrainingAssignment, TrainingError> {
        self.transition(id, TrainingStatus::Cancelled, None)
    }

    pub fn for_user(&self, user: &UserId) -> Result<Vec<TrainingAssignment>, TrainingError> {
        Ok(self.repository.for_user(user)?)
    }

    fn transition(
        &self,
        id: &TrainingAssignmentId,
        to: TrainingStatus,
        completion: Option<TrainingCompletion>,
    ) -> Result<TrainingAssignment, TrainingError> {
        let mut assignment = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;

        if !assignment.status.is_open() {
            return Err(TrainingError::IllegalTransition {
                from: assignment.status,
                to,
            });
        }

        assignment.status = to;
        assignment.completion = match to {
            TrainingStatus::Completed => completion,
            _ => None,
        };

        self.repository.update(assignment.clone())?;
        Ok(assignment)
    }
}
