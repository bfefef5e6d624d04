use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::domain::{
    EmailLog, EmailStatus, EmailTemplate, KpiScoreId, Notification, NotificationKind,
    NotificationStatus, UserId,
};
use super::repository::{
    EmailLogRepository, EmailMessage, EmailTransport, NotificationRepository, RepositoryError,
};

/// Outcome of a dispatch request after the delivered-already check.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Dispatched(EmailLog),
    /// The latest attempt for this (score, template) already succeeded and
    /// the caller did not ask for a resend.
    SkippedAlreadySent,
}

/// Email dispatch with a per-(score, template) attempt log.
///
/// A transport failure is not an error to the caller: it is captured on the
/// appended log entry so the orchestrator can fold it into the automation
/// result, and the original failure record survives any later resend. A
/// template whose latest attempt already succeeded is skipped unless the
/// caller explicitly requests a resend.
pub struct EmailDispatcher {
    log: Arc<dyn EmailLogRepository>,
    transport: Arc<dyn EmailTransport>,
}

impl EmailDispatcher {
    pub fn new(log: Arc<dyn EmailLogRepository>, transport: Arc<dyn EmailTransport>) -> Self {
        Self { log, transport }
    }

    pub fn dispatch(
        &self,
        user: &UserId,
        template: EmailTemplate,
        kpi_score: &KpiScoreId,
        data: BTreeMap<String, String>,
        resend: bool,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, RepositoryError> {
        let history = self.log.attempts(kpi_score, template)?;
        if !resend {
            if let Some(last) = history.last() {
                if last.status == EmailStatus::Sent {
                    return Ok(DispatchOutcome::SkippedAlreadySent);
                }
            }
        }
        let attempt = history.len() as u32 + 1;

        let message = EmailMessage {
            template,
            recipient: user.clone(),
            subject: subject_line(template),
            data,
        };

        let (status, error) = match self.transport.send(&message) {
            Ok(()) => (EmailStatus::Sent, None),
            Err(err) => (EmailStatus::Failed, Some(err.to_string())),
        };

        let log = self.log.append(EmailLog {
            user: user.clone(),
            template,
            kpi_score: kpi_score.clone(),
            attempt,
            status,
            error,
            dispatched_at: now,
        })?;
        Ok(DispatchOutcome::Dispatched(log))
    }

    pub fn attempts(
        &self,
        kpi_score: &KpiScoreId,
        template: EmailTemplate,
    ) -> Result<Vec<EmailLog>, RepositoryError> {
        self.log.attempts(kpi_score, template)
    }
}

fn subject_line(template: EmailTemplate) -> String {
    match template {
        EmailTemplate::KpiNotification => "Your monthly KPI score is available".to_string(),
        EmailTemplate::TrainingAssignment => "New training assigned to you".to_string(),
        EmailTemplate::AuditNotification => "An audit has been scheduled".to_string(),
        EmailTemplate::PerformanceWarning => "Performance warning".to_string(),
    }
}

/// Outcome of a notify request after the per-(score, kind) dedupe check.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    Created(Notification),
    SkippedExisting,
}

/// In-app notification store owner: unread → read → acknowledged.
pub struct NotificationService {
    repository: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(repository: Arc<dyn NotificationRepository>) -> Self {
        Self { repository }
    }

    /// Create a notification unless one of this kind already exists for the
    /// score, so a reprocess never duplicates the inbox entry.
    pub fn notify(
        &self,
        user: &UserId,
        kind: NotificationKind,
        message: String,
        kpi_score: &KpiScoreId,
        now: DateTime<Utc>,
    ) -> Result<NotifyOutcome, RepositoryError> {
        if self.repository.exists_for(kpi_score, kind)? {
            return Ok(NotifyOutcome::SkippedExisting);
        }

        let notification = self.repository.insert(Notification {
            user: user.clone(),
            kind,
            status: NotificationStatus::Unread,
            message,
            kpi_score: Some(kpi_score.clone()),
            created_at: now,
        })?;

        Ok(NotifyOutcome::Created(notification))
    }

    pub fn mark_read(
        &self,
        user: &UserId,
        kind: NotificationKind,
        kpi_score: &KpiScoreId,
    ) -> Result<(), RepositoryError> {
        self.repository
            .set_status(user, kind, kpi_score, NotificationStatus::Read)
    }

    pub fn acknowledge(
        &self,
        user: &UserId,
        kind: NotificationKind,
        kpi_score: &KpiScoreId,
    ) -> Result<(), RepositoryError> {
        self.repository
            .set_status(user, kind, kpi_score, NotificationStatus::Acknowledged)
    }

    pub fn for_user(&self, user: &UserId) -> Result<Vec<Notification>, RepositoryError> {
        self.repository.for_user(user)
    }
}
