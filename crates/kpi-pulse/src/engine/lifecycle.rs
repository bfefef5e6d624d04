use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{LifecycleEvent, LifecycleKind, UserId};
use super::repository::{LifecycleStore, RepositoryError};

/// Fire-and-forget writer for the user timeline.
///
/// Lifecycle events are observability, not a transactional participant: a
/// failed append is logged and swallowed so it can never roll back or block
/// the action it describes.
pub struct LifecycleRecorder {
    store: Arc<dyn LifecycleStore>,
}

impl LifecycleRecorder {
    pub fn new(store: Arc<dyn LifecycleStore>) -> Self {
        Self { store }
    }

    pub fn record(
        &self,
        user: &UserId,
        kind: LifecycleKind,
        title: impl Into<String>,
        description: impl Into<String>,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let event = LifecycleEvent {
            user: user.clone(),
            kind,
            title: title.into(),
            description: description.into(),
            metadata,
            recorded_at: now,
        };

        if let Err(err) = self.store.append(event) {
            warn!(user = %user.0, kind = ?kind, error = %err, "failed to record lifecycle event");
        }
    }

    /// Reporting read over the append-only log.
    pub fn timeline(&self, user: &UserId) -> Result<Vec<LifecycleEvent>, RepositoryError> {
        self.store.for_user(user)
    }
}
