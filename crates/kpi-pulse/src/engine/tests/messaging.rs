use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::engine::domain::{
    EmailLog, EmailStatus, EmailTemplate, KpiScoreId, NotificationKind, NotificationStatus, UserId,
};
use crate::engine::memory::{
    MemoryEmailLogRepository, MemoryNotificationRepository, RecordingEmailTransport,
};
use crate::engine::messaging::{DispatchOutcome, EmailDispatcher, NotificationService, NotifyOutcome};

fn dispatcher() -> (
    EmailDispatcher,
    Arc<MemoryEmailLogRepository>,
    Arc<RecordingEmailTransport>,
) {
    let log = Arc::new(MemoryEmailLogRepository::default());
    let transport = Arc::new(RecordingEmailTransport::default());
    (
        EmailDispatcher::new(log.clone(), transport.clone()),
        log,
        transport,
    )
}

fn delivered(outcome: DispatchOutcome) -> EmailLog {
    match outcome {
        DispatchOutcome::Dispatched(log) => log,
        DispatchOutcome::SkippedAlreadySent => panic!("expected a dispatch, got a skip"),
    }
}

#[test]
fn resend_attempts_are_numbered_per_score_and_template() {
    let (dispatcher, _, _) = dispatcher();
    let user = UserId("emp-40".to_string());
    let score = KpiScoreId("kpi-msg-01".to_string());

    for expected in 1..=3u32 {
        let log = delivered(
            dispatcher
                .dispatch(
                    &user,
                    EmailTemplate::KpiNotification,
                    &score,
                    BTreeMap::new(),
                    true,
                    Utc::now(),
                )
                .expect("dispatch recorded"),
        );
        assert_eq!(log.attempt, expected);
        assert_eq!(log.status, EmailStatus::Sent);
    }

    // A different template starts its own sequence.
    let log = delivered(
        dispatcher
            .dispatch(
                &user,
                EmailTemplate::TrainingAssignment,
                &score,
                BTreeMap::new(),
                false,
                Utc::now(),
            )
            .expect("dispatch recorded"),
    );
    assert_eq!(log.attempt, 1);
}

#[test]
fn delivered_template_is_skipped_without_an_explicit_resend() {
    let (dispatcher, log_store, _) = dispatcher();
    let user = UserId("emp-44".to_string());
    let score = KpiScoreId("kpi-msg-05".to_string());

    let first = delivered(
        dispatcher
            .dispatch(
                &user,
                EmailTemplate::KpiNotification,
                &score,
                BTreeMap::new(),
                false,
                Utc::now(),
            )
            .expect("dispatch recorded"),
    );
    assert_eq!(first.status, EmailStatus::Sent);

    let repeat = dispatcher
        .dispatch(
            &user,
            EmailTemplate::KpiNotification,
            &score,
            BTreeMap::new(),
            false,
            Utc::now(),
        )
        .expect("skip is not an error");
    assert_eq!(repeat, DispatchOutcome::SkippedAlreadySent);
    assert_eq!(log_store.all().len(), 1);

    // An explicit resend still appends a fresh attempt.
    let resent = delivered(
        dispatcher
            .dispatch(
                &user,
                EmailTemplate::KpiNotification,
                &score,
                BTreeMap::new(),
                true,
                Utc::now(),
            )
            .expect("dispatch recorded"),
    );
    assert_eq!(resent.attempt, 2);
}

#[test]
fn failed_attempt_is_preserved_next_to_the_retry() {
    let (dispatcher, log_store, transport) = dispatcher();
    let user = UserId("emp-41".to_string());
    let score = KpiScoreId("kpi-msg-02".to_string());

    transport.fail_template(EmailTemplate::AuditNotification);
    let failed = delivered(
        dispatcher
            .dispatch(
                &user,
                EmailTemplate::AuditNotification,
                &score,
                BTreeMap::new(),
                false,
                Utc::now(),
            )
            .expect("failure still recorded"),
    );
    assert_eq!(failed.status, EmailStatus::Failed);
    assert!(failed.error.as_deref().unwrap_or_default().contains("rejected"));

    transport.clear_failures();
    let retried = delivered(
        dispatcher
            .dispatch(
                &user,
                EmailTemplate::AuditNotification,
                &score,
                BTreeMap::new(),
                false,
                Utc::now(),
            )
            .expect("retry recorded"),
    );
    assert_eq!(retried.status, EmailStatus::Sent);
    assert_eq!(retried.attempt, 2);

    let history = log_store.all();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, EmailStatus::Failed);
    assert_eq!(history[1].status, EmailStatus::Sent);
}

#[test]
fn notifications_deduplicate_per_score_and_kind() {
    let repository = Arc::new(MemoryNotificationRepository::default());
    let service = NotificationService::new(repository);
    let user = UserId("emp-42".to_string());
    let score = KpiScoreId("kpi-msg-03".to_string());

    let first = service
        .notify(
            &user,
            NotificationKind::KpiRecorded,
            "Your KPI score for 2025-04 is ready".to_string(),
            &score,
            Utc::now(),
        )
        .expect("notify succeeds");
    assert!(matches!(first, NotifyOutcome::Created(_)));

    let second = service
        .notify(
            &user,
            NotificationKind::KpiRecorded,
            "Your KPI score for 2025-04 is ready".to_string(),
            &score,
            Utc::now(),
        )
        .expect("notify succeeds");
    assert_eq!(second, NotifyOutcome::SkippedExisting);

    // A different kind for the same score still goes through.
    let other_kind = service
        .notify(
            &user,
            NotificationKind::TrainingAssigned,
            "Training has been assigned".to_string(),
            &score,
            Utc::now(),
        )
        .expect("notify succeeds");
    assert!(matches!(other_kind, NotifyOutcome::Created(_)));
}

#[test]
fn notification_status_moves_unread_read_acknowledged() {
    let repository = Arc::new(MemoryNotificationRepository::default());
    let service = NotificationService::new(repository);
    let user = UserId("emp-43".to_string());
    let score = KpiScoreId("kpi-msg-04".to_string());

    service
        .notify(
            &user,
            NotificationKind::WarningIssued,
            "A performance warning was issued".to_string(),
            &score,
            Utc::now(),
        )
        .expect("notify succeeds");

    let unread = service.for_user(&user).expect("list readable");
    assert_eq!(unread[0].status, NotificationStatus::Unread);

    service
        .mark_read(&user, NotificationKind::WarningIssued, &score)
        .expect("mark read succeeds");
    let read = service.for_user(&user).expect("list readable");
    assert_eq!(read[0].status, NotificationStatus::Read);

    service
        .acknowledge(&user, NotificationKind::WarningIssued, &score)
        .expect("acknowledge succeeds");
    let acked = service.for_user(&user).expect("list readable");
    assert_eq!(acked[0].status, NotificationStatus::Acknowledged);
}
