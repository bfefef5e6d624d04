use std::thread;

use chrono::{Duration, Utc};

use super::common::{harness, strong_metrics, submission, weak_metrics};
use crate::engine::domain::{
    AutomationStatus, EmailStatus, EmailTemplate, KpiScoreId, KpiScoreRecord, LifecycleKind,
    Period, Rating, TrainingType, UserId,
};
use crate::engine::orchestrator::{
    ActionRef, ActionStatus, AutomationOutcome, AutomationResult, OrchestratorError,
    ProcessOptions, SkipReason,
};
use crate::engine::repository::{EmailLogRepository, KpiScoreRepository};
use crate::engine::scoring::config::TriggersUpdate;

fn dispatched(outcome: AutomationOutcome) -> AutomationResult {
    match outcome {
        AutomationOutcome::Dispatched(result) => result,
        other => panic!("expected a dispatched run, got {other:?}"),
    }
}

#[test]
fn excellent_score_sends_notification_email_only() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-01", "2025-03", strong_metrics()))
        .expect("submission accepted");
    assert_eq!(record.rating, Rating::Excellent);

    let result = dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("processing runs"),
    );

    assert_eq!(result.overall, AutomationStatus::Completed);
    assert!(h.stores.training.all().is_empty());
    assert!(h.stores.audits.all().is_empty());

    let sent = h.stores.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, EmailTemplate::KpiNotification);

    let stored = h.service.get(&record.id).expect("record readable");
    assert_eq!(stored.automation_status, AutomationStatus::Completed);
    assert!(stored.processed_at.is_some());
}

#[test]
fn weak_score_fans_out_training_audits_notifications_and_emails() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-02", "2025-03", weak_metrics()))
        .expect("submission accepted");
    assert_eq!(record.rating, Rating::BelowAverage);

    let result = dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("processing runs"),
    );

    assert_eq!(result.overall, AutomationStatus::Completed);
    assert!(result
        .actions
        .iter()
        .all(|a| a.status == ActionStatus::Created));

    let trainings = h.stores.training.all();
    assert_eq!(trainings.len(), 3);
    assert!(trainings
        .iter()
        .all(|t| t.kpi_score.as_ref() == Some(&record.id)));

    assert_eq!(h.stores.audits.all().len(), 2);
    assert_eq!(h.stores.transport.sent().len(), 3);

    let notifications = h
        .service
        .notifications()
        .for_user(&record.user)
        .expect("notifications readable");
    assert_eq!(notifications.len(), 3);
}

#[test]
fn email_failure_does_not_roll_back_sibling_actions() {
    let h = harness();
    h.stores.transport.fail_template(EmailTemplate::KpiNotification);

    let record = h
        .service
        .submit(submission("emp-03", "2025-03", weak_metrics()))
        .expect("submission accepted");
    let result = dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("processing runs"),
    );

    assert_eq!(result.overall, AutomationStatus::PartiallyFailed);
    assert_eq!(h.stores.training.all().len(), 3);
    assert_eq!(h.stores.audits.all().len(), 2);

    let failed: Vec<_> = result
        .actions
        .iter()
        .filter(|a| matches!(a.status, ActionStatus::Failed(_)))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].action,
        ActionRef::Email(EmailTemplate::KpiNotification)
    );

    let attempts = h
        .stores
        .email_log
        .all()
        .into_iter()
        .filter(|log| log.template == EmailTemplate::KpiNotification)
        .collect::<Vec<_>>();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, EmailStatus::Failed);
    assert!(attempts[0].error.is_some());
}

#[test]
fn reprocess_skips_open_duplicates_and_notifications() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-04", "2025-03", weak_metrics()))
        .expect("submission accepted");

    let quiet = ProcessOptions {
        send_email: false,
        reprocess: false,
    };
    dispatched(h.service.process_trigger(&record.id, quiet).expect("first run"));
    assert_eq!(h.stores.training.all().len(), 3);

    let result = dispatched(
        h.service
            .process_trigger(
                &record.id,
                ProcessOptions {
                    send_email: false,
                    reprocess: true,
                },
            )
            .expect("reprocess runs"),
    );

    assert_eq!(result.overall, AutomationStatus::Completed);
    assert!(result.actions.iter().all(|a| matches!(
        a.status,
        ActionStatus::Skipped(SkipReason::OpenDuplicate)
            | ActionStatus::Skipped(SkipReason::AlreadyNotified)
    )));
    assert_eq!(h.stores.training.all().len(), 3);
    assert_eq!(h.stores.audits.all().len(), 2);
}

#[test]
fn reprocess_with_email_appends_fresh_numbered_attempts() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-05", "2025-03", weak_metrics()))
        .expect("submission accepted");

    dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("first run"),
    );
    dispatched(
        h.service
            .process_trigger(
                &record.id,
                ProcessOptions {
                    send_email: true,
                    reprocess: true,
                },
            )
            .expect("reprocess runs"),
    );

    let attempts = h
        .stores
        .email_log
        .attempts(&record.id, EmailTemplate::KpiNotification)
        .expect("log readable");
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].attempt, 1);
    assert_eq!(attempts[1].attempt, 2);
}

#[test]
fn retry_after_partial_failure_does_not_resend_delivered_emails() {
    let h = harness();
    h.stores.transport.fail_template(EmailTemplate::TrainingAssignment);

    let record = h
        .service
        .submit(submission("emp-14", "2025-03", weak_metrics()))
        .expect("submission accepted");
    let first = dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("first run"),
    );
    assert_eq!(first.overall, AutomationStatus::PartiallyFailed);

    h.stores.transport.clear_failures();
    let retry = dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("retry runs"),
    );
    assert_eq!(retry.overall, AutomationStatus::Completed);

    // The failed template went out on a fresh attempt.
    let reattempted = h
        .stores
        .email_log
        .attempts(&record.id, EmailTemplate::TrainingAssignment)
        .expect("log readable");
    assert_eq!(reattempted.len(), 2);
    assert_eq!(reattempted[1].status, EmailStatus::Sent);

    // Templates delivered on the first run were skipped, not re-sent.
    let delivered = h
        .stores
        .email_log
        .attempts(&record.id, EmailTemplate::KpiNotification)
        .expect("log readable");
    assert_eq!(delivered.len(), 1);
    assert!(retry.actions.iter().any(|a| a.action
        == ActionRef::Email(EmailTemplate::KpiNotification)
        && a.status == ActionStatus::Skipped(SkipReason::AlreadySent)));
}

#[test]
fn completed_score_without_reprocess_is_a_noop() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-06", "2025-03", strong_metrics()))
        .expect("submission accepted");

    dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("first run"),
    );

    let outcome = h
        .service
        .process_trigger(&record.id, ProcessOptions::default())
        .expect("second call succeeds");
    assert_eq!(outcome, AutomationOutcome::AlreadyCompleted);
    assert_eq!(h.stores.transport.sent().len(), 1);
}

#[test]
fn concurrent_processing_claims_exactly_once() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-07", "2025-03", weak_metrics()))
        .expect("submission accepted");

    let options = ProcessOptions {
        send_email: false,
        reprocess: false,
    };
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = h.service.clone();
            let id = record.id.clone();
            thread::spawn(move || service.process_trigger(&id, options).expect("processing runs"))
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker thread panicked"))
        .collect();

    let dispatched_count = outcomes
        .iter()
        .filter(|o| matches!(o, AutomationOutcome::Dispatched(_)))
        .count();
    assert_eq!(dispatched_count, 1);
    // The loser either saw the claim held or arrived after completion.
    assert!(outcomes.iter().all(|o| matches!(
        o,
        AutomationOutcome::Dispatched(_)
            | AutomationOutcome::AlreadyProcessing
            | AutomationOutcome::AlreadyCompleted
    )));
    assert_eq!(h.stores.training.all().len(), 3);
}

#[test]
fn stale_processing_claim_is_reclaimed() {
    let h = harness();
    let now = Utc::now();

    let record = KpiScoreRecord {
        id: KpiScoreId("kpi-stale-01".to_string()),
        user: UserId("emp-08".to_string()),
        period: Period::parse("2025-03").expect("valid period"),
        metrics: weak_metrics(),
        overall_score: 49.25,
        rating: Rating::BelowAverage,
        automation_status: AutomationStatus::Processing,
        submitted_at: now - Duration::hours(2),
        processing_started_at: Some(now - Duration::hours(1)),
        processed_at: None,
        score_override: None,
    };
    h.stores.scores.insert(record.clone()).expect("record stored");

    let result = dispatched(
        h.service
            .process_trigger(
                &record.id,
                ProcessOptions {
                    send_email: false,
                    reprocess: false,
                },
            )
            .expect("stale claim recovered"),
    );
    assert_eq!(result.overall, AutomationStatus::Completed);
    assert_eq!(h.stores.training.all().len(), 3);
}

#[test]
fn fresh_processing_claim_is_respected() {
    let h = harness();
    let now = Utc::now();

    let record = KpiScoreRecord {
        id: KpiScoreId("kpi-held-01".to_string()),
        user: UserId("emp-09".to_string()),
        period: Period::parse("2025-03").expect("valid period"),
        metrics: weak_metrics(),
        overall_score: 49.25,
        rating: Rating::BelowAverage,
        automation_status: AutomationStatus::Processing,
        submitted_at: now,
        processing_started_at: Some(now - Duration::minutes(1)),
        processed_at: None,
        score_override: None,
    };
    h.stores.scores.insert(record.clone()).expect("record stored");

    let outcome = h
        .service
        .process_trigger(&record.id, ProcessOptions::default())
        .expect("call succeeds");
    assert_eq!(outcome, AutomationOutcome::AlreadyProcessing);
    assert!(h.stores.training.all().is_empty());
}

#[test]
fn unknown_score_is_an_error() {
    let h = harness();
    let missing = KpiScoreId("kpi-999999".to_string());
    let err = h
        .service
        .process_trigger(&missing, ProcessOptions::default())
        .expect_err("missing score rejected");
    assert!(matches!(
        err,
        crate::engine::service::KpiServiceError::Orchestrator(OrchestratorError::ScoreNotFound(_))
    ));
}

#[test]
fn reprocess_evaluates_against_the_current_rules() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-10", "2025-03", weak_metrics()))
        .expect("submission accepted");

    let quiet = ProcessOptions {
        send_email: false,
        reprocess: false,
    };
    dispatched(h.service.process_trigger(&record.id, quiet).expect("first run"));

    // Clear every trigger rule and reprocess: nothing should be owed.
    h.config
        .update_triggers(TriggersUpdate {
            rating_rules: Some(Vec::new()),
            metric_rules: Some(Vec::new()),
        })
        .expect("rules update accepted");

    let result = dispatched(
        h.service
            .process_trigger(
                &record.id,
                ProcessOptions {
                    send_email: false,
                    reprocess: true,
                },
            )
            .expect("reprocess runs"),
    );
    assert!(result.actions.is_empty());
    assert_eq!(result.overall, AutomationStatus::Completed);
}

#[test]
fn lifecycle_outage_never_blocks_processing() {
    let h = harness();
    h.stores.lifecycle.set_unavailable(true);

    let record = h
        .service
        .submit(submission("emp-11", "2025-03", weak_metrics()))
        .expect("submission accepted despite lifecycle outage");
    let result = dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("processing runs"),
    );

    assert_eq!(result.overall, AutomationStatus::Completed);
    assert!(h.stores.lifecycle.all().is_empty());
}

#[test]
fn trigger_run_writes_a_lifecycle_trail() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-12", "2025-03", weak_metrics()))
        .expect("submission accepted");
    dispatched(
        h.service
            .process_trigger(&record.id, ProcessOptions::default())
            .expect("processing runs"),
    );

    let events = h.service.timeline(&record.user).expect("timeline readable");
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&LifecycleKind::KpiRecorded));
    assert!(kinds.contains(&LifecycleKind::TrainingAssigned));
    assert!(kinds.contains(&LifecycleKind::AuditScheduled));
    assert!(kinds.contains(&LifecycleKind::EmailSent));
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == LifecycleKind::TrainingAssigned)
            .count(),
        3
    );
}

#[test]
fn trigger_sourced_training_carries_a_due_date() {
    let h = harness();
    let record = h
        .service
        .submit(submission("emp-13", "2025-03", weak_metrics()))
        .expect("submission accepted");
    dispatched(
        h.service
            .process_trigger(
                &record.id,
                ProcessOptions {
                    send_email: false,
                    reprocess: false,
                },
            )
            .expect("processing runs"),
    );

    let trainings = h.stores.training.all();
    assert!(trainings
        .iter()
        .all(|t| t.due_date.is_some() && t.training != TrainingType::CustomerHandling));
}
