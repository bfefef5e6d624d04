use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::bulk;
use super::domain::{
    AuditOutcome, AuditScheduleId, AuditType, KpiScoreId, Period, RawMetrics,
    TrainingAssignmentId, TrainingCompletion, TrainingType, UserId,
};
use super::orchestrator::{AutomationOutcome, OrchestratorError, ProcessOptions};
use super::repository::RepositoryError;
use super::scoring::config::{MetricsUpdate, TriggersUpdate};
use super::service::{KpiService, KpiScoreView, KpiServiceError, KpiSubmission, OverrideRequest};
use super::audits::{AuditError, ScheduleOutcome};
use super::training::{AssignOutcome, TrainingError};

/// Router exposing the engine's HTTP surface.
pub fn engine_router(service: Arc<KpiService>) -> Router {
    Router::new()
        .route("/api/v1/kpi/scores", post(submit_handler))
        .route("/api/v1/kpi/scores/bulk", post(bulk_handler))
        .route("/api/v1/kpi/scores/:score_id", get(fetch_handler))
        .route("/api/v1/kpi/scores/:score_id/process", post(process_handler))
        .route("/api/v1/kpi/scores/:score_id/override", post(override_handler))
        .route("/api/v1/config", get(config_handler))
        .route("/api/v1/config/metrics", put(update_metrics_handler))
        .route("/api/v1/config/triggers", put(update_triggers_handler))
        .route("/api/v1/config/reset", post(reset_config_handler))
        .route("/api/v1/training", post(assign_training_handler))
        .route(
            "/api/v1/training/:assignment_id/complete",
            post(complete_training_handler),
        )
        .route(
            "/api/v1/training/:assignment_id/cancel",
            post(cancel_training_handler),
        )
        .route("/api/v1/audits", post(schedule_audit_handler))
        .route("/api/v1/audits/:audit_id/complete", post(complete_audit_handler))
        .route("/api/v1/audits/:audit_id/cancel", post(cancel_audit_handler))
        .route("/api/v1/users/:user_id/training", get(user_training_handler))
        .route("/api/v1/users/:user_id/audits", get(user_audits_handler))
        .route("/api/v1/users/:user_id/timeline", get(timeline_handler))
        .with_state(service)
}

fn error_response(err: KpiServiceError) -> Response {
    let status = match &err {
        KpiServiceError::Validation(_) | KpiServiceError::Config(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        KpiServiceError::DuplicatePeriod { .. } => StatusCode::CONFLICT,
        KpiServiceError::Repository(RepositoryError::NotFound)
        | KpiServiceError::Orchestrator(OrchestratorError::ScoreNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        KpiServiceError::Training(TrainingError::Repository(RepositoryError::NotFound))
        | KpiServiceError::Audit(AuditError::Repository(RepositoryError::NotFound)) => {
            StatusCode::NOT_FOUND
        }
        KpiServiceError::Training(TrainingError::IllegalTransition { .. })
        | KpiServiceError::Audit(AuditError::IllegalTransition { .. }) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    user_id: String,
    period: Period,
    metrics: RawMetrics,
    /// Run trigger automation synchronously after scoring.
    #[serde(default = "default_true")]
    process: bool,
    #[serde(default)]
    send_email: bool,
}

async fn submit_handler(
    State(service): State<Arc<KpiService>>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    let submission = KpiSubmission {
        user: UserId(request.user_id),
        period: request.period,
        metrics: request.metrics,
    };

    let record = match service.submit(submission) {
        Ok(record) => record,
        Err(err) => return error_response(err),
    };

    let automation = if request.process {
        let options = ProcessOptions {
            send_email: request.send_email,
            reprocess: false,
        };
        match service.process_trigger(&record.id, options) {
            Ok(outcome) => Some(outcome),
            Err(err) => return error_response(err),
        }
    } else {
        None
    };

    // Re-read so the returned status reflects the automation run.
    let view = service
        .get(&record.id)
        .map(|record| KpiScoreView::from_record(&record))
        .unwrap_or_else(|_| KpiScoreView::from_record(&record));

    (
        StatusCode::CREATED,
        Json(json!({ "score": view, "automation": automation })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    csv: String,
    #[serde(default)]
    send_email: bool,
}

async fn bulk_handler(
    State(service): State<Arc<KpiService>>,
    Json(request): Json<BulkRequest>,
) -> Response {
    let options = ProcessOptions {
        send_email: request.send_email,
        reprocess: false,
    };
    let reader = Cursor::new(request.csv.into_bytes());
    let report = bulk::import_csv(&service, reader, options);
    (StatusCode::OK, Json(report)).into_response()
}

async fn fetch_handler(
    State(service): State<Arc<KpiService>>,
    Path(score_id): Path<String>,
) -> Response {
    match service.get(&KpiScoreId(score_id)) {
        Ok(record) => {
            (StatusCode::OK, Json(KpiScoreView::from_record(&record))).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProcessRequest {
    #[serde(default = "default_true")]
    send_email: bool,
    #[serde(default)]
    reprocess: bool,
}

async fn process_handler(
    State(service): State<Arc<KpiService>>,
    Path(score_id): Path<String>,
    Json(request): Json<ProcessRequest>,
) -> Response {
    let options = ProcessOptions {
        send_email: request.send_email,
        reprocess: request.reprocess,
    };

    match service.process_trigger(&KpiScoreId(score_id), options) {
        Ok(outcome @ AutomationOutcome::Dispatched(_)) => {
            (StatusCode::OK, Json(outcome)).into_response()
        }
        // Benign skips are 200s: the caller lost a race, nothing is wrong.
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn override_handler(
    State(service): State<Arc<KpiService>>,
    Path(score_id): Path<String>,
    Json(request): Json<OverrideRequest>,
) -> Response {
    match service.apply_override(&KpiScoreId(score_id), request) {
        Ok(record) => {
            (StatusCode::OK, Json(KpiScoreView::from_record(&record))).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn config_handler(State(service): State<Arc<KpiService>>) -> Response {
    let store = service.config_store();
    let config = store.active();
    (
        StatusCode::OK,
        Json(json!({ "version": store.version(), "config": &*config })),
    )
        .into_response()
}

async fn update_metrics_handler(
    State(service): State<Arc<KpiService>>,
    Json(update): Json<MetricsUpdate>,
) -> Response {
    match service.config_store().update_metrics(update) {
        Ok(config) => (
            StatusCode::OK,
            Json(json!({ "version": service.config_store().version(), "config": &*config })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn update_triggers_handler(
    State(service): State<Arc<KpiService>>,
    Json(update): Json<TriggersUpdate>,
) -> Response {
    match service.config_store().update_triggers(update) {
        Ok(config) => (
            StatusCode::OK,
            Json(json!({ "version": service.config_store().version(), "config": &*config })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn reset_config_handler(State(service): State<Arc<KpiService>>) -> Response {
    let config = service.config_store().reset_to_defaults();
    (
        StatusCode::OK,
        Json(json!({ "version": service.config_store().version(), "config": &*config })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct AssignTrainingRequest {
    user_id: String,
    training: TrainingType,
    #[serde(default)]
    due_date: Option<NaiveDate>,
}

async fn assign_training_handler(
    State(service): State<Arc<KpiService>>,
    Json(request): Json<AssignTrainingRequest>,
) -> Response {
    match service.assign_training(UserId(request.user_id), request.training, request.due_date) {
        Ok(AssignOutcome::Created(assignment)) => {
            (StatusCode::CREATED, Json(assignment)).into_response()
        }
        Ok(AssignOutcome::SkippedOpenDuplicate) => (
            StatusCode::OK,
            Json(json!({ "skipped": "open_duplicate" })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn complete_training_handler(
    State(service): State<Arc<KpiService>>,
    Path(assignment_id): Path<String>,
    Json(completion): Json<TrainingCompletion>,
) -> Response {
    match service.complete_training(&TrainingAssignmentId(assignment_id), completion) {
        Ok(assignment) => (StatusCode::OK, Json(assignment)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn cancel_training_handler(
    State(service): State<Arc<KpiService>>,
    Path(assignment_id): Path<String>,
) -> Response {
    match service.cancel_training(&TrainingAssignmentId(assignment_id)) {
        Ok(assignment) => (StatusCode::OK, Json(assignment)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleAuditRequest {
    user_id: String,
    audit: AuditType,
    scheduled_for: NaiveDate,
}

async fn schedule_audit_handler(
    State(service): State<Arc<KpiService>>,
    Json(request): Json<ScheduleAuditRequest>,
) -> Response {
    match service.schedule_audit(UserId(request.user_id), request.audit, request.scheduled_for) {
        Ok(ScheduleOutcome::Created(schedule)) => {
            (StatusCode::CREATED, Json(schedule)).into_response()
        }
        Ok(ScheduleOutcome::SkippedOpenDuplicate) => (
            StatusCode::OK,
            Json(json!({ "skipped": "open_duplicate" })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn complete_audit_handler(
    State(service): State<Arc<KpiService>>,
    Path(audit_id): Path<String>,
    Json(outcome): Json<AuditOutcome>,
) -> Response {
    match service.complete_audit(&AuditScheduleId(audit_id), outcome) {
        Ok(schedule) => (StatusCode::OK, Json(schedule)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn cancel_audit_handler(
    State(service): State<Arc<KpiService>>,
    Path(audit_id): Path<String>,
) -> Response {
    match service.cancel_audit(&AuditScheduleId(audit_id)) {
        Ok(schedule) => (StatusCode::OK, Json(schedule)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn user_training_handler(
    State(service): State<Arc<KpiService>>,
    Path(user_id): Path<String>,
) -> Response {
    match service.trainings_for(&UserId(user_id)) {
        Ok(assignments) => (StatusCode::OK, Json(assignments)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn user_audits_handler(
    State(service): State<Arc<KpiService>>,
    Path(user_id): Path<String>,
) -> Response {
    match service.audits_for(&UserId(user_id)) {
        Ok(schedules) => (StatusCode::OK, Json(schedules)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn timeline_handler(
    State(service): State<Arc<KpiService>>,
    Path(user_id): Path<String>,
) -> Response {
    match service.timeline(&UserId(user_id)) {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(err) => error_response(err),
    }
}
