use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::domain::{Actor, ActorRole, Contractor, ContractorId, EvaluationRecord, JobCompletion};
use super::repository::{ContractorRepository, RepositoryError};
use super::service::{GradingError, GradingService, RecomputeRequest};
use crate::workflows::escalation::TaskId;
use crate::workflows::notifications::{DeviceToken, Notifier};

pub(crate) const ACTOR_ID_HEADER: &str = "x-actor-id";
pub(crate) const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, Deserialize)]
pub struct ContractorRegistration {
    pub contractor_id: ContractorId,
    pub display_name: String,
    #[serde(default)]
    pub notification_targets: Vec<DeviceToken>,
}

/// Evaluation body; the contractor comes from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationSubmission {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub would_recommend: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl EvaluationSubmission {
    fn into_record(self, contractor_id: ContractorId) -> EvaluationRecord {
        EvaluationRecord {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            contractor_id,
            category_scores: self.category_scores,
            overall_score: self.overall_score,
            would_recommend: self.would_recommend,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionSubmission {
    pub task_id: TaskId,
    pub response_minutes: f64,
    pub completed_on_time: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Router builder exposing contractor grading endpoints.
pub fn grading_router<R, N>(service: Arc<GradingService<R, N>>) -> Router
where
    R: ContractorRepository + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/contractors", post(register_handler::<R, N>))
        .route(
            "/api/v1/contractors/:contractor_id",
            get(contractor_handler::<R, N>),
        )
        .route(
            "/api/v1/contractors/:contractor_id/audit",
            get(audit_handler::<R, N>),
        )
        .route(
            "/api/v1/contractors/:contractor_id/evaluations",
            post(evaluation_handler::<R, N>),
        )
        .route(
            "/api/v1/contractors/:contractor_id/completions",
            post(completion_handler::<R, N>),
        )
        .route(
            "/api/v1/admin/grades/recompute",
            post(recompute_handler::<R, N>),
        )
        .with_state(service)
}

pub(crate) async fn register_handler<R, N>(
    State(service): State<Arc<GradingService<R, N>>>,
    headers: HeaderMap,
    axum::Json(registration): axum::Json<ContractorRegistration>,
) -> Response
where
    R: ContractorRepository + 'static,
    N: Notifier + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return missing_actor_response();
    };
    if !actor.can_manage_records() {
        return error_response(GradingError::Unauthorized {
            actor: actor.id,
            action: "register contractors",
        });
    }

    let mut contractor = Contractor::new(
        registration.contractor_id,
        registration.display_name,
        Utc::now(),
    );
    contractor.notification_targets = registration.notification_targets;
    match service.register(contractor) {
        Ok(contractor) => (StatusCode::CREATED, axum::Json(contractor.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn contractor_handler<R, N>(
    State(service): State<Arc<GradingService<R, N>>>,
    Path(contractor_id): Path<String>,
) -> Response
where
    R: ContractorRepository + 'static,
    N: Notifier + 'static,
{
    match service.contractor(&ContractorId(contractor_id)) {
        Ok(contractor) => (StatusCode::OK, axum::Json(contractor.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn audit_handler<R, N>(
    State(service): State<Arc<GradingService<R, N>>>,
    Path(contractor_id): Path<String>,
) -> Response
where
    R: ContractorRepository + 'static,
    N: Notifier + 'static,
{
    match service.audit_log(&ContractorId(contractor_id)) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn evaluation_handler<R, N>(
    State(service): State<Arc<GradingService<R, N>>>,
    Path(contractor_id): Path<String>,
    axum::Json(submission): axum::Json<EvaluationSubmission>,
) -> Response
where
    R: ContractorRepository + 'static,
    N: Notifier + 'static,
{
    let record = submission.into_record(ContractorId(contractor_id));
    match service.record_evaluation(record).await {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn completion_handler<R, N>(
    State(service): State<Arc<GradingService<R, N>>>,
    Path(contractor_id): Path<String>,
    axum::Json(submission): axum::Json<CompletionSubmission>,
) -> Response
where
    R: ContractorRepository + 'static,
    N: Notifier + 'static,
{
    let completion = JobCompletion {
        task_id: submission.task_id,
        contractor_id: ContractorId(contractor_id),
        response_minutes: submission.response_minutes,
        completed_on_time: submission.completed_on_time,
        completed_at: submission.completed_at.unwrap_or_else(Utc::now),
    };
    match service.record_completion(completion).await {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn recompute_handler<R, N>(
    State(service): State<Arc<GradingService<R, N>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<RecomputeRequest>,
) -> Response
where
    R: ContractorRepository + 'static,
    N: Notifier + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return missing_actor_response();
    };
    match service.recompute_batch(&actor, request).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Caller identity as forwarded by the upstream identity provider.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let id = headers.get(ACTOR_ID_HEADER)?.to_str().ok()?.trim();
    if id.is_empty() {
        return None;
    }
    let role = ActorRole::parse(headers.get(ACTOR_ROLE_HEADER)?.to_str().ok()?)?;
    Some(Actor {
        id: id.to_string(),
        role,
    })
}

pub fn missing_actor_response() -> Response {
    let payload = json!({
        "error": "missing or invalid actor headers",
    });
    (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
}

fn error_response(error: GradingError) -> Response {
    let status = match &error {
        GradingError::ContractorNotFound(_) | GradingError::Repository(RepositoryError::NotFound) => {
            StatusCode::NOT_FOUND
        }
        GradingError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        GradingError::Repository(RepositoryError::Conflict)
        | GradingError::Repository(RepositoryError::StaleVersion { .. }) => StatusCode::CONFLICT,
        GradingError::Repository(RepositoryError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
