use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::domain::{CadenceSettings, CadenceSlots, CadenceVariant, SurchargeState, Task, TaskId};
use super::repository::{RepositoryError, TaskRepository};
use super::scheduler::EscalationScheduler;
use super::service::{EscalationError, TaskService};
use crate::workflows::grading::router::{actor_from_headers, missing_actor_response};
use crate::workflows::grading::ContractorId;
use crate::workflows::notifications::{Notifier, RecipientId};

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimRequest {
    pub contractor_id: ContractorId,
}

/// New open task. Rates are whole percentage points; at most one cadence may be set.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSubmission {
    pub task_id: TaskId,
    pub title: String,
    pub base_rate: u32,
    pub max_rate: u32,
    #[serde(default)]
    pub short: Option<CadenceSettings>,
    #[serde(default)]
    pub long: Option<CadenceSettings>,
    #[serde(default)]
    pub watchers: Vec<RecipientId>,
}

impl TaskSubmission {
    fn into_task(self) -> Task {
        let cadence = CadenceSlots {
            short: self.short,
            long: self.long,
        };
        Task::open(
            self.task_id,
            self.title,
            SurchargeState::new(self.base_rate, self.max_rate),
            cadence,
            Utc::now(),
        )
        .with_watchers(self.watchers)
    }
}

/// Manual tick; omitting `variant` runs both cadences.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TickRequest {
    #[serde(default)]
    pub variant: Option<CadenceVariant>,
}

/// Router builder exposing task lookup, claiming and the manual escalation trigger.
pub fn escalation_router<T, N>(
    tasks: Arc<TaskService<T>>,
    scheduler: Arc<EscalationScheduler<T, N>>,
) -> Router
where
    T: TaskRepository + 'static,
    N: Notifier + 'static,
{
    let task_routes = Router::new()
        .route("/api/v1/tasks", post(create_task_handler::<T>))
        .route("/api/v1/tasks/:task_id", get(task_handler::<T>))
        .route("/api/v1/tasks/:task_id/claim", post(claim_handler::<T>))
        .with_state(tasks);

    let admin_routes = Router::new()
        .route("/api/v1/admin/escalation/tick", post(tick_handler::<T, N>))
        .with_state(scheduler);

    task_routes.merge(admin_routes)
}

pub(crate) async fn create_task_handler<T>(
    State(service): State<Arc<TaskService<T>>>,
    headers: HeaderMap,
    axum::Json(submission): axum::Json<TaskSubmission>,
) -> Response
where
    T: TaskRepository + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return missing_actor_response();
    };
    if !actor.can_manage_records() {
        return error_response(EscalationError::Unauthorized {
            actor: actor.id,
            action: "post tasks",
        });
    }

    match service.create(submission.into_task()) {
        Ok(task) => (StatusCode::CREATED, axum::Json(task.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn task_handler<T>(
    State(service): State<Arc<TaskService<T>>>,
    Path(task_id): Path<String>,
) -> Response
where
    T: TaskRepository + 'static,
{
    match service.task(&TaskId(task_id)) {
        Ok(task) => (StatusCode::OK, axum::Json(task.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn claim_handler<T>(
    State(service): State<Arc<TaskService<T>>>,
    Path(task_id): Path<String>,
    axum::Json(request): axum::Json<ClaimRequest>,
) -> Response
where
    T: TaskRepository + 'static,
{
    match service.claim(&TaskId(task_id), request.contractor_id) {
        Ok(task) => (StatusCode::OK, axum::Json(task.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn tick_handler<T, N>(
    State(scheduler): State<Arc<EscalationScheduler<T, N>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<TickRequest>,
) -> Response
where
    T: TaskRepository + 'static,
    N: Notifier + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return missing_actor_response();
    };
    if !actor.can_run_escalation() {
        warn!(actor = %actor.id, role = ?actor.role, "rejected manual escalation tick");
        return error_response(EscalationError::Unauthorized {
            actor: actor.id,
            action: "run fee escalation",
        });
    }

    let variants = match request.variant {
        Some(variant) => vec![variant],
        None => CadenceVariant::ALL.to_vec(),
    };
    let now = Utc::now();
    let mut reports = Vec::with_capacity(variants.len());
    for variant in variants {
        match scheduler.tick(variant, now).await {
            Ok(report) => reports.push(report),
            Err(error) => return error_response(error),
        }
    }

    (StatusCode::OK, axum::Json(json!({ "reports": reports }))).into_response()
}

fn error_response(error: EscalationError) -> Response {
    let status = match &error {
        EscalationError::TaskNotFound(_) | EscalationError::Repository(RepositoryError::NotFound) => {
            StatusCode::NOT_FOUND
        }
        EscalationError::InvalidTransition { .. }
        | EscalationError::Repository(RepositoryError::Conflict)
        | EscalationError::Repository(RepositoryError::StaleVersion { .. }) => StatusCode::CONFLICT,
        EscalationError::ConflictingCadence(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EscalationError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        EscalationError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
