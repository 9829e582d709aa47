use crate::infra::{AppState, Services};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use fieldwork::error::AppError;
use fieldwork::store::InMemoryStore;
use fieldwork::workflows::escalation::escalation_router;
use fieldwork::workflows::grading::router::{actor_from_headers, missing_actor_response};
use fieldwork::workflows::grading::{grading_router, GradeClassifier, GradePolicy, PolicyKind};
use fieldwork::workflows::import::{EvaluationCsvImporter, GradeReport};
use fieldwork::workflows::notifications::{DeviceToken, RecipientId};
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub(crate) struct GradeReportRequest {
    pub(crate) evaluations_csv: String,
    #[serde(default)]
    pub(crate) completions_csv: Option<String>,
    #[serde(default)]
    pub(crate) policy: Option<PolicyKind>,
}

pub(crate) fn with_service_routes(services: &Services) -> axum::Router {
    grading_router(services.grading.clone())
        .merge(escalation_router(
            services.tasks.clone(),
            services.scheduler.clone(),
        ))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/grades/report",
            axum::routing::post(grade_report_endpoint),
        )
        .merge(
            axum::Router::new()
                .route(
                    "/api/v1/recipients/:recipient_id/devices",
                    axum::routing::post(register_devices_endpoint),
                )
                .with_state(services.store.clone()),
        )
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceRegistration {
    pub(crate) tokens: Vec<DeviceToken>,
}

/// Recipients register their own devices; staff may register on anyone's behalf.
pub(crate) async fn register_devices_endpoint(
    State(store): State<Arc<InMemoryStore>>,
    Path(recipient_id): Path<String>,
    headers: HeaderMap,
    Json(registration): Json<DeviceRegistration>,
) -> Response {
    let Some(actor) = actor_from_headers(&headers) else {
        return missing_actor_response();
    };
    if actor.id != recipient_id && !actor.can_manage_records() {
        let payload = json!({
            "error": format!("{} may not register devices for {recipient_id}", actor.id),
        });
        return (StatusCode::FORBIDDEN, Json(payload)).into_response();
    }

    let tokens: Vec<DeviceToken> = registration
        .tokens
        .into_iter()
        .map(|token| DeviceToken(token.0.trim().to_string()))
        .filter(|token| !token.0.is_empty())
        .collect();
    if tokens.is_empty() {
        let payload = json!({ "error": "at least one device token is required" });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    }

    match store.register_devices(RecipientId(recipient_id.clone()), tokens) {
        Ok(devices) => {
            info!(recipient = %recipient_id, devices = devices.len(), "devices registered");
            let payload = json!({ "recipient_id": recipient_id, "devices": devices.len() });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn grade_report_endpoint(
    Json(payload): Json<GradeReportRequest>,
) -> Result<Json<GradeReport>, AppError> {
    let GradeReportRequest {
        evaluations_csv,
        completions_csv,
        policy,
    } = payload;

    let evidence = EvaluationCsvImporter::from_reader(
        Cursor::new(evaluations_csv.into_bytes()),
        completions_csv.map(|csv| Cursor::new(csv.into_bytes())),
    )?;
    let classifier = GradeClassifier::new(GradePolicy::standard(
        policy.unwrap_or(PolicyKind::Threshold),
    ));

    Ok(Json(GradeReport::build(&evidence, &classifier)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{LogPushTransport, PushChannel};
    use axum::body::Body;
    use axum::http::Request;
    use fieldwork::config::NotificationSettings;
    use fieldwork::workflows::grading::Tier;
    use fieldwork::workflows::notifications::RetryPolicy;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use fieldwork::workflows::escalation::{CadenceVariant, TaskId, TaskRepository};
    use fieldwork::workflows::grading::{ContractorId, ContractorRepository};
    use fieldwork::workflows::notifications::RecipientDirectory;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn services() -> Services {
        let settings = NotificationSettings {
            retry: RetryPolicy::default(),
            push_gateway_url: None,
        };
        Services::build(
            GradePolicy::standard(PolicyKind::Threshold),
            PushChannel::Log(LogPushTransport),
            &settings,
        )
    }

    fn app_for(services: &Services, ready: bool) -> axum::Router {
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_service_routes(services).layer(Extension(state))
    }

    fn app(ready: bool) -> axum::Router {
        app_for(&services(), ready)
    }

    fn staff_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-actor-id", "staff-2")
            .header("x-actor-role", "staff")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn readiness_reflects_startup_state() {
        let response = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn workflow_routes_are_mounted() {
        let response = app(true)
            .oneshot(
                Request::get("/api/v1/contractors/unknown")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(true)
            .oneshot(
                Request::get("/api/v1/tasks/unknown")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn a_fresh_server_can_be_populated_over_http() {
        let services = services();
        let app = app_for(&services, true);

        let contractor = app
            .clone()
            .oneshot(staff_post(
                "/api/v1/contractors",
                json!({
                    "contractor_id": "worker-61",
                    "display_name": "Ines Duarte",
                    "notification_targets": ["fcm-ines-phone"]
                }),
            ))
            .await
            .expect("router response");
        assert_eq!(contractor.status(), StatusCode::CREATED);

        let task = app
            .clone()
            .oneshot(staff_post(
                "/api/v1/tasks",
                json!({
                    "task_id": "job-310",
                    "title": "Replace breaker panel",
                    "base_rate": 10,
                    "max_rate": 30,
                    "long": { "interval_secs": 3600, "step": 5 },
                    "watchers": ["customer-77"]
                }),
            ))
            .await
            .expect("router response");
        assert_eq!(task.status(), StatusCode::CREATED);

        let devices = app
            .clone()
            .oneshot(
                Request::post("/api/v1/recipients/customer-77/devices")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-actor-id", "customer-77")
                    .header("x-actor-role", "customer")
                    .body(Body::from(json!({ "tokens": ["apns-77", " "] }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(devices.status(), StatusCode::OK);

        let evaluation = app
            .oneshot(
                Request::post("/api/v1/contractors/worker-61/evaluations")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "id": "ev-1", "overall_score": 4.5 }).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(evaluation.status(), StatusCode::OK);

        let stored = services
            .store
            .fetch_contractor(&ContractorId("worker-61".to_string()))
            .expect("store readable")
            .expect("contractor registered");
        assert_eq!(stored.stats.total_evaluations, 1);
        assert_eq!(
            services
                .store
                .targets(&RecipientId("customer-77".to_string()))
                .expect("targets"),
            vec![DeviceToken("apns-77".to_string())]
        );
        assert!(services
            .store
            .fetch_task(&TaskId("job-310".to_string()))
            .expect("store readable")
            .is_some());

        let report = services
            .scheduler
            .tick(CadenceVariant::Long, chrono::Utc::now() + chrono::Duration::hours(2))
            .await
            .expect("tick succeeds");
        assert_eq!(report.escalated.len(), 1);
        assert_eq!(report.escalated[0].new_rate, 15);
    }

    #[tokio::test]
    async fn devices_cannot_be_registered_for_someone_else() {
        let response = app(true)
            .oneshot(
                Request::post("/api/v1/recipients/customer-77/devices")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-actor-id", "customer-78")
                    .header("x-actor-role", "customer")
                    .body(Body::from(json!({ "tokens": ["apns-78"] }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app(true)
            .oneshot(
                Request::post("/api/v1/recipients/customer-77/devices")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "tokens": ["apns-78"] }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn grade_report_endpoint_classifies_export() {
        let request = GradeReportRequest {
            evaluations_csv: "contractor_id,overall_score,would_recommend\nc-1,4.0,yes\nc-2,2.0,no\n"
                .to_string(),
            completions_csv: None,
            policy: Some(PolicyKind::Weighted),
        };

        let Json(report) = grade_report_endpoint(Json(request))
            .await
            .expect("report builds");

        assert_eq!(report.policy, PolicyKind::Weighted);
        assert_eq!(report.contractors.len(), 2);
        assert!(report.contractors[0].score > report.contractors[1].score);
        assert!(report.contractors[0].tier > report.contractors[1].tier);
    }

    #[tokio::test]
    async fn grade_report_endpoint_rejects_bad_rows() {
        let request = GradeReportRequest {
            evaluations_csv: "contractor_id,overall_score\nc-1,great\n".to_string(),
            completions_csv: None,
            policy: None,
        };

        let error = grade_report_endpoint(Json(request))
            .await
            .expect_err("bad score");

        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
