use crate::cli::ServeArgs;
use crate::infra::{AppState, PushChannel, Services};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fieldwork::config::AppConfig;
use fieldwork::error::AppError;
use fieldwork::telemetry;
use fieldwork::workflows::escalation::ScheduleConfig;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.no_escalation {
        config.escalation.enabled = false;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let channel = PushChannel::from_settings(&config.notifications)?;
    let policy = config.grading.resolve_policy()?;
    let policy_kind = policy.kind();
    let services = Services::build(policy, channel, &config.notifications);

    let cancel = CancellationToken::new();
    let jobs: Vec<JoinHandle<()>> = if config.escalation.enabled {
        ScheduleConfig::from_settings(&config.escalation)
            .into_iter()
            .map(|schedule| services.scheduler.clone().spawn(schedule, cancel.clone()))
            .collect()
    } else {
        info!("escalation jobs disabled");
        Vec::new()
    };

    let app = with_service_routes(&services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        policy = policy_kind.label(),
        custom_policy = config.grading.policy_file.is_some(),
        escalation = config.escalation.enabled,
        "fieldwork service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    cancel.cancel();
    for job in jobs {
        if let Err(err) = job.await {
            warn!(error = %err, "escalation job ended abnormally");
        }
    }
    info!("fieldwork service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
