use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fieldwork::config::NotificationSettings;
use fieldwork::error::AppError;
use fieldwork::store::InMemoryStore;
use fieldwork::workflows::escalation::{EscalationScheduler, TaskService};
use fieldwork::workflows::grading::{GradePolicy, GradingService, PolicyKind};
use fieldwork::workflows::notifications::{
    DeliveryError, DeviceToken, NotificationDispatcher, NotificationMessage, PushTransport,
};
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Dispatcher = NotificationDispatcher<PushChannel, InMemoryStore>;
pub(crate) type Grading = GradingService<InMemoryStore, Dispatcher>;
pub(crate) type Tasks = TaskService<InMemoryStore>;
pub(crate) type Scheduler = EscalationScheduler<InMemoryStore, Dispatcher>;

/// Transport used when no push gateway is configured: every push is logged and accepted.
#[derive(Debug, Default, Clone)]
pub(crate) struct LogPushTransport;

#[async_trait]
impl PushTransport for LogPushTransport {
    async fn deliver(
        &self,
        token: &DeviceToken,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        info!(
            token = %token.redacted(),
            category = message.category.label(),
            title = %message.title,
            "push notification"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct GatewayPayload<'a> {
    token: &'a str,
    category: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a std::collections::BTreeMap<String, String>,
}

/// Posts each push to an HTTP gateway that fronts the mobile push providers.
#[derive(Debug, Clone)]
pub(crate) struct GatewayPushTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl GatewayPushTransport {
    pub(crate) fn new(endpoint: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| AppError::Server(axum::Error::new(err)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

/// 404 and 410 mean the provider no longer knows the token.
pub(crate) fn classify_gateway_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Err(DeliveryError::InvalidToken(format!("gateway answered {status}")))
    } else {
        Err(DeliveryError::Transient(format!("gateway answered {status}")))
    }
}

#[async_trait]
impl PushTransport for GatewayPushTransport {
    async fn deliver(
        &self,
        token: &DeviceToken,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let payload = GatewayPayload {
            token: &token.0,
            category: message.category.label(),
            title: &message.title,
            body: &message.body,
            data: &message.data,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| DeliveryError::Transient(err.to_string()))?;
        classify_gateway_status(response.status())
    }
}

/// Push transport selected from configuration.
#[derive(Debug, Clone)]
pub(crate) enum PushChannel {
    Log(LogPushTransport),
    Gateway(GatewayPushTransport),
}

impl PushChannel {
    pub(crate) fn from_settings(settings: &NotificationSettings) -> Result<Self, AppError> {
        match &settings.push_gateway_url {
            Some(url) => Ok(PushChannel::Gateway(GatewayPushTransport::new(url.clone())?)),
            None => Ok(PushChannel::Log(LogPushTransport)),
        }
    }
}

#[async_trait]
impl PushTransport for PushChannel {
    async fn deliver(
        &self,
        token: &DeviceToken,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        match self {
            PushChannel::Log(transport) => transport.deliver(token, message).await,
            PushChannel::Gateway(transport) => transport.deliver(token, message).await,
        }
    }
}

/// Services wired over one shared in-memory store.
pub(crate) struct Services {
    pub(crate) store: Arc<InMemoryStore>,
    pub(crate) grading: Arc<Grading>,
    pub(crate) tasks: Arc<Tasks>,
    pub(crate) scheduler: Arc<Scheduler>,
}

impl Services {
    pub(crate) fn build(
        policy: GradePolicy,
        channel: PushChannel,
        notifications: &NotificationSettings,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(channel),
            store.clone(),
            notifications.retry.clone(),
        ));
        let grading = Arc::new(GradingService::new(
            store.clone(),
            dispatcher.clone(),
            policy,
        ));
        let tasks = Arc::new(TaskService::new(store.clone()));
        let scheduler = Arc::new(EscalationScheduler::new(store.clone(), dispatcher));

        Self {
            store,
            grading,
            tasks,
            scheduler,
        }
    }
}

pub(crate) fn parse_policy(raw: &str) -> Result<PolicyKind, String> {
    PolicyKind::parse(raw).ok_or_else(|| format!("unknown grade policy '{raw}'"))
}
