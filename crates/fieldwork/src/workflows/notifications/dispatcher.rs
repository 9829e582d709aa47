use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{
    AttemptOutcome, DeliveryAttempt, DeviceToken, DispatchReport, NotificationMessage,
    RecipientId, RecipientReport, RecipientStatus,
};
use super::transport::{DeliveryError, PushTransport, RecipientDirectory};

/// Bounded retry with exponential backoff between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per token, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure.
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 250,
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Seam through which the workflows emit events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipients: &[RecipientId],
        message: NotificationMessage,
    ) -> DispatchReport;
}

enum TargetResult {
    Delivered,
    Undelivered,
    Revoked,
}

struct TargetReport {
    recipient: RecipientId,
    token: DeviceToken,
    result: TargetResult,
    attempts: Vec<DeliveryAttempt>,
}

pub struct NotificationDispatcher<T, D> {
    transport: Arc<T>,
    directory: Arc<D>,
    retry: RetryPolicy,
}

impl<T, D> NotificationDispatcher<T, D>
where
    T: PushTransport + 'static,
    D: RecipientDirectory + 'static,
{
    pub fn new(transport: Arc<T>, directory: Arc<D>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            directory,
            retry,
        }
    }

    /// Deliver `message` to every device of every recipient, settling all sends before
    /// reporting.
    pub async fn dispatch(
        &self,
        recipients: &[RecipientId],
        message: &NotificationMessage,
    ) -> DispatchReport {
        let mut unique: Vec<&RecipientId> = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            if !unique.contains(&recipient) {
                unique.push(recipient);
            }
        }

        let mut reports = Vec::with_capacity(unique.len());
        let mut sends = Vec::new();

        for recipient in unique {
            match self.directory.targets(recipient) {
                Ok(tokens) if tokens.is_empty() => {
                    debug!(%recipient, category = message.category.label(), "recipient has no devices");
                    reports.push(RecipientReport {
                        recipient: recipient.clone(),
                        status: RecipientStatus::NoTargets,
                        pruned_tokens: Vec::new(),
                    });
                }
                Ok(tokens) => {
                    reports.push(RecipientReport {
                        recipient: recipient.clone(),
                        status: RecipientStatus::Undelivered,
                        pruned_tokens: Vec::new(),
                    });
                    for token in tokens {
                        sends.push(self.deliver_to_target(recipient.clone(), token, message));
                    }
                }
                Err(err) => {
                    warn!(%recipient, error = %err, "recipient lookup failed");
                    reports.push(RecipientReport {
                        recipient: recipient.clone(),
                        status: RecipientStatus::LookupFailed,
                        pruned_tokens: Vec::new(),
                    });
                }
            }
        }

        let mut attempts = Vec::new();
        for target in join_all(sends).await {
            let TargetReport {
                recipient,
                token,
                result,
                attempts: target_attempts,
            } = target;
            attempts.extend(target_attempts);

            let Some(report) = reports
                .iter_mut()
                .find(|report| report.recipient == recipient)
            else {
                continue;
            };
            match result {
                TargetResult::Delivered => report.status = RecipientStatus::Delivered,
                TargetResult::Revoked => report.pruned_tokens.push(token),
                TargetResult::Undelivered => {}
            }
        }

        let report = DispatchReport {
            recipients: reports,
            attempts,
        };
        info!(
            category = message.category.label(),
            recipients = report.recipients.len(),
            attempts = report.attempts.len(),
            status = ?report.status(),
            "notification dispatch settled"
        );
        report
    }

    async fn deliver_to_target(
        &self,
        recipient: RecipientId,
        token: DeviceToken,
        message: &NotificationMessage,
    ) -> TargetReport {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = Vec::new();

        for attempt in 1..=max_attempts {
            let (outcome, error) = match self.transport.deliver(&token, message).await {
                Ok(()) => (AttemptOutcome::Delivered, None),
                Err(DeliveryError::InvalidToken(reason)) => {
                    (AttemptOutcome::TokenRevoked, Some(reason))
                }
                Err(DeliveryError::Transient(reason)) if attempt == max_attempts => {
                    (AttemptOutcome::RetryExhausted, Some(reason))
                }
                Err(DeliveryError::Transient(reason)) => (AttemptOutcome::Failed, Some(reason)),
            };

            metrics::counter!(
                "notification_attempts_total",
                "category" => message.category.label(),
                "outcome" => outcome.label()
            )
            .increment(1);
            debug!(
                %recipient,
                token = %token.redacted(),
                attempt,
                outcome = outcome.label(),
                error = error.as_deref().unwrap_or(""),
                "delivery attempt"
            );

            attempts.push(DeliveryAttempt {
                recipient: recipient.clone(),
                token: token.clone(),
                category: message.category,
                attempt,
                outcome,
                error,
                at: Utc::now(),
            });

            match outcome {
                AttemptOutcome::Delivered => {
                    return TargetReport {
                        recipient,
                        token,
                        result: TargetResult::Delivered,
                        attempts,
                    };
                }
                AttemptOutcome::TokenRevoked => {
                    if let Err(err) = self.directory.prune_target(&recipient, &token) {
                        warn!(%recipient, token = %token.redacted(), error = %err, "failed to prune dead token");
                    } else {
                        info!(%recipient, token = %token.redacted(), "pruned dead device token");
                    }
                    return TargetReport {
                        recipient,
                        token,
                        result: TargetResult::Revoked,
                        attempts,
                    };
                }
                AttemptOutcome::RetryExhausted => break,
                AttemptOutcome::Failed => {
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                }
            }
        }

        warn!(%recipient, token = %token.redacted(), "delivery retries exhausted");
        TargetReport {
            recipient,
            token,
            result: TargetResult::Undelivered,
            attempts,
        }
    }
}

#[async_trait]
impl<T, D> Notifier for NotificationDispatcher<T, D>
where
    T: PushTransport + 'static,
    D: RecipientDirectory + 'static,
{
    async fn notify(
        &self,
        recipients: &[RecipientId],
        message: NotificationMessage,
    ) -> DispatchReport {
        self.dispatch(recipients, &message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::notifications::domain::{DispatchStatus, NotificationCategory};
    use crate::workflows::notifications::transport::DirectoryError;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<Result<(), DeliveryError>>>>,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn script(&self, token: &str, results: Vec<Result<(), DeliveryError>>) {
            self.scripts
                .lock()
                .expect("script mutex poisoned")
                .insert(token.to_string(), results.into());
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().expect("sent mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn deliver(
            &self,
            token: &DeviceToken,
            _message: &NotificationMessage,
        ) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .expect("sent mutex poisoned")
                .push(token.0.clone());
            self.scripts
                .lock()
                .expect("script mutex poisoned")
                .get_mut(&token.0)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(Ok(()))
        }
    }

    #[derive(Default)]
    struct MapDirectory {
        targets: Mutex<HashMap<RecipientId, Vec<DeviceToken>>>,
        fail_lookups_for: Option<RecipientId>,
    }

    impl MapDirectory {
        fn with(entries: &[(&str, &[&str])]) -> Self {
            let targets = entries
                .iter()
                .map(|(recipient, tokens)| {
                    (
                        RecipientId(recipient.to_string()),
                        tokens
                            .iter()
                            .map(|token| DeviceToken(token.to_string()))
                            .collect(),
                    )
                })
                .collect();
            Self {
                targets: Mutex::new(targets),
                fail_lookups_for: None,
            }
        }

        fn tokens(&self, recipient: &str) -> Vec<DeviceToken> {
            self.targets
                .lock()
                .expect("directory mutex poisoned")
                .get(&RecipientId(recipient.to_string()))
                .cloned()
                .unwrap_or_default()
        }
    }

    impl RecipientDirectory for MapDirectory {
        fn targets(&self, recipient: &RecipientId) -> Result<Vec<DeviceToken>, DirectoryError> {
            if self.fail_lookups_for.as_ref() == Some(recipient) {
                return Err(DirectoryError::Unavailable("shard offline".to_string()));
            }
            Ok(self
                .targets
                .lock()
                .expect("directory mutex poisoned")
                .get(recipient)
                .cloned()
                .unwrap_or_default())
        }

        fn prune_target(
            &self,
            recipient: &RecipientId,
            token: &DeviceToken,
        ) -> Result<(), DirectoryError> {
            if let Some(tokens) = self
                .targets
                .lock()
                .expect("directory mutex poisoned")
                .get_mut(recipient)
            {
                tokens.retain(|existing| existing != token);
            }
            Ok(())
        }
    }

    fn message() -> NotificationMessage {
        NotificationMessage {
            category: NotificationCategory::FeeEscalated,
            title: "Urgent fee raised".to_string(),
            body: "The urgent fee is now 20%".to_string(),
            data: BTreeMap::new(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 0,
        }
    }

    fn ids(raw: &[&str]) -> Vec<RecipientId> {
        raw.iter().map(|id| RecipientId(id.to_string())).collect()
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(
            "tok-a",
            vec![
                Err(DeliveryError::Transient("timeout".to_string())),
                Ok(()),
            ],
        );
        let directory = Arc::new(MapDirectory::with(&[("worker-1", &["tok-a"])]));
        let dispatcher = NotificationDispatcher::new(transport.clone(), directory, fast_retry());

        let report = dispatcher.dispatch(&ids(&["worker-1"]), &message()).await;

        assert_eq!(report.status(), DispatchStatus::Delivered);
        let outcomes: Vec<AttemptOutcome> = report.attempts.iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![AttemptOutcome::Failed, AttemptOutcome::Delivered]
        );
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn retries_stop_at_the_configured_bound() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(
            "tok-a",
            vec![
                Err(DeliveryError::Transient("503".to_string())),
                Err(DeliveryError::Transient("503".to_string())),
                Err(DeliveryError::Transient("503".to_string())),
                Ok(()),
            ],
        );
        let directory = Arc::new(MapDirectory::with(&[("worker-1", &["tok-a"])]));
        let dispatcher = NotificationDispatcher::new(transport.clone(), directory, fast_retry());

        let report = dispatcher.dispatch(&ids(&["worker-1"]), &message()).await;

        assert_eq!(report.status(), DispatchStatus::Failed);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(
            report.attempts.last().map(|attempt| attempt.outcome),
            Some(AttemptOutcome::RetryExhausted)
        );
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn invalid_token_is_pruned_without_retry() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.script(
            "dead",
            vec![Err(DeliveryError::InvalidToken("unregistered".to_string()))],
        );
        let directory = Arc::new(MapDirectory::with(&[("worker-1", &["dead", "live"])]));
        let dispatcher =
            NotificationDispatcher::new(transport.clone(), directory.clone(), fast_retry());

        let report = dispatcher.dispatch(&ids(&["worker-1"]), &message()).await;

        assert_eq!(report.status(), DispatchStatus::Delivered);
        assert_eq!(directory.tokens("worker-1"), vec![DeviceToken("live".to_string())]);
        let recipient = report
            .recipient(&RecipientId("worker-1".to_string()))
            .expect("recipient reported");
        assert_eq!(recipient.pruned_tokens, vec![DeviceToken("dead".to_string())]);
        assert_eq!(
            transport
                .sent()
                .iter()
                .filter(|token| token.as_str() == "dead")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn lookup_failure_does_not_block_other_recipients() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut directory = MapDirectory::with(&[("worker-1", &["tok-1"]), ("worker-2", &["tok-2"])]);
        directory.fail_lookups_for = Some(RecipientId("worker-1".to_string()));
        let dispatcher =
            NotificationDispatcher::new(transport.clone(), Arc::new(directory), fast_retry());

        let report = dispatcher
            .dispatch(&ids(&["worker-1", "worker-2"]), &message())
            .await;

        assert_eq!(report.status(), DispatchStatus::Partial);
        assert_eq!(transport.sent(), vec!["tok-2".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_recipients_are_sent_once() {
        let transport = Arc::new(ScriptedTransport::default());
        let directory = Arc::new(MapDirectory::with(&[("worker-1", &["tok-1"])]));
        let dispatcher = NotificationDispatcher::new(transport.clone(), directory, fast_retry());

        let report = dispatcher
            .dispatch(&ids(&["worker-1", "worker-1"]), &message())
            .await;

        assert_eq!(report.recipients.len(), 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn recipients_without_devices_report_no_targets() {
        let transport = Arc::new(ScriptedTransport::default());
        let directory = Arc::new(MapDirectory::default());
        let dispatcher = NotificationDispatcher::new(transport, directory, fast_retry());

        let report = dispatcher.notify(&ids(&["nobody"]), message()).await;

        assert_eq!(report.status(), DispatchStatus::NoTargets);
        assert!(report.attempts.is_empty());
    }

    #[test]
    fn backoff_doubles_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_base_ms: 100,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }
}
