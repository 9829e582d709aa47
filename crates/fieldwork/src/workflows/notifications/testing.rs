use std::sync::Mutex;

use async_trait::async_trait;

use super::dispatcher::Notifier;
use super::domain::{
    DispatchReport, NotificationMessage, RecipientId, RecipientReport, RecipientStatus,
};

/// Notifier double that records every message and reports it delivered.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<RecipientId>, NotificationMessage)>>,
}

impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<(Vec<RecipientId>, NotificationMessage)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(crate) fn messages(&self) -> Vec<NotificationMessage> {
        self.sent()
            .into_iter()
            .map(|(_, message)| message)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipients: &[RecipientId],
        message: NotificationMessage,
    ) -> DispatchReport {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((recipients.to_vec(), message));

        DispatchReport {
            recipients: recipients
                .iter()
                .map(|recipient| RecipientReport {
                    recipient: recipient.clone(),
                    status: RecipientStatus::Delivered,
                    pruned_tokens: Vec::new(),
                })
                .collect(),
            attempts: Vec::new(),
        }
    }
}
