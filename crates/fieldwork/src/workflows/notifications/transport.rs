use async_trait::async_trait;

use super::domain::{DeviceToken, NotificationMessage, RecipientId};

/// Outbound push transport (FCM, APNs, a webhook gateway, ...).
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        token: &DeviceToken,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError>;
}

/// Transport failures split by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),
    #[error("device token permanently invalid: {0}")]
    InvalidToken(String),
}

/// Lookup of a recipient's registered devices, with best-effort pruning of dead tokens.
pub trait RecipientDirectory: Send + Sync {
    fn targets(&self, recipient: &RecipientId) -> Result<Vec<DeviceToken>, DirectoryError>;

    /// Remove `token` from the recipient's record. A recipient that no longer exists is not an
    /// error.
    fn prune_target(
        &self,
        recipient: &RecipientId,
        token: &DeviceToken,
    ) -> Result<(), DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("recipient directory unavailable: {0}")]
    Unavailable(String),
}
