use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of anyone who can receive a push (contractor, customer, dispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipientId(pub String);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, possibly stale device registration issued by the push transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceToken(pub String);

impl DeviceToken {
    /// Shortened form for logs; full tokens are credentials.
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(6).collect();
        format!("{prefix}…")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    TierUpgrade,
    TierDowngrade,
    FeeEscalated,
    FeeCapped,
}

impl NotificationCategory {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationCategory::TierUpgrade => "tier_upgrade",
            NotificationCategory::TierDowngrade => "tier_downgrade",
            NotificationCategory::FeeEscalated => "fee_escalated",
            NotificationCategory::FeeCapped => "fee_capped",
        }
    }
}

/// Rendered push payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Delivered,
    /// Transient failure; another attempt follows.
    Failed,
    /// Transient failure on the last allowed attempt.
    RetryExhausted,
    /// Transport confirmed the token is dead; it was pruned.
    TokenRevoked,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Delivered => "delivered",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::RetryExhausted => "retry_exhausted",
            AttemptOutcome::TokenRevoked => "token_revoked",
        }
    }
}

/// One entry per delivery attempt, kept for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub recipient: RecipientId,
    pub token: DeviceToken,
    pub category: NotificationCategory,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    /// At least one of the recipient's devices accepted the message.
    Delivered,
    /// No device accepted the message.
    Undelivered,
    /// The recipient has no registered devices.
    NoTargets,
    /// The directory lookup failed, so nothing was attempted.
    LookupFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientReport {
    pub recipient: RecipientId,
    pub status: RecipientStatus,
    pub pruned_tokens: Vec<DeviceToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Delivered,
    Partial,
    Failed,
    NoTargets,
}

/// Settled result of one dispatch across all recipients.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    pub recipients: Vec<RecipientReport>,
    pub attempts: Vec<DeliveryAttempt>,
}

impl DispatchReport {
    pub fn status(&self) -> DispatchStatus {
        let reachable: Vec<&RecipientReport> = self
            .recipients
            .iter()
            .filter(|report| report.status != RecipientStatus::NoTargets)
            .collect();

        if reachable.is_empty() {
            return DispatchStatus::NoTargets;
        }

        let delivered = reachable
            .iter()
            .filter(|report| report.status == RecipientStatus::Delivered)
            .count();

        if delivered == reachable.len() {
            DispatchStatus::Delivered
        } else if delivered == 0 {
            DispatchStatus::Failed
        } else {
            DispatchStatus::Partial
        }
    }

    pub fn recipient(&self, id: &RecipientId) -> Option<&RecipientReport> {
        self.recipients.iter().find(|report| &report.recipient == id)
    }

    pub fn pruned_tokens(&self) -> impl Iterator<Item = &DeviceToken> {
        self.recipients
            .iter()
            .flat_map(|report| report.pruned_tokens.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: RecipientStatus) -> RecipientReport {
        RecipientReport {
            recipient: RecipientId(format!("{status:?}")),
            status,
            pruned_tokens: Vec::new(),
        }
    }

    #[test]
    fn status_ignores_recipients_without_devices() {
        let dispatch = DispatchReport {
            recipients: vec![
                report(RecipientStatus::Delivered),
                report(RecipientStatus::NoTargets),
            ],
            attempts: Vec::new(),
        };
        assert_eq!(dispatch.status(), DispatchStatus::Delivered);

        let empty = DispatchReport::default();
        assert_eq!(empty.status(), DispatchStatus::NoTargets);
    }

    #[test]
    fn status_distinguishes_partial_from_failed() {
        let partial = DispatchReport {
            recipients: vec![
                report(RecipientStatus::Delivered),
                report(RecipientStatus::Undelivered),
            ],
            attempts: Vec::new(),
        };
        assert_eq!(partial.status(), DispatchStatus::Partial);

        let failed = DispatchReport {
            recipients: vec![
                report(RecipientStatus::LookupFailed),
                report(RecipientStatus::Undelivered),
            ],
            attempts: Vec::new(),
        };
        assert_eq!(failed.status(), DispatchStatus::Failed);
    }

    #[test]
    fn redacted_token_keeps_only_prefix() {
        let token = DeviceToken("abcdef123456".to_string());
        assert_eq!(token.redacted(), "abcdef…");
    }
}
