//! Best-effort push delivery shared by the grading and escalation workflows.
//!
//! Every (recipient, token) pair is attempted independently with bounded retry; tokens the
//! transport reports as permanently invalid are pruned from the recipient's record. Dispatch
//! never fails as a whole: callers receive a [`DispatchReport`] describing what settled.

pub mod dispatcher;
pub mod domain;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{NotificationDispatcher, Notifier, RetryPolicy};
pub use domain::{
    AttemptOutcome, DeliveryAttempt, DeviceToken, DispatchReport, DispatchStatus,
    NotificationCategory, NotificationMessage, RecipientId, RecipientReport, RecipientStatus,
};
pub use transport::{DeliveryError, DirectoryError, PushTransport, RecipientDirectory};
