#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fieldwork::store::InMemoryStore;
use fieldwork::workflows::notifications::{
    DeliveryError, DeviceToken, NotificationCategory, NotificationDispatcher, NotificationMessage,
    PushTransport, RetryPolicy,
};

/// Push transport keyed on token prefixes: `dead-` tokens are rejected as invalid, `flaky-`
/// tokens fail once before succeeding, anything else is accepted.
#[derive(Default)]
pub struct ScriptedTransport {
    attempts: Mutex<HashMap<String, u32>>,
    delivered: Mutex<Vec<(DeviceToken, NotificationCategory)>>,
}

impl ScriptedTransport {
    pub fn delivered(&self) -> Vec<(DeviceToken, NotificationCategory)> {
        self.delivered.lock().expect("transport mutex").clone()
    }

    pub fn attempts_for(&self, token: &str) -> u32 {
        self.attempts
            .lock()
            .expect("transport mutex")
            .get(token)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn deliver(
        &self,
        token: &DeviceToken,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let attempt = {
            let mut attempts = self.attempts.lock().expect("transport mutex");
            let count = attempts.entry(token.0.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if token.0.starts_with("dead-") {
            return Err(DeliveryError::InvalidToken("unregistered".to_string()));
        }
        if token.0.starts_with("flaky-") && attempt == 1 {
            return Err(DeliveryError::Transient("gateway timeout".to_string()));
        }

        self.delivered
            .lock()
            .expect("transport mutex")
            .push((token.clone(), message.category));
        Ok(())
    }
}

pub type Dispatcher = NotificationDispatcher<ScriptedTransport, InMemoryStore>;

pub fn dispatcher(
    store: Arc<InMemoryStore>,
) -> (Arc<Dispatcher>, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let retry = RetryPolicy {
        max_attempts: 3,
        backoff_base_ms: 0,
    };
    (
        Arc::new(NotificationDispatcher::new(transport.clone(), store, retry)),
        transport,
    )
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}
