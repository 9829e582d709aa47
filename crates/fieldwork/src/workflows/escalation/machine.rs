use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CadenceSettings, SurchargeState, Task, TaskStatus};

/// A planned surcharge step, applied with a version-guarded write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurchargeIncrease {
    pub previous_rate: u32,
    pub new_rate: u32,
    pub at: DateTime<Utc>,
    pub increase_count: u32,
    /// Set only on the increase that reaches the cap.
    #[serde(default)]
    pub capped_at: Option<DateTime<Utc>>,
}

impl SurchargeIncrease {
    pub fn reaches_cap(&self) -> bool {
        self.capped_at.is_some()
    }
}

impl SurchargeState {
    /// Fold a committed increase into the surcharge fields.
    pub fn apply(&mut self, increase: &SurchargeIncrease) {
        self.current_rate = increase.new_rate;
        self.last_increase_at = Some(increase.at);
        self.increase_count = increase.increase_count;
        if self.capped_at.is_none() {
            self.capped_at = increase.capped_at;
        }
    }
}

/// Decide whether `task` is due for a surcharge increase at `now`.
///
/// The decision depends only on persisted fields: elapsed time is measured from the last increase,
/// or from task creation when none has happened. A second call inside the same window returns
/// `None` once the first increase has been stored.
pub fn plan_increase(
    task: &Task,
    cadence: &CadenceSettings,
    now: DateTime<Utc>,
) -> Option<SurchargeIncrease> {
    if task.status != TaskStatus::Open || cadence.step == 0 {
        return None;
    }

    let surcharge = &task.surcharge;
    if surcharge.current_rate >= surcharge.max_rate {
        return None;
    }

    let since = surcharge.last_increase_at.unwrap_or(task.created_at);
    if now - since < cadence.interval() {
        return None;
    }

    let new_rate = surcharge
        .current_rate
        .saturating_add(cadence.step)
        .min(surcharge.max_rate);
    let capped_at = if new_rate == surcharge.max_rate {
        surcharge.capped_at.or(Some(now))
    } else {
        None
    };

    Some(SurchargeIncrease {
        previous_rate: surcharge.current_rate,
        new_rate,
        at: now,
        increase_count: surcharge.increase_count.saturating_add(1),
        capped_at,
    })
}
