use std::collections::BTreeMap;

use super::domain::Task;
use super::machine::SurchargeIncrease;
use crate::workflows::notifications::{NotificationCategory, NotificationMessage};

pub(crate) fn surcharge_message(task: &Task, increase: &SurchargeIncrease) -> NotificationMessage {
    let mut data = BTreeMap::new();
    data.insert("task_id".to_string(), task.id.0.clone());
    data.insert("previous_rate".to_string(), increase.previous_rate.to_string());
    data.insert("current_rate".to_string(), increase.new_rate.to_string());
    data.insert("max_rate".to_string(), task.surcharge.max_rate.to_string());

    if increase.reaches_cap() {
        NotificationMessage {
            category: NotificationCategory::FeeCapped,
            title: format!("Urgent fee capped for \"{}\"", task.title),
            body: format!(
                "The urgency surcharge on \"{}\" reached its maximum of {}%. It will not increase further.",
                task.title, increase.new_rate
            ),
            data,
        }
    } else {
        NotificationMessage {
            category: NotificationCategory::FeeEscalated,
            title: format!("Urgent fee raised for \"{}\"", task.title),
            body: format!(
                "The urgency surcharge on \"{}\" went from {}% to {}% while the job waits for a contractor.",
                task.title, increase.previous_rate, increase.new_rate
            ),
            data,
        }
    }
}
