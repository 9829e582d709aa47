use std::collections::BTreeMap;

use super::domain::{Contractor, TierChange};
use crate::workflows::notifications::{NotificationCategory, NotificationMessage};

const MAX_GUIDANCE_ITEMS: usize = 3;

pub(crate) fn tier_change_message(
    contractor: &Contractor,
    change: &TierChange,
    notes: &[String],
) -> NotificationMessage {
    if change.is_upgrade() {
        upgrade_message(contractor, change)
    } else {
        downgrade_message(contractor, change, notes)
    }
}

fn base_data(contractor: &Contractor, change: &TierChange) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    data.insert("contractor_id".to_string(), contractor.id.0.clone());
    data.insert("from_tier".to_string(), change.from.label().to_string());
    data.insert("to_tier".to_string(), change.to.label().to_string());
    data.insert("score".to_string(), format!("{:.2}", change.score));
    data
}

fn upgrade_message(contractor: &Contractor, change: &TierChange) -> NotificationMessage {
    NotificationMessage {
        category: NotificationCategory::TierUpgrade,
        title: format!("Congratulations, you reached {}!", change.to),
        body: format!(
            "Great work, {}. Your customers rate you {:.2} on average and you've moved up from {} to {}. Higher-tier jobs are now open to you.",
            contractor.display_name, change.score, change.from, change.to
        ),
        data: base_data(contractor, change),
    }
}

/// Downgrades carry the criteria of the lost tier that were missed.
fn downgrade_message(
    contractor: &Contractor,
    change: &TierChange,
    notes: &[String],
) -> NotificationMessage {
    let lost = change.from.label();
    let guidance: Vec<&str> = notes
        .iter()
        .filter(|note| note.contains(lost))
        .take(MAX_GUIDANCE_ITEMS)
        .map(String::as_str)
        .collect();

    let body = if guidance.is_empty() {
        format!(
            "{}, your grade changed from {} to {}. Keep response times short and jobs on schedule to climb back.",
            contractor.display_name, change.from, change.to
        )
    } else {
        format!(
            "{}, your grade changed from {} to {}. To regain {}: {}.",
            contractor.display_name,
            change.from,
            change.to,
            change.from,
            guidance.join("; ")
        )
    };

    let mut data = base_data(contractor, change);
    if !guidance.is_empty() {
        data.insert("guidance".to_string(), guidance.join("\n"));
    }

    NotificationMessage {
        category: NotificationCategory::TierDowngrade,
        title: format!("Your grade is now {}", change.to),
        body,
        data,
    }
}
