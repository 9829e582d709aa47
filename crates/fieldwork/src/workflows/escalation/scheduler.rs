use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::domain::{CadenceVariant, Task, TaskId};
use super::machine::{plan_increase, SurchargeIncrease};
use super::notices::surcharge_message;
use super::repository::{RepositoryError, TaskRepository};
use super::service::EscalationError;
use crate::config::EscalationSettings;
use crate::workflows::notifications::{DispatchStatus, Notifier};

/// How often one escalation job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub variant: CadenceVariant,
    pub period: Duration,
}

impl ScheduleConfig {
    pub fn short() -> Self {
        Self {
            variant: CadenceVariant::Short,
            period: Duration::from_secs(10 * 60),
        }
    }

    pub fn long() -> Self {
        Self {
            variant: CadenceVariant::Long,
            period: Duration::from_secs(60 * 60),
        }
    }

    /// Both jobs, with periods taken from configuration.
    pub fn from_settings(settings: &EscalationSettings) -> [ScheduleConfig; 2] {
        [
            ScheduleConfig {
                variant: CadenceVariant::Short,
                period: settings.short_period,
            },
            ScheduleConfig {
                variant: CadenceVariant::Long,
                period: settings.long_period,
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalatedTask {
    pub task_id: TaskId,
    pub previous_rate: u32,
    pub new_rate: u32,
    pub capped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<DispatchStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: TaskId,
    pub error: String,
}

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub variant: CadenceVariant,
    pub at: DateTime<Utc>,
    /// Open tasks carrying this variant's cadence.
    pub scanned: usize,
    pub escalated: Vec<EscalatedTask>,
    pub not_due: usize,
    /// Increases dropped because the task changed between scan and write.
    pub conflicts: usize,
    /// Tasks configured with both cadences; never escalated.
    pub integrity_warnings: Vec<TaskId>,
    pub failures: Vec<TaskFailure>,
}

impl TickReport {
    fn new(variant: CadenceVariant, at: DateTime<Utc>) -> Self {
        Self {
            variant,
            at,
            scanned: 0,
            escalated: Vec::new(),
            not_due: 0,
            conflicts: 0,
            integrity_warnings: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn capped(&self) -> usize {
        self.escalated.iter().filter(|task| task.capped).count()
    }
}

/// Recurring job advancing the surcharge state machine of every open task.
pub struct EscalationScheduler<T, N> {
    tasks: Arc<T>,
    notifier: Arc<N>,
}

impl<T, N> Clone for EscalationScheduler<T, N> {
    fn clone(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<T, N> EscalationScheduler<T, N>
where
    T: TaskRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(tasks: Arc<T>, notifier: Arc<N>) -> Self {
        Self { tasks, notifier }
    }

    /// Run one pass for `variant`. Safe to invoke concurrently or re-deliver: increases are
    /// planned from persisted timestamps and written with a version guard.
    pub async fn tick(
        &self,
        variant: CadenceVariant,
        now: DateTime<Utc>,
    ) -> Result<TickReport, EscalationError> {
        let open = self.tasks.list_open()?;
        let mut report = TickReport::new(variant, now);

        for task in open {
            if task.cadence.is_conflicting() {
                warn!(
                    task = %task.id,
                    variant = variant.label(),
                    "task carries both escalation cadences, skipping"
                );
                report.integrity_warnings.push(task.id);
                continue;
            }
            let Some(cadence) = task.cadence_for(variant) else {
                continue;
            };
            report.scanned += 1;

            let Some(increase) = plan_increase(&task, cadence, now) else {
                report.not_due += 1;
                continue;
            };

            match self.tasks.apply_increase(&task.id, task.version, &increase) {
                Ok(updated) => {
                    metrics::counter!(
                        "fee_escalations_total",
                        "variant" => variant.label(),
                        "capped" => if increase.reaches_cap() { "true" } else { "false" }
                    )
                    .increment(1);
                    info!(
                        task = %updated.id,
                        variant = variant.label(),
                        from = increase.previous_rate,
                        to = increase.new_rate,
                        capped = increase.reaches_cap(),
                        "urgency surcharge increased"
                    );
                    let notification = self.notify_watchers(&updated, &increase).await;
                    report.escalated.push(EscalatedTask {
                        task_id: updated.id,
                        previous_rate: increase.previous_rate,
                        new_rate: increase.new_rate,
                        capped: increase.reaches_cap(),
                        notification,
                    });
                }
                Err(RepositoryError::Conflict | RepositoryError::StaleVersion { .. }) => {
                    debug!(task = %task.id, "task changed since scan, increase dropped");
                    report.conflicts += 1;
                }
                Err(error) => {
                    warn!(task = %task.id, error = %error, "surcharge increase failed");
                    report.failures.push(TaskFailure {
                        task_id: task.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            variant = variant.label(),
            scanned = report.scanned,
            escalated = report.escalated.len(),
            capped = report.capped(),
            conflicts = report.conflicts,
            warnings = report.integrity_warnings.len(),
            failures = report.failures.len(),
            "escalation tick finished"
        );
        Ok(report)
    }

    async fn notify_watchers(
        &self,
        task: &Task,
        increase: &SurchargeIncrease,
    ) -> Option<DispatchStatus> {
        if task.watchers.is_empty() {
            return None;
        }
        let message = surcharge_message(task, increase);
        let report = self.notifier.notify(&task.watchers, message).await;
        Some(report.status())
    }

    /// Run `tick` on a fixed period until `cancel` fires. Missed ticks are skipped.
    pub fn spawn(
        self: Arc<Self>,
        config: ScheduleConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(config.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                variant = config.variant.label(),
                period_secs = config.period.as_secs(),
                "escalation job started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(variant = config.variant.label(), "escalation job shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = self.tick(config.variant, Utc::now()).await {
                            warn!(
                                variant = config.variant.label(),
                                error = %error,
                                "escalation tick failed"
                            );
                        }
                    }
                }
            }
        })
    }
}
