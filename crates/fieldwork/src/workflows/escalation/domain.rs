use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::grading::ContractorId;
use crate::workflows::notifications::RecipientId;

/// Identifier wrapper for marketplace tasks (jobs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task lifecycle. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Open, TaskStatus::Assigned)
                | (TaskStatus::Open, TaskStatus::Cancelled)
                | (TaskStatus::Assigned, TaskStatus::InProgress)
                | (TaskStatus::Assigned, TaskStatus::Cancelled)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Position of a task's surcharge in its escalation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationState {
    /// No increase applied yet.
    Base,
    Escalating,
    /// `current_rate == max_rate`; no further increases.
    Capped,
}

/// Urgency surcharge, in whole percentage points of the task price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurchargeState {
    pub base_rate: u32,
    pub max_rate: u32,
    pub current_rate: u32,
    #[serde(default)]
    pub last_increase_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub increase_count: u32,
    #[serde(default)]
    pub capped_at: Option<DateTime<Utc>>,
}

impl SurchargeState {
    pub fn new(base_rate: u32, max_rate: u32) -> Self {
        Self {
            base_rate,
            max_rate: max_rate.max(base_rate),
            current_rate: base_rate,
            last_increase_at: None,
            increase_count: 0,
            capped_at: None,
        }
    }

    pub fn state(&self) -> EscalationState {
        if self.current_rate >= self.max_rate {
            EscalationState::Capped
        } else if self.increase_count == 0 {
            EscalationState::Base
        } else {
            EscalationState::Escalating
        }
    }
}

/// Per-task escalation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceSettings {
    pub interval_secs: u64,
    /// Percentage points added per increase.
    pub step: u32,
}

impl CadenceSettings {
    pub fn new(interval: Duration, step: u32) -> Self {
        Self {
            interval_secs: interval.as_secs(),
            step,
        }
    }

    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.interval_secs).unwrap_or(i64::MAX))
    }
}

/// Which of the two coexisting escalation schedules a job serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceVariant {
    /// Short interval, small step.
    Short,
    /// Long interval, larger step.
    Long,
}

impl CadenceVariant {
    pub const ALL: [CadenceVariant; 2] = [CadenceVariant::Short, CadenceVariant::Long];

    pub fn label(&self) -> &'static str {
        match self {
            CadenceVariant::Short => "short",
            CadenceVariant::Long => "long",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "short" => Some(CadenceVariant::Short),
            "long" => Some(CadenceVariant::Long),
            _ => None,
        }
    }
}

impl fmt::Display for CadenceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cadence slots as stored on a task. At most one should be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceSlots {
    #[serde(default)]
    pub short: Option<CadenceSettings>,
    #[serde(default)]
    pub long: Option<CadenceSettings>,
}

impl CadenceSlots {
    pub fn short(settings: CadenceSettings) -> Self {
        Self {
            short: Some(settings),
            long: None,
        }
    }

    pub fn long(settings: CadenceSettings) -> Self {
        Self {
            short: None,
            long: Some(settings),
        }
    }

    pub fn is_conflicting(&self) -> bool {
        self.short.is_some() && self.long.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub surcharge: SurchargeState,
    #[serde(default)]
    pub cadence: CadenceSlots,
    /// Recipients told about surcharge changes.
    #[serde(default)]
    pub watchers: Vec<RecipientId>,
    #[serde(default)]
    pub assignee: Option<ContractorId>,
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn open(
        id: TaskId,
        title: impl Into<String>,
        surcharge: SurchargeState,
        cadence: CadenceSlots,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            status: TaskStatus::Open,
            created_at: now,
            surcharge,
            cadence,
            watchers: Vec::new(),
            assignee: None,
            version: 0,
            updated_at: now,
        }
    }

    pub fn with_watchers(mut self, watchers: Vec<RecipientId>) -> Self {
        self.watchers = watchers;
        self
    }

    /// The task's own settings for `variant`, when that slot is populated.
    pub fn cadence_for(&self, variant: CadenceVariant) -> Option<&CadenceSettings> {
        match variant {
            CadenceVariant::Short => self.cadence.short.as_ref(),
            CadenceVariant::Long => self.cadence.long.as_ref(),
        }
    }

    pub fn escalation_state(&self) -> EscalationState {
        self.surcharge.state()
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            task_id: self.id.clone(),
            title: self.title.clone(),
            status: self.status,
            assignee: self.assignee.clone(),
            escalation: self.escalation_state(),
            current_rate: self.surcharge.current_rate,
            max_rate: self.surcharge.max_rate,
            increase_count: self.surcharge.increase_count,
            last_increase_at: self.surcharge.last_increase_at,
            capped_at: self.surcharge.capped_at,
        }
    }
}

/// Task projection exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<ContractorId>,
    pub escalation: EscalationState,
    pub current_rate: u32,
    pub max_rate: u32,
    pub increase_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_increase_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capped_at: Option<DateTime<Utc>>,
}
