//! Time-based urgency surcharge escalation for unclaimed tasks.
//!
//! Each open task carries its own cadence (interval and step). A recurring job per cadence
//! variant plans increases from persisted timestamps and commits them with a write that only
//! succeeds while the task is still open at the version that was read.

pub mod domain;
pub mod machine;
mod notices;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    CadenceSettings, CadenceSlots, CadenceVariant, EscalationState, SurchargeState, Task, TaskId,
    TaskStatus, TaskView,
};
pub use machine::{plan_increase, SurchargeIncrease};
pub use repository::TaskRepository;
pub use router::escalation_router;
pub use scheduler::{EscalatedTask, EscalationScheduler, ScheduleConfig, TaskFailure, TickReport};
pub use service::{EscalationError, TaskService};
