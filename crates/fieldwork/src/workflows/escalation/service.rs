use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{Task, TaskId, TaskStatus};
use super::repository::{RepositoryError, TaskRepository};
use crate::workflows::grading::ContractorId;

/// Task lifecycle operations. Once a task leaves `Open`, surcharge fields are frozen.
pub struct TaskService<T> {
    tasks: Arc<T>,
}

impl<T> Clone for TaskService<T> {
    fn clone(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
        }
    }
}

impl<T> TaskService<T>
where
    T: TaskRepository + 'static,
{
    pub fn new(tasks: Arc<T>) -> Self {
        Self { tasks }
    }

    /// Store a new task. A task may follow one cadence at most.
    pub fn create(&self, task: Task) -> Result<Task, EscalationError> {
        if task.cadence.is_conflicting() {
            return Err(EscalationError::ConflictingCadence(task.id));
        }
        let created = self.tasks.insert_task(task)?;
        info!(
            task = %created.id,
            rate = created.surcharge.current_rate,
            max_rate = created.surcharge.max_rate,
            "task opened"
        );
        Ok(created)
    }

    pub fn task(&self, id: &TaskId) -> Result<Task, EscalationError> {
        self.tasks
            .fetch_task(id)?
            .ok_or_else(|| EscalationError::TaskNotFound(id.clone()))
    }

    /// Assign an open task. Losing the race to another claim yields
    /// [`EscalationError::Repository`] with a conflict.
    pub fn claim(&self, id: &TaskId, contractor: ContractorId) -> Result<Task, EscalationError> {
        self.advance(id, TaskStatus::Assigned, Some(contractor))
    }

    pub fn advance(
        &self,
        id: &TaskId,
        next: TaskStatus,
        assignee: Option<ContractorId>,
    ) -> Result<Task, EscalationError> {
        let current = self.task(id)?;
        if !current.status.can_transition_to(next) {
            return Err(EscalationError::InvalidTransition {
                task_id: id.clone(),
                from: current.status,
                to: next,
            });
        }

        let assignee = assignee.or(current.assignee);
        let updated = self
            .tasks
            .transition(id, current.status, next, assignee, Utc::now())?;
        info!(
            task = %updated.id,
            from = %current.status,
            to = %updated.status,
            rate = updated.surcharge.current_rate,
            "task status changed"
        );
        Ok(updated)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("task {0} sets both the short and the long cadence")]
    ConflictingCadence(TaskId),
    #[error("{actor} is not allowed to {action}")]
    Unauthorized { actor: String, action: &'static str },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
