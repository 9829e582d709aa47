use chrono::{DateTime, Utc};

use super::domain::{Task, TaskId, TaskStatus};
use super::machine::SurchargeIncrease;
use crate::workflows::grading::ContractorId;
pub use crate::store::RepositoryError;

/// Storage abstraction for marketplace tasks.
pub trait TaskRepository: Send + Sync {
    fn insert_task(&self, task: Task) -> Result<Task, RepositoryError>;
    fn fetch_task(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError>;
    /// Tasks whose status is `Open` at read time.
    fn list_open(&self) -> Result<Vec<Task>, RepositoryError>;

    /// Apply `increase` only if the task is still `Open` at `expected_version`; otherwise
    /// [`RepositoryError::Conflict`].
    fn apply_increase(
        &self,
        id: &TaskId,
        expected_version: u64,
        increase: &SurchargeIncrease,
    ) -> Result<Task, RepositoryError>;

    /// Move the task from `expected` to `next`, failing with [`RepositoryError::Conflict`] when
    /// the stored status is no longer `expected`.
    fn transition(
        &self,
        id: &TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        assignee: Option<ContractorId>,
        at: DateTime<Utc>,
    ) -> Result<Task, RepositoryError>;
}
