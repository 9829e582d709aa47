use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::store::InMemoryStore;
use crate::workflows::escalation::{
    CadenceSettings, CadenceSlots, EscalationScheduler, SurchargeIncrease, SurchargeState, Task,
    TaskId, TaskRepository, TaskService, TaskStatus,
};
use crate::workflows::grading::ContractorId;
use crate::workflows::notifications::testing::RecordingNotifier;
use crate::workflows::notifications::RecipientId;

pub(super) fn created() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 9, 7, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn hours(count: i64) -> DateTime<Utc> {
    created() + Duration::hours(count)
}

pub(super) fn hourly(step: u32) -> CadenceSettings {
    CadenceSettings::new(StdDuration::from_secs(3600), step)
}

pub(super) fn every_ten_minutes(step: u32) -> CadenceSettings {
    CadenceSettings::new(StdDuration::from_secs(600), step)
}

pub(super) fn task(id: &str, cadence: CadenceSlots) -> Task {
    Task::open(
        TaskId(id.to_string()),
        format!("Install ceiling fan {id}"),
        SurchargeState::new(15, 50),
        cadence,
        created(),
    )
    .with_watchers(vec![RecipientId("customer-204".to_string())])
}

pub(super) fn long_task(id: &str) -> Task {
    task(id, CadenceSlots::long(hourly(5)))
}

pub(super) fn build_scheduler(
    tasks: Vec<Task>,
) -> (
    EscalationScheduler<InMemoryStore, RecordingNotifier>,
    Arc<InMemoryStore>,
    Arc<RecordingNotifier>,
) {
    let store = Arc::new(InMemoryStore::new());
    for task in tasks {
        store.insert_task(task).expect("insert task");
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = EscalationScheduler::new(store.clone(), notifier.clone());
    (scheduler, store, notifier)
}

pub(super) fn task_service(store: Arc<InMemoryStore>) -> TaskService<InMemoryStore> {
    TaskService::new(store)
}

pub(super) fn stored(store: &InMemoryStore, id: &str) -> Task {
    store
        .fetch_task(&TaskId(id.to_string()))
        .expect("fetch task")
        .expect("task present")
}

/// Simulates a contractor claiming every task right after the scheduler's scan.
#[derive(Default)]
pub(super) struct ClaimAfterScan {
    pub(super) inner: InMemoryStore,
}

impl TaskRepository for ClaimAfterScan {
    fn insert_task(&self, task: Task) -> Result<Task, crate::store::RepositoryError> {
        self.inner.insert_task(task)
    }

    fn fetch_task(&self, id: &TaskId) -> Result<Option<Task>, crate::store::RepositoryError> {
        self.inner.fetch_task(id)
    }

    fn list_open(&self) -> Result<Vec<Task>, crate::store::RepositoryError> {
        let snapshot = self.inner.list_open()?;
        for task in &snapshot {
            self.inner.transition(
                &task.id,
                TaskStatus::Open,
                TaskStatus::Assigned,
                Some(ContractorId("worker-quick".to_string())),
                created(),
            )?;
        }
        Ok(snapshot)
    }

    fn apply_increase(
        &self,
        id: &TaskId,
        expected_version: u64,
        increase: &SurchargeIncrease,
    ) -> Result<Task, crate::store::RepositoryError> {
        self.inner.apply_increase(id, expected_version, increase)
    }

    fn transition(
        &self,
        id: &TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        assignee: Option<ContractorId>,
        at: DateTime<Utc>,
    ) -> Result<Task, crate::store::RepositoryError> {
        self.inner.transition(id, expected, next, assignee, at)
    }
}

/// Hands every caller the first `list_open` result, as overlapping ticks that scanned the same
/// documents would see it.
#[derive(Default)]
pub(super) struct SharedScan {
    pub(super) inner: InMemoryStore,
    snapshot: Mutex<Option<Vec<Task>>>,
}

impl TaskRepository for SharedScan {
    fn insert_task(&self, task: Task) -> Result<Task, crate::store::RepositoryError> {
        self.inner.insert_task(task)
    }

    fn fetch_task(&self, id: &TaskId) -> Result<Option<Task>, crate::store::RepositoryError> {
        self.inner.fetch_task(id)
    }

    fn list_open(&self) -> Result<Vec<Task>, crate::store::RepositoryError> {
        let mut snapshot = self.snapshot.lock().expect("snapshot mutex poisoned");
        if let Some(tasks) = snapshot.as_ref() {
            return Ok(tasks.clone());
        }
        let tasks = self.inner.list_open()?;
        *snapshot = Some(tasks.clone());
        Ok(tasks)
    }

    fn apply_increase(
        &self,
        id: &TaskId,
        expected_version: u64,
        increase: &SurchargeIncrease,
    ) -> Result<Task, crate::store::RepositoryError> {
        self.inner.apply_increase(id, expected_version, increase)
    }

    fn transition(
        &self,
        id: &TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        assignee: Option<ContractorId>,
        at: DateTime<Utc>,
    ) -> Result<Task, crate::store::RepositoryError> {
        self.inner.transition(id, expected, next, assignee, at)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
