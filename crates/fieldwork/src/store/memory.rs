use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::RepositoryError;
use crate::workflows::escalation::{SurchargeIncrease, Task, TaskId, TaskRepository, TaskStatus};
use crate::workflows::grading::{
    Contractor, ContractorFilter, ContractorId, ContractorRepository, EvaluationRecord,
    GradeAuditEntry, GradeCommit, JobCompletion,
};
use crate::workflows::notifications::{
    DeviceToken, DirectoryError, RecipientDirectory, RecipientId,
};

#[derive(Default)]
struct StoreState {
    contractors: HashMap<ContractorId, Contractor>,
    evaluations: HashMap<ContractorId, Vec<EvaluationRecord>>,
    evaluation_ids: HashSet<String>,
    completions: HashMap<ContractorId, Vec<JobCompletion>>,
    audit: HashMap<ContractorId, Vec<GradeAuditEntry>>,
    tasks: HashMap<TaskId, Task>,
    /// Devices for recipients that are not contractors (customers, staff).
    accounts: HashMap<RecipientId, Vec<DeviceToken>>,
}

/// Document store stand-in. Every write happens under one lock, so each conditional update is
/// atomic with respect to the others.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }

    /// Register push devices for a recipient. Contractors keep theirs on the contractor record;
    /// like pruning, this does not bump the contractor version. Returns the full device list.
    pub fn register_devices(
        &self,
        recipient: RecipientId,
        tokens: Vec<DeviceToken>,
    ) -> Result<Vec<DeviceToken>, RepositoryError> {
        let mut state = self.lock()?;
        let contractor_id = ContractorId(recipient.0.clone());
        let entry = match state.contractors.get_mut(&contractor_id) {
            Some(contractor) => &mut contractor.notification_targets,
            None => state.accounts.entry(recipient).or_default(),
        };
        for token in tokens {
            if !entry.contains(&token) {
                entry.push(token);
            }
        }
        Ok(entry.clone())
    }
}

impl ContractorRepository for InMemoryStore {
    fn insert_contractor(&self, contractor: Contractor) -> Result<Contractor, RepositoryError> {
        let mut state = self.lock()?;
        if state.contractors.contains_key(&contractor.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .contractors
            .insert(contractor.id.clone(), contractor.clone());
        Ok(contractor)
    }

    fn fetch_contractor(&self, id: &ContractorId) -> Result<Option<Contractor>, RepositoryError> {
        Ok(self.lock()?.contractors.get(id).cloned())
    }

    fn list_contractors(
        &self,
        filter: &ContractorFilter,
    ) -> Result<Vec<Contractor>, RepositoryError> {
        let state = self.lock()?;
        let mut matches: Vec<Contractor> = state
            .contractors
            .values()
            .filter(|contractor| filter.matches(contractor))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    fn append_evaluation(&self, record: EvaluationRecord) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if !state.contractors.contains_key(&record.contractor_id) {
            return Err(RepositoryError::NotFound);
        }
        if !state.evaluation_ids.insert(record.id.clone()) {
            return Err(RepositoryError::Conflict);
        }
        state
            .evaluations
            .entry(record.contractor_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    fn evaluations_for(&self, id: &ContractorId) -> Result<Vec<EvaluationRecord>, RepositoryError> {
        Ok(self
            .lock()?
            .evaluations
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    fn append_completion(&self, completion: JobCompletion) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if !state.contractors.contains_key(&completion.contractor_id) {
            return Err(RepositoryError::NotFound);
        }
        state
            .completions
            .entry(completion.contractor_id.clone())
            .or_default()
            .push(completion);
        Ok(())
    }

    fn completions_for(&self, id: &ContractorId) -> Result<Vec<JobCompletion>, RepositoryError> {
        Ok(self
            .lock()?
            .completions
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    fn commit_grade(&self, commit: GradeCommit) -> Result<Contractor, RepositoryError> {
        let mut state = self.lock()?;
        let contractor = state
            .contractors
            .get_mut(&commit.contractor_id)
            .ok_or(RepositoryError::NotFound)?;
        if contractor.version != commit.expected_version {
            return Err(RepositoryError::StaleVersion {
                expected: commit.expected_version,
                actual: contractor.version,
            });
        }

        contractor.tier = commit.tier;
        contractor.stats = commit.stats;
        contractor.completed_jobs = commit.completed_jobs;
        if let Some(change) = commit.transition {
            contractor.tier_history.push(change);
        }
        contractor.version += 1;
        contractor.updated_at = commit.at;
        let updated = contractor.clone();

        if let Some(entry) = commit.audit {
            state
                .audit
                .entry(commit.contractor_id)
                .or_default()
                .push(entry);
        }
        Ok(updated)
    }

    fn audit_entries(&self, id: &ContractorId) -> Result<Vec<GradeAuditEntry>, RepositoryError> {
        Ok(self.lock()?.audit.get(id).cloned().unwrap_or_default())
    }
}

impl TaskRepository for InMemoryStore {
    fn insert_task(&self, task: Task) -> Result<Task, RepositoryError> {
        let mut state = self.lock()?;
        if state.tasks.contains_key(&task.id) {
            return Err(RepositoryError::Conflict);
        }
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    fn fetch_task(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        Ok(self.lock()?.tasks.get(id).cloned())
    }

    fn list_open(&self) -> Result<Vec<Task>, RepositoryError> {
        let state = self.lock()?;
        let mut open: Vec<Task> = state
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Open)
            .cloned()
            .collect();
        open.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(open)
    }

    fn apply_increase(
        &self,
        id: &TaskId,
        expected_version: u64,
        increase: &SurchargeIncrease,
    ) -> Result<Task, RepositoryError> {
        let mut state = self.lock()?;
        let task = state.tasks.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if task.status != TaskStatus::Open || task.version != expected_version {
            return Err(RepositoryError::Conflict);
        }

        task.surcharge.apply(increase);
        task.version += 1;
        task.updated_at = increase.at;
        Ok(task.clone())
    }

    fn transition(
        &self,
        id: &TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        assignee: Option<ContractorId>,
        at: DateTime<Utc>,
    ) -> Result<Task, RepositoryError> {
        let mut state = self.lock()?;
        let task = state.tasks.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if task.status != expected {
            return Err(RepositoryError::Conflict);
        }

        task.status = next;
        task.assignee = assignee;
        task.version += 1;
        task.updated_at = at;
        Ok(task.clone())
    }
}

impl RecipientDirectory for InMemoryStore {
    fn targets(&self, recipient: &RecipientId) -> Result<Vec<DeviceToken>, DirectoryError> {
        let state = self
            .state
            .lock()
            .map_err(|_| DirectoryError::Unavailable("store lock poisoned".to_string()))?;

        let contractor_id = ContractorId(recipient.0.clone());
        if let Some(contractor) = state.contractors.get(&contractor_id) {
            return Ok(contractor.notification_targets.clone());
        }
        Ok(state.accounts.get(recipient).cloned().unwrap_or_default())
    }

    fn prune_target(
        &self,
        recipient: &RecipientId,
        token: &DeviceToken,
    ) -> Result<(), DirectoryError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DirectoryError::Unavailable("store lock poisoned".to_string()))?;

        let contractor_id = ContractorId(recipient.0.clone());
        if let Some(contractor) = state.contractors.get_mut(&contractor_id) {
            contractor.notification_targets.retain(|known| known != token);
        }
        if let Some(tokens) = state.accounts.get_mut(recipient) {
            tokens.retain(|known| known != token);
        }
        Ok(())
    }
}
