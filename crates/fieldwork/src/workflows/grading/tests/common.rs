use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::store::InMemoryStore;
use crate::workflows::escalation::TaskId;
use crate::workflows::grading::{
    Contractor, ContractorFilter, ContractorId, ContractorRepository, EvaluationRecord,
    GradeAuditEntry, GradeCommit, GradePolicy, GradingService, JobCompletion, PerformanceMetrics,
    PolicyKind, RepositoryError,
};
use crate::workflows::notifications::testing::RecordingNotifier;
use crate::workflows::notifications::DeviceToken;

pub(super) const CONTRACTOR: &str = "worker-17";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 2, 8, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn contractor_id() -> ContractorId {
    ContractorId(CONTRACTOR.to_string())
}

pub(super) fn contractor() -> Contractor {
    let mut contractor = Contractor::new(contractor_id(), "Priya Raman", now());
    contractor.notification_targets = vec![DeviceToken("fcm-token-priya-01".to_string())];
    contractor
}

pub(super) fn evaluation(
    id: &str,
    overall: f64,
    categories: &[(&str, f64)],
    recommend: Option<bool>,
) -> EvaluationRecord {
    EvaluationRecord {
        id: id.to_string(),
        contractor_id: contractor_id(),
        category_scores: categories
            .iter()
            .map(|(name, score)| (name.to_string(), *score))
            .collect::<BTreeMap<_, _>>(),
        overall_score: Some(overall),
        would_recommend: recommend,
        created_at: now(),
    }
}

pub(super) fn strong_evaluation(index: usize) -> EvaluationRecord {
    evaluation(
        &format!("ev-strong-{index}"),
        4.6,
        &[("quality", 4.6), ("communication", 4.7)],
        Some(true),
    )
}

pub(super) fn poor_evaluation() -> EvaluationRecord {
    evaluation(
        "ev-poor-1",
        1.0,
        &[("quality", 1.0), ("communication", 1.0)],
        Some(false),
    )
}

pub(super) fn completion(index: usize, on_time: bool, response_minutes: f64) -> JobCompletion {
    JobCompletion {
        task_id: TaskId(format!("task-{index}")),
        contractor_id: contractor_id(),
        response_minutes,
        completed_on_time: on_time,
        completed_at: now() - Duration::days(index as i64),
    }
}

/// 60 jobs, 57 of them on time (95%), accepted within 20 minutes.
pub(super) fn seed_top_completions(store: &InMemoryStore) {
    for index in 0..60 {
        store
            .append_completion(completion(index, index >= 3, 20.0))
            .expect("append completion");
    }
}

pub(super) fn metrics(
    completed_jobs: u32,
    rating: f64,
    quality: f64,
    response: f64,
    on_time: f64,
    satisfaction: f64,
) -> PerformanceMetrics {
    PerformanceMetrics {
        completed_jobs,
        average_rating: rating,
        quality_score: quality,
        category_averages: BTreeMap::new(),
        response_time_minutes: response,
        on_time_rate_percent: on_time,
        recommendation_rate_percent: satisfaction,
        recommendation_answers: 20,
    }
}

pub(super) fn build_service() -> (
    GradingService<InMemoryStore, RecordingNotifier>,
    Arc<InMemoryStore>,
    Arc<RecordingNotifier>,
) {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = GradingService::new(
        store.clone(),
        notifier.clone(),
        GradePolicy::standard(PolicyKind::Threshold),
    );
    service.register(contractor()).expect("register contractor");
    (service, store, notifier)
}

/// Store wrapper that loses a configurable number of commit races and counts reads.
#[derive(Default)]
pub(super) struct ContendedStore {
    pub(super) inner: InMemoryStore,
    pub(super) stale_commits: AtomicU32,
    pub(super) reads: AtomicU32,
}

impl ContendedStore {
    pub(super) fn losing(races: u32) -> Self {
        let store = Self::default();
        store.stale_commits.store(races, Ordering::SeqCst);
        store
    }

    pub(super) fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ContractorRepository for ContendedStore {
    fn insert_contractor(&self, contractor: Contractor) -> Result<Contractor, RepositoryError> {
        self.inner.insert_contractor(contractor)
    }

    fn fetch_contractor(&self, id: &ContractorId) -> Result<Option<Contractor>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_contractor(id)
    }

    fn list_contractors(
        &self,
        filter: &ContractorFilter,
    ) -> Result<Vec<Contractor>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.list_contractors(filter)
    }

    fn append_evaluation(&self, record: EvaluationRecord) -> Result<(), RepositoryError> {
        self.inner.append_evaluation(record)
    }

    fn evaluations_for(&self, id: &ContractorId) -> Result<Vec<EvaluationRecord>, RepositoryError> {
        self.inner.evaluations_for(id)
    }

    fn append_completion(&self, completion: JobCompletion) -> Result<(), RepositoryError> {
        self.inner.append_completion(completion)
    }

    fn completions_for(&self, id: &ContractorId) -> Result<Vec<JobCompletion>, RepositoryError> {
        self.inner.completions_for(id)
    }

    fn commit_grade(&self, commit: GradeCommit) -> Result<Contractor, RepositoryError> {
        let remaining = self.stale_commits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.stale_commits.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::StaleVersion {
                expected: commit.expected_version,
                actual: commit.expected_version + 1,
            });
        }
        self.inner.commit_grade(commit)
    }

    fn audit_entries(&self, id: &ContractorId) -> Result<Vec<GradeAuditEntry>, RepositoryError> {
        self.inner.audit_entries(id)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
