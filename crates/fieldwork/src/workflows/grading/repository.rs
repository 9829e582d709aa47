use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Contractor, ContractorFilter, ContractorId, EvaluationRecord, GradeAuditEntry, JobCompletion,
    Tier, TierChange,
};
use super::metrics::EvaluationStats;
pub use crate::store::RepositoryError;

/// One atomic write of a contractor's grade projection.
///
/// The store must reject the commit with [`RepositoryError::StaleVersion`] unless the stored
/// contractor is still at `expected_version`. `transition` is appended to the tier history and
/// `audit` to the audit log in the same write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeCommit {
    pub contractor_id: ContractorId,
    pub expected_version: u64,
    pub tier: Tier,
    pub stats: EvaluationStats,
    pub completed_jobs: u32,
    pub transition: Option<TierChange>,
    pub audit: Option<GradeAuditEntry>,
    pub at: DateTime<Utc>,
}

/// Storage abstraction for contractor records and their append-only evidence logs.
pub trait ContractorRepository: Send + Sync {
    fn insert_contractor(&self, contractor: Contractor) -> Result<Contractor, RepositoryError>;
    fn fetch_contractor(&self, id: &ContractorId) -> Result<Option<Contractor>, RepositoryError>;
    fn list_contractors(&self, filter: &ContractorFilter)
        -> Result<Vec<Contractor>, RepositoryError>;

    /// Append to the evaluation log. Re-submitting a known evaluation id yields
    /// [`RepositoryError::Conflict`].
    fn append_evaluation(&self, record: EvaluationRecord) -> Result<(), RepositoryError>;
    /// Evaluations in submission order.
    fn evaluations_for(&self, id: &ContractorId) -> Result<Vec<EvaluationRecord>, RepositoryError>;

    fn append_completion(&self, completion: JobCompletion) -> Result<(), RepositoryError>;
    fn completions_for(&self, id: &ContractorId) -> Result<Vec<JobCompletion>, RepositoryError>;

    fn commit_grade(&self, commit: GradeCommit) -> Result<Contractor, RepositoryError>;
    fn audit_entries(&self, id: &ContractorId) -> Result<Vec<GradeAuditEntry>, RepositoryError>;
}
