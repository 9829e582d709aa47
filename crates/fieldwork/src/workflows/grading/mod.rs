//! Contractor grade engine: metrics aggregation, tier classification and transition management.
//!
//! Evaluations and completions are append-only evidence. The contractor's tier is a cache over
//! that evidence, recomputed after every write and committed with an optimistic version check.

pub mod classifier;
pub mod domain;
pub mod metrics;
mod notices;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use classifier::{
    Classification, GradeClassifier, GradePolicy, MetricWeights, PolicyError, PolicyKind,
    ScoreBand, ThresholdTable, TierCriteria, WeightedPolicy,
};
pub use domain::{
    Actor, ActorRole, Contractor, ContractorFilter, ContractorId, ContractorView,
    EvaluationRecord, GradeAuditEntry, JobCompletion, Tier, TierChange,
};
pub use metrics::{aggregate, EvaluationStats, PerformanceMetrics};
pub use repository::{ContractorRepository, GradeCommit, RepositoryError};
pub use router::grading_router;
pub use service::{
    BatchItemError, BatchReport, GradingError, GradingService, RecomputeOutcome,
    RecomputeRequest, RecomputeStatus,
};
