use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::classifier::{Classification, GradeClassifier, GradePolicy};
use super::domain::{
    Actor, Contractor, ContractorFilter, ContractorId, EvaluationRecord, GradeAuditEntry,
    JobCompletion, Tier, TierChange,
};
use super::metrics::{aggregate, EvaluationStats, PerformanceMetrics};
use super::notices::tier_change_message;
use super::repository::{ContractorRepository, GradeCommit, RepositoryError};
use crate::workflows::notifications::{DispatchStatus, Notifier, RecipientId};

/// Re-derivations allowed after losing an optimistic-concurrency race.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Grade transition manager: recomputes a contractor's tier and commits transitions.
pub struct GradingService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    classifier: Arc<GradeClassifier>,
}

impl<R, N> Clone for GradingService<R, N> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            notifier: self.notifier.clone(),
            classifier: self.classifier.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeStatus {
    /// Nothing changed; no write was issued.
    Unchanged,
    /// Cached statistics were refreshed, tier unchanged.
    Refreshed,
    /// The tier changed and the transition was committed.
    Transitioned,
    /// Concurrent writers kept winning; this invocation's decision was dropped.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeOutcome {
    pub contractor_id: ContractorId,
    pub status: RecomputeStatus,
    pub previous_tier: Tier,
    pub tier: Tier,
    pub score: f64,
    pub metrics: PerformanceMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<TierChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<DispatchStatus>,
}

/// Administrator recomputation scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RecomputeRequest {
    Single { contractor_id: ContractorId },
    Filter(ContractorFilter),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub contractor_id: ContractorId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: Vec<RecomputeOutcome>,
    pub failed: Vec<BatchItemError>,
}

impl BatchReport {
    pub fn transitions(&self) -> usize {
        self.succeeded
            .iter()
            .filter(|outcome| outcome.status == RecomputeStatus::Transitioned)
            .count()
    }
}

impl<R, N> GradingService<R, N>
where
    R: ContractorRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, policy: GradePolicy) -> Self {
        Self {
            repository,
            notifier,
            classifier: Arc::new(GradeClassifier::new(policy)),
        }
    }

    pub fn classifier(&self) -> &GradeClassifier {
        &self.classifier
    }

    pub fn register(&self, contractor: Contractor) -> Result<Contractor, GradingError> {
        let registered = self.repository.insert_contractor(contractor)?;
        info!(contractor = %registered.id, tier = %registered.tier, "contractor registered");
        Ok(registered)
    }

    pub fn contractor(&self, id: &ContractorId) -> Result<Contractor, GradingError> {
        self.repository
            .fetch_contractor(id)?
            .ok_or_else(|| GradingError::ContractorNotFound(id.clone()))
    }

    pub fn history(&self, id: &ContractorId) -> Result<Vec<TierChange>, GradingError> {
        Ok(self.contractor(id)?.tier_history)
    }

    pub fn audit_log(&self, id: &ContractorId) -> Result<Vec<GradeAuditEntry>, GradingError> {
        self.contractor(id)?;
        Ok(self.repository.audit_entries(id)?)
    }

    /// Persist a new evaluation and regrade its contractor.
    ///
    /// Re-delivery of an evaluation that is already stored still regrades, which is a no-op when
    /// the earlier delivery already committed.
    pub async fn record_evaluation(
        &self,
        record: EvaluationRecord,
    ) -> Result<RecomputeOutcome, GradingError> {
        let contractor_id = record.contractor_id.clone();
        self.contractor(&contractor_id)?;

        match self.repository.append_evaluation(record) {
            Ok(()) => {}
            Err(RepositoryError::Conflict) => {
                debug!(contractor = %contractor_id, "evaluation already recorded");
            }
            Err(err) => return Err(err.into()),
        }

        self.recompute(&contractor_id).await
    }

    pub async fn record_completion(
        &self,
        completion: JobCompletion,
    ) -> Result<RecomputeOutcome, GradingError> {
        let contractor_id = completion.contractor_id.clone();
        self.contractor(&contractor_id)?;
        self.repository.append_completion(completion)?;
        self.recompute(&contractor_id).await
    }

    pub async fn recompute(&self, id: &ContractorId) -> Result<RecomputeOutcome, GradingError> {
        self.recompute_at(id, Utc::now()).await
    }

    /// Recompute `id` as of `now`. Decisions are derived from persisted state only, so repeated or
    /// overlapping invocations converge.
    pub async fn recompute_at(
        &self,
        id: &ContractorId,
        now: DateTime<Utc>,
    ) -> Result<RecomputeOutcome, GradingError> {
        let mut last_attempt = (PerformanceMetrics::zero(), 0.0);
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let contractor = self.contractor(id)?;
            let evaluations = self.repository.evaluations_for(id)?;
            let completions = self.repository.completions_for(id)?;

            let stats = EvaluationStats::from_records(&evaluations);
            let metrics = aggregate(&stats, &completions);
            let classification = self.classifier.classify(&metrics);
            last_attempt = (metrics.clone(), classification.score);

            let result = if classification.tier == contractor.tier {
                self.refresh(&contractor, stats, metrics, classification, now)
            } else {
                self.transition(&contractor, stats, metrics, classification, now)
                    .await
            };

            match result {
                Err(GradingError::Repository(RepositoryError::StaleVersion { .. })) => {
                    debug!(contractor = %id, attempt, "grade commit lost a race, re-reading");
                }
                other => return other,
            }
        }

        warn!(contractor = %id, "grade recomputation superseded by concurrent writers");
        let contractor = self.contractor(id)?;
        let (metrics, score) = last_attempt;
        Ok(RecomputeOutcome {
            contractor_id: id.clone(),
            status: RecomputeStatus::Superseded,
            previous_tier: contractor.tier,
            tier: contractor.tier,
            score,
            metrics,
            transition: None,
            notification: None,
        })
    }

    fn refresh(
        &self,
        contractor: &Contractor,
        stats: EvaluationStats,
        metrics: PerformanceMetrics,
        classification: Classification,
        now: DateTime<Utc>,
    ) -> Result<RecomputeOutcome, GradingError> {
        let unchanged =
            contractor.stats == stats && contractor.completed_jobs == metrics.completed_jobs;

        if !unchanged {
            self.repository.commit_grade(GradeCommit {
                contractor_id: contractor.id.clone(),
                expected_version: contractor.version,
                tier: contractor.tier,
                stats,
                completed_jobs: metrics.completed_jobs,
                transition: None,
                audit: None,
                at: now,
            })?;
        }

        Ok(RecomputeOutcome {
            contractor_id: contractor.id.clone(),
            status: if unchanged {
                RecomputeStatus::Unchanged
            } else {
                RecomputeStatus::Refreshed
            },
            previous_tier: contractor.tier,
            tier: contractor.tier,
            score: classification.score,
            metrics,
            transition: None,
            notification: None,
        })
    }

    async fn transition(
        &self,
        contractor: &Contractor,
        stats: EvaluationStats,
        metrics: PerformanceMetrics,
        classification: Classification,
        now: DateTime<Utc>,
    ) -> Result<RecomputeOutcome, GradingError> {
        let change = TierChange {
            from: contractor.tier,
            to: classification.tier,
            at: now,
            score: metrics.average_rating,
        };
        let audit = GradeAuditEntry {
            id: Uuid::new_v4(),
            contractor_id: contractor.id.clone(),
            from: change.from,
            to: change.to,
            at: now,
            policy: self.classifier.policy().kind(),
            score: classification.score,
            metrics: metrics.clone(),
            notes: classification.notes.clone(),
        };

        let committed = self.repository.commit_grade(GradeCommit {
            contractor_id: contractor.id.clone(),
            expected_version: contractor.version,
            tier: change.to,
            stats,
            completed_jobs: metrics.completed_jobs,
            transition: Some(change.clone()),
            audit: Some(audit),
            at: now,
        })?;

        let direction = if change.is_upgrade() {
            "upgrade"
        } else {
            "downgrade"
        };
        metrics::counter!("grade_transitions_total", "direction" => direction).increment(1);
        info!(
            contractor = %committed.id,
            from = %change.from,
            to = %change.to,
            score = change.score,
            direction,
            "contractor tier changed"
        );

        let message = tier_change_message(&committed, &change, &classification.notes);
        let recipients = [RecipientId::from(&committed.id)];
        let report = self.notifier.notify(&recipients, message).await;
        let notification = report.status();
        if notification == DispatchStatus::Failed {
            warn!(contractor = %committed.id, "tier change notification was not delivered");
        }

        Ok(RecomputeOutcome {
            contractor_id: committed.id.clone(),
            status: RecomputeStatus::Transitioned,
            previous_tier: change.from,
            tier: change.to,
            score: classification.score,
            metrics,
            transition: Some(change),
            notification: Some(notification),
        })
    }

    /// Administrator-triggered recomputation. Item failures are collected, never fatal.
    pub async fn recompute_batch(
        &self,
        actor: &Actor,
        request: RecomputeRequest,
    ) -> Result<BatchReport, GradingError> {
        if !actor.can_recompute_grades() {
            warn!(actor = %actor.id, role = ?actor.role, "rejected grade recomputation");
            return Err(GradingError::Unauthorized {
                actor: actor.id.clone(),
                action: "recompute grades",
            });
        }

        let ids: Vec<ContractorId> = match request {
            RecomputeRequest::Single { contractor_id } => vec![contractor_id],
            RecomputeRequest::Filter(filter) => self
                .repository
                .list_contractors(&filter)?
                .into_iter()
                .map(|contractor| contractor.id)
                .collect(),
        };

        let now = Utc::now();
        let results = join_all(ids.iter().map(|id| self.recompute_at(id, now))).await;

        let mut report = BatchReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(err) => {
                    warn!(contractor = %id, error = %err, "batch recomputation item failed");
                    report.failed.push(BatchItemError {
                        contractor_id: id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            actor = %actor.id,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            transitions = report.transitions(),
            "batch grade recomputation finished"
        );
        Ok(report)
    }
}

/// Error raised by the grading service.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("contractor {0} not found")]
    ContractorNotFound(ContractorId),
    #[error("{actor} is not allowed to {action}")]
    Unauthorized { actor: String, action: &'static str },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
