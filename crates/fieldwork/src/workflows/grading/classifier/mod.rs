mod config;
mod threshold;
mod weighted;

pub use config::{GradePolicy, PolicyError, PolicyKind};
pub use threshold::{ThresholdTable, TierCriteria};
pub use weighted::{MetricKind, MetricWeights, ScoreBand, ScoreComponent, WeightedPolicy};

use super::domain::Tier;
use super::metrics::PerformanceMetrics;
use serde::{Deserialize, Serialize};

/// Stateless classifier applying the configured policy to a metrics bundle.
#[derive(Debug, Clone)]
pub struct GradeClassifier {
    policy: GradePolicy,
}

impl GradeClassifier {
    pub fn new(policy: GradePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GradePolicy {
        &self.policy
    }

    pub fn classify(&self, metrics: &PerformanceMetrics) -> Classification {
        match &self.policy {
            GradePolicy::Threshold(table) => table.classify(metrics),
            GradePolicy::Weighted(policy) => policy.classify(metrics),
        }
    }
}

/// Classifier output with the evidence trail used for audits and downgrade guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub tier: Tier,
    /// Average rating under the threshold policy, 0–100 composite under the weighted policy.
    pub score: f64,
    pub notes: Vec<String>,
}
