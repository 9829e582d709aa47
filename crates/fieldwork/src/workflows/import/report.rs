use serde::Serialize;

use super::GradeEvidence;
use crate::workflows::grading::{
    aggregate, ContractorId, EvaluationStats, GradeClassifier, PerformanceMetrics, PolicyKind,
    Tier,
};

/// Grade one contractor would receive from the exported evidence alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeSummary {
    pub contractor_id: ContractorId,
    pub evaluations: usize,
    pub tier: Tier,
    pub score: f64,
    pub metrics: PerformanceMetrics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Offline classification of an export, nothing persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeReport {
    pub policy: PolicyKind,
    pub contractors: Vec<GradeSummary>,
}

impl GradeReport {
    pub fn build(evidence: &GradeEvidence, classifier: &GradeClassifier) -> Self {
        let contractors = evidence
            .contractors()
            .into_iter()
            .map(|id| {
                let evaluations = evidence.evaluations_for(&id);
                let stats = EvaluationStats::from_records(evaluations);
                let metrics = aggregate(&stats, evidence.completions_for(&id));
                let classification = classifier.classify(&metrics);
                GradeSummary {
                    contractor_id: id,
                    evaluations: evaluations.len(),
                    tier: classification.tier,
                    score: classification.score,
                    metrics,
                    notes: classification.notes,
                }
            })
            .collect();

        Self {
            policy: classifier.policy().kind(),
            contractors,
        }
    }

    /// Number of contractors per tier, highest tier first.
    pub fn distribution(&self) -> Vec<(Tier, usize)> {
        let mut counts: Vec<(Tier, usize)> = Vec::new();
        for summary in &self.contractors {
            match counts.iter_mut().find(|(tier, _)| *tier == summary.tier) {
                Some((_, count)) => *count += 1,
                None => counts.push((summary.tier, 1)),
            }
        }
        counts.sort_by(|a, b| b.0.cmp(&a.0));
        counts
    }
}
