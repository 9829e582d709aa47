use serde::{Deserialize, Serialize};

use super::threshold::ThresholdTable;
use super::weighted::WeightedPolicy;
use crate::workflows::grading::domain::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Threshold,
    Weighted,
}

impl PolicyKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "threshold" | "table" => Some(Self::Threshold),
            "weighted" | "score" => Some(Self::Weighted),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PolicyKind::Threshold => "threshold",
            PolicyKind::Weighted => "weighted",
        }
    }
}

/// The single grading rubric, parameterized by policy choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GradePolicy {
    Threshold(ThresholdTable),
    Weighted(WeightedPolicy),
}

impl GradePolicy {
    pub fn standard(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Threshold => GradePolicy::Threshold(ThresholdTable::standard()),
            PolicyKind::Weighted => GradePolicy::Weighted(WeightedPolicy::standard()),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            GradePolicy::Threshold(_) => PolicyKind::Threshold,
            GradePolicy::Weighted(_) => PolicyKind::Weighted,
        }
    }

    /// Parse a custom policy definition, applying the same checks as the constructors.
    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        let policy: GradePolicy =
            serde_json::from_str(raw).map_err(|err| PolicyError::Malformed(err.to_string()))?;
        match policy {
            GradePolicy::Threshold(table) => Ok(GradePolicy::Threshold(table.validated()?)),
            GradePolicy::Weighted(weighted) => Ok(GradePolicy::Weighted(weighted.validated()?)),
        }
    }
}

/// Rejected policy definitions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("policy definition is malformed: {0}")]
    Malformed(String),
    #[error("threshold table has no tiers")]
    EmptyTable,
    #[error("tier {0} appears more than once in the threshold table")]
    DuplicateTier(Tier),
    #[error("metric weights must sum to 1.0, got {sum:.4}")]
    WeightsDoNotSumToOne { sum: f64 },
    #[error("metric weights must not be negative")]
    NegativeWeight,
    #[error("job saturation point must be greater than zero")]
    InvalidSaturation,
    #[error("response time ceiling must exceed one minute")]
    InvalidResponseCeiling,
    #[error("weighted policy has no score bands")]
    EmptyBands,
}
