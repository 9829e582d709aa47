use serde::{Deserialize, Serialize};

use super::config::PolicyError;
use super::Classification;
use crate::workflows::grading::domain::Tier;
use crate::workflows::grading::metrics::{
    clamp_metric, PerformanceMetrics, RATING_MAX, RESPONSE_MAX_MINUTES, RESPONSE_MIN_MINUTES,
};

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Rating,
    Quality,
    Volume,
    Responsiveness,
    Punctuality,
    Satisfaction,
}

/// Per-metric weights; must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    pub rating: f64,
    pub quality: f64,
    pub volume: f64,
    pub responsiveness: f64,
    pub punctuality: f64,
    pub satisfaction: f64,
}

impl MetricWeights {
    fn entries(&self) -> [(MetricKind, f64); 6] {
        [
            (MetricKind::Rating, self.rating),
            (MetricKind::Quality, self.quality),
            (MetricKind::Volume, self.volume),
            (MetricKind::Responsiveness, self.responsiveness),
            (MetricKind::Punctuality, self.punctuality),
            (MetricKind::Satisfaction, self.satisfaction),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.entries().iter().map(|(_, weight)| weight).sum()
    }
}

/// Lower bound, in 0–5 grade points, for a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub min_grade_points: f64,
    pub tier: Tier,
}

/// Weighted contribution of one metric, kept for audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub metric: MetricKind,
    /// 0–100.
    pub sub_score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPolicy {
    weights: MetricWeights,
    job_saturation: u32,
    max_response_minutes: f64,
    bands: Vec<ScoreBand>,
}

impl WeightedPolicy {
    pub fn new(
        weights: MetricWeights,
        job_saturation: u32,
        max_response_minutes: f64,
        mut bands: Vec<ScoreBand>,
    ) -> Result<Self, PolicyError> {
        if weights.entries().iter().any(|(_, weight)| *weight < 0.0) {
            return Err(PolicyError::NegativeWeight);
        }
        let sum = weights.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(PolicyError::WeightsDoNotSumToOne { sum });
        }
        if job_saturation == 0 {
            return Err(PolicyError::InvalidSaturation);
        }
        if max_response_minutes.is_nan() || max_response_minutes <= RESPONSE_MIN_MINUTES {
            return Err(PolicyError::InvalidResponseCeiling);
        }
        if bands.is_empty() {
            return Err(PolicyError::EmptyBands);
        }
        bands.sort_by(|a, b| b.min_grade_points.total_cmp(&a.min_grade_points));

        Ok(Self {
            weights,
            job_saturation,
            max_response_minutes: max_response_minutes.min(RESPONSE_MAX_MINUTES),
            bands,
        })
    }

    pub(super) fn validated(self) -> Result<Self, PolicyError> {
        Self::new(
            self.weights,
            self.job_saturation,
            self.max_response_minutes,
            self.bands,
        )
    }

    pub fn standard() -> Self {
        Self {
            weights: MetricWeights {
                rating: 0.30,
                quality: 0.20,
                volume: 0.15,
                responsiveness: 0.10,
                punctuality: 0.15,
                satisfaction: 0.10,
            },
            job_saturation: 50,
            max_response_minutes: RESPONSE_MAX_MINUTES,
            bands: Self::standard_bands(),
        }
    }

    /// Grade-point floors: 4.5 Platinum, 3.5 Gold, 2.5 Silver, 1.5 Bronze.
    pub fn standard_bands() -> Vec<ScoreBand> {
        [
            (4.5, Tier::Platinum),
            (3.5, Tier::Gold),
            (2.5, Tier::Silver),
            (1.5, Tier::Bronze),
        ]
        .into_iter()
        .map(|(min_grade_points, tier)| ScoreBand {
            min_grade_points,
            tier,
        })
        .collect()
    }

    pub fn weights(&self) -> &MetricWeights {
        &self.weights
    }

    /// Without any recommend answers the satisfaction component is left out and the
    /// remaining weights are scaled back up to 1.0.
    pub fn components(&self, metrics: &PerformanceMetrics) -> Vec<ScoreComponent> {
        let entries: Vec<(MetricKind, f64)> = self
            .weights
            .entries()
            .into_iter()
            .filter(|(metric, _)| {
                *metric != MetricKind::Satisfaction || metrics.has_recommendation_data()
            })
            .collect();
        let total: f64 = entries.iter().map(|(_, weight)| weight).sum();

        entries
            .into_iter()
            .map(|(metric, weight)| ScoreComponent {
                metric,
                sub_score: self.sub_score(metric, metrics),
                weight: if total > 0.0 { weight / total } else { 0.0 },
            })
            .collect()
    }

    /// Composite 0–100 score.
    pub fn composite(&self, metrics: &PerformanceMetrics) -> f64 {
        weighted_total(&self.components(metrics))
    }

    pub fn classify(&self, metrics: &PerformanceMetrics) -> Classification {
        let components = self.components(metrics);
        let composite = weighted_total(&components);
        let grade_points = composite / 20.0;

        let tier = self
            .bands
            .iter()
            .find(|band| grade_points >= band.min_grade_points)
            .map(|band| band.tier)
            .unwrap_or_else(Tier::lowest);

        let notes = components
            .iter()
            .filter(|component| component.sub_score < 100.0 && component.weight > 0.0)
            .map(|component| {
                format!(
                    "{:?} scored {:.0}/100 (weight {:.2})",
                    component.metric, component.sub_score, component.weight
                )
            })
            .collect();

        Classification {
            tier,
            score: composite,
            notes,
        }
    }

    fn sub_score(&self, metric: MetricKind, metrics: &PerformanceMetrics) -> f64 {
        let score = match metric {
            MetricKind::Rating => metrics.average_rating / RATING_MAX * 100.0,
            MetricKind::Quality => metrics.quality_score / RATING_MAX * 100.0,
            MetricKind::Volume => {
                let capped = metrics.completed_jobs.min(self.job_saturation);
                capped as f64 / self.job_saturation as f64 * 100.0
            }
            MetricKind::Responsiveness => {
                if !metrics.has_response_data() {
                    return 0.0;
                }
                let minutes = clamp_metric(
                    metrics.response_time_minutes,
                    RESPONSE_MIN_MINUTES,
                    self.max_response_minutes,
                );
                (self.max_response_minutes - minutes)
                    / (self.max_response_minutes - RESPONSE_MIN_MINUTES)
                    * 100.0
            }
            MetricKind::Punctuality => metrics.on_time_rate_percent,
            MetricKind::Satisfaction => metrics.recommendation_rate_percent,
        };
        score.clamp(0.0, 100.0)
    }
}

fn weighted_total(components: &[ScoreComponent]) -> f64 {
    let total: f64 = components
        .iter()
        .map(|component| component.sub_score * component.weight)
        .sum();
    clamp_metric(total, 0.0, 100.0)
}
