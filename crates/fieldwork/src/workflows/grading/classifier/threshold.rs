use serde::{Deserialize, Serialize};

use super::config::PolicyError;
use super::Classification;
use crate::workflows::grading::domain::Tier;
use crate::workflows::grading::metrics::PerformanceMetrics;

/// Minimum requirements (and a response-time ceiling) a contractor must meet for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCriteria {
    pub tier: Tier,
    pub min_completed_jobs: u32,
    pub min_average_rating: f64,
    pub min_quality_score: f64,
    pub max_response_minutes: f64,
    pub min_on_time_rate: f64,
    pub min_satisfaction_rate: f64,
}

impl TierCriteria {
    pub fn is_met(&self, metrics: &PerformanceMetrics) -> bool {
        self.unmet(metrics).is_empty()
    }

    /// Human readable list of the requirements `metrics` falls short of.
    pub fn unmet(&self, metrics: &PerformanceMetrics) -> Vec<String> {
        let mut gaps = Vec::new();

        if metrics.completed_jobs < self.min_completed_jobs {
            gaps.push(format!(
                "{} completed jobs, {} needs {}",
                metrics.completed_jobs, self.tier, self.min_completed_jobs
            ));
        }
        if metrics.average_rating < self.min_average_rating {
            gaps.push(format!(
                "average rating {:.2}, {} needs {:.2}",
                metrics.average_rating, self.tier, self.min_average_rating
            ));
        }
        if metrics.quality_score < self.min_quality_score {
            gaps.push(format!(
                "quality score {:.2}, {} needs {:.2}",
                metrics.quality_score, self.tier, self.min_quality_score
            ));
        }
        if metrics.response_time_minutes > self.max_response_minutes {
            gaps.push(format!(
                "response time {:.0} min, {} allows {:.0}",
                metrics.response_time_minutes, self.tier, self.max_response_minutes
            ));
        }
        if metrics.on_time_rate_percent < self.min_on_time_rate {
            gaps.push(format!(
                "on-time rate {:.0}%, {} needs {:.0}%",
                metrics.on_time_rate_percent, self.tier, self.min_on_time_rate
            ));
        }
        if metrics.has_recommendation_data()
            && metrics.recommendation_rate_percent < self.min_satisfaction_rate
        {
            gaps.push(format!(
                "satisfaction {:.0}%, {} needs {:.0}%",
                metrics.recommendation_rate_percent, self.tier, self.min_satisfaction_rate
            ));
        }

        gaps
    }
}

/// Ordered tier table. Rows are kept highest tier first; the first fully satisfied row wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    rows: Vec<TierCriteria>,
}

impl ThresholdTable {
    pub fn new(mut rows: Vec<TierCriteria>) -> Result<Self, PolicyError> {
        if rows.is_empty() {
            return Err(PolicyError::EmptyTable);
        }
        rows.sort_by(|a, b| b.tier.cmp(&a.tier));
        if let Some(pair) = rows.windows(2).find(|pair| pair[0].tier == pair[1].tier) {
            return Err(PolicyError::DuplicateTier(pair[0].tier));
        }
        Ok(Self { rows })
    }

    pub(super) fn validated(self) -> Result<Self, PolicyError> {
        Self::new(self.rows)
    }

    pub fn standard() -> Self {
        Self {
            rows: vec![
                TierCriteria {
                    tier: Tier::Platinum,
                    min_completed_jobs: 50,
                    min_average_rating: 4.5,
                    min_quality_score: 4.5,
                    max_response_minutes: 30.0,
                    min_on_time_rate: 95.0,
                    min_satisfaction_rate: 90.0,
                },
                TierCriteria {
                    tier: Tier::Gold,
                    min_completed_jobs: 30,
                    min_average_rating: 4.0,
                    min_quality_score: 4.0,
                    max_response_minutes: 60.0,
                    min_on_time_rate: 90.0,
                    min_satisfaction_rate: 80.0,
                },
                TierCriteria {
                    tier: Tier::Silver,
                    min_completed_jobs: 15,
                    min_average_rating: 3.5,
                    min_quality_score: 3.5,
                    max_response_minutes: 120.0,
                    min_on_time_rate: 80.0,
                    min_satisfaction_rate: 70.0,
                },
                TierCriteria {
                    tier: Tier::Bronze,
                    min_completed_jobs: 5,
                    min_average_rating: 3.0,
                    min_quality_score: 3.0,
                    max_response_minutes: 240.0,
                    min_on_time_rate: 70.0,
                    min_satisfaction_rate: 50.0,
                },
                TierCriteria {
                    tier: Tier::Standard,
                    min_completed_jobs: 0,
                    min_average_rating: 0.0,
                    min_quality_score: 0.0,
                    max_response_minutes: 480.0,
                    min_on_time_rate: 0.0,
                    min_satisfaction_rate: 0.0,
                },
            ],
        }
    }

    pub fn rows(&self) -> &[TierCriteria] {
        &self.rows
    }

    pub fn criteria_for(&self, tier: Tier) -> Option<&TierCriteria> {
        self.rows.iter().find(|row| row.tier == tier)
    }

    pub fn classify(&self, metrics: &PerformanceMetrics) -> Classification {
        let mut notes = Vec::new();

        for row in &self.rows {
            let gaps = row.unmet(metrics);
            if gaps.is_empty() {
                return Classification {
                    tier: row.tier,
                    score: metrics.average_rating,
                    notes,
                };
            }
            notes.extend(gaps);
        }

        // `new` rejects empty tables.
        let floor = self.rows.last().map(|row| row.tier).unwrap_or_else(Tier::lowest);
        Classification {
            tier: floor,
            score: metrics.average_rating,
            notes,
        }
    }
}
