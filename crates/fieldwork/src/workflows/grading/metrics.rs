use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::domain::{EvaluationRecord, JobCompletion};

pub const RATING_MIN: f64 = 0.0;
pub const RATING_MAX: f64 = 5.0;
pub const RESPONSE_MIN_MINUTES: f64 = 1.0;
pub const RESPONSE_MAX_MINUTES: f64 = 480.0;

/// Clamp into `[min, max]`; NaN collapses to `min`.
pub(crate) fn clamp_metric(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Running mean for one evaluation category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryAverage {
    pub count: u64,
    pub average: f64,
}

/// Cached statistics over a contractor's evaluation log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub total_evaluations: u64,
    /// Evaluations that carried an overall or category score.
    pub rated_evaluations: u64,
    pub average_score: f64,
    pub categories: BTreeMap<String, CategoryAverage>,
    pub recommendation_answers: u64,
    pub recommendations: u64,
}

impl EvaluationStats {
    /// Fold one more evaluation into the statistics without revisiting earlier records.
    pub fn combine(mut self, record: &EvaluationRecord) -> Self {
        self.total_evaluations += 1;

        if let Some(rating) = record_rating(record) {
            self.rated_evaluations += 1;
            self.average_score += (rating - self.average_score) / self.rated_evaluations as f64;
        }

        for (category, raw) in &record.category_scores {
            let score = clamp_metric(*raw, RATING_MIN, RATING_MAX);
            let entry = self.categories.entry(category.clone()).or_default();
            entry.count += 1;
            entry.average += (score - entry.average) / entry.count as f64;
        }

        if let Some(recommend) = record.would_recommend {
            self.recommendation_answers += 1;
            if recommend {
                self.recommendations += 1;
            }
        }

        self
    }

    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a EvaluationRecord>,
    {
        records
            .into_iter()
            .fold(EvaluationStats::default(), EvaluationStats::combine)
    }

    pub fn category_averages(&self) -> BTreeMap<String, f64> {
        self.categories
            .iter()
            .map(|(name, category)| (name.clone(), category.average))
            .collect()
    }
}

/// The rating an evaluation contributes: its overall score, else the mean of its categories.
fn record_rating(record: &EvaluationRecord) -> Option<f64> {
    if let Some(overall) = record.overall_score {
        return Some(clamp_metric(overall, RATING_MIN, RATING_MAX));
    }
    if record.category_scores.is_empty() {
        return None;
    }
    let sum: f64 = record
        .category_scores
        .values()
        .map(|score| clamp_metric(*score, RATING_MIN, RATING_MAX))
        .sum();
    Some(sum / record.category_scores.len() as f64)
}

/// Normalized inputs to the grade classifier. Every field is within its documented range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub completed_jobs: u32,
    /// 0–5.
    pub average_rating: f64,
    /// Mean of the category averages, 0–5.
    pub quality_score: f64,
    pub category_averages: BTreeMap<String, f64>,
    /// 1–480 minutes, or 0 when there are no completed jobs.
    pub response_time_minutes: f64,
    /// 0–100.
    pub on_time_rate_percent: f64,
    /// 0–100; meaningless when `recommendation_answers` is zero.
    pub recommendation_rate_percent: f64,
    pub recommendation_answers: u64,
}

impl PerformanceMetrics {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn has_response_data(&self) -> bool {
        self.response_time_minutes > 0.0
    }

    /// Evaluations may omit the recommend question entirely; no answers is no data, not 0%.
    pub fn has_recommendation_data(&self) -> bool {
        self.recommendation_answers > 0
    }
}

/// Reduce cached evaluation statistics and completion records to a metrics bundle.
///
/// Completions are de-duplicated by task id, since the completion feed is at-least-once.
pub fn aggregate(stats: &EvaluationStats, completions: &[JobCompletion]) -> PerformanceMetrics {
    let mut seen = BTreeSet::new();
    let unique: Vec<&JobCompletion> = completions
        .iter()
        .filter(|completion| seen.insert(completion.task_id.clone()))
        .collect();

    let (response_time_minutes, on_time_rate_percent) = if unique.is_empty() {
        (0.0, 0.0)
    } else {
        let count = unique.len() as f64;
        let response_sum: f64 = unique
            .iter()
            .map(|completion| {
                clamp_metric(
                    completion.response_minutes,
                    RESPONSE_MIN_MINUTES,
                    RESPONSE_MAX_MINUTES,
                )
            })
            .sum();
        let on_time = unique
            .iter()
            .filter(|completion| completion.completed_on_time)
            .count() as f64;
        (response_sum / count, on_time * 100.0 / count)
    };

    let category_averages: BTreeMap<String, f64> = stats
        .categories
        .iter()
        .map(|(name, category)| {
            (
                name.clone(),
                clamp_metric(category.average, RATING_MIN, RATING_MAX),
            )
        })
        .collect();

    let quality_score = if category_averages.is_empty() {
        0.0
    } else {
        category_averages.values().sum::<f64>() / category_averages.len() as f64
    };

    let recommendation_rate_percent = if stats.recommendation_answers == 0 {
        0.0
    } else {
        stats.recommendations as f64 * 100.0 / stats.recommendation_answers as f64
    };

    PerformanceMetrics {
        completed_jobs: unique.len().min(u32::MAX as usize) as u32,
        average_rating: clamp_metric(stats.average_score, RATING_MIN, RATING_MAX),
        quality_score,
        category_averages,
        response_time_minutes,
        on_time_rate_percent: clamp_metric(on_time_rate_percent, 0.0, 100.0),
        recommendation_rate_percent: clamp_metric(recommendation_rate_percent, 0.0, 100.0),
        recommendation_answers: stats.recommendation_answers,
    }
}
