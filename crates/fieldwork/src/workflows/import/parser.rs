use std::collections::BTreeMap;
use std::io::Read;

use chrono::{DateTime, NaiveDate, Utc};

use super::EvaluationImportError;
use crate::workflows::escalation::TaskId;
use crate::workflows::grading::{ContractorId, EvaluationRecord, JobCompletion};

const EVALUATION_ID: &str = "evaluation_id";
const CONTRACTOR_ID: &str = "contractor_id";
const OVERALL_SCORE: &str = "overall_score";
const WOULD_RECOMMEND: &str = "would_recommend";
const CREATED_AT: &str = "created_at";
const TASK_ID: &str = "task_id";
const RESPONSE_MINUTES: &str = "response_minutes";
const COMPLETED_ON_TIME: &str = "completed_on_time";
const COMPLETED_AT: &str = "completed_at";

/// A row that parsed as CSV but could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: u64,
    pub message: String,
}

/// Evaluation exports carry fixed columns plus one column per rating category.
pub(crate) fn parse_evaluations<R: Read>(
    reader: R,
) -> Result<Vec<EvaluationRecord>, EvaluationImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(normalize_header)
        .collect();

    let column = |name: &str| headers.iter().position(|header| header == name);
    let Some(contractor_col) = column(CONTRACTOR_ID) else {
        return Err(EvaluationImportError::Row(RowError {
            line: 1,
            message: format!("missing `{CONTRACTOR_ID}` column"),
        }));
    };
    let id_col = column(EVALUATION_ID);
    let overall_col = column(OVERALL_SCORE);
    let recommend_col = column(WOULD_RECOMMEND);
    let created_col = column(CREATED_AT);
    let fixed = [
        Some(contractor_col),
        id_col,
        overall_col,
        recommend_col,
        created_col,
    ];

    let mut records = Vec::new();
    for (index, row) in csv_reader.records().enumerate() {
        let row = row?;
        let line = row
            .position()
            .map(|position| position.line())
            .unwrap_or(index as u64 + 2);
        let field = |col: Option<usize>| {
            col.and_then(|col| row.get(col))
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };
        let row_error =
            |message: String| EvaluationImportError::Row(RowError { line, message });

        let Some(contractor) = field(Some(contractor_col)) else {
            return Err(row_error("contractor id is empty".to_string()));
        };

        let overall_score = field(overall_col)
            .map(|raw| {
                parse_score(raw).ok_or_else(|| row_error(format!("invalid score `{raw}`")))
            })
            .transpose()?;
        let would_recommend = field(recommend_col)
            .map(|raw| {
                parse_flag(raw).ok_or_else(|| row_error(format!("invalid flag `{raw}`")))
            })
            .transpose()?;
        let created_at = match field(created_col) {
            Some(raw) => parse_timestamp(raw)
                .ok_or_else(|| row_error(format!("invalid timestamp `{raw}`")))?,
            None => Utc::now(),
        };

        let mut category_scores = BTreeMap::new();
        for (col, header) in headers.iter().enumerate() {
            if fixed.contains(&Some(col)) {
                continue;
            }
            if let Some(raw) = field(Some(col)) {
                let score = parse_score(raw)
                    .ok_or_else(|| row_error(format!("invalid {header} score `{raw}`")))?;
                category_scores.insert(header.clone(), score);
            }
        }

        records.push(EvaluationRecord {
            id: field(id_col)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{contractor}-row-{line}")),
            contractor_id: ContractorId(contractor.to_string()),
            category_scores,
            overall_score,
            would_recommend,
            created_at,
        });
    }

    Ok(records)
}

pub(crate) fn parse_completions<R: Read>(
    reader: R,
) -> Result<Vec<JobCompletion>, EvaluationImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(normalize_header)
        .collect();

    let column = |name: &str| headers.iter().position(|header| header == name);
    let required = |name: &str| {
        column(name).ok_or_else(|| {
            EvaluationImportError::Row(RowError {
                line: 1,
                message: format!("missing `{name}` column"),
            })
        })
    };
    let task_col = required(TASK_ID)?;
    let contractor_col = required(CONTRACTOR_ID)?;
    let response_col = required(RESPONSE_MINUTES)?;
    let on_time_col = required(COMPLETED_ON_TIME)?;
    let completed_col = column(COMPLETED_AT);

    let mut completions = Vec::new();
    for (index, row) in csv_reader.records().enumerate() {
        let row = row?;
        let line = row
            .position()
            .map(|position| position.line())
            .unwrap_or(index as u64 + 2);
        let field = |col: Option<usize>| {
            col.and_then(|col| row.get(col))
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };
        let row_error =
            |message: String| EvaluationImportError::Row(RowError { line, message });

        let Some(task_id) = field(Some(task_col)) else {
            return Err(row_error("task id is empty".to_string()));
        };
        let Some(contractor) = field(Some(contractor_col)) else {
            return Err(row_error("contractor id is empty".to_string()));
        };
        let raw_response = field(Some(response_col)).unwrap_or_default();
        let response_minutes = parse_score(raw_response)
            .ok_or_else(|| row_error(format!("invalid response time `{raw_response}`")))?;
        let raw_on_time = field(Some(on_time_col)).unwrap_or_default();
        let completed_on_time = parse_flag(raw_on_time)
            .ok_or_else(|| row_error(format!("invalid flag `{raw_on_time}`")))?;
        let completed_at = match field(completed_col) {
            Some(raw) => parse_timestamp(raw)
                .ok_or_else(|| row_error(format!("invalid timestamp `{raw}`")))?,
            None => Utc::now(),
        };

        completions.push(JobCompletion {
            task_id: TaskId(task_id.to_string()),
            contractor_id: ContractorId(contractor.to_string()),
            response_minutes,
            completed_on_time,
            completed_at,
        });
    }

    Ok(completions)
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

fn parse_score(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
