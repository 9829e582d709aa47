//! Offline CSV exports of evaluations and job completions.

mod parser;
mod report;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::workflows::grading::{ContractorId, EvaluationRecord, JobCompletion};

pub use parser::RowError;
pub use report::{GradeReport, GradeSummary};

#[derive(Debug)]
pub enum EvaluationImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row(RowError),
}

impl std::fmt::Display for EvaluationImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationImportError::Io(err) => write!(f, "failed to read export: {}", err),
            EvaluationImportError::Csv(err) => write!(f, "invalid CSV data: {}", err),
            EvaluationImportError::Row(err) => {
                write!(f, "invalid row at line {}: {}", err.line, err.message)
            }
        }
    }
}

impl std::error::Error for EvaluationImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvaluationImportError::Io(err) => Some(err),
            EvaluationImportError::Csv(err) => Some(err),
            EvaluationImportError::Row(_) => None,
        }
    }
}

impl From<std::io::Error> for EvaluationImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for EvaluationImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Evidence loaded from exports, grouped per contractor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeEvidence {
    pub evaluations: BTreeMap<ContractorId, Vec<EvaluationRecord>>,
    pub completions: BTreeMap<ContractorId, Vec<JobCompletion>>,
}

impl GradeEvidence {
    pub fn contractors(&self) -> Vec<ContractorId> {
        let mut ids: Vec<ContractorId> = self
            .evaluations
            .keys()
            .chain(self.completions.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn evaluations_for(&self, id: &ContractorId) -> &[EvaluationRecord] {
        self.evaluations.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn completions_for(&self, id: &ContractorId) -> &[JobCompletion] {
        self.completions.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub struct EvaluationCsvImporter;

impl EvaluationCsvImporter {
    pub fn from_path<P: AsRef<Path>>(
        evaluations: P,
        completions: Option<P>,
    ) -> Result<GradeEvidence, EvaluationImportError> {
        let evaluations = std::fs::File::open(evaluations)?;
        match completions {
            Some(path) => {
                let completions = std::fs::File::open(path)?;
                Self::from_reader(evaluations, Some(completions))
            }
            None => Self::from_reader(evaluations, None::<std::fs::File>),
        }
    }

    pub fn from_reader<R: Read, C: Read>(
        evaluations: R,
        completions: Option<C>,
    ) -> Result<GradeEvidence, EvaluationImportError> {
        let mut evidence = GradeEvidence::default();

        for record in parser::parse_evaluations(evaluations)? {
            evidence
                .evaluations
                .entry(record.contractor_id.clone())
                .or_default()
                .push(record);
        }

        if let Some(reader) = completions {
            for completion in parser::parse_completions(reader)? {
                evidence
                    .completions
                    .entry(completion.contractor_id.clone())
                    .or_default()
                    .push(completion);
            }
        }

        Ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::grading::{GradeClassifier, GradePolicy, PolicyKind, Tier};
    use std::io::Cursor;

    const EVALUATIONS: &str = "\u{feff}Evaluation ID,Contractor ID,Overall Score,Would Recommend,Created At,Punctuality,Cleanliness\n\
ev-1,c-1,4.5,yes,2025-03-01T10:00:00Z,5,4\n\
ev-2,c-1,,no,2025-03-02,3,\n\
ev-3,c-2,3.0,,,,\n";

    #[test]
    fn evaluations_group_by_contractor_with_category_columns() {
        let evidence =
            EvaluationCsvImporter::from_reader(Cursor::new(EVALUATIONS), None::<&[u8]>)
                .expect("import succeeds");

        let first = evidence.evaluations_for(&ContractorId("c-1".into()));
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].overall_score, Some(4.5));
        assert_eq!(first[0].would_recommend, Some(true));
        assert_eq!(first[0].category_scores.get("punctuality"), Some(&5.0));
        assert_eq!(first[0].category_scores.get("cleanliness"), Some(&4.0));
        assert_eq!(first[1].overall_score, None);
        assert_eq!(first[1].would_recommend, Some(false));
        assert!(!first[1].category_scores.contains_key("cleanliness"));

        assert_eq!(
            evidence.contractors(),
            vec![ContractorId("c-1".into()), ContractorId("c-2".into())]
        );
    }

    #[test]
    fn completions_are_attached_when_provided() {
        let completions = "task_id,contractor_id,response_minutes,completed_on_time,completed_at\n\
t-1,c-3,25,true,2025-03-04T08:00:00Z\n\
t-2,c-3,40,false,\n";
        let evidence = EvaluationCsvImporter::from_reader(
            Cursor::new("contractor_id,overall_score\n"),
            Some(Cursor::new(completions)),
        )
        .expect("import succeeds");

        let rows = evidence.completions_for(&ContractorId("c-3".into()));
        assert_eq!(rows.len(), 2);
        assert!(rows[0].completed_on_time);
        assert_eq!(rows[1].response_minutes, 40.0);
        assert_eq!(evidence.contractors(), vec![ContractorId("c-3".into())]);
    }

    #[test]
    fn completion_flags_accept_the_same_spellings_as_evaluations() {
        let completions = "Task ID,Contractor ID,Response Minutes,Completed On Time\n\
t-1,c-4,30,yes\n\
t-2,c-4,45,N\n\
t-3,c-4,20,1\n\
t-4,c-4,50,false\n";
        let evidence = EvaluationCsvImporter::from_reader(
            Cursor::new("contractor_id\n"),
            Some(Cursor::new(completions)),
        )
        .expect("import succeeds");

        let flags: Vec<bool> = evidence
            .completions_for(&ContractorId("c-4".into()))
            .iter()
            .map(|completion| completion.completed_on_time)
            .collect();
        assert_eq!(flags, vec![true, false, true, false]);
    }

    #[test]
    fn unreadable_completion_flags_report_their_line() {
        let completions = "task_id,contractor_id,response_minutes,completed_on_time\n\
t-1,c-4,30,yes\n\
t-2,c-4,45,no\n\
t-3,c-4,20,maybe\n";
        let error = EvaluationCsvImporter::from_reader(
            Cursor::new("contractor_id\n"),
            Some(Cursor::new(completions)),
        )
        .expect_err("expected row error");

        match error {
            EvaluationImportError::Row(row) => {
                assert_eq!(row.line, 4);
                assert!(row.message.contains("maybe"));
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_scores_report_their_line() {
        let csv = "contractor_id,overall_score\nc-1,4\nc-1,excellent\n";
        let error = EvaluationCsvImporter::from_reader(Cursor::new(csv), None::<&[u8]>)
            .expect_err("expected row error");

        match error {
            EvaluationImportError::Row(row) => {
                assert_eq!(row.line, 3);
                assert!(row.message.contains("excellent"));
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn missing_contractor_column_is_rejected() {
        let error = EvaluationCsvImporter::from_reader(
            Cursor::new("overall_score\n4\n"),
            None::<&[u8]>,
        )
        .expect_err("expected header error");
        assert!(matches!(
            error,
            EvaluationImportError::Row(RowError { line: 1, .. })
        ));
    }

    #[test]
    fn report_grades_each_contractor_offline() {
        let evidence =
            EvaluationCsvImporter::from_reader(Cursor::new(EVALUATIONS), None::<&[u8]>)
                .expect("import succeeds");
        let classifier = GradeClassifier::new(GradePolicy::standard(PolicyKind::Threshold));

        let report = GradeReport::build(&evidence, &classifier);

        assert_eq!(report.policy, PolicyKind::Threshold);
        assert_eq!(report.contractors.len(), 2);
        assert_eq!(report.contractors[0].evaluations, 2);
        assert_eq!(report.contractors[0].metrics.completed_jobs, 0);
        assert!(report
            .contractors
            .iter()
            .all(|summary| summary.tier == Tier::Standard));
        assert_eq!(report.distribution(), vec![(Tier::Standard, 2)]);
    }

    #[test]
    fn from_path_propagates_io_errors() {
        let error = EvaluationCsvImporter::from_path("./does-not-exist.csv", None)
            .expect_err("expected io error");
        assert!(matches!(error, EvaluationImportError::Io(_)));
    }
}
