use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Completed,
    Graded,
    #[default]
    Pending,
}

impl SubmissionStatus {
    /// Unknown or missing statuses are treated as drafts.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("submitted") => SubmissionStatus::Submitted,
            Some("completed") => SubmissionStatus::Completed,
            Some("graded") => SubmissionStatus::Graded,
            _ => SubmissionStatus::Pending,
        }
    }
}

/// One student's answer to one problem of one content item.
///
/// Keyed by `(class_id, content_id, student_id, problem_index)`; a
/// re-submission replaces the record under the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub content_id: String,
    pub problem_index: i32,
    pub score: f64,
    pub problem_points: f64,
    pub submitted: bool,
    pub status: SubmissionStatus,
    pub updated_at: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl AnswerRecord {
    pub fn counts_as_submitted(&self) -> bool {
        self.submitted
            || matches!(
                self.status,
                SubmissionStatus::Submitted | SubmissionStatus::Completed
            )
    }

    /// `updated_at`, then `timestamp`, then `submitted_at`.
    pub fn effective_time(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.timestamp).or(self.submitted_at)
    }
}
