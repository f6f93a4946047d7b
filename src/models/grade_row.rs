use super::content::ContentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived on every load from answer records and the curriculum; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRow {
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub class_name: String,
    pub content_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: u32,
    pub submitted_at: DateTime<Utc>,
    pub answer_count: usize,
}
