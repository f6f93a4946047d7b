use crate::models::grade_row::GradeRow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GradesQuery {
    pub class_id: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassGradeSummary {
    pub class_id: String,
    pub class_name: String,
    pub rows: usize,
    pub average_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeSummary {
    pub total_rows: usize,
    /// Unweighted mean of the per-row percentages.
    pub average_percentage: f64,
    pub highest: Option<u32>,
    pub lowest: Option<u32>,
    pub by_class: Vec<ClassGradeSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradesResponse {
    pub rows: Vec<GradeRow>,
    pub summary: GradeSummary,
}
