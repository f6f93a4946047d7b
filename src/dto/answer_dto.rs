use crate::models::answer_record::{AnswerRecord, SubmissionStatus};
use crate::utils::time::deserialize_optional_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

/// Raw answer document as the store hands it back. Field names arrive in
/// either snake_case or camelCase.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerDocument {
    #[serde(default, alias = "studentId")]
    #[validate(length(min = 1))]
    pub student_id: String,
    #[serde(default, alias = "studentName")]
    pub student_name: Option<String>,
    #[serde(default, alias = "classId")]
    pub class_id: Option<String>,
    #[serde(default, alias = "contentId")]
    #[validate(length(min = 1))]
    pub content_id: String,
    #[serde(default, alias = "problemIndex", deserialize_with = "lenient_i32")]
    pub problem_index: i32,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[validate(range(min = 0.0))]
    pub score: f64,
    #[serde(
        default,
        alias = "problemPoints",
        alias = "maxPoints",
        deserialize_with = "lenient_f64"
    )]
    #[validate(range(min = 0.0))]
    pub problem_points: f64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub submitted: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "updatedAt", deserialize_with = "deserialize_optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "submittedAt", deserialize_with = "deserialize_optional_timestamp")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl AnswerDocument {
    pub fn into_record(self, fallback_class_id: &str) -> AnswerRecord {
        AnswerRecord {
            student_name: self
                .student_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| self.student_id.clone()),
            student_id: self.student_id,
            class_id: self
                .class_id
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| fallback_class_id.to_string()),
            content_id: self.content_id,
            problem_index: self.problem_index,
            score: self.score,
            problem_points: self.problem_points,
            submitted: self.submitted,
            status: SubmissionStatus::parse_lenient(self.status.as_deref()),
            updated_at: self.updated_at,
            timestamp: self.timestamp,
            submitted_at: self.submitted_at,
        }
    }
}

/// Numbers sometimes arrive as strings; anything unparsable or non-finite
/// counts as zero.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = JsonValue::deserialize(deserializer)?;
    let value = match raw {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value.filter(|v| v.is_finite()).unwrap_or(0.0))
}

/// Null, out-of-range or non-numeric indexes fall back to problem 0.
fn lenient_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = JsonValue::deserialize(deserializer)?;
    let index = match raw {
        JsonValue::Number(n) => n.as_i64().and_then(|i| i32::try_from(i).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(index.unwrap_or(0))
}

/// Only a literal `true` marks a document as submitted.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = JsonValue::deserialize(deserializer)?;
    Ok(matches!(raw, JsonValue::Bool(true)))
}

pub fn parse_answer_document(class_id: &str, doc: JsonValue) -> crate::error::Result<AnswerRecord> {
    let parsed: AnswerDocument = serde_json::from_value(doc)?;
    parsed.validate()?;
    Ok(parsed.into_record(class_id))
}

/// Parses every document for a class, skipping (and logging) the ones that
/// do not describe a usable answer.
pub fn parse_answer_documents(class_id: &str, docs: Vec<JsonValue>) -> Vec<AnswerRecord> {
    let mut records = Vec::with_capacity(docs.len());
    for doc in docs {
        match parse_answer_document(class_id, doc) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(class_id, error = %e, "Skipping malformed answer document"),
        }
    }
    records
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAnswerPayload {
    #[validate(length(min = 1))]
    pub student_id: String,
    pub student_name: Option<String>,
    #[validate(length(min = 1))]
    pub content_id: String,
    #[validate(range(min = 0))]
    pub problem_index: i32,
    #[validate(range(min = 0.0))]
    pub score: f64,
    #[validate(range(min = 0.0))]
    pub problem_points: f64,
    pub question_text: Option<String>,
    pub answer: Option<JsonValue>,
    pub answer_type: Option<String>,
    pub correct: Option<bool>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub partial_credit: Option<f64>,
    pub status: Option<SubmissionStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub saved: bool,
    pub class_id: String,
    pub content_id: String,
    pub problem_index: i32,
    pub timestamp: DateTime<Utc>,
}
