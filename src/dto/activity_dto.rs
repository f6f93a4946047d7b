use crate::models::live_event::LiveAnswerEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectnessFilter {
    #[default]
    All,
    Correct,
    Incorrect,
    Pending,
}

/// Filter parameters, accepted both as a query string and as a WebSocket
/// text frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityQuery {
    pub content_id: Option<String>,
    pub filter: Option<CorrectnessFilter>,
    pub search: Option<String>,
    pub recent_only: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityView {
    pub class_id: String,
    pub content_id: Option<String>,
    pub entries: Vec<LiveAnswerEvent>,
    pub active_students: usize,
    pub total_events: usize,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub pending_count: usize,
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
}
