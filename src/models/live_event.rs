use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correctness {
    Correct,
    Incorrect,
    /// Not graded yet: the `correct` flag is unset.
    Pending,
}

/// A live answer observation, already defaulted from whatever the feed held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveAnswerEvent {
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub content_id: String,
    pub problem_index: i32,
    pub question_text: String,
    pub answer: String,
    pub answer_type: String,
    pub correct: Option<bool>,
    pub partial_credit: Option<f64>,
    pub score: f64,
    pub problem_points: f64,
    pub timestamp: DateTime<Utc>,
}

impl LiveAnswerEvent {
    pub fn correctness(&self) -> Correctness {
        match self.correct {
            Some(true) => Correctness::Correct,
            Some(false) => Correctness::Incorrect,
            None => Correctness::Pending,
        }
    }
}
