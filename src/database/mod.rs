//! Typed boundaries to the document store.
//!
//! The aggregator and the activity service only talk to the traits below;
//! `DocumentStore` picks the backing implementation at startup.

pub mod memory_store;
pub mod pg_store;
pub mod pool;

use crate::error::Result;
use crate::models::answer_record::AnswerRecord;
use crate::models::class_info::ClassInfo;
use crate::models::content::CurriculumTree;
use crate::models::viewer::Viewer;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

pub use memory_store::MemoryStore;
pub use pg_store::PgStore;

pub trait AnswerSource: Send + Sync {
    /// Raw answer documents for a class, optionally narrowed to one content id.
    fn fetch_answers(
        &self,
        class_id: &str,
        content_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<JsonValue>>> + Send;

    fn upsert_answer(&self, record: &AnswerRecord) -> impl Future<Output = Result<()>> + Send;
}

pub trait CurriculumSource: Send + Sync {
    fn fetch_curriculum(
        &self,
        class_id: &str,
    ) -> impl Future<Output = Result<Option<CurriculumTree>>> + Send;
}

pub trait EnrollmentSource: Send + Sync {
    /// Students get the classes they are enrolled in, teachers the classes
    /// they teach, admins every class.
    fn classes_for(&self, viewer: &Viewer) -> impl Future<Output = Result<Vec<ClassInfo>>> + Send;
}

/// Seed file layout: classes, raw curriculum trees and raw answer
/// documents keyed by class id.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub classes: Vec<ClassInfo>,
    pub curricula: HashMap<String, JsonValue>,
    pub answers: HashMap<String, Vec<JsonValue>>,
}

impl SeedData {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Clone)]
pub enum DocumentStore {
    Memory(MemoryStore),
    Postgres(PgStore),
}

impl AnswerSource for DocumentStore {
    async fn fetch_answers(&self, class_id: &str, content_id: Option<&str>) -> Result<Vec<JsonValue>> {
        match self {
            DocumentStore::Memory(store) => store.fetch_answers(class_id, content_id).await,
            DocumentStore::Postgres(store) => store.fetch_answers(class_id, content_id).await,
        }
    }

    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<()> {
        match self {
            DocumentStore::Memory(store) => store.upsert_answer(record).await,
            DocumentStore::Postgres(store) => store.upsert_answer(record).await,
        }
    }
}

impl CurriculumSource for DocumentStore {
    async fn fetch_curriculum(&self, class_id: &str) -> Result<Option<CurriculumTree>> {
        match self {
            DocumentStore::Memory(store) => store.fetch_curriculum(class_id).await,
            DocumentStore::Postgres(store) => store.fetch_curriculum(class_id).await,
        }
    }
}

impl EnrollmentSource for DocumentStore {
    async fn classes_for(&self, viewer: &Viewer) -> Result<Vec<ClassInfo>> {
        match self {
            DocumentStore::Memory(store) => store.classes_for(viewer).await,
            DocumentStore::Postgres(store) => store.classes_for(viewer).await,
        }
    }
}

/// Store key of an answer document: `content/student/problem`.
pub fn answer_key(content_id: &str, student_id: &str, problem_index: i32) -> String {
    format!("{}/{}/{}", content_id, student_id, problem_index)
}

/// Curriculum documents that do not fit the tree shape degrade to `None`.
pub fn parse_curriculum(class_id: &str, raw: JsonValue) -> Option<CurriculumTree> {
    match serde_json::from_value::<CurriculumTree>(raw) {
        Ok(tree) => Some(tree),
        Err(e) => {
            tracing::warn!(class_id, error = %e, "Ignoring malformed curriculum document");
            None
        }
    }
}
