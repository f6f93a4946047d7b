use super::{
    answer_key, parse_curriculum, AnswerSource, CurriculumSource, EnrollmentSource, SeedData,
};
use crate::error::{Error, Result};
use crate::models::answer_record::AnswerRecord;
use crate::models::class_info::ClassInfo;
use crate::models::content::CurriculumTree;
use crate::models::viewer::{Role, Viewer};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct MemoryData {
    classes: BTreeMap<String, ClassInfo>,
    curricula: HashMap<String, JsonValue>,
    /// class id -> answer key -> raw document
    answers: HashMap<String, BTreeMap<String, JsonValue>>,
}

/// Document store held in process memory. Documents are kept raw so the
/// same parsing edge runs as against the database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let store = Self::new();
        for class in seed.classes {
            store.insert_class(class);
        }
        for (class_id, tree) in seed.curricula {
            store.set_curriculum_document(&class_id, tree);
        }
        for (class_id, docs) in seed.answers {
            for doc in docs {
                store.insert_answer_document(&class_id, doc);
            }
        }
        store
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_seed(SeedData::from_file(path)?))
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryData> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryData> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_class(&self, class: ClassInfo) {
        self.write().classes.insert(class.id.clone(), class);
    }

    pub fn set_curriculum(&self, class_id: &str, tree: &CurriculumTree) -> Result<()> {
        let raw = serde_json::to_value(tree)?;
        self.set_curriculum_document(class_id, raw);
        Ok(())
    }

    pub fn set_curriculum_document(&self, class_id: &str, raw: JsonValue) {
        self.write().curricula.insert(class_id.to_string(), raw);
    }

    /// Stores a raw document as-is. Documents missing their identifying
    /// fields get a synthetic key so they are still returned by fetches.
    pub fn insert_answer_document(&self, class_id: &str, doc: JsonValue) {
        let mut data = self.write();
        let bucket = data.answers.entry(class_id.to_string()).or_default();
        let key = document_key(&doc).unwrap_or_else(|| format!("raw/{}", bucket.len()));
        bucket.insert(key, doc);
    }
}

fn document_key(doc: &JsonValue) -> Option<String> {
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| doc.get(*n).and_then(JsonValue::as_str))
            .map(str::to_string)
    };
    let content_id = field(&["content_id", "contentId"])?;
    let student_id = field(&["student_id", "studentId"])?;
    // An index that does not fit gets a synthetic key rather than
    // overwriting problem 0.
    let problem_index = match ["problem_index", "problemIndex"]
        .iter()
        .find_map(|n| doc.get(*n).and_then(JsonValue::as_i64))
    {
        Some(i) => i32::try_from(i).ok()?,
        None => 0,
    };
    Some(answer_key(&content_id, &student_id, problem_index))
}

fn document_content_id(doc: &JsonValue) -> Option<&str> {
    doc.get("content_id")
        .or_else(|| doc.get("contentId"))
        .and_then(JsonValue::as_str)
}

impl AnswerSource for MemoryStore {
    async fn fetch_answers(&self, class_id: &str, content_id: Option<&str>) -> Result<Vec<JsonValue>> {
        let data = self.read();
        if !data.classes.contains_key(class_id) {
            return Err(Error::NotFound(format!("Class {} not found", class_id)));
        }
        let docs = data
            .answers
            .get(class_id)
            .map(|bucket| {
                bucket
                    .values()
                    .filter(|doc| match content_id {
                        Some(wanted) => document_content_id(doc) == Some(wanted),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<()> {
        let doc = serde_json::to_value(record)?;
        let key = answer_key(&record.content_id, &record.student_id, record.problem_index);
        self.write()
            .answers
            .entry(record.class_id.clone())
            .or_default()
            .insert(key, doc);
        Ok(())
    }
}

impl CurriculumSource for MemoryStore {
    async fn fetch_curriculum(&self, class_id: &str) -> Result<Option<CurriculumTree>> {
        let raw = self.read().curricula.get(class_id).cloned();
        Ok(raw.and_then(|raw| parse_curriculum(class_id, raw)))
    }
}

impl EnrollmentSource for MemoryStore {
    async fn classes_for(&self, viewer: &Viewer) -> Result<Vec<ClassInfo>> {
        let data = self.read();
        let classes = data
            .classes
            .values()
            .filter(|class| match viewer.role {
                Role::Admin => true,
                Role::Teacher => class.teacher_id == viewer.id,
                Role::Student => class.has_student(&viewer.id),
            })
            .cloned()
            .collect();
        Ok(classes)
    }
}
