use serde::{Deserialize, Serialize};

pub const UNKNOWN_CONTENT_TITLE: &str = "Unknown Assignment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Lesson,
    #[default]
    #[serde(alias = "homework", alias = "problem")]
    Assignment,
    #[serde(alias = "test", alias = "exam")]
    Quiz,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub content_type: ContentType,
}

impl ContentRef {
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: UNKNOWN_CONTENT_TITLE.to_string(),
            content_type: ContentType::Assignment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "content")]
    pub contents: Vec<ContentRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurriculumTree {
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}
