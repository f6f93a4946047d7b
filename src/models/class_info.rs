use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    #[serde(alias = "teacherId")]
    pub teacher_id: String,
    #[serde(default, alias = "studentIds")]
    pub student_ids: Vec<String>,
}

impl ClassInfo {
    pub fn has_student(&self, student_id: &str) -> bool {
        self.student_ids.iter().any(|s| s == student_id)
    }
}
