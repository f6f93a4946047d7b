use crate::models::content::{ContentRef, ContentType, CurriculumTree};

pub struct CurriculumService;

impl CurriculumService {
    /// Depth-first scan: contents inside lessons first, in lesson order, then
    /// the lessons themselves. The first match wins.
    pub fn find(tree: &CurriculumTree, content_id: &str) -> Option<ContentRef> {
        let nested = tree
            .lessons
            .iter()
            .flat_map(|lesson| lesson.contents.iter())
            .find(|content| content.id == content_id)
            .cloned();

        nested.or_else(|| {
            tree.lessons
                .iter()
                .find(|lesson| lesson.id == content_id)
                .map(|lesson| ContentRef {
                    id: lesson.id.clone(),
                    title: lesson.title.clone(),
                    content_type: ContentType::Lesson,
                })
        })
    }

    /// Never fails: a missing tree or an unknown id yields the placeholder.
    pub fn resolve(tree: Option<&CurriculumTree>, content_id: &str) -> ContentRef {
        let mut found = tree
            .and_then(|t| Self::find(t, content_id))
            .unwrap_or_else(|| ContentRef::unknown(content_id));
        if found.title.trim().is_empty() {
            found.title = ContentRef::unknown(content_id).title;
        }
        found
    }
}
