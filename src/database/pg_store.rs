use super::{parse_curriculum, AnswerSource, CurriculumSource, EnrollmentSource, SeedData};
use crate::dto::answer_dto::parse_answer_documents;
use crate::error::Result;
use crate::models::answer_record::AnswerRecord;
use crate::models::class_info::ClassInfo;
use crate::models::content::CurriculumTree;
use crate::models::viewer::{Role, Viewer};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

const CLASS_SELECT: &str = r#"
    SELECT c.id, c.name, c.teacher_id,
           COALESCE(
               array_agg(cs.student_id ORDER BY cs.student_id) FILTER (WHERE cs.student_id IS NOT NULL),
               '{}'
           ) AS student_ids
    FROM classes c
    LEFT JOIN class_students cs ON cs.class_id = c.id
"#;

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_class(&self, class: &ClassInfo) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO classes (id, name, teacher_id) VALUES ($1, $2, $3)
               ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, teacher_id = EXCLUDED.teacher_id"#,
        )
        .bind(&class.id)
        .bind(&class.name)
        .bind(&class.teacher_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM class_students WHERE class_id = $1")
            .bind(&class.id)
            .execute(&mut *tx)
            .await?;
        for student_id in &class.student_ids {
            sqlx::query("INSERT INTO class_students (class_id, student_id) VALUES ($1, $2)")
                .bind(&class.id)
                .bind(student_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_curriculum_document(&self, class_id: &str, raw: JsonValue) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO curricula (class_id, tree) VALUES ($1, $2)
               ON CONFLICT (class_id) DO UPDATE SET tree = EXCLUDED.tree, updated_at = NOW()"#,
        )
        .bind(class_id)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts every class, curriculum and answer in the seed. Answer
    /// documents go through the same parsing edge as reads, so malformed
    /// ones are skipped.
    pub async fn seed(&self, seed: SeedData) -> Result<()> {
        for class in &seed.classes {
            self.upsert_class(class).await?;
        }
        for (class_id, tree) in seed.curricula {
            self.set_curriculum_document(&class_id, tree).await?;
        }
        let mut answers = 0usize;
        for (class_id, docs) in seed.answers {
            for record in parse_answer_documents(&class_id, docs) {
                self.upsert_answer(&record).await?;
                answers += 1;
            }
        }
        tracing::info!(classes = seed.classes.len(), answers, "Seeded PostgreSQL document store");
        Ok(())
    }
}

fn class_from_row(row: &sqlx::postgres::PgRow) -> Result<ClassInfo> {
    Ok(ClassInfo {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        teacher_id: row.try_get("teacher_id")?,
        student_ids: row.try_get("student_ids")?,
    })
}

impl AnswerSource for PgStore {
    async fn fetch_answers(&self, class_id: &str, content_id: Option<&str>) -> Result<Vec<JsonValue>> {
        let rows = sqlx::query(
            r#"SELECT document FROM answers
               WHERE class_id = $1 AND ($2::text IS NULL OR content_id = $2)
               ORDER BY content_id, student_id, problem_index"#,
        )
        .bind(class_id)
        .bind(content_id)
        .fetch_all(&self.pool)
        .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            docs.push(row.try_get::<JsonValue, _>("document")?);
        }
        Ok(docs)
    }

    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<()> {
        let document = serde_json::to_value(record)?;
        sqlx::query(
            r#"INSERT INTO answers (class_id, content_id, student_id, problem_index, document)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (class_id, content_id, student_id, problem_index)
               DO UPDATE SET document = EXCLUDED.document, updated_at = NOW()"#,
        )
        .bind(&record.class_id)
        .bind(&record.content_id)
        .bind(&record.student_id)
        .bind(record.problem_index)
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl CurriculumSource for PgStore {
    async fn fetch_curriculum(&self, class_id: &str) -> Result<Option<CurriculumTree>> {
        let row = sqlx::query("SELECT tree FROM curricula WHERE class_id = $1")
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let raw: JsonValue = row.try_get("tree")?;
        Ok(parse_curriculum(class_id, raw))
    }
}

impl EnrollmentSource for PgStore {
    async fn classes_for(&self, viewer: &Viewer) -> Result<Vec<ClassInfo>> {
        let rows = match viewer.role {
            Role::Admin => {
                sqlx::query(&format!("{} GROUP BY c.id ORDER BY c.name", CLASS_SELECT))
                    .fetch_all(&self.pool)
                    .await?
            }
            Role::Teacher => {
                sqlx::query(&format!(
                    "{} WHERE c.teacher_id = $1 GROUP BY c.id ORDER BY c.name",
                    CLASS_SELECT
                ))
                .bind(&viewer.id)
                .fetch_all(&self.pool)
                .await?
            }
            Role::Student => {
                sqlx::query(&format!(
                    "{} WHERE EXISTS (SELECT 1 FROM class_students me WHERE me.class_id = c.id AND me.student_id = $1)
                     GROUP BY c.id ORDER BY c.name",
                    CLASS_SELECT
                ))
                .bind(&viewer.id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(class_from_row).collect()
    }
}
