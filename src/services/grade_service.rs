use crate::database::{AnswerSource, CurriculumSource, EnrollmentSource};
use crate::dto::answer_dto::parse_answer_documents;
use crate::dto::grades_dto::{ClassGradeSummary, GradeSummary};
use crate::error::{Error, Result};
use crate::models::answer_record::AnswerRecord;
use crate::models::class_info::ClassInfo;
use crate::models::content::CurriculumTree;
use crate::models::grade_row::GradeRow;
use crate::models::viewer::{Role, Viewer};
use crate::services::curriculum_service::CurriculumService;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;

/// `round(total / max * 100)`, or 0 when nothing was possible or the
/// inputs are not finite.
pub fn percentage(total: f64, max: f64) -> u32 {
    if !(total.is_finite() && max.is_finite()) || max <= 0.0 {
        return 0;
    }
    let pct = ((total / max) * 100.0).round();
    if pct.is_finite() {
        pct.clamp(0.0, u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Unweighted mean of row percentages, rounded to two decimals.
pub fn average_percentage(rows: &[GradeRow]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let sum: f64 = rows.iter().map(|r| r.percentage as f64).sum();
    (sum / rows.len() as f64 * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    /// The viewer's own answers, one row per content id.
    OwnByContent,
    /// One row per (student, content id).
    ByStudentAndContent,
}

#[derive(Debug, Default)]
struct Bucket {
    student_name: String,
    total: f64,
    max: f64,
    latest: Option<DateTime<Utc>>,
    count: usize,
}

#[derive(Clone)]
pub struct GradeService {
    fetch_timeout: Duration,
}

impl GradeService {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self { fetch_timeout }
    }

    pub async fn aggregate<S>(
        &self,
        store: &S,
        viewer: &Viewer,
        class_filter: Option<&str>,
    ) -> Result<Vec<GradeRow>>
    where
        S: AnswerSource + CurriculumSource + EnrollmentSource,
    {
        self.aggregate_at(store, viewer, class_filter, Utc::now()).await
    }

    /// Aggregation with an explicit clock; records carrying no timestamp at
    /// all are stamped with `now`.
    pub async fn aggregate_at<S>(
        &self,
        store: &S,
        viewer: &Viewer,
        class_filter: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<GradeRow>>
    where
        S: AnswerSource + CurriculumSource + EnrollmentSource,
    {
        let classes = self.viewable_classes(store, viewer, class_filter).await?;
        let grouping = match viewer.role {
            Role::Student => Grouping::OwnByContent,
            Role::Teacher | Role::Admin => Grouping::ByStudentAndContent,
        };

        let per_class = join_all(
            classes
                .iter()
                .map(|class| self.rows_for_class(store, viewer, class, grouping, now)),
        )
        .await;

        let mut rows: Vec<GradeRow> = per_class.into_iter().flatten().collect();
        sort_rows(&mut rows);

        tracing::debug!(
            viewer = %viewer.id,
            classes = classes.len(),
            rows = rows.len(),
            "Aggregated grade rows"
        );
        Ok(rows)
    }

    pub async fn viewable_classes<S>(
        &self,
        store: &S,
        viewer: &Viewer,
        class_filter: Option<&str>,
    ) -> Result<Vec<ClassInfo>>
    where
        S: EnrollmentSource,
    {
        let classes = timeout(self.fetch_timeout, store.classes_for(viewer))
            .await
            .map_err(|_| Error::Timeout("Fetching enrolled classes timed out".to_string()))??;

        match class_filter {
            None => Ok(classes),
            Some(wanted) => {
                let selected: Vec<ClassInfo> =
                    classes.into_iter().filter(|c| c.id == wanted).collect();
                if selected.is_empty() {
                    return Err(Error::Forbidden(format!(
                        "Class {} is not available to this user",
                        wanted
                    )));
                }
                Ok(selected)
            }
        }
    }

    async fn rows_for_class<S>(
        &self,
        store: &S,
        viewer: &Viewer,
        class: &ClassInfo,
        grouping: Grouping,
        now: DateTime<Utc>,
    ) -> Vec<GradeRow>
    where
        S: AnswerSource + CurriculumSource,
    {
        let docs = match timeout(self.fetch_timeout, store.fetch_answers(&class.id, None)).await {
            Ok(Ok(docs)) => docs,
            Ok(Err(e)) => {
                tracing::warn!(class_id = %class.id, error = %e, "Failed to fetch answers for class");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(class_id = %class.id, "Timed out fetching answers for class");
                return Vec::new();
            }
        };

        let records: Vec<AnswerRecord> = parse_answer_documents(&class.id, docs)
            .into_iter()
            .filter(AnswerRecord::counts_as_submitted)
            .filter(|r| grouping != Grouping::OwnByContent || r.student_id == viewer.id)
            .collect();
        if records.is_empty() {
            return Vec::new();
        }

        let curriculum = match timeout(self.fetch_timeout, store.fetch_curriculum(&class.id)).await {
            Ok(Ok(tree)) => tree,
            Ok(Err(e)) => {
                tracing::warn!(class_id = %class.id, error = %e, "Curriculum unavailable, using placeholder titles");
                None
            }
            Err(_) => {
                tracing::warn!(class_id = %class.id, "Timed out fetching curriculum, using placeholder titles");
                None
            }
        };

        build_rows(class, records, curriculum.as_ref(), now)
    }

    pub fn summarize(rows: &[GradeRow]) -> GradeSummary {
        let mut per_class: BTreeMap<&str, (String, Vec<GradeRow>)> = BTreeMap::new();
        for row in rows {
            per_class
                .entry(row.class_id.as_str())
                .or_insert_with(|| (row.class_name.clone(), Vec::new()))
                .1
                .push(row.clone());
        }

        GradeSummary {
            total_rows: rows.len(),
            average_percentage: average_percentage(rows),
            highest: rows.iter().map(|r| r.percentage).max(),
            lowest: rows.iter().map(|r| r.percentage).min(),
            by_class: per_class
                .into_iter()
                .map(|(class_id, (class_name, class_rows))| ClassGradeSummary {
                    class_id: class_id.to_string(),
                    class_name,
                    rows: class_rows.len(),
                    average_percentage: average_percentage(&class_rows),
                })
                .collect(),
        }
    }

    /// Case-insensitive match on student name, title and class name.
    pub fn search(rows: Vec<GradeRow>, term: Option<&str>) -> Vec<GradeRow> {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return rows;
        };
        let needle = term.to_lowercase();
        rows.into_iter()
            .filter(|r| {
                r.student_name.to_lowercase().contains(&needle)
                    || r.title.to_lowercase().contains(&needle)
                    || r.class_name.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

fn build_rows(
    class: &ClassInfo,
    records: Vec<AnswerRecord>,
    curriculum: Option<&CurriculumTree>,
    now: DateTime<Utc>,
) -> Vec<GradeRow> {
    let mut buckets: BTreeMap<(String, String), Bucket> = BTreeMap::new();
    for record in records {
        let at = record.effective_time().unwrap_or(now);
        let bucket = buckets
            .entry((record.student_id.clone(), record.content_id.clone()))
            .or_default();
        bucket.total += record.score;
        bucket.max += record.problem_points;
        bucket.count += 1;
        if bucket.latest.map_or(true, |latest| at > latest) {
            bucket.latest = Some(at);
            bucket.student_name = record.student_name;
        }
    }

    buckets
        .into_iter()
        .map(|((student_id, content_id), bucket)| {
            let content = CurriculumService::resolve(curriculum, &content_id);
            GradeRow {
                student_id,
                student_name: bucket.student_name,
                class_id: class.id.clone(),
                class_name: class.name.clone(),
                content_id,
                title: content.title,
                content_type: content.content_type,
                total_score: bucket.total,
                max_score: bucket.max,
                percentage: percentage(bucket.total, bucket.max),
                submitted_at: bucket.latest.unwrap_or(now),
                answer_count: bucket.count,
            }
        })
        .collect()
}

/// Newest first; ties fall back to (class, student, content) so repeated
/// runs return the same order.
fn sort_rows(rows: &mut [GradeRow]) {
    rows.sort_by(|a, b| {
        b.submitted_at
            .cmp(&a.submitted_at)
            .then_with(|| a.class_id.cmp(&b.class_id))
            .then_with(|| a.student_id.cmp(&b.student_id))
            .then_with(|| a.content_id.cmp(&b.content_id))
    });
}
