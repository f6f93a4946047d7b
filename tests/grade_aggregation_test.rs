use chrono::{DateTime, Duration, TimeZone, Utc};
use gradebook_backend::database::{
    AnswerSource, CurriculumSource, EnrollmentSource, MemoryStore,
};
use gradebook_backend::error::{Error, Result};
use gradebook_backend::models::answer_record::AnswerRecord;
use gradebook_backend::models::class_info::ClassInfo;
use gradebook_backend::models::content::{
    ContentRef, ContentType, CurriculumTree, Lesson, UNKNOWN_CONTENT_TITLE,
};
use gradebook_backend::models::viewer::{Role, Viewer};
use gradebook_backend::services::grade_service::GradeService;
use serde_json::{json, Value as JsonValue};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn class(id: &str, name: &str, teacher: &str, students: &[&str]) -> ClassInfo {
    ClassInfo {
        id: id.to_string(),
        name: name.to_string(),
        teacher_id: teacher.to_string(),
        student_ids: students.iter().map(|s| s.to_string()).collect(),
    }
}

fn answer(
    student: &str,
    content: &str,
    problem: i32,
    score: f64,
    max: f64,
    status: &str,
    minutes: i64,
) -> JsonValue {
    json!({
        "studentId": student,
        "studentName": format!("Student {}", student),
        "contentId": content,
        "problemIndex": problem,
        "score": score,
        "problemPoints": max,
        "status": status,
        "updatedAt": (base_time() + Duration::minutes(minutes)).to_rfc3339(),
    })
}

fn curriculum() -> CurriculumTree {
    CurriculumTree {
        lessons: vec![Lesson {
            id: "l1".into(),
            title: "Fractions".into(),
            contents: vec![
                ContentRef {
                    id: "q1".into(),
                    title: "Fraction quiz".into(),
                    content_type: ContentType::Quiz,
                },
                ContentRef {
                    id: "hw1".into(),
                    title: "Fraction homework".into(),
                    content_type: ContentType::Assignment,
                },
            ],
        }],
    }
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_class(class("c1", "Math 7A", "t1", &["s1", "s2"]));
    store.insert_class(class("c2", "Science 7A", "t1", &["s1"]));
    store.insert_class(class("c3", "History", "t2", &["s2"]));
    store.set_curriculum("c1", &curriculum()).unwrap();
    store
}

fn student(id: &str) -> Viewer {
    Viewer::new(id, format!("Student {}", id), Role::Student)
}

fn teacher(id: &str) -> Viewer {
    Viewer::new(id, "Teacher", Role::Teacher)
}

fn service() -> GradeService {
    GradeService::new(std::time::Duration::from_secs(5))
}

#[tokio::test]
async fn two_submitted_answers_make_one_row() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 8.0, 10.0, "submitted", 1));
    store.insert_answer_document("c1", answer("s1", "q1", 1, 2.0, 10.0, "submitted", 2));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.content_id, "q1");
    assert_eq!(row.total_score, 10.0);
    assert_eq!(row.max_score, 20.0);
    assert_eq!(row.percentage, 50);
    assert_eq!(row.title, "Fraction quiz");
    assert_eq!(row.content_type, ContentType::Quiz);
    assert_eq!(row.class_name, "Math 7A");
    assert_eq!(row.answer_count, 2);
    assert_eq!(row.submitted_at, base_time() + Duration::minutes(2));
}

#[tokio::test]
async fn content_with_only_pending_answers_is_dropped() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 5.0, 10.0, "pending", 1));
    store.insert_answer_document("c1", answer("s1", "q1", 1, 5.0, 10.0, "pending", 2));
    store.insert_answer_document("c1", answer("s1", "hw1", 0, 3.0, 4.0, "completed", 3));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content_id, "hw1");
    assert_eq!(rows[0].percentage, 75);
}

#[tokio::test]
async fn pending_answers_do_not_count_towards_a_submitted_content() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 4.0, 5.0, "submitted", 1));
    store.insert_answer_document("c1", answer("s1", "q1", 1, 0.0, 5.0, "pending", 2));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    assert_eq!(rows[0].max_score, 5.0);
    assert_eq!(rows[0].percentage, 80);
}

#[tokio::test]
async fn submitted_flag_counts_but_graded_status_alone_does_not() {
    let store = seeded_store();
    let mut flagged = answer("s1", "q1", 0, 1.0, 2.0, "graded", 1);
    flagged["submitted"] = json!(true);
    store.insert_answer_document("c1", flagged);
    store.insert_answer_document("c1", answer("s1", "hw1", 0, 2.0, 2.0, "graded", 2));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content_id, "q1");
}

#[tokio::test]
async fn zero_possible_points_yield_zero_percent() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 0.0, 0.0, "submitted", 1));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].max_score, 0.0);
    assert_eq!(rows[0].percentage, 0);
}

#[tokio::test]
async fn students_only_see_their_own_answers() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 1.0, 1.0, "submitted", 1));
    store.insert_answer_document("c1", answer("s2", "q1", 0, 0.0, 1.0, "submitted", 2));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].student_id, "s1");
    assert_eq!(rows[0].percentage, 100);
}

#[tokio::test]
async fn teacher_view_has_one_row_per_student_per_content_newest_first() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 1.0, 1.0, "submitted", 10));
    store.insert_answer_document("c1", answer("s2", "q1", 0, 0.0, 1.0, "submitted", 30));
    store.insert_answer_document("c1", answer("s2", "hw1", 0, 1.0, 2.0, "completed", 5));
    store.insert_answer_document("c2", answer("s1", "lab1", 0, 3.0, 3.0, "submitted", 20));
    store.insert_answer_document("c3", answer("s2", "essay", 0, 3.0, 3.0, "submitted", 40));

    let rows = service().aggregate(&store, &teacher("t1"), None).await.unwrap();

    assert_eq!(rows.len(), 4, "class c3 belongs to another teacher");
    assert!(rows
        .windows(2)
        .all(|pair| pair[0].submitted_at >= pair[1].submitted_at));
    assert_eq!(rows[0].student_id, "s2");
    assert_eq!(rows[0].content_id, "q1");
    let lab = rows.iter().find(|r| r.content_id == "lab1").unwrap();
    assert_eq!(lab.class_name, "Science 7A");
    assert_eq!(lab.title, UNKNOWN_CONTENT_TITLE);
}

#[tokio::test]
async fn admins_see_every_class() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 1.0, 1.0, "submitted", 1));
    store.insert_answer_document("c3", answer("s2", "essay", 0, 3.0, 3.0, "submitted", 2));

    let admin = Viewer::new("a1", "Admin", Role::Admin);
    let rows = service().aggregate(&store, &admin, None).await.unwrap();

    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn aggregation_is_idempotent() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 1.0, 2.0, "submitted", 1));
    store.insert_answer_document("c1", answer("s2", "q1", 0, 2.0, 2.0, "submitted", 1));
    store.insert_answer_document(
        "c1",
        json!({"studentId": "s2", "contentId": "hw1", "score": 1, "problemPoints": 1, "submitted": true}),
    );

    let now = base_time() + Duration::days(1);
    let svc = service();
    let first = svc.aggregate_at(&store, &teacher("t1"), None, now).await.unwrap();
    let second = svc.aggregate_at(&store, &teacher("t1"), None, now).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    let untimed = first.iter().find(|r| r.content_id == "hw1").unwrap();
    assert_eq!(untimed.submitted_at, now);
}

#[tokio::test]
async fn submitted_at_prefers_updated_at_then_timestamp_then_submitted_at() {
    let store = seeded_store();
    let t = |m: i64| (base_time() + Duration::minutes(m)).to_rfc3339();
    store.insert_answer_document(
        "c1",
        json!({
            "studentId": "s1", "contentId": "q1", "problemIndex": 0,
            "score": 1, "problemPoints": 1, "status": "submitted",
            "updatedAt": t(5), "timestamp": t(50), "submittedAt": t(60)
        }),
    );
    store.insert_answer_document(
        "c1",
        json!({
            "studentId": "s1", "contentId": "q1", "problemIndex": 1,
            "score": 1, "problemPoints": 1, "status": "submitted",
            "timestamp": t(7), "submittedAt": t(90)
        }),
    );
    store.insert_answer_document(
        "c1",
        json!({
            "studentId": "s1", "contentId": "hw1", "problemIndex": 0,
            "score": 1, "problemPoints": 1, "status": "submitted",
            "submittedAt": t(3)
        }),
    );

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    let quiz = rows.iter().find(|r| r.content_id == "q1").unwrap();
    assert_eq!(quiz.submitted_at, base_time() + Duration::minutes(7));
    let homework = rows.iter().find(|r| r.content_id == "hw1").unwrap();
    assert_eq!(homework.submitted_at, base_time() + Duration::minutes(3));
}

#[tokio::test]
async fn average_is_the_unweighted_mean_of_row_percentages() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 1.0, 1.0, "submitted", 1));
    store.insert_answer_document("c1", answer("s1", "hw1", 0, 0.0, 9.0, "submitted", 2));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();
    let summary = GradeService::summarize(&rows);

    assert_eq!(summary.total_rows, 2);
    assert_eq!(summary.average_percentage, 50.0);
    assert_eq!(summary.highest, Some(100));
    assert_eq!(summary.lowest, Some(0));
    assert_eq!(summary.by_class.len(), 1);
    assert_eq!(summary.by_class[0].class_id, "c1");
}

#[tokio::test]
async fn class_filter_outside_viewer_classes_is_forbidden() {
    let store = seeded_store();

    let result = service().aggregate(&store, &teacher("t1"), Some("c3")).await;

    assert!(matches!(result, Err(Error::Forbidden(_))));
}

#[tokio::test]
async fn search_matches_student_title_and_class() {
    let store = seeded_store();
    store.insert_answer_document("c1", answer("s1", "q1", 0, 1.0, 1.0, "submitted", 1));
    store.insert_answer_document("c2", answer("s1", "lab1", 0, 1.0, 1.0, "submitted", 2));

    let rows = service().aggregate(&store, &teacher("t1"), None).await.unwrap();

    assert_eq!(GradeService::search(rows.clone(), Some("fraction")).len(), 1);
    assert_eq!(GradeService::search(rows.clone(), Some("SCIENCE")).len(), 1);
    assert_eq!(GradeService::search(rows.clone(), Some("student s1")).len(), 2);
    assert_eq!(GradeService::search(rows, Some("  ")).len(), 2);
}

/// Wraps the memory store and breaks or stalls selected classes.
struct FlakyStore {
    inner: MemoryStore,
    broken: &'static str,
    slow: &'static str,
}

impl AnswerSource for FlakyStore {
    async fn fetch_answers(&self, class_id: &str, content_id: Option<&str>) -> Result<Vec<JsonValue>> {
        if class_id == self.broken {
            return Err(Error::Internal("permission denied".to_string()));
        }
        if class_id == self.slow {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        }
        self.inner.fetch_answers(class_id, content_id).await
    }

    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<()> {
        self.inner.upsert_answer(record).await
    }
}

impl CurriculumSource for FlakyStore {
    async fn fetch_curriculum(&self, class_id: &str) -> Result<Option<CurriculumTree>> {
        if class_id == "c1" {
            return Err(Error::Internal("curriculum offline".to_string()));
        }
        self.inner.fetch_curriculum(class_id).await
    }
}

impl EnrollmentSource for FlakyStore {
    async fn classes_for(&self, viewer: &Viewer) -> Result<Vec<ClassInfo>> {
        self.inner.classes_for(viewer).await
    }
}

#[tokio::test]
async fn failing_or_stalled_classes_do_not_abort_the_others() {
    let inner = seeded_store();
    inner.insert_class(class("c4", "Art", "t1", &["s1"]));
    inner.insert_answer_document("c1", answer("s1", "q1", 0, 1.0, 2.0, "submitted", 1));
    inner.insert_answer_document("c2", answer("s1", "lab1", 0, 1.0, 1.0, "submitted", 2));
    inner.insert_answer_document("c4", answer("s1", "sketch", 0, 1.0, 1.0, "submitted", 3));
    let store = FlakyStore {
        inner,
        broken: "c2",
        slow: "c4",
    };

    let svc = GradeService::new(std::time::Duration::from_millis(100));
    let rows = svc.aggregate(&store, &teacher("t1"), None).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].class_id, "c1");
    assert_eq!(rows[0].title, UNKNOWN_CONTENT_TITLE, "curriculum failure degrades titles only");
    assert_eq!(rows[0].percentage, 50);
}

#[tokio::test]
async fn malformed_documents_are_skipped() {
    let store = seeded_store();
    store.insert_answer_document("c1", json!({"studentId": "s1", "score": 3, "submitted": true}));
    store.insert_answer_document("c1", json!({"studentId": "s1", "contentId": "q1", "problemIndex": 5, "submitted": "yes"}));
    store.insert_answer_document("c1", answer("s1", "q1", 0, 1.0, 4.0, "submitted", 1));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].percentage, 25);
}

#[tokio::test]
async fn explicit_null_submitted_flag_still_counts_a_submitted_status() {
    let store = seeded_store();
    store.insert_answer_document(
        "c1",
        json!({
            "studentId": "s1",
            "contentId": "q1",
            "problemIndex": null,
            "status": "submitted",
            "submitted": null,
            "score": 5,
            "problemPoints": 10,
            "updatedAt": base_time().to_rfc3339()
        }),
    );

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].percentage, 50);
}

#[tokio::test]
async fn non_finite_scores_cannot_inflate_percentages() {
    let store = seeded_store();
    let mut inflated = answer("s1", "q1", 0, 0.0, 10.0, "submitted", 1);
    inflated["score"] = json!("inf");
    store.insert_answer_document("c1", inflated);
    store.insert_answer_document("c1", answer("s1", "hw1", 0, 3.0, 4.0, "submitted", 2));

    let rows = service().aggregate(&store, &student("s1"), None).await.unwrap();
    let summary = GradeService::summarize(&rows);

    let quiz = rows.iter().find(|r| r.content_id == "q1").unwrap();
    assert_eq!(quiz.total_score, 0.0);
    assert_eq!(quiz.percentage, 0);
    assert_eq!(summary.highest, Some(75));
    assert_eq!(summary.average_percentage, 37.5);
}
