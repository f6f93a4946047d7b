use crate::{
    database::AnswerSource,
    dto::answer_dto::{SubmitAnswerPayload, SubmitAnswerResponse},
    error::{Error, Result},
    models::answer_record::{AnswerRecord, SubmissionStatus},
    models::live_event::LiveAnswerEvent,
    models::viewer::{Role, Viewer},
    services::activity_service::{DEFAULT_ANSWER_TYPE, DEFAULT_QUESTION, NO_ANSWER},
    utils::time::now,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::Value as JsonValue;
use validator::Validate;

/// Stores an answer and pushes it onto the live feed.
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(class_id): Path<String>,
    Json(payload): Json<SubmitAnswerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    if viewer.role == Role::Student && payload.student_id != viewer.id {
        return Err(Error::Forbidden(
            "Students may only submit their own answers".to_string(),
        ));
    }
    let class = state
        .grade_service
        .viewable_classes(&state.store, &viewer, Some(&class_id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Forbidden(format!("Class {} is not available to this user", class_id)))?;
    if viewer.role != Role::Student && !class.has_student(&payload.student_id) {
        return Err(Error::BadRequest(format!(
            "Student {} is not enrolled in class {}",
            payload.student_id, class_id
        )));
    }

    let timestamp = now();
    let status = payload.status.unwrap_or(SubmissionStatus::Submitted);
    let student_name = payload
        .student_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
            if viewer.id == payload.student_id {
                viewer.name.clone()
            } else {
                payload.student_id.clone()
            }
        });

    let record = AnswerRecord {
        student_id: payload.student_id.clone(),
        student_name: student_name.clone(),
        class_id: class_id.clone(),
        content_id: payload.content_id.clone(),
        problem_index: payload.problem_index,
        score: payload.score,
        problem_points: payload.problem_points,
        submitted: status != SubmissionStatus::Pending,
        status,
        updated_at: Some(timestamp),
        timestamp: Some(timestamp),
        submitted_at: (status != SubmissionStatus::Pending).then_some(timestamp),
    };
    state.store.upsert_answer(&record).await?;

    let event = LiveAnswerEvent {
        student_id: record.student_id.clone(),
        student_name,
        class_id: class_id.clone(),
        content_id: record.content_id.clone(),
        problem_index: record.problem_index,
        question_text: payload
            .question_text
            .unwrap_or_else(|| DEFAULT_QUESTION.to_string()),
        answer: match payload.answer {
            Some(JsonValue::String(s)) if !s.trim().is_empty() => s,
            Some(JsonValue::Null) | Some(JsonValue::String(_)) | None => NO_ANSWER.to_string(),
            Some(other) => other.to_string(),
        },
        answer_type: payload
            .answer_type
            .unwrap_or_else(|| DEFAULT_ANSWER_TYPE.to_string()),
        correct: payload.correct,
        partial_credit: payload.partial_credit,
        score: record.score,
        problem_points: record.problem_points,
        timestamp,
    };
    state.hub.publish(&event)?;

    tracing::info!(
        class_id = %class_id,
        content_id = %record.content_id,
        student_id = %record.student_id,
        "Answer recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitAnswerResponse {
            saved: true,
            class_id,
            content_id: record.content_id,
            problem_index: record.problem_index,
            timestamp,
        }),
    ))
}
