use crate::{
    dto::grades_dto::{GradesQuery, GradesResponse},
    error::Result,
    models::viewer::Viewer,
    services::grade_service::GradeService,
    AppState,
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};

pub async fn list_grades(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<GradesQuery>,
) -> Result<impl IntoResponse> {
    let rows = state
        .grade_service
        .aggregate(&state.store, &viewer, query.class_id.as_deref())
        .await?;
    let rows = GradeService::search(rows, query.search.as_deref());
    let summary = GradeService::summarize(&rows);
    Ok(Json(GradesResponse { rows, summary }))
}

pub async fn grade_summary(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<GradesQuery>,
) -> Result<impl IntoResponse> {
    let rows = state
        .grade_service
        .aggregate(&state.store, &viewer, query.class_id.as_deref())
        .await?;
    let rows = GradeService::search(rows, query.search.as_deref());
    Ok(Json(GradeService::summarize(&rows)))
}
