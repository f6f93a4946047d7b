pub mod activity;
pub mod answers;
pub mod grades;
pub mod health;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/grades", get(grades::list_grades))
        .route("/api/grades/summary", get(grades::grade_summary))
        .route("/api/classes/:class_id/answers", post(answers::submit_answer))
        .route("/api/classes/:class_id/activity", get(activity::get_activity))
        .route("/api/classes/:class_id/activity/ws", get(activity::activity_ws))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::require_viewer,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .with_state(state)
}
