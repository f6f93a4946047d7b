pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::database::DocumentStore;
use crate::services::{
    activity_service::ActivityService, feed_hub::FeedHub, grade_service::GradeService,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub hub: FeedHub,
    pub grade_service: GradeService,
    pub activity_service: ActivityService,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(store: DocumentStore, config: &Config) -> Self {
        let hub = FeedHub::new();
        let grade_service = GradeService::new(config.fetch_timeout());
        let activity_service = ActivityService::new(
            hub.clone(),
            chrono::Duration::seconds(config.activity_recent_window_secs.max(1)),
            config.activity_max_entries,
        )
        .with_fetch_timeout(config.fetch_timeout());

        Self {
            store,
            hub,
            grade_service,
            activity_service,
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
        }
    }
}
