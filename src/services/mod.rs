pub mod activity_service;
pub mod curriculum_service;
pub mod feed_hub;
pub mod grade_service;
