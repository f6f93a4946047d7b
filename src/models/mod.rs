pub mod answer_record;
pub mod class_info;
pub mod content;
pub mod grade_row;
pub mod live_event;
pub mod viewer;
