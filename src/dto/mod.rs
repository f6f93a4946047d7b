pub mod activity_dto;
pub mod answer_dto;
pub mod grades_dto;
