pub mod domain;
pub mod face_matcher;
pub mod gallery_trainer;
pub mod infrastructure;
