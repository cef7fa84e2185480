pub mod answer_keys;
pub mod core;
pub mod electives;
pub mod exchange;
pub mod grading;
pub mod responses;
