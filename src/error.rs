//! Error types for mockexamd

use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExamError {
    #[error("unknown subject: {0}")]
    UnknownSubject(String),

    #[error("unknown round: {0}")]
    UnknownRound(String),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("no answer key for {subject} question {question_number} in round {round}")]
    AnswerKeyMissing {
        round: String,
        subject: String,
        question_number: u32,
    },

    #[error("electives must be two different subjects, got {0} twice")]
    DuplicateElective(String),

    #[error("not an elective subject: {0}")]
    InvalidElective(String),

    #[error("student {student_id} has not selected {subject} as an elective for round {round}")]
    ElectiveNotSelected {
        student_id: String,
        round: String,
        subject: String,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExamResult<T> = Result<T, ExamError>;

impl ExamError {
    /// Stable wire code reported in the `error.code` field of a response.
    pub fn code(&self) -> &'static str {
        match self {
            ExamError::UnknownSubject(_) => "unknown_subject",
            ExamError::UnknownRound(_) => "unknown_round",
            ExamError::InvalidRow(_) => "invalid_row",
            ExamError::AnswerKeyMissing { .. } => "answer_key_missing",
            ExamError::DuplicateElective(_) => "duplicate_elective",
            ExamError::InvalidElective(_) => "invalid_elective",
            ExamError::ElectiveNotSelected { .. } => "elective_not_selected",
            ExamError::Forbidden(_) => "forbidden",
            ExamError::Config(_) => "config_invalid",
            ExamError::Storage(_) => "db_error",
            ExamError::Unavailable(_) => "store_unavailable",
            ExamError::Io(_) => "io_error",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ExamError::UnknownSubject(subject) => Some(json!({ "subject": subject })),
            ExamError::UnknownRound(round) => Some(json!({ "round": round })),
            ExamError::AnswerKeyMissing {
                round,
                subject,
                question_number,
            } => Some(json!({
                "round": round,
                "subject": subject,
                "questionNumber": question_number,
            })),
            ExamError::DuplicateElective(subject) | ExamError::InvalidElective(subject) => {
                Some(json!({ "subject": subject }))
            }
            ExamError::ElectiveNotSelected {
                student_id,
                round,
                subject,
            } => Some(json!({
                "studentId": student_id,
                "round": round,
                "subject": subject,
            })),
            _ => None,
        }
    }
}
