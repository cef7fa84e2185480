//! mockexamd: answer keys, student responses and grading for a multi-round
//! mock examination.
//!
//! The core (catalog, store, upsert, electives, grading) is usable as a
//! library; [`ipc`] wraps it in the JSON-lines protocol served by the
//! `mockexamd` binary.

pub mod backup;
pub mod catalog;
pub mod config;
pub mod electives;
pub mod error;
pub mod exchange;
pub mod grading;
pub mod ipc;
pub mod model;
pub mod store;
pub mod upsert;

pub use config::{ExamConfig, ExamContext};
pub use error::{ExamError, ExamResult};
