use std::path::PathBuf;

use crate::config::ExamContext;
use crate::store::RecordStore;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub ctx: ExamContext,
    /// Directory of the open SQLite workspace; `None` for ephemeral sessions.
    pub workspace: Option<PathBuf>,
    pub store: Option<Box<dyn RecordStore>>,
}

impl AppState {
    pub fn new(ctx: ExamContext) -> Self {
        Self {
            ctx,
            workspace: None,
            store: None,
        }
    }
}
