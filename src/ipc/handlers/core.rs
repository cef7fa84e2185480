use crate::config::ExamContext;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{MemoryStore, SqliteStore};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "store": state.store.as_ref().map(|s| s.describe()),
            "configPath": state.ctx.source().map(|p| p.to_string_lossy().to_string()),
        }),
    )
}

/// Opens `path` as the session's workspace. Also used at start-up.
pub fn open_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<()> {
    let store = SqliteStore::open(&path)?;
    info!(workspace = %path.to_string_lossy(), "workspace opened");
    state.workspace = Some(path);
    state.store = Some(Box::new(store));
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    if req.params.get("ephemeral").and_then(|v| v.as_bool()) == Some(true) {
        state.workspace = None;
        state.store = Some(Box::new(MemoryStore::new()));
        info!("ephemeral workspace opened");
        return ok(&req.id, json!({ "workspacePath": null, "ephemeral": true }));
    }

    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Close the previous workspace before opening another one.
    state.store = None;
    state.workspace = None;
    match open_workspace(state, path.clone()) {
        Ok(()) => ok(
            &req.id,
            json!({ "workspacePath": path.to_string_lossy(), "ephemeral": false }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{:#}", e), None),
    }
}

fn config_json(ctx: &ExamContext) -> serde_json::Value {
    let cfg = ctx.config();
    json!({
        "source": ctx.source().map(|p| p.to_string_lossy().to_string()),
        "rounds": cfg.rounds,
        "catalogPreset": cfg.catalog.preset,
        "subjectOverrides": cfg.catalog.subjects.len(),
        "defaultPointValue": cfg.default_point_value,
        "logFilter": cfg.log_filter,
        "workspace": cfg.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
    })
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, config_json(&state.ctx))
}

fn handle_config_reload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match get_optional_str(&req.params, "path")
        .map(PathBuf::from)
        .or_else(|| state.ctx.source().map(|p| p.to_path_buf()))
    {
        Some(p) => p,
        None => {
            return err(
                &req.id,
                "bad_params",
                "missing path and no configuration file was loaded at start-up",
                None,
            )
        }
    };
    match ExamContext::load(&path) {
        Ok(ctx) => {
            info!(config = %path.to_string_lossy(), "configuration reloaded");
            state.ctx = ctx;
            ok(&req.id, config_json(&state.ctx))
        }
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_catalog_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let catalog = state.ctx.catalog();
    let subjects: Vec<serde_json::Value> = catalog
        .subjects()
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "questionCount": s.question_count,
                "category": s.category.as_str(),
                "elective": s.category.is_elective(),
            })
        })
        .collect();
    ok(
        &req.id,
        json!({
            "rounds": state.ctx.rounds(),
            "subjects": subjects,
            "coreSubjects": catalog.core_subjects(),
            "electiveSubjects": catalog.elective_subjects(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "config.get" => Some(handle_config_get(state, req)),
        "config.reload" => Some(handle_config_reload(state, req)),
        "catalog.get" => Some(handle_catalog_get(state, req)),
        _ => None,
    }
}
