use crate::backup;
use crate::exchange;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, io_failed, require_staff, store, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

use super::core::open_workspace;

fn export_csv(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    require_staff(&req.params)?;
    let dir = get_required_str(&req.params, "dir")?;
    let summary = exchange::export_csv(store, &PathBuf::from(&dir)).map_err(|e| io_failed(e, &dir))?;
    Ok(json!(summary))
}

fn import_csv(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    require_staff(&req.params)?;
    let dir = get_required_str(&req.params, "dir")?;
    let summary = exchange::import_csv(&state.ctx, store, &PathBuf::from(&dir))
        .map_err(|e| io_failed(e, &dir))?;
    Ok(json!(summary))
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_staff(&req.params) {
        return e.response(&req.id);
    }
    let Some(workspace_path) = state.workspace.clone() else {
        return err(
            &req.id,
            "no_workspace",
            "select a workspace directory first",
            None,
        );
    };
    let out_path = match get_required_str(&req.params, "outPath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    if let Some(store) = state.store.as_ref() {
        if let Err(e) = store.flush() {
            return HandlerErr::from(e).response(&req.id);
        }
    }

    let out = PathBuf::from(&out_path);
    let export = match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(v) => v,
        Err(e) => return io_failed(e, &out_path).response(&req.id),
    };
    info!(path = %out_path, "workspace bundle exported");

    ok(
        &req.id,
        json!({
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256,
        }),
    )
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_staff(&req.params) {
        return e.response(&req.id);
    }
    let in_path = match get_required_str(&req.params, "inPath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let workspace_path = match req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
    {
        Some(p) => p,
        None => return err(&req.id, "bad_params", "missing workspacePath", None),
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "bad_params",
            "inPath does not exist",
            Some(json!({ "path": in_path })),
        );
    }

    // Drop open handle before replacing file.
    let previous = state.workspace.take();
    state.store = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            if let Some(prev) = previous {
                if let Err(reopen) = open_workspace(state, prev) {
                    warn!(error = %reopen, "failed to reopen previous workspace");
                }
            }
            return io_failed(e, &in_path).response(&req.id);
        }
    };

    match open_workspace(state, workspace_path.clone()) {
        Ok(()) => {
            info!(
                workspace = %workspace_path.to_string_lossy(),
                format = %import.bundle_format_detected,
                "workspace bundle imported"
            );
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace_path.to_string_lossy(),
                    "bundleFormatDetected": import.bundle_format_detected,
                    "dbSha256": import.db_sha256,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{:#}", e), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exchange.exportCsv" => export_csv(state, req),
        "exchange.importCsv" => import_csv(state, req),
        "backup.exportWorkspaceBundle" => {
            return Some(handle_backup_export_workspace_bundle(state, req))
        }
        "backup.importWorkspaceBundle" => {
            return Some(handle_backup_import_workspace_bundle(state, req))
        }
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
