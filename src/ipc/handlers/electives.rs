use crate::electives;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, require_self_or_staff, store, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::upsert::UpsertEngine;
use serde_json::json;

fn select(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    require_self_or_staff(&req.params, &student_id)?;
    let round = get_required_str(&req.params, "round")?;
    let elective1 = get_required_str(&req.params, "elective1")?;
    let elective2 = get_required_str(&req.params, "elective2")?;

    let selection = UpsertEngine::new(&state.ctx, store)
        .save_electives(&student_id, &round, &elective1, &elective2)?;
    let available = electives::available_subjects(&state.ctx, store, &student_id, &round)?;
    Ok(json!({
        "selection": selection,
        "availableSubjects": available,
    }))
}

fn get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    require_self_or_staff(&req.params, &student_id)?;
    let round = get_required_str(&req.params, "round")?;

    let available = electives::available_subjects(&state.ctx, store, &student_id, &round)?;
    let selection = electives::selected_electives(store, &student_id, &round)?;
    Ok(json!({
        "selection": selection,
        "availableSubjects": available,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "electives.select" => select(state, req),
        "electives.get" => get(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
