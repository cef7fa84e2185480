use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_str, parse_key_inputs, require_staff, row_filter, store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::upsert::UpsertEngine;
use serde_json::json;

fn save(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    require_staff(&req.params)?;
    let round = get_required_str(&req.params, "round")?;
    let subject = get_required_str(&req.params, "subject")?;
    let answers = parse_key_inputs(&req.params)?;

    let summary = UpsertEngine::new(&state.ctx, store).save_answer_keys(&round, &subject, &answers)?;
    Ok(json!(summary))
}

fn get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    // Keys carry the correct answers; students only see them through grades.
    require_staff(&req.params)?;
    let filter = row_filter(&req.params)?;
    let rows = store.answer_keys(&filter)?;
    Ok(json!({ "answerKeys": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "answerKeys.save" => save(state, req),
        "answerKeys.get" => get(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
