use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_str, parse_answers, require_self_or_staff, require_staff, row_filter, store,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::upsert::UpsertEngine;
use serde_json::json;

fn submit(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    require_self_or_staff(&req.params, &student_id)?;
    let round = get_required_str(&req.params, "round")?;
    let subject = get_required_str(&req.params, "subject")?;
    let answers = parse_answers(&req.params)?;

    let receipt = UpsertEngine::new(&state.ctx, store)
        .submit_responses(&student_id, &round, &subject, &answers)?;
    Ok(json!(receipt))
}

fn get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let filter = row_filter(&req.params)?;
    let rows = store.responses(&filter)?;
    Ok(json!({ "responses": rows }))
}

fn answer_log(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    require_staff(&req.params)?;
    let filter = row_filter(&req.params)?;
    let rows = store.answer_log(&filter)?;
    Ok(json!({ "entries": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "responses.submit" => submit(state, req),
        "responses.get" => get(state, req),
        "answerLog.list" => answer_log(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
