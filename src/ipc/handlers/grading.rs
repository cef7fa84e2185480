use crate::grading::GradingEngine;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, require_self_or_staff, require_staff, store, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn scope(req: &Request) -> Result<(String, String), HandlerErr> {
    Ok((
        get_required_str(&req.params, "round")?,
        get_required_str(&req.params, "subject")?,
    ))
}

fn student(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let engine = GradingEngine::new(&state.ctx, store(state)?);
    let (round, subject) = scope(req)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    require_self_or_staff(&req.params, &student_id)?;
    Ok(json!(engine.grade_student(&round, &subject, &student_id)?))
}

fn all_students(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let engine = GradingEngine::new(&state.ctx, store(state)?);
    require_staff(&req.params)?;
    let (round, subject) = scope(req)?;
    Ok(json!({ "students": engine.grade_all_students(&round, &subject)? }))
}

fn questions(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let engine = GradingEngine::new(&state.ctx, store(state)?);
    require_staff(&req.params)?;
    let (round, subject) = scope(req)?;
    Ok(json!({ "questions": engine.question_difficulty(&round, &subject)? }))
}

fn subject_report(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let engine = GradingEngine::new(&state.ctx, store(state)?);
    require_staff(&req.params)?;
    let (round, subject) = scope(req)?;
    Ok(json!(engine.subject_report(&round, &subject)?))
}

fn subject_average(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let engine = GradingEngine::new(&state.ctx, store(state)?);
    let round = get_optional_str(&req.params, "round");
    Ok(json!({
        "round": round,
        "subjects": engine.subject_average(round.as_deref())?,
    }))
}

fn round_trend(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let engine = GradingEngine::new(&state.ctx, store(state)?);
    Ok(json!({ "rounds": engine.round_trend()? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grading.student" => student(state, req),
        "grading.allStudents" => all_students(state, req),
        "grading.questions" => questions(state, req),
        "grading.subjectReport" => subject_report(state, req),
        "stats.subjectAverage" => subject_average(state, req),
        "stats.roundTrend" => round_trend(state),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
