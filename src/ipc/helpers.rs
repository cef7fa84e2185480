use crate::error::ExamError;
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::model::{Identity, RowFilter};
use crate::store::RecordStore;
use crate::upsert::{AnswerInput, KeyInput};
use serde_json::json;
use tracing::debug;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

impl From<ExamError> for HandlerErr {
    fn from(e: ExamError) -> Self {
        debug!(code = e.code(), error = %e, "request failed");
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

pub fn io_failed(e: anyhow::Error, path: &str) -> HandlerErr {
    HandlerErr {
        code: "io_error",
        message: format!("{:#}", e),
        details: Some(json!({ "path": path })),
    }
}

pub fn store(state: &AppState) -> Result<&dyn RecordStore, HandlerErr> {
    state.store.as_deref().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// `actor` is optional; without it no identity check is made.
pub fn actor(params: &serde_json::Value) -> Option<Identity> {
    get_optional_str(params, "actor").map(|a| Identity::parse(&a))
}

pub fn require_staff(params: &serde_json::Value) -> Result<(), HandlerErr> {
    if let Some(id) = actor(params) {
        id.require_staff()?;
    }
    Ok(())
}

pub fn require_self_or_staff(params: &serde_json::Value, student_id: &str) -> Result<(), HandlerErr> {
    if let Some(id) = actor(params) {
        id.require_self_or_staff(student_id)?;
    }
    Ok(())
}

/// Filter from optional `round`, `subject` and `studentId`. A student actor
/// is pinned to its own rows.
pub fn row_filter(params: &serde_json::Value) -> Result<RowFilter, HandlerErr> {
    let mut filter = RowFilter {
        round: get_optional_str(params, "round"),
        subject: get_optional_str(params, "subject"),
        student_id: get_optional_str(params, "studentId"),
    };
    if let Some(Identity::Student(id)) = actor(params) {
        match &filter.student_id {
            Some(sid) if *sid != id => {
                Identity::Student(id).require_self_or_staff(sid)?;
            }
            Some(_) => {}
            None => filter.student_id = Some(id),
        }
    }
    Ok(filter)
}

fn answer_text(v: &serde_json::Value) -> Result<String, HandlerErr> {
    match v {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(HandlerErr::bad_params(format!(
            "answer must be a string or number, got {}",
            other
        ))),
    }
}

fn question_number(v: Option<&serde_json::Value>) -> Result<u32, HandlerErr> {
    v.and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| HandlerErr::bad_params("questionNumber must be a positive integer"))
}

/// `answers` is either positional (`["3", "", 1]`, question numbers from 1)
/// or a list of `{questionNumber, answer, pointValue?}` objects.
fn parse_answer_items(
    params: &serde_json::Value,
) -> Result<Vec<(u32, String, Option<f64>)>, HandlerErr> {
    let Some(items) = params.get("answers").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing answers"));
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item {
            serde_json::Value::Object(obj) => {
                let q = question_number(obj.get("questionNumber"))?;
                let answer = answer_text(obj.get("answer").unwrap_or(&serde_json::Value::Null))?;
                let points = match obj.get("pointValue") {
                    None | Some(serde_json::Value::Null) => None,
                    Some(v) => Some(
                        v.as_f64()
                            .ok_or_else(|| HandlerErr::bad_params("pointValue must be a number"))?,
                    ),
                };
                out.push((q, answer, points));
            }
            other => out.push((i as u32 + 1, answer_text(other)?, None)),
        }
    }
    Ok(out)
}

pub fn parse_answers(params: &serde_json::Value) -> Result<Vec<AnswerInput>, HandlerErr> {
    Ok(parse_answer_items(params)?
        .into_iter()
        .map(|(question_number, answer, _)| AnswerInput {
            question_number,
            answer,
        })
        .collect())
}

/// Like [`parse_answers`], with point values taken from the objects or from
/// a positional `pointValues` array.
pub fn parse_key_inputs(params: &serde_json::Value) -> Result<Vec<KeyInput>, HandlerErr> {
    let point_values: Option<Vec<Option<f64>>> = params
        .get("pointValues")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().map(|v| v.as_f64()).collect());
    Ok(parse_answer_items(params)?
        .into_iter()
        .enumerate()
        .map(|(i, (question_number, answer, points))| KeyInput {
            question_number,
            answer,
            point_value: points.or_else(|| {
                point_values
                    .as_ref()
                    .and_then(|pv| pv.get(i).copied().flatten())
            }),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_and_object_answers() {
        let params = json!({ "answers": ["3", "", 2, null] });
        let a = parse_answers(&params).ok().expect("parse");
        assert_eq!(a.len(), 4);
        assert_eq!(a[2].question_number, 3);
        assert_eq!(a[2].answer, "2");
        assert_eq!(a[3].answer, "");

        let params = json!({
            "answers": [{ "questionNumber": 7, "answer": "4", "pointValue": 3.0 }],
            "pointValues": [9.0]
        });
        let k = parse_key_inputs(&params).ok().expect("parse");
        assert_eq!(k[0].question_number, 7);
        assert_eq!(k[0].point_value, Some(3.0));

        let params = json!({ "answers": ["1", "2"], "pointValues": [3.0] });
        let k = parse_key_inputs(&params).ok().expect("parse");
        assert_eq!(k[0].point_value, Some(3.0));
        assert_eq!(k[1].point_value, None);
    }

    #[test]
    fn student_actor_is_pinned_to_itself() {
        let f = row_filter(&json!({ "actor": "s1", "round": "1차" })).ok().expect("filter");
        assert_eq!(f.student_id.as_deref(), Some("s1"));
        let e = row_filter(&json!({ "actor": "s1", "studentId": "s2" }));
        assert!(matches!(e, Err(HandlerErr { code: "forbidden", .. })));
        let f = row_filter(&json!({ "actor": "teacher" })).ok().expect("filter");
        assert!(f.student_id.is_none());
    }
}
