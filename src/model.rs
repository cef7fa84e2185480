use crate::error::{ExamError, ExamResult};
use serde::{Deserialize, Serialize};

/// Normalizes a raw answer before storage or comparison.
///
/// Surrounding whitespace is trimmed. Anything that reads as an integer,
/// with or without an all-zero fractional part ("3", "+3", "03", "3.0",
/// "-2.00"), collapses to its plain integer text ("3", "-2"). Zero loses
/// its sign. Everything else is kept as typed.
pub fn canonicalize_answer(raw: &str) -> String {
    let t = raw.trim();
    let (sign, unsigned) = match t.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", t.strip_prefix('+').unwrap_or(t)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return t.to_string();
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c == '0')
    {
        return t.to_string();
    }
    let digits = int_part.trim_start_matches('0');
    if digits.is_empty() {
        return "0".to_string();
    }
    format!("{}{}", sign, digits)
}

/// VB6-compatible 1-decimal rounding: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKeyEntry {
    pub round: String,
    pub subject: String,
    pub question_number: u32,
    pub correct_answer: String,
    pub point_value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub student_id: String,
    pub round: String,
    pub subject: String,
    pub question_number: u32,
    pub input_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectiveSelection {
    pub student_id: String,
    pub round: String,
    pub elective1: String,
    pub elective2: String,
}

impl ElectiveSelection {
    pub fn contains(&self, subject: &str) -> bool {
        self.elective1 == subject || self.elective2 == subject
    }
}

/// Raw audit row: every answer box of a submission, blanks included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerLogEntry {
    pub student_id: String,
    pub round: String,
    pub subject: String,
    pub question_number: u32,
    pub recorded_answer: String,
    pub submission_id: String,
    pub submitted_at: String,
}

/// Exact-match conjunction over key fields; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub round: Option<String>,
    pub subject: Option<String>,
    pub student_id: Option<String>,
}

impl RowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn round(round: &str) -> Self {
        Self {
            round: Some(round.to_string()),
            ..Self::default()
        }
    }

    pub fn round_subject(round: &str, subject: &str) -> Self {
        Self {
            round: Some(round.to_string()),
            subject: Some(subject.to_string()),
            student_id: None,
        }
    }

    pub fn with_student(mut self, student_id: &str) -> Self {
        self.student_id = Some(student_id.to_string());
        self
    }

    pub fn matches(&self, round: &str, subject: Option<&str>, student_id: Option<&str>) -> bool {
        fn field_ok(want: &Option<String>, have: Option<&str>) -> bool {
            match (want, have) {
                (None, _) => true,
                (Some(w), Some(h)) => w == h,
                // The relation has no such column; the predicate does not apply.
                (Some(_), None) => true,
            }
        }
        field_ok(&self.round, Some(round))
            && field_ok(&self.subject, subject)
            && field_ok(&self.student_id, student_id)
    }
}

/// Caller identity as supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Staff(String),
    Student(String),
}

impl Identity {
    pub fn parse(raw: &str) -> Self {
        let t = raw.trim();
        if t.eq_ignore_ascii_case("teacher") || t.eq_ignore_ascii_case("admin") {
            Identity::Staff(t.to_ascii_lowercase())
        } else {
            Identity::Student(t.to_string())
        }
    }

    pub fn require_staff(&self) -> ExamResult<()> {
        match self {
            Identity::Staff(_) => Ok(()),
            Identity::Student(id) => Err(ExamError::Forbidden(format!(
                "student {} may not edit answer keys",
                id
            ))),
        }
    }

    /// Staff may act for anyone; a student only for itself.
    pub fn require_self_or_staff(&self, student_id: &str) -> ExamResult<()> {
        match self {
            Identity::Staff(_) => Ok(()),
            Identity::Student(id) if id == student_id => Ok(()),
            Identity::Student(id) => Err(ExamError::Forbidden(format!(
                "student {} may not act for {}",
                id, student_id
            ))),
        }
    }
}
