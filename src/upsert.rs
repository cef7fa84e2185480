//! Replace-on-resubmit writes.
//!
//! Every write path funnels through [`UpsertEngine::replace_all`]: batches are
//! validated and canonicalized first, and only a fully valid set reaches the
//! store, which applies it atomically.

use crate::config::ExamContext;
use crate::electives;
use crate::error::{ExamError, ExamResult};
use crate::grading::{GradingEngine, StudentGrade};
use crate::model::{
    canonicalize_answer, round_off_1_decimal, AnswerKeyEntry, AnswerLogEntry, ElectiveSelection,
    ResponseEntry,
};
use crate::store::{RecordStore, ReplaceBatch, ReplaceOutcome};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// One answer box as typed by a student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerInput {
    pub question_number: u32,
    pub answer: String,
}

impl AnswerInput {
    /// Numbers answers 1, 2, 3, ... by position.
    pub fn positional<S: AsRef<str>>(answers: &[S]) -> Vec<AnswerInput> {
        answers
            .iter()
            .enumerate()
            .map(|(i, a)| AnswerInput {
                question_number: i as u32 + 1,
                answer: a.as_ref().to_string(),
            })
            .collect()
    }
}

/// One answer-key box; `point_value` falls back to the configured default.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInput {
    pub question_number: u32,
    pub answer: String,
    pub point_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerKeySaveSummary {
    pub round: String,
    pub subject: String,
    pub saved: usize,
    pub replaced: usize,
    /// Question numbers left blank; they have no key until saved again.
    pub skipped: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub submission_id: String,
    pub submitted_at: String,
    pub stored: usize,
    pub blank: usize,
    pub grade: StudentGrade,
}

pub struct UpsertEngine<'a> {
    ctx: &'a ExamContext,
    store: &'a dyn RecordStore,
}

fn require_non_blank(field: &str, value: &str) -> ExamResult<()> {
    if value.trim().is_empty() {
        return Err(ExamError::InvalidRow(format!("{} must not be blank", field)));
    }
    Ok(())
}

fn require_in_scope(ok: bool, relation: &str, question_number: Option<u32>) -> ExamResult<()> {
    if ok {
        return Ok(());
    }
    Err(ExamError::InvalidRow(match question_number {
        Some(q) => format!("{} row for question {} is outside the replace scope", relation, q),
        None => format!("{} row is outside the replace scope", relation),
    }))
}

fn require_unique(seen: &mut HashSet<u32>, question_number: u32) -> ExamResult<()> {
    if !seen.insert(question_number) {
        return Err(ExamError::InvalidRow(format!(
            "question {} appears more than once",
            question_number
        )));
    }
    Ok(())
}

fn normalize_point_value(v: f64, question_number: u32) -> ExamResult<f64> {
    if !v.is_finite() || v < 0.0 {
        return Err(ExamError::InvalidRow(format!(
            "point value for question {} must be a non-negative number",
            question_number
        )));
    }
    Ok(round_off_1_decimal(v))
}

impl<'a> UpsertEngine<'a> {
    pub fn new(ctx: &'a ExamContext, store: &'a dyn RecordStore) -> Self {
        Self { ctx, store }
    }

    pub fn replace(&self, batch: ReplaceBatch) -> ExamResult<ReplaceOutcome> {
        let mut out = self.replace_all(vec![batch])?;
        Ok(out.pop().unwrap_or_default())
    }

    pub fn replace_all(&self, batches: Vec<ReplaceBatch>) -> ExamResult<Vec<ReplaceOutcome>> {
        let prepared = batches
            .into_iter()
            .map(|b| self.prepare(b))
            .collect::<ExamResult<Vec<_>>>()?;
        let outcomes = self.store.apply(&prepared)?;
        for (b, o) in prepared.iter().zip(&outcomes) {
            debug!(
                table = b.relation().table(),
                removed = o.removed,
                inserted = o.inserted,
                "replace applied"
            );
        }
        Ok(outcomes)
    }

    fn prepare(&self, batch: ReplaceBatch) -> ExamResult<ReplaceBatch> {
        let catalog = self.ctx.catalog();
        match batch {
            ReplaceBatch::AnswerKeys {
                round,
                subject,
                rows,
            } => {
                self.ctx.check_round(&round)?;
                catalog.get(&subject)?;
                let mut seen = HashSet::new();
                let mut out = Vec::with_capacity(rows.len());
                for r in rows {
                    require_in_scope(
                        r.round == round && r.subject == subject,
                        "answer key",
                        Some(r.question_number),
                    )?;
                    catalog.check_question(&subject, r.question_number)?;
                    require_unique(&mut seen, r.question_number)?;
                    let correct_answer = canonicalize_answer(&r.correct_answer);
                    if correct_answer.is_empty() {
                        return Err(ExamError::InvalidRow(format!(
                            "question {} has a blank correct answer",
                            r.question_number
                        )));
                    }
                    out.push(AnswerKeyEntry {
                        point_value: normalize_point_value(r.point_value, r.question_number)?,
                        correct_answer,
                        ..r
                    });
                }
                Ok(ReplaceBatch::AnswerKeys {
                    round,
                    subject,
                    rows: out,
                })
            }
            ReplaceBatch::Responses {
                student_id,
                round,
                subject,
                rows,
            } => {
                require_non_blank("student_id", &student_id)?;
                self.ctx.check_round(&round)?;
                catalog.get(&subject)?;
                let mut seen = HashSet::new();
                let mut out = Vec::with_capacity(rows.len());
                for r in rows {
                    require_in_scope(
                        r.student_id == student_id && r.round == round && r.subject == subject,
                        "response",
                        Some(r.question_number),
                    )?;
                    catalog.check_question(&subject, r.question_number)?;
                    require_unique(&mut seen, r.question_number)?;
                    let input_answer = canonicalize_answer(&r.input_answer);
                    // Absence of a row is what "not answered" means.
                    if input_answer.is_empty() {
                        continue;
                    }
                    out.push(ResponseEntry { input_answer, ..r });
                }
                // Read before the write lock is taken; sound only while a
                // session has a single writer.
                electives::ensure_subject_available(
                    self.ctx,
                    self.store,
                    &student_id,
                    &round,
                    &subject,
                )?;
                Ok(ReplaceBatch::Responses {
                    student_id,
                    round,
                    subject,
                    rows: out,
                })
            }
            ReplaceBatch::ElectiveSelection {
                student_id,
                round,
                row,
            } => {
                require_non_blank("student_id", &student_id)?;
                self.ctx.check_round(&round)?;
                require_in_scope(
                    row.student_id == student_id && row.round == round,
                    "elective selection",
                    None,
                )?;
                electives::validate_selection(catalog, &row.elective1, &row.elective2)?;
                Ok(ReplaceBatch::ElectiveSelection {
                    student_id,
                    round,
                    row,
                })
            }
            ReplaceBatch::AnswerLog {
                student_id,
                round,
                subject,
                rows,
            } => {
                require_non_blank("student_id", &student_id)?;
                self.ctx.check_round(&round)?;
                catalog.get(&subject)?;
                let mut seen = HashSet::new();
                let mut out = Vec::with_capacity(rows.len());
                for r in rows {
                    require_in_scope(
                        r.student_id == student_id && r.round == round && r.subject == subject,
                        "answer log",
                        Some(r.question_number),
                    )?;
                    catalog.check_question(&subject, r.question_number)?;
                    require_unique(&mut seen, r.question_number)?;
                    out.push(AnswerLogEntry {
                        recorded_answer: canonicalize_answer(&r.recorded_answer),
                        ..r
                    });
                }
                Ok(ReplaceBatch::AnswerLog {
                    student_id,
                    round,
                    subject,
                    rows: out,
                })
            }
        }
    }

    /// Replaces the whole key for `(round, subject)`. Blank boxes are skipped,
    /// leaving those questions without a key.
    pub fn save_answer_keys(
        &self,
        round: &str,
        subject: &str,
        answers: &[KeyInput],
    ) -> ExamResult<AnswerKeySaveSummary> {
        self.ctx.check_round(round)?;
        let catalog = self.ctx.catalog();
        catalog.get(subject)?;

        let mut rows = Vec::with_capacity(answers.len());
        let mut skipped = Vec::new();
        for a in answers {
            catalog.check_question(subject, a.question_number)?;
            let correct_answer = canonicalize_answer(&a.answer);
            if correct_answer.is_empty() {
                skipped.push(a.question_number);
                continue;
            }
            rows.push(AnswerKeyEntry {
                round: round.to_string(),
                subject: subject.to_string(),
                question_number: a.question_number,
                correct_answer,
                point_value: a.point_value.unwrap_or(self.ctx.default_point_value()),
            });
        }

        let saved = rows.len();
        let outcome = self.replace(ReplaceBatch::AnswerKeys {
            round: round.to_string(),
            subject: subject.to_string(),
            rows,
        })?;
        info!(round, subject, saved, replaced = outcome.removed, "answer key saved");

        Ok(AnswerKeySaveSummary {
            round: round.to_string(),
            subject: subject.to_string(),
            saved,
            replaced: outcome.removed,
            skipped,
        })
    }

    pub fn save_electives(
        &self,
        student_id: &str,
        round: &str,
        elective1: &str,
        elective2: &str,
    ) -> ExamResult<ElectiveSelection> {
        let row = ElectiveSelection {
            student_id: student_id.to_string(),
            round: round.to_string(),
            elective1: elective1.to_string(),
            elective2: elective2.to_string(),
        };
        self.replace(ReplaceBatch::ElectiveSelection {
            student_id: student_id.to_string(),
            round: round.to_string(),
            row: row.clone(),
        })?;
        info!(student_id, round, elective1, elective2, "electives selected");
        Ok(row)
    }

    /// Replaces the student's responses and raw log for `(round, subject)`
    /// in one unit, then grades the new submission.
    pub fn submit_responses(
        &self,
        student_id: &str,
        round: &str,
        subject: &str,
        answers: &[AnswerInput],
    ) -> ExamResult<SubmissionReceipt> {
        require_non_blank("student_id", student_id)?;
        self.ctx.check_round(round)?;
        self.ctx.catalog().get(subject)?;

        let submission_id = Uuid::new_v4().to_string();
        let submitted_at = chrono::Utc::now().to_rfc3339();

        let responses: Vec<ResponseEntry> = answers
            .iter()
            .map(|a| ResponseEntry {
                student_id: student_id.to_string(),
                round: round.to_string(),
                subject: subject.to_string(),
                question_number: a.question_number,
                input_answer: a.answer.clone(),
            })
            .collect();
        let log: Vec<AnswerLogEntry> = answers
            .iter()
            .map(|a| AnswerLogEntry {
                student_id: student_id.to_string(),
                round: round.to_string(),
                subject: subject.to_string(),
                question_number: a.question_number,
                recorded_answer: a.answer.clone(),
                submission_id: submission_id.clone(),
                submitted_at: submitted_at.clone(),
            })
            .collect();

        let outcomes = self.replace_all(vec![
            ReplaceBatch::Responses {
                student_id: student_id.to_string(),
                round: round.to_string(),
                subject: subject.to_string(),
                rows: responses,
            },
            ReplaceBatch::AnswerLog {
                student_id: student_id.to_string(),
                round: round.to_string(),
                subject: subject.to_string(),
                rows: log,
            },
        ])?;
        let stored = outcomes.first().map(|o| o.inserted).unwrap_or(0);
        let blank = answers.len() - stored;
        info!(student_id, round, subject, stored, blank, "responses submitted");

        let grade = GradingEngine::new(self.ctx, self.store).grade_student(round, subject, student_id)?;
        Ok(SubmissionReceipt {
            submission_id,
            submitted_at,
            stored,
            blank,
            grade,
        })
    }
}
