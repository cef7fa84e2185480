//! Read-only scoring over the record store.
//!
//! Every call re-reads the relations it needs and builds its answer-key index
//! once; nothing is cached between calls.

use crate::config::ExamContext;
use crate::error::{ExamError, ExamResult};
use crate::model::{canonicalize_answer, ResponseEntry, RowFilter};
use crate::store::RecordStore;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Percentage of `correct` over `attempted`; 0.0 when nothing was attempted.
pub fn accuracy_percent(correct: usize, attempted: usize) -> f64 {
    if attempted == 0 {
        return 0.0;
    }
    (correct as f64 / attempted as f64) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Blank,
    KeyMissing,
    Correct(f64),
    Incorrect,
}

#[derive(Debug, Clone, PartialEq)]
struct KeyedAnswer {
    correct_answer: String,
    point_value: f64,
}

/// `(round, subject, question_number)` to key, built once per call.
#[derive(Debug, Default)]
struct AnswerKeyIndex {
    keys: HashMap<(String, String, u32), KeyedAnswer>,
}

impl AnswerKeyIndex {
    fn load(store: &dyn RecordStore, filter: &RowFilter) -> ExamResult<Self> {
        let mut keys = HashMap::new();
        for k in store.answer_keys(filter)? {
            keys.insert(
                (k.round, k.subject, k.question_number),
                KeyedAnswer {
                    correct_answer: canonicalize_answer(&k.correct_answer),
                    point_value: k.point_value,
                },
            );
        }
        Ok(Self { keys })
    }

    fn get(&self, round: &str, subject: &str, question_number: u32) -> Option<&KeyedAnswer> {
        self.keys
            .get(&(round.to_string(), subject.to_string(), question_number))
    }

    fn judge(&self, r: &ResponseEntry) -> Outcome {
        let answer = canonicalize_answer(&r.input_answer);
        if answer.is_empty() {
            return Outcome::Blank;
        }
        match self.get(&r.round, &r.subject, r.question_number) {
            None => Outcome::KeyMissing,
            Some(k) if k.correct_answer == answer => Outcome::Correct(k.point_value),
            Some(_) => Outcome::Incorrect,
        }
    }

    fn max_weighted_score(&self, round: &str, subject: &str) -> f64 {
        self.keys
            .iter()
            .filter(|((r, s, _), _)| r == round && s == subject)
            .map(|(_, k)| k.point_value)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Tally {
    correct: usize,
    attempted: usize,
    weighted: f64,
}

impl Tally {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Blank | Outcome::KeyMissing => {}
            Outcome::Correct(points) => {
                self.correct += 1;
                self.attempted += 1;
                self.weighted += points;
            }
            Outcome::Incorrect => {
                self.attempted += 1;
            }
        }
    }

    fn accuracy(&self) -> f64 {
        accuracy_percent(self.correct, self.attempted)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrade {
    pub student_id: String,
    pub round: String,
    pub subject: String,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub attempted_count: usize,
    /// Percentage; `None` when nothing gradable was attempted.
    pub accuracy: Option<f64>,
    pub weighted_score: f64,
    pub max_weighted_score: f64,
    pub missing_key_questions: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStat {
    pub question_number: u32,
    pub correct_answer: Option<String>,
    pub point_value: Option<f64>,
    pub response_count: usize,
    pub correct_count: usize,
    pub accuracy: f64,
    pub unanswered: bool,
    pub key_missing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject: String,
    pub average_accuracy: f64,
    pub total_correct: usize,
    pub total_attempted: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTrendPoint {
    pub round: String,
    pub average_accuracy: f64,
    pub total_correct: usize,
    pub total_attempted: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReport {
    pub round: String,
    pub subject: String,
    pub question_count: u32,
    pub average_accuracy: f64,
    pub students: Vec<StudentGrade>,
    pub questions: Vec<QuestionStat>,
    pub missing_key_questions: Vec<u32>,
}

/// Groups rows by a label, keeping labels in first-appearance order.
#[derive(Debug, Default)]
struct OrderedTallies {
    order: Vec<String>,
    tallies: HashMap<String, Tally>,
}

impl OrderedTallies {
    fn entry(&mut self, label: &str) -> &mut Tally {
        if !self.tallies.contains_key(label) {
            self.order.push(label.to_string());
        }
        self.tallies.entry(label.to_string()).or_default()
    }

    fn into_rows(mut self) -> Vec<(String, Tally)> {
        self.order
            .into_iter()
            .map(|label| {
                let t = self.tallies.remove(&label).unwrap_or_default();
                (label, t)
            })
            .collect()
    }
}

pub struct GradingEngine<'a> {
    ctx: &'a ExamContext,
    store: &'a dyn RecordStore,
}

impl<'a> GradingEngine<'a> {
    pub fn new(ctx: &'a ExamContext, store: &'a dyn RecordStore) -> Self {
        Self { ctx, store }
    }

    fn check_scope(&self, round: &str, subject: &str) -> ExamResult<u32> {
        self.ctx.check_round(round)?;
        self.ctx.catalog().question_count(subject)
    }

    fn grade_rows(
        &self,
        student_id: &str,
        round: &str,
        subject: &str,
        rows: &[&ResponseEntry],
        keys: &AnswerKeyIndex,
    ) -> StudentGrade {
        let mut tally = Tally::default();
        let mut missing_key_questions = Vec::new();
        for r in rows {
            let outcome = keys.judge(r);
            if outcome == Outcome::KeyMissing {
                warn!(
                    "{}",
                    ExamError::AnswerKeyMissing {
                        round: round.to_string(),
                        subject: subject.to_string(),
                        question_number: r.question_number,
                    }
                );
                missing_key_questions.push(r.question_number);
            }
            tally.record(outcome);
        }
        missing_key_questions.sort_unstable();

        StudentGrade {
            student_id: student_id.to_string(),
            round: round.to_string(),
            subject: subject.to_string(),
            correct_count: tally.correct,
            incorrect_count: tally.attempted - tally.correct,
            attempted_count: tally.attempted,
            accuracy: (tally.attempted > 0).then(|| tally.accuracy()),
            weighted_score: tally.weighted,
            max_weighted_score: keys.max_weighted_score(round, subject),
            missing_key_questions,
        }
    }

    pub fn grade_student(&self, round: &str, subject: &str, student_id: &str) -> ExamResult<StudentGrade> {
        self.check_scope(round, subject)?;
        let scope = RowFilter::round_subject(round, subject);
        let keys = AnswerKeyIndex::load(self.store, &scope)?;
        let responses = self.store.responses(&scope.with_student(student_id))?;
        let rows: Vec<&ResponseEntry> = responses.iter().collect();
        debug!(round, subject, student_id, rows = rows.len(), "grading student");
        Ok(self.grade_rows(student_id, round, subject, &rows, &keys))
    }

    /// One grade per student with responses, in first-appearance order.
    pub fn grade_all_students(&self, round: &str, subject: &str) -> ExamResult<Vec<StudentGrade>> {
        self.check_scope(round, subject)?;
        let scope = RowFilter::round_subject(round, subject);
        let keys = AnswerKeyIndex::load(self.store, &scope)?;
        let responses = self.store.responses(&scope)?;

        let mut order: Vec<&str> = Vec::new();
        let mut by_student: HashMap<&str, Vec<&ResponseEntry>> = HashMap::new();
        for r in &responses {
            let rows = by_student.entry(r.student_id.as_str()).or_default();
            if rows.is_empty() {
                order.push(r.student_id.as_str());
            }
            rows.push(r);
        }

        Ok(order
            .into_iter()
            .map(|sid| {
                let rows = by_student.remove(sid).unwrap_or_default();
                self.grade_rows(sid, round, subject, &rows, &keys)
            })
            .collect())
    }

    /// Per-question accuracy for every question number of the subject.
    pub fn question_difficulty(&self, round: &str, subject: &str) -> ExamResult<Vec<QuestionStat>> {
        let question_count = self.check_scope(round, subject)?;
        let scope = RowFilter::round_subject(round, subject);
        let keys = AnswerKeyIndex::load(self.store, &scope)?;
        let responses = self.store.responses(&scope)?;

        let mut tallies: HashMap<u32, (usize, usize)> = HashMap::new();
        for r in &responses {
            let outcome = keys.judge(r);
            if outcome == Outcome::Blank {
                continue;
            }
            let t = tallies.entry(r.question_number).or_default();
            t.0 += 1;
            if matches!(outcome, Outcome::Correct(_)) {
                t.1 += 1;
            }
        }

        Ok((1..=question_count)
            .map(|q| {
                let key = keys.get(round, subject, q);
                let (response_count, correct_count) = tallies.get(&q).copied().unwrap_or((0, 0));
                QuestionStat {
                    question_number: q,
                    correct_answer: key.map(|k| k.correct_answer.clone()),
                    point_value: key.map(|k| k.point_value),
                    response_count,
                    correct_count,
                    accuracy: accuracy_percent(correct_count, response_count),
                    unanswered: response_count == 0,
                    key_missing: key.is_none(),
                }
            })
            .collect())
    }

    fn tally_responses<F>(&self, filter: &RowFilter, label: F) -> ExamResult<Vec<(String, Tally)>>
    where
        F: Fn(&ResponseEntry) -> &str,
    {
        let keys = AnswerKeyIndex::load(self.store, filter)?;
        let mut grouped = OrderedTallies::default();
        let mut missing = 0usize;
        for r in self.store.responses(filter)? {
            let outcome = keys.judge(&r);
            if outcome == Outcome::KeyMissing {
                missing += 1;
            }
            grouped.entry(label(&r)).record(outcome);
        }
        if missing > 0 {
            warn!(missing, "responses without an answer key were excluded");
        }
        Ok(grouped.into_rows())
    }

    /// `total_correct / total_attempted` per subject, subjects in order of
    /// first appearance among responses.
    pub fn subject_average(&self, round: Option<&str>) -> ExamResult<Vec<SubjectAverage>> {
        let filter = match round {
            Some(r) => {
                self.ctx.check_round(r)?;
                RowFilter::round(r)
            }
            None => RowFilter::all(),
        };
        Ok(self
            .tally_responses(&filter, |r| r.subject.as_str())?
            .into_iter()
            .map(|(subject, t)| SubjectAverage {
                subject,
                average_accuracy: t.accuracy(),
                total_correct: t.correct,
                total_attempted: t.attempted,
            })
            .collect())
    }

    /// Same aggregation as [`Self::subject_average`], grouped by round in
    /// configured order. Rounds without responses are omitted.
    pub fn round_trend(&self) -> ExamResult<Vec<RoundTrendPoint>> {
        let mut rows = self.tally_responses(&RowFilter::all(), |r| r.round.as_str())?;
        // Stable sort: unconfigured rounds keep first-appearance order at the end.
        rows.sort_by_key(|(round, _)| self.ctx.round_index(round).unwrap_or(usize::MAX));
        Ok(rows
            .into_iter()
            .map(|(round, t)| RoundTrendPoint {
                round,
                average_accuracy: t.accuracy(),
                total_correct: t.correct,
                total_attempted: t.attempted,
            })
            .collect())
    }

    pub fn subject_report(&self, round: &str, subject: &str) -> ExamResult<SubjectReport> {
        let question_count = self.check_scope(round, subject)?;
        let students = self.grade_all_students(round, subject)?;
        let questions = self.question_difficulty(round, subject)?;

        let (correct, attempted) = students
            .iter()
            .fold((0, 0), |(c, a), s| (c + s.correct_count, a + s.attempted_count));
        let missing_key_questions = questions
            .iter()
            .filter(|q| q.key_missing)
            .map(|q| q.question_number)
            .collect();

        Ok(SubjectReport {
            round: round.to_string(),
            subject: subject.to_string(),
            question_count,
            average_accuracy: accuracy_percent(correct, attempted),
            students,
            questions,
            missing_key_questions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ReplaceBatch};
    use crate::upsert::{AnswerInput, KeyInput, UpsertEngine};

    fn save_keys(ctx: &ExamContext, store: &MemoryStore, round: &str, subject: &str, answers: &[&str]) {
        let keys: Vec<KeyInput> = answers
            .iter()
            .enumerate()
            .map(|(i, a)| KeyInput {
                question_number: i as u32 + 1,
                answer: a.to_string(),
                point_value: None,
            })
            .collect();
        UpsertEngine::new(ctx, store)
            .save_answer_keys(round, subject, &keys)
            .expect("save keys");
    }

    fn submit(ctx: &ExamContext, store: &MemoryStore, sid: &str, round: &str, subject: &str, answers: &[&str]) {
        UpsertEngine::new(ctx, store)
            .submit_responses(sid, round, subject, &AnswerInput::positional(answers))
            .expect("submit");
    }

    #[test]
    fn one_of_two_correct_is_fifty_percent() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        save_keys(&ctx, &store, "1차", "수학", &["3", "1"]);
        submit(&ctx, &store, "s1", "1차", "수학", &["3", "2"]);

        let g = GradingEngine::new(&ctx, &store)
            .grade_student("1차", "수학", "s1")
            .unwrap();
        assert_eq!(g.correct_count, 1);
        assert_eq!(g.attempted_count, 2);
        assert_eq!(g.incorrect_count, 1);
        assert_eq!(g.accuracy, Some(50.0));
        assert_eq!(g.weighted_score, 2.0);
        assert_eq!(g.max_weighted_score, 4.0);
    }

    #[test]
    fn decimal_spelling_matches_integer_key() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        save_keys(&ctx, &store, "1차", "수학", &["3"]);
        // Bypass the upsert canonicalization to exercise the comparison itself.
        store
            .apply(&[ReplaceBatch::Responses {
                student_id: "s1".into(),
                round: "1차".into(),
                subject: "수학".into(),
                rows: vec![ResponseEntry {
                    student_id: "s1".into(),
                    round: "1차".into(),
                    subject: "수학".into(),
                    question_number: 1,
                    input_answer: " 3.0 ".into(),
                }],
            }])
            .unwrap();

        let g = GradingEngine::new(&ctx, &store)
            .grade_student("1차", "수학", "s1")
            .unwrap();
        assert_eq!(g.correct_count, 1);
    }

    #[test]
    fn question_without_key_is_excluded_not_wrong() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        save_keys(&ctx, &store, "1차", "수학", &["3", "1"]);
        submit(&ctx, &store, "s1", "1차", "수학", &["3", "1", "5"]);

        let engine = GradingEngine::new(&ctx, &store);
        let g = engine.grade_student("1차", "수학", "s1").unwrap();
        assert_eq!(g.attempted_count, 2);
        assert_eq!(g.correct_count, 2);
        assert_eq!(g.missing_key_questions, vec![3]);

        let q = engine.question_difficulty("1차", "수학").unwrap();
        assert_eq!(q.len(), 30);
        assert!(q[2].key_missing);
        assert_eq!(q[2].accuracy, 0.0);
        assert!(q[3].unanswered);
        assert_eq!(q[0].accuracy, 100.0);
    }

    #[test]
    fn nothing_attempted_has_no_accuracy() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        save_keys(&ctx, &store, "1차", "수학", &["3"]);
        let g = GradingEngine::new(&ctx, &store)
            .grade_student("1차", "수학", "nobody")
            .unwrap();
        assert_eq!(g.attempted_count, 0);
        assert_eq!(g.accuracy, None);
    }

    #[test]
    fn all_students_keep_first_appearance_order() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        save_keys(&ctx, &store, "1차", "국어", &["1", "2"]);
        submit(&ctx, &store, "zed", "1차", "국어", &["1", "2"]);
        submit(&ctx, &store, "amy", "1차", "국어", &["2", "2"]);

        let all = GradingEngine::new(&ctx, &store)
            .grade_all_students("1차", "국어")
            .unwrap();
        let ids: Vec<&str> = all.iter().map(|g| g.student_id.as_str()).collect();
        assert_eq!(ids, vec!["zed", "amy"]);
        assert_eq!(all[1].correct_count, 1);
    }

    #[test]
    fn subject_average_weights_by_attempts() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        let ten: Vec<&str> = vec!["1"; 10];
        save_keys(&ctx, &store, "1차", "영어", &ten);
        // 10 attempted, 5 correct.
        submit(&ctx, &store, "s1", "1차", "영어", &["1", "2", "1", "2", "1", "2", "1", "2", "1", "2"]);
        // 2 attempted, 2 correct.
        submit(&ctx, &store, "s2", "1차", "영어", &["1", "1"]);

        let avg = GradingEngine::new(&ctx, &store).subject_average(None).unwrap();
        assert_eq!(avg.len(), 1);
        assert_eq!(avg[0].total_correct, 7);
        assert_eq!(avg[0].total_attempted, 12);
        assert!((avg[0].average_accuracy - 7.0 / 12.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn subject_average_orders_by_first_appearance_and_filters_round() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        save_keys(&ctx, &store, "1차", "영어", &["1"]);
        save_keys(&ctx, &store, "1차", "국어", &["1"]);
        save_keys(&ctx, &store, "2차", "수학", &["1"]);
        submit(&ctx, &store, "s1", "1차", "영어", &["1"]);
        submit(&ctx, &store, "s1", "1차", "국어", &["2"]);
        submit(&ctx, &store, "s1", "2차", "수학", &["1"]);

        let engine = GradingEngine::new(&ctx, &store);
        let all = engine.subject_average(None).unwrap();
        let names: Vec<&str> = all.iter().map(|a| a.subject.as_str()).collect();
        assert_eq!(names, vec!["영어", "국어", "수학"]);

        let first = engine.subject_average(Some("1차")).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].average_accuracy, 0.0);
        assert!(matches!(
            engine.subject_average(Some("9차")),
            Err(ExamError::UnknownRound(_))
        ));
    }

    #[test]
    fn round_trend_uses_configured_order_and_skips_empty_rounds() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        for round in ["3차", "1차"] {
            save_keys(&ctx, &store, round, "한국사", &["4"]);
        }
        submit(&ctx, &store, "s1", "3차", "한국사", &["4"]);
        submit(&ctx, &store, "s1", "1차", "한국사", &["1"]);

        let trend = GradingEngine::new(&ctx, &store).round_trend().unwrap();
        let rounds: Vec<&str> = trend.iter().map(|p| p.round.as_str()).collect();
        assert_eq!(rounds, vec!["1차", "3차"]);
        assert_eq!(trend[0].average_accuracy, 0.0);
        assert_eq!(trend[1].average_accuracy, 100.0);
    }

    #[test]
    fn subject_report_bundles_students_and_questions() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        save_keys(&ctx, &store, "2차", "한국사", &["1", "2", "3"]);
        submit(&ctx, &store, "s1", "2차", "한국사", &["1", "2", "3"]);
        submit(&ctx, &store, "s2", "2차", "한국사", &["1", "1"]);

        let report = GradingEngine::new(&ctx, &store)
            .subject_report("2차", "한국사")
            .unwrap();
        assert_eq!(report.question_count, 20);
        assert_eq!(report.students.len(), 2);
        assert_eq!(report.questions.len(), 20);
        assert_eq!(report.questions[1].response_count, 2);
        assert_eq!(report.questions[1].correct_count, 1);
        assert_eq!(report.questions[1].accuracy, 50.0);
        assert_eq!(report.missing_key_questions.len(), 17);
        assert!((report.average_accuracy - 80.0).abs() < 1e-9);
    }
}
