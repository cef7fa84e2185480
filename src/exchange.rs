//! CSV exchange for the four relations.
//!
//! Export writes one file per relation with the canonical header. Import
//! accepts the canonical header or the Korean one, groups rows by replace
//! scope and sends every group through the upsert engine, so imported data
//! is validated and replaced exactly like interactive writes.

use crate::config::ExamContext;
use crate::model::{
    canonicalize_answer, AnswerKeyEntry, AnswerLogEntry, ElectiveSelection, ResponseEntry,
    RowFilter,
};
use crate::store::{RecordStore, Relation, ReplaceBatch};
use crate::upsert::UpsertEngine;
use anyhow::Context;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

pub const ANSWER_KEY_FILE: &str = "answer_key.csv";
pub const RESPONSES_FILE: &str = "responses.csv";
pub const ELECTIVES_FILE: &str = "elective_selection.csv";
pub const ANSWER_LOG_FILE: &str = "student_answer_log.csv";

/// Name used for the answer-key file by older data directories.
const LEGACY_ANSWER_KEY_FILE: &str = "answers.csv";

const LOG_EXTRA_COLUMNS: [&str; 2] = ["submission_id", "submitted_at"];

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

/// Splits `text` into records with the 1-based line each one starts on.
/// A newline inside a quoted field belongs to the field. Blank lines
/// between records are skipped.
fn split_csv_records(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    let mut in_quotes = false;
    for (idx, line) in text.lines().enumerate() {
        match pending.as_mut() {
            Some((_, buf)) => {
                buf.push('\n');
                buf.push_str(line);
            }
            None if line.trim().is_empty() => continue,
            None => pending = Some((idx + 1, line.to_string())),
        }
        // A doubled quote toggles twice, so only the parity matters.
        if line.chars().filter(|&c| c == '"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
        if !in_quotes {
            out.extend(pending.take());
        }
    }
    // An unterminated quote runs to the end of the file.
    out.extend(pending);
    out
}

/// Header names accepted for each logical column.
fn column_aliases(column: &str) -> &'static [&'static str] {
    match column {
        "round" => &["round", "회차"],
        "subject" => &["subject", "과목"],
        "question_number" => &["question_number", "문항번호"],
        "correct_answer" => &["correct_answer", "정답"],
        "point_value" => &["point_value", "배점"],
        "student_id" => &["student_id", "학생ID", "학생id"],
        "input_answer" => &["input_answer", "입력답"],
        "recorded_answer" => &["recorded_answer", "correct_answer", "입력답", "정답"],
        "elective1" => &["elective1", "선택1"],
        "elective2" => &["elective2", "선택2"],
        "submission_id" => &["submission_id"],
        "submitted_at" => &["submitted_at"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportWarning {
    pub file: String,
    pub line: usize,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub file: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub dir: String,
    pub files: Vec<ExportedFile>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedFile {
    pub file: String,
    pub rows_read: usize,
    pub groups_applied: usize,
    pub groups_rejected: usize,
    pub rows_written: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub files: Vec<ImportedFile>,
    pub warnings: Vec<ImportWarning>,
}

fn write_csv(dir: &Path, file: &str, header: &[&str], lines: Vec<String>) -> anyhow::Result<ExportedFile> {
    let mut csv = header.join(",");
    csv.push('\n');
    let rows = lines.len();
    for line in lines {
        csv.push_str(&line);
        csv.push('\n');
    }
    let path = dir.join(file);
    std::fs::write(&path, csv).with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(ExportedFile {
        file: file.to_string(),
        rows,
    })
}

fn join_fields<S: AsRef<str>>(fields: &[S]) -> String {
    fields.iter().map(|f| csv_quote(f.as_ref())).collect::<Vec<_>>().join(",")
}

pub fn export_csv(store: &dyn RecordStore, dir: &Path) -> anyhow::Result<ExportSummary> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.to_string_lossy()))?;
    let all = RowFilter::all();
    let mut files = Vec::new();

    let keys = store.answer_keys(&all)?;
    files.push(write_csv(
        dir,
        ANSWER_KEY_FILE,
        Relation::AnswerKey.columns(),
        keys.iter()
            .map(|k| {
                join_fields(&[
                    &k.round,
                    &k.subject,
                    &k.question_number.to_string(),
                    &k.correct_answer,
                    &format!("{:.1}", k.point_value),
                ])
            })
            .collect(),
    )?);

    let responses = store.responses(&all)?;
    files.push(write_csv(
        dir,
        RESPONSES_FILE,
        Relation::Response.columns(),
        responses
            .iter()
            .map(|r| {
                join_fields(&[
                    &r.student_id,
                    &r.round,
                    &r.subject,
                    &r.question_number.to_string(),
                    &r.input_answer,
                ])
            })
            .collect(),
    )?);

    let electives = store.elective_selections(&all)?;
    files.push(write_csv(
        dir,
        ELECTIVES_FILE,
        Relation::ElectiveSelection.columns(),
        electives
            .iter()
            .map(|e| join_fields(&[&e.student_id, &e.round, &e.elective1, &e.elective2]))
            .collect(),
    )?);

    let log = store.answer_log(&all)?;
    let mut log_header: Vec<&str> = Relation::StudentAnswerLog.columns().to_vec();
    log_header.extend(LOG_EXTRA_COLUMNS);
    files.push(write_csv(
        dir,
        ANSWER_LOG_FILE,
        &log_header,
        log.iter()
            .map(|l| {
                join_fields(&[
                    &l.student_id,
                    &l.round,
                    &l.subject,
                    &l.question_number.to_string(),
                    &l.recorded_answer,
                    &l.submission_id,
                    &l.submitted_at,
                ])
            })
            .collect(),
    )?);

    info!(dir = %dir.to_string_lossy(), "csv export complete");
    Ok(ExportSummary {
        dir: dir.to_string_lossy().to_string(),
        files,
    })
}

/// One data line with its fields addressed by logical column name.
struct CsvRow {
    line: usize,
    fields: Vec<String>,
}

struct CsvTable {
    file: String,
    columns: HashMap<&'static str, usize>,
    rows: Vec<CsvRow>,
}

impl CsvTable {
    fn parse(file: &str, text: &str, wanted: &[&'static str]) -> Self {
        let mut records = split_csv_records(text.trim_start_matches('\u{feff}')).into_iter();
        let Some((_, header)) = records.next() else {
            return Self {
                file: file.to_string(),
                columns: HashMap::new(),
                rows: Vec::new(),
            };
        };
        let header = parse_csv_record(&header);

        let mut columns = HashMap::new();
        for &col in wanted {
            let aliases = column_aliases(col);
            if let Some(idx) = header.iter().position(|h| aliases.contains(&h.trim())) {
                columns.insert(col, idx);
            }
        }

        let rows = records
            .map(|(line, raw)| CsvRow {
                line,
                fields: parse_csv_record(&raw),
            })
            .collect();
        Self {
            file: file.to_string(),
            columns,
            rows,
        }
    }

    fn require(&self, required: &[&'static str]) -> Result<(), ImportWarning> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !self.columns.contains_key(*c))
            .copied()
            .collect();
        if missing.is_empty() || self.rows.is_empty() {
            return Ok(());
        }
        Err(ImportWarning {
            file: self.file.clone(),
            line: 1,
            code: "bad_header".to_string(),
            message: format!("missing columns: {}", missing.join(", ")),
        })
    }

    fn get<'r>(&self, row: &'r CsvRow, column: &str) -> Option<&'r str> {
        self.columns
            .get(column)
            .and_then(|&i| row.fields.get(i))
            .map(|s| s.as_str())
    }

    fn text(&self, row: &CsvRow, column: &str) -> String {
        self.get(row, column).map(|s| s.trim().to_string()).unwrap_or_default()
    }

    fn warn(&self, line: usize, code: &str, message: impl Into<String>) -> ImportWarning {
        ImportWarning {
            file: self.file.clone(),
            line,
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn question_number(&self, row: &CsvRow) -> Result<u32, ImportWarning> {
        // Spreadsheet round-trips may turn 3 into 3.0.
        let raw = canonicalize_answer(&self.text(row, "question_number"));
        raw.parse::<u32>().map_err(|_| {
            self.warn(
                row.line,
                "bad_question_number",
                format!("question_number must be a positive integer, got {:?}", raw),
            )
        })
    }
}

/// Rows grouped by replace scope, scopes in first-appearance order.
struct ScopedGroups<K, R> {
    order: Vec<K>,
    groups: HashMap<K, (usize, Vec<R>)>,
}

impl<K: std::hash::Hash + Eq + Clone, R> ScopedGroups<K, R> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            groups: HashMap::new(),
        }
    }

    fn push(&mut self, key: K, line: usize, row: R) {
        let entry = self.groups.entry(key.clone()).or_insert_with(|| {
            self.order.push(key);
            (line, Vec::new())
        });
        entry.1.push(row);
    }

    fn into_groups(mut self) -> Vec<(K, usize, Vec<R>)> {
        self.order
            .into_iter()
            .filter_map(|k| self.groups.remove(&k).map(|(line, rows)| (k, line, rows)))
            .collect()
    }
}

/// Keeps the last row for each question number, at the position the
/// question first appeared. Returns the rows and how many were dropped.
fn keep_last_per_question<R>(rows: Vec<R>, question: impl Fn(&R) -> u32) -> (Vec<R>, usize) {
    let mut slot: HashMap<u32, usize> = HashMap::new();
    let mut out: Vec<R> = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for r in rows {
        match slot.get(&question(&r)) {
            Some(&i) => {
                out[i] = r;
                dropped += 1;
            }
            None => {
                slot.insert(question(&r), out.len());
                out.push(r);
            }
        }
    }
    (out, dropped)
}

struct Importer<'a> {
    engine: UpsertEngine<'a>,
    ctx: &'a ExamContext,
    summary: ImportSummary,
}

impl<'a> Importer<'a> {
    fn read(&mut self, dir: &Path, names: &[&str], wanted: &[&'static str], required: &[&'static str]) -> anyhow::Result<Option<CsvTable>> {
        let Some(name) = names.iter().find(|n| dir.join(n).is_file()) else {
            return Ok(None);
        };
        let path = dir.join(name);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        let table = CsvTable::parse(name, &text, wanted);
        if let Err(w) = table.require(required) {
            self.summary.warnings.push(w);
            self.summary.files.push(ImportedFile {
                file: name.to_string(),
                rows_read: table.rows.len(),
                ..ImportedFile::default()
            });
            return Ok(None);
        }
        Ok(Some(table))
    }

    /// Older data files were appended to on every save, so one scope can
    /// repeat a question. The last row wins, as a resubmission would.
    fn dedupe_scope<R>(
        &mut self,
        table: &CsvTable,
        line: usize,
        scope: &str,
        rows: Vec<R>,
        question: impl Fn(&R) -> u32,
    ) -> Vec<R> {
        let (rows, dropped) = keep_last_per_question(rows, question);
        if dropped > 0 {
            self.summary.warnings.push(table.warn(
                line,
                "duplicate_scope",
                format!(
                    "{} repeated question rows in {}; the last one per question is kept",
                    dropped, scope
                ),
            ));
        }
        rows
    }

    fn apply_groups(&mut self, table: &CsvTable, groups: Vec<(usize, ReplaceBatch)>) {
        let mut file = ImportedFile {
            file: table.file.clone(),
            rows_read: table.rows.len(),
            ..ImportedFile::default()
        };
        for (line, batch) in groups {
            match self.engine.replace(batch) {
                Ok(outcome) => {
                    file.groups_applied += 1;
                    file.rows_written += outcome.inserted;
                }
                Err(e) => {
                    file.groups_rejected += 1;
                    warn!(file = %table.file, line, error = %e, "import group rejected");
                    self.summary
                        .warnings
                        .push(table.warn(line, e.code(), e.to_string()));
                }
            }
        }
        self.summary.files.push(file);
    }

    fn answer_keys(&mut self, dir: &Path) -> anyhow::Result<()> {
        let wanted = ["round", "subject", "question_number", "correct_answer", "point_value"];
        let Some(table) = self.read(
            dir,
            &[ANSWER_KEY_FILE, LEGACY_ANSWER_KEY_FILE],
            &wanted,
            &wanted[..4],
        )?
        else {
            return Ok(());
        };

        let mut scoped: ScopedGroups<(String, String), AnswerKeyEntry> = ScopedGroups::new();
        for row in &table.rows {
            let question_number = match table.question_number(row) {
                Ok(q) => q,
                Err(w) => {
                    self.summary.warnings.push(w);
                    continue;
                }
            };
            let correct_answer = canonicalize_answer(&table.text(row, "correct_answer"));
            if correct_answer.is_empty() {
                continue;
            }
            let raw_points = table.text(row, "point_value");
            let point_value = if raw_points.is_empty() {
                self.ctx.default_point_value()
            } else {
                match raw_points.parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => {
                        self.summary.warnings.push(table.warn(
                            row.line,
                            "bad_point_value",
                            "point_value must be numeric when provided",
                        ));
                        continue;
                    }
                }
            };
            let entry = AnswerKeyEntry {
                round: table.text(row, "round"),
                subject: table.text(row, "subject"),
                question_number,
                correct_answer,
                point_value,
            };
            scoped.push((entry.round.clone(), entry.subject.clone()), row.line, entry);
        }

        let mut groups = Vec::new();
        for ((round, subject), line, rows) in scoped.into_groups() {
            let scope = format!("{} {}", round, subject);
            let rows = self.dedupe_scope(&table, line, &scope, rows, |r| r.question_number);
            groups.push((line, ReplaceBatch::AnswerKeys { round, subject, rows }));
        }
        self.apply_groups(&table, groups);
        Ok(())
    }

    fn electives(&mut self, dir: &Path) -> anyhow::Result<()> {
        let wanted = ["student_id", "round", "elective1", "elective2"];
        let Some(table) = self.read(dir, &[ELECTIVES_FILE], &wanted, &wanted)? else {
            return Ok(());
        };

        let mut scoped: ScopedGroups<(String, String), ElectiveSelection> = ScopedGroups::new();
        for row in &table.rows {
            let sel = ElectiveSelection {
                student_id: table.text(row, "student_id"),
                round: table.text(row, "round"),
                elective1: table.text(row, "elective1"),
                elective2: table.text(row, "elective2"),
            };
            scoped.push((sel.student_id.clone(), sel.round.clone()), row.line, sel);
        }

        let mut groups = Vec::new();
        for ((student_id, round), line, mut rows) in scoped.into_groups() {
            if rows.len() > 1 {
                self.summary.warnings.push(table.warn(
                    line,
                    "duplicate_scope",
                    format!(
                        "{} selections for {} in {}; the last one is kept",
                        rows.len(),
                        student_id,
                        round
                    ),
                ));
            }
            let Some(row) = rows.pop() else { continue };
            groups.push((
                line,
                ReplaceBatch::ElectiveSelection {
                    student_id,
                    round,
                    row,
                },
            ));
        }
        self.apply_groups(&table, groups);
        Ok(())
    }

    fn responses(&mut self, dir: &Path) -> anyhow::Result<()> {
        let wanted = ["student_id", "round", "subject", "question_number", "input_answer"];
        let Some(table) = self.read(dir, &[RESPONSES_FILE], &wanted, &wanted)? else {
            return Ok(());
        };

        let mut scoped: ScopedGroups<(String, String, String), ResponseEntry> = ScopedGroups::new();
        for row in &table.rows {
            let question_number = match table.question_number(row) {
                Ok(q) => q,
                Err(w) => {
                    self.summary.warnings.push(w);
                    continue;
                }
            };
            let entry = ResponseEntry {
                student_id: table.text(row, "student_id"),
                round: table.text(row, "round"),
                subject: table.text(row, "subject"),
                question_number,
                input_answer: table.get(row, "input_answer").unwrap_or_default().to_string(),
            };
            let key = (
                entry.student_id.clone(),
                entry.round.clone(),
                entry.subject.clone(),
            );
            scoped.push(key, row.line, entry);
        }

        let mut groups = Vec::new();
        for ((student_id, round, subject), line, rows) in scoped.into_groups() {
            let scope = format!("{} {} {}", student_id, round, subject);
            let rows = self.dedupe_scope(&table, line, &scope, rows, |r| r.question_number);
            let batch = ReplaceBatch::Responses {
                student_id,
                round,
                subject,
                rows,
            };
            groups.push((line, batch));
        }
        self.apply_groups(&table, groups);
        Ok(())
    }

    fn answer_log(&mut self, dir: &Path) -> anyhow::Result<()> {
        let wanted = [
            "student_id",
            "round",
            "subject",
            "question_number",
            "recorded_answer",
            "submission_id",
            "submitted_at",
        ];
        let Some(table) = self.read(dir, &[ANSWER_LOG_FILE], &wanted, &wanted[..5])? else {
            return Ok(());
        };

        let mut scoped: ScopedGroups<(String, String, String), AnswerLogEntry> = ScopedGroups::new();
        for row in &table.rows {
            let question_number = match table.question_number(row) {
                Ok(q) => q,
                Err(w) => {
                    self.summary.warnings.push(w);
                    continue;
                }
            };
            let entry = AnswerLogEntry {
                student_id: table.text(row, "student_id"),
                round: table.text(row, "round"),
                subject: table.text(row, "subject"),
                question_number,
                recorded_answer: table.get(row, "recorded_answer").unwrap_or_default().to_string(),
                submission_id: table.text(row, "submission_id"),
                submitted_at: table.text(row, "submitted_at"),
            };
            let key = (
                entry.student_id.clone(),
                entry.round.clone(),
                entry.subject.clone(),
            );
            scoped.push(key, row.line, entry);
        }

        let imported_at = chrono::Utc::now().to_rfc3339();
        let mut groups = Vec::new();
        for ((student_id, round, subject), line, rows) in scoped.into_groups() {
            let scope = format!("{} {} {}", student_id, round, subject);
            let mut rows = self.dedupe_scope(&table, line, &scope, rows, |r| r.question_number);
            // Logs written before submissions were tracked get one id per group.
            let fallback_id = Uuid::new_v4().to_string();
            for r in rows.iter_mut() {
                if r.submission_id.is_empty() {
                    r.submission_id = fallback_id.clone();
                }
                if r.submitted_at.is_empty() {
                    r.submitted_at = imported_at.clone();
                }
            }
            let batch = ReplaceBatch::AnswerLog {
                student_id,
                round,
                subject,
                rows,
            };
            groups.push((line, batch));
        }
        self.apply_groups(&table, groups);
        Ok(())
    }
}

/// Imports whichever exchange files exist in `dir`. Answer keys and
/// elective selections go first so response groups can pass the elective
/// precondition.
pub fn import_csv(ctx: &ExamContext, store: &dyn RecordStore, dir: &Path) -> anyhow::Result<ImportSummary> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.to_string_lossy());
    }
    let mut importer = Importer {
        engine: UpsertEngine::new(ctx, store),
        ctx,
        summary: ImportSummary::default(),
    };
    importer.answer_keys(dir)?;
    importer.electives(dir)?;
    importer.responses(dir)?;
    importer.answer_log(dir)?;

    let summary = importer.summary;
    info!(
        dir = %dir.to_string_lossy(),
        files = summary.files.len(),
        warnings = summary.warnings.len(),
        "csv import complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::upsert::{AnswerInput, KeyInput};

    #[test]
    fn parse_csv_record_handles_quotes() {
        assert_eq!(parse_csv_record("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(
            parse_csv_record("\"ㄱ, ㄴ\",\"say \"\"hi\"\"\","),
            vec!["ㄱ, ㄴ", "say \"hi\"", ""]
        );
        assert_eq!(csv_quote("ㄱ, ㄴ"), "\"ㄱ, ㄴ\"");
        assert_eq!(csv_quote("3"), "3");
    }

    #[test]
    fn export_then_import_into_empty_store() {
        let ctx = ExamContext::default();
        let source = MemoryStore::new();
        let engine = UpsertEngine::new(&ctx, &source);
        engine
            .save_answer_keys(
                "1차",
                "수학",
                &[
                    KeyInput {
                        question_number: 1,
                        answer: "3".into(),
                        point_value: Some(3.0),
                    },
                    KeyInput {
                        question_number: 2,
                        answer: "ㄱ, ㄴ".into(),
                        point_value: None,
                    },
                ],
            )
            .unwrap();
        engine.save_electives("s1", "1차", "화학", "경제").unwrap();
        engine
            .submit_responses("s1", "1차", "수학", &AnswerInput::positional(&["3", ""]))
            .unwrap();
        engine
            .submit_responses("s1", "1차", "화학", &AnswerInput::positional(&["1"]))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let exported = export_csv(&source, dir.path()).unwrap();
        assert_eq!(exported.files.len(), 4);
        let text = std::fs::read_to_string(dir.path().join(ANSWER_KEY_FILE)).unwrap();
        assert!(text.starts_with("round,subject,question_number,correct_answer,point_value\n"));
        assert!(text.contains("1차,수학,2,\"ㄱ, ㄴ\",2.0"));

        let target = MemoryStore::new();
        let summary = import_csv(&ctx, &target, dir.path()).unwrap();
        assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
        assert_eq!(
            target.answer_keys(&RowFilter::all()).unwrap(),
            source.answer_keys(&RowFilter::all()).unwrap()
        );
        assert_eq!(
            target.responses(&RowFilter::all()).unwrap(),
            source.responses(&RowFilter::all()).unwrap()
        );
        assert_eq!(
            target.answer_log(&RowFilter::all()).unwrap(),
            source.answer_log(&RowFilter::all()).unwrap()
        );
        assert_eq!(target.elective_selections(&RowFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn korean_headers_and_bad_rows_produce_warnings() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(LEGACY_ANSWER_KEY_FILE),
            "\u{feff}회차,과목,문항번호,정답\n1차,국어,1,3.0\n1차,국어,x,2\n1차,천문학,1,1\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(RESPONSES_FILE),
            "학생ID,회차,과목,문항번호,입력답\ns1,1차,국어,1,3\ns1,1차,물리학,1,2\n",
        )
        .unwrap();

        let summary = import_csv(&ctx, &store, dir.path()).unwrap();
        let codes: Vec<&str> = summary.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(
            codes,
            vec!["bad_question_number", "unknown_subject", "elective_not_selected"]
        );
        assert_eq!(summary.warnings[0].line, 3);
        assert_eq!(summary.warnings[1].line, 4);

        let keys = store.answer_keys(&RowFilter::all()).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].correct_answer, "3");
        assert_eq!(keys[0].point_value, 2.0);
        assert_eq!(store.responses(&RowFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn resaved_legacy_file_keeps_last_row_per_question() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(LEGACY_ANSWER_KEY_FILE),
            "회차,과목,문항번호,정답\n1차,국어,1,1\n1차,국어,2,2\n1차,국어,1,3\n1차,국어,2,4\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(RESPONSES_FILE),
            "학생ID,회차,과목,문항번호,입력답\ns1,1차,국어,1,1\ns1,1차,국어,1,3\n",
        )
        .unwrap();

        let summary = import_csv(&ctx, &store, dir.path()).unwrap();
        let codes: Vec<&str> = summary.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec!["duplicate_scope", "duplicate_scope"]);
        assert_eq!(summary.warnings[0].line, 2);

        let keys: Vec<(u32, String)> = store
            .answer_keys(&RowFilter::all())
            .unwrap()
            .into_iter()
            .map(|k| (k.question_number, k.correct_answer))
            .collect();
        assert_eq!(keys, vec![(1, "3".to_string()), (2, "4".to_string())]);
        let responses = store.responses(&RowFilter::all()).unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].input_answer, "3");
    }

    #[test]
    fn quoted_line_breaks_survive_export_and_import() {
        let ctx = ExamContext::default();
        let source = MemoryStore::new();
        UpsertEngine::new(&ctx, &source)
            .submit_responses(
                "s1",
                "1차",
                "국어",
                &AnswerInput::positional(&["a\nb", "say \"hi\"", "2"]),
            )
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        export_csv(&source, dir.path()).unwrap();

        let target = MemoryStore::new();
        let summary = import_csv(&ctx, &target, dir.path()).unwrap();
        assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
        assert_eq!(
            target.responses(&RowFilter::all()).unwrap(),
            source.responses(&RowFilter::all()).unwrap()
        );
        assert_eq!(
            target.answer_log(&RowFilter::all()).unwrap(),
            source.answer_log(&RowFilter::all()).unwrap()
        );
    }

    #[test]
    fn records_split_only_on_unquoted_newlines() {
        let records = split_csv_records("h1,h2\n\n\"x\ny\",1\nz,2\n");
        assert_eq!(
            records,
            vec![
                (1, "h1,h2".to_string()),
                (3, "\"x\ny\",1".to_string()),
                (5, "z,2".to_string()),
            ]
        );
    }

    #[test]
    fn missing_required_column_skips_file() {
        let ctx = ExamContext::default();
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ELECTIVES_FILE), "student_id,round,elective1\ns1,1차,화학\n").unwrap();

        let summary = import_csv(&ctx, &store, dir.path()).unwrap();
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.warnings[0].code, "bad_header");
        assert!(store.elective_selections(&RowFilter::all()).unwrap().is_empty());
    }
}
