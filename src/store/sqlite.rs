use super::{RecordStore, ReplaceBatch, ReplaceOutcome};
use crate::error::ExamResult;
use crate::model::{AnswerKeyEntry, AnswerLogEntry, ElectiveSelection, ResponseEntry, RowFilter};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_FILE: &str = "exam.sqlite3";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (creating if needed) the workspace database.
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(workspace)?;
        let db_path = workspace.join(DB_FILE);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets readers keep a consistent snapshot while a replace commits.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            path: Some(db_path),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS answer_key(
            round TEXT NOT NULL,
            subject TEXT NOT NULL,
            question_number INTEGER NOT NULL,
            correct_answer TEXT NOT NULL,
            point_value REAL NOT NULL,
            PRIMARY KEY(round, subject, question_number)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            student_id TEXT NOT NULL,
            round TEXT NOT NULL,
            subject TEXT NOT NULL,
            question_number INTEGER NOT NULL,
            input_answer TEXT NOT NULL,
            PRIMARY KEY(student_id, round, subject, question_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_round_subject ON responses(round, subject)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS elective_selection(
            student_id TEXT NOT NULL,
            round TEXT NOT NULL,
            elective1 TEXT NOT NULL,
            elective2 TEXT NOT NULL,
            PRIMARY KEY(student_id, round),
            CHECK(elective1 <> elective2)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_answer_log(
            student_id TEXT NOT NULL,
            round TEXT NOT NULL,
            subject TEXT NOT NULL,
            question_number INTEGER NOT NULL,
            recorded_answer TEXT NOT NULL,
            PRIMARY KEY(student_id, round, subject, question_number)
        )",
        [],
    )?;
    // Early workspaces logged answers without submission metadata.
    ensure_answer_log_submission_columns(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_answer_log_round_subject ON student_answer_log(round, subject)",
        [],
    )?;

    Ok(())
}

fn ensure_answer_log_submission_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "student_answer_log", "submission_id")? {
        conn.execute(
            "ALTER TABLE student_answer_log ADD COLUMN submission_id TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    if !table_has_column(conn, "student_answer_log", "submitted_at")? {
        conn.execute(
            "ALTER TABLE student_answer_log ADD COLUMN submitted_at TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Builds ` WHERE a = ? AND b = ?` for the filter fields this table has.
fn where_clause(filter: &RowFilter, has_subject: bool, has_student: bool) -> (String, Vec<Value>) {
    let mut conds: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(r) = &filter.round {
        conds.push("round = ?");
        values.push(Value::Text(r.clone()));
    }
    if let (true, Some(s)) = (has_subject, &filter.subject) {
        conds.push("subject = ?");
        values.push(Value::Text(s.clone()));
    }
    if let (true, Some(id)) = (has_student, &filter.student_id) {
        conds.push("student_id = ?");
        values.push(Value::Text(id.clone()));
    }
    if conds.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conds.join(" AND ")), values)
    }
}

fn apply_one(tx: &Transaction<'_>, batch: &ReplaceBatch) -> rusqlite::Result<ReplaceOutcome> {
    match batch {
        ReplaceBatch::AnswerKeys {
            round,
            subject,
            rows,
        } => {
            let removed = tx.execute(
                "DELETE FROM answer_key WHERE round = ? AND subject = ?",
                (round, subject),
            )?;
            let mut stmt = tx.prepare_cached(
                "INSERT INTO answer_key(round, subject, question_number, correct_answer, point_value)
                 VALUES(?, ?, ?, ?, ?)",
            )?;
            for r in rows {
                stmt.execute((
                    &r.round,
                    &r.subject,
                    r.question_number,
                    &r.correct_answer,
                    r.point_value,
                ))?;
            }
            Ok(ReplaceOutcome {
                removed,
                inserted: rows.len(),
            })
        }
        ReplaceBatch::Responses {
            student_id,
            round,
            subject,
            rows,
        } => {
            let removed = tx.execute(
                "DELETE FROM responses WHERE student_id = ? AND round = ? AND subject = ?",
                (student_id, round, subject),
            )?;
            let mut stmt = tx.prepare_cached(
                "INSERT INTO responses(student_id, round, subject, question_number, input_answer)
                 VALUES(?, ?, ?, ?, ?)",
            )?;
            for r in rows {
                stmt.execute((
                    &r.student_id,
                    &r.round,
                    &r.subject,
                    r.question_number,
                    &r.input_answer,
                ))?;
            }
            Ok(ReplaceOutcome {
                removed,
                inserted: rows.len(),
            })
        }
        ReplaceBatch::ElectiveSelection {
            student_id,
            round,
            row,
        } => {
            let removed = tx.execute(
                "DELETE FROM elective_selection WHERE student_id = ? AND round = ?",
                (student_id, round),
            )?;
            tx.execute(
                "INSERT INTO elective_selection(student_id, round, elective1, elective2)
                 VALUES(?, ?, ?, ?)",
                (&row.student_id, &row.round, &row.elective1, &row.elective2),
            )?;
            Ok(ReplaceOutcome {
                removed,
                inserted: 1,
            })
        }
        ReplaceBatch::AnswerLog {
            student_id,
            round,
            subject,
            rows,
        } => {
            let removed = tx.execute(
                "DELETE FROM student_answer_log WHERE student_id = ? AND round = ? AND subject = ?",
                (student_id, round, subject),
            )?;
            let mut stmt = tx.prepare_cached(
                "INSERT INTO student_answer_log(
                    student_id, round, subject, question_number, recorded_answer,
                    submission_id, submitted_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            )?;
            for r in rows {
                stmt.execute((
                    &r.student_id,
                    &r.round,
                    &r.subject,
                    r.question_number,
                    &r.recorded_answer,
                    &r.submission_id,
                    &r.submitted_at,
                ))?;
            }
            Ok(ReplaceOutcome {
                removed,
                inserted: rows.len(),
            })
        }
    }
}

impl RecordStore for SqliteStore {
    fn apply(&self, batches: &[ReplaceBatch]) -> ExamResult<Vec<ReplaceOutcome>> {
        // IMMEDIATE takes the write lock up front so concurrent writers queue
        // instead of interleaving their delete/insert pairs.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let mut out = Vec::with_capacity(batches.len());
        for b in batches {
            out.push(apply_one(&tx, b)?);
        }
        tx.commit()?;
        Ok(out)
    }

    fn answer_keys(&self, filter: &RowFilter) -> ExamResult<Vec<AnswerKeyEntry>> {
        let (clause, values) = where_clause(filter, true, false);
        let sql = format!(
            "SELECT round, subject, question_number, correct_answer, point_value
             FROM answer_key{} ORDER BY rowid",
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |r| {
                Ok(AnswerKeyEntry {
                    round: r.get(0)?,
                    subject: r.get(1)?,
                    question_number: r.get(2)?,
                    correct_answer: r.get(3)?,
                    point_value: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn responses(&self, filter: &RowFilter) -> ExamResult<Vec<ResponseEntry>> {
        let (clause, values) = where_clause(filter, true, true);
        let sql = format!(
            "SELECT student_id, round, subject, question_number, input_answer
             FROM responses{} ORDER BY rowid",
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |r| {
                Ok(ResponseEntry {
                    student_id: r.get(0)?,
                    round: r.get(1)?,
                    subject: r.get(2)?,
                    question_number: r.get(3)?,
                    input_answer: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn elective_selections(&self, filter: &RowFilter) -> ExamResult<Vec<ElectiveSelection>> {
        let (clause, values) = where_clause(filter, false, true);
        let sql = format!(
            "SELECT student_id, round, elective1, elective2
             FROM elective_selection{} ORDER BY rowid",
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |r| {
                Ok(ElectiveSelection {
                    student_id: r.get(0)?,
                    round: r.get(1)?,
                    elective1: r.get(2)?,
                    elective2: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn answer_log(&self, filter: &RowFilter) -> ExamResult<Vec<AnswerLogEntry>> {
        let (clause, values) = where_clause(filter, true, true);
        let sql = format!(
            "SELECT student_id, round, subject, question_number, recorded_answer,
                    submission_id, submitted_at
             FROM student_answer_log{} ORDER BY rowid",
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |r| {
                Ok(AnswerLogEntry {
                    student_id: r.get(0)?,
                    round: r.get(1)?,
                    subject: r.get(2)?,
                    question_number: r.get(3)?,
                    recorded_answer: r.get(4)?,
                    submission_id: r.get(5)?,
                    submitted_at: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn flush(&self) -> ExamResult<()> {
        if self.path.is_some() {
            self.conn
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(p) => format!("sqlite:{}", p.to_string_lossy()),
            None => "sqlite::memory:".to_string(),
        }
    }
}
