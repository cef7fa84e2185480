//! Record store: the four persisted relations behind one trait so the core
//! runs against SQLite workspaces and in-process tables alike.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, DB_FILE};

use crate::error::ExamResult;
use crate::model::{AnswerKeyEntry, AnswerLogEntry, ElectiveSelection, ResponseEntry, RowFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    AnswerKey,
    Response,
    ElectiveSelection,
    StudentAnswerLog,
}

impl Relation {
    pub fn table(self) -> &'static str {
        match self {
            Relation::AnswerKey => "answer_key",
            Relation::Response => "responses",
            Relation::ElectiveSelection => "elective_selection",
            Relation::StudentAnswerLog => "student_answer_log",
        }
    }

    /// Column order for file exchange.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Relation::AnswerKey => &[
                "round",
                "subject",
                "question_number",
                "correct_answer",
                "point_value",
            ],
            Relation::Response => &[
                "student_id",
                "round",
                "subject",
                "question_number",
                "input_answer",
            ],
            Relation::ElectiveSelection => &["student_id", "round", "elective1", "elective2"],
            Relation::StudentAnswerLog => &[
                "student_id",
                "round",
                "subject",
                "question_number",
                "correct_answer",
            ],
        }
    }
}

/// One "replace all rows matching this key" unit. The scope fields are the
/// key predicate; the rows are the full replacement set.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceBatch {
    AnswerKeys {
        round: String,
        subject: String,
        rows: Vec<AnswerKeyEntry>,
    },
    Responses {
        student_id: String,
        round: String,
        subject: String,
        rows: Vec<ResponseEntry>,
    },
    ElectiveSelection {
        student_id: String,
        round: String,
        row: ElectiveSelection,
    },
    AnswerLog {
        student_id: String,
        round: String,
        subject: String,
        rows: Vec<AnswerLogEntry>,
    },
}

impl ReplaceBatch {
    pub fn relation(&self) -> Relation {
        match self {
            ReplaceBatch::AnswerKeys { .. } => Relation::AnswerKey,
            ReplaceBatch::Responses { .. } => Relation::Response,
            ReplaceBatch::ElectiveSelection { .. } => Relation::ElectiveSelection,
            ReplaceBatch::AnswerLog { .. } => Relation::StudentAnswerLog,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceOutcome {
    pub removed: usize,
    pub inserted: usize,
}

pub trait RecordStore {
    /// Applies every batch as one indivisible unit: readers observe either
    /// the state before all of them or after all of them.
    fn apply(&self, batches: &[ReplaceBatch]) -> ExamResult<Vec<ReplaceOutcome>>;

    /// Rows in insertion order.
    fn answer_keys(&self, filter: &RowFilter) -> ExamResult<Vec<AnswerKeyEntry>>;

    /// Rows in insertion order.
    fn responses(&self, filter: &RowFilter) -> ExamResult<Vec<ResponseEntry>>;

    fn elective_selections(&self, filter: &RowFilter) -> ExamResult<Vec<ElectiveSelection>>;

    fn answer_log(&self, filter: &RowFilter) -> ExamResult<Vec<AnswerLogEntry>>;

    fn elective_selection(
        &self,
        student_id: &str,
        round: &str,
    ) -> ExamResult<Option<ElectiveSelection>> {
        let filter = RowFilter::round(round).with_student(student_id);
        Ok(self.elective_selections(&filter)?.into_iter().next())
    }

    /// Makes all committed writes durable in the backing file, if any.
    fn flush(&self) -> ExamResult<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}
