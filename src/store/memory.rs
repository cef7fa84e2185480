use super::{RecordStore, ReplaceBatch, ReplaceOutcome};
use crate::error::{ExamError, ExamResult};
use crate::model::{AnswerKeyEntry, AnswerLogEntry, ElectiveSelection, ResponseEntry, RowFilter};
use std::sync::{RwLock, RwLockReadGuard};

#[derive(Debug, Default, Clone)]
struct Tables {
    answer_keys: Vec<AnswerKeyEntry>,
    responses: Vec<ResponseEntry>,
    electives: Vec<ElectiveSelection>,
    answer_log: Vec<AnswerLogEntry>,
}

/// In-process tables. Each `apply` holds the write lock across every delete
/// and insert it performs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> ExamResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| ExamError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn replace_rows<T: Clone>(
    table: &mut Vec<T>,
    in_scope: impl Fn(&T) -> bool,
    rows: &[T],
) -> ReplaceOutcome {
    let before = table.len();
    table.retain(|r| !in_scope(r));
    let removed = before - table.len();
    table.extend(rows.iter().cloned());
    ReplaceOutcome {
        removed,
        inserted: rows.len(),
    }
}

fn apply_one(t: &mut Tables, batch: &ReplaceBatch) -> ReplaceOutcome {
    match batch {
        ReplaceBatch::AnswerKeys {
            round,
            subject,
            rows,
        } => replace_rows(
            &mut t.answer_keys,
            |r| r.round == *round && r.subject == *subject,
            rows,
        ),
        ReplaceBatch::Responses {
            student_id,
            round,
            subject,
            rows,
        } => replace_rows(
            &mut t.responses,
            |r| r.student_id == *student_id && r.round == *round && r.subject == *subject,
            rows,
        ),
        ReplaceBatch::ElectiveSelection {
            student_id,
            round,
            row,
        } => replace_rows(
            &mut t.electives,
            |r| r.student_id == *student_id && r.round == *round,
            std::slice::from_ref(row),
        ),
        ReplaceBatch::AnswerLog {
            student_id,
            round,
            subject,
            rows,
        } => replace_rows(
            &mut t.answer_log,
            |r| r.student_id == *student_id && r.round == *round && r.subject == *subject,
            rows,
        ),
    }
}

impl RecordStore for MemoryStore {
    fn apply(&self, batches: &[ReplaceBatch]) -> ExamResult<Vec<ReplaceOutcome>> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| ExamError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(batches.iter().map(|b| apply_one(&mut tables, b)).collect())
    }

    fn answer_keys(&self, filter: &RowFilter) -> ExamResult<Vec<AnswerKeyEntry>> {
        Ok(self
            .read()?
            .answer_keys
            .iter()
            .filter(|r| filter.matches(&r.round, Some(&r.subject), None))
            .cloned()
            .collect())
    }

    fn responses(&self, filter: &RowFilter) -> ExamResult<Vec<ResponseEntry>> {
        Ok(self
            .read()?
            .responses
            .iter()
            .filter(|r| filter.matches(&r.round, Some(&r.subject), Some(&r.student_id)))
            .cloned()
            .collect())
    }

    fn elective_selections(&self, filter: &RowFilter) -> ExamResult<Vec<ElectiveSelection>> {
        Ok(self
            .read()?
            .electives
            .iter()
            .filter(|r| filter.matches(&r.round, None, Some(&r.student_id)))
            .cloned()
            .collect())
    }

    fn answer_log(&self, filter: &RowFilter) -> ExamResult<Vec<AnswerLogEntry>> {
        Ok(self
            .read()?
            .answer_log
            .iter()
            .filter(|r| filter.matches(&r.round, Some(&r.subject), Some(&r.student_id)))
            .cloned()
            .collect())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(q: u32, ans: &str) -> AnswerKeyEntry {
        AnswerKeyEntry {
            round: "1차".into(),
            subject: "수학".into(),
            question_number: q,
            correct_answer: ans.into(),
            point_value: 2.0,
        }
    }

    fn key_batch(answers: &[&str]) -> ReplaceBatch {
        ReplaceBatch::AnswerKeys {
            round: "1차".into(),
            subject: "수학".into(),
            rows: answers
                .iter()
                .enumerate()
                .map(|(i, a)| key(i as u32 + 1, a))
                .collect(),
        }
    }

    #[test]
    fn replace_removes_only_matching_scope() {
        let store = MemoryStore::new();
        store.apply(&[key_batch(&["1", "2", "3"])]).unwrap();
        store
            .apply(&[ReplaceBatch::AnswerKeys {
                round: "2차".into(),
                subject: "수학".into(),
                rows: vec![AnswerKeyEntry {
                    round: "2차".into(),
                    ..key(1, "5")
                }],
            }])
            .unwrap();

        let out = store.apply(&[key_batch(&["4"])]).unwrap();
        assert_eq!(out[0], ReplaceOutcome { removed: 3, inserted: 1 });

        let all = store.answer_keys(&RowFilter::all()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].round, "2차");
        assert_eq!(all[1].correct_answer, "4");
    }

    #[test]
    fn concurrent_replaces_never_duplicate_keys() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let ans = format!("{}", (t + i) % 5 + 1);
                        store
                            .apply(&[key_batch(&[ans.as_str(), "1", "2"])])
                            .expect("apply");
                        let seen = store
                            .answer_keys(&RowFilter::round_subject("1차", "수학"))
                            .expect("read");
                        assert_eq!(seen.len(), 3, "reader saw an interleaved state");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("join");
        }
        let rows = store.answer_keys(&RowFilter::all()).unwrap();
        let mut numbers: Vec<u32> = rows.iter().map(|r| r.question_number).collect();
        numbers.sort();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}
