use crate::catalog::SubjectCatalog;
use crate::config::ExamContext;
use crate::error::{ExamError, ExamResult};
use crate::model::ElectiveSelection;
use crate::store::RecordStore;

/// Two distinct subjects, both drawn from the combined elective groups.
pub fn validate_selection(catalog: &SubjectCatalog, elective1: &str, elective2: &str) -> ExamResult<()> {
    if elective1 == elective2 {
        return Err(ExamError::DuplicateElective(elective1.to_string()));
    }
    for e in [elective1, elective2] {
        match catalog.is_elective(e) {
            Ok(true) => {}
            Ok(false) | Err(ExamError::UnknownSubject(_)) => {
                return Err(ExamError::InvalidElective(e.to_string()))
            }
            Err(other) => return Err(other),
        }
    }
    Ok(())
}

pub fn selected_electives(
    store: &dyn RecordStore,
    student_id: &str,
    round: &str,
) -> ExamResult<Option<ElectiveSelection>> {
    store.elective_selection(student_id, round)
}

/// Core subjects followed by the student's chosen electives, in catalog order.
pub fn available_subjects(
    ctx: &ExamContext,
    store: &dyn RecordStore,
    student_id: &str,
    round: &str,
) -> ExamResult<Vec<String>> {
    ctx.check_round(round)?;
    let selection = selected_electives(store, student_id, round)?;
    Ok(ctx
        .catalog()
        .subjects()
        .iter()
        .filter(|s| {
            !s.category.is_elective()
                || selection.as_ref().map(|sel| sel.contains(&s.name)).unwrap_or(false)
        })
        .map(|s| s.name.clone())
        .collect())
}

/// Precondition for writing responses: elective subjects require a prior
/// selection naming them for the same round.
pub fn ensure_subject_available(
    ctx: &ExamContext,
    store: &dyn RecordStore,
    student_id: &str,
    round: &str,
    subject: &str,
) -> ExamResult<()> {
    if !ctx.catalog().is_elective(subject)? {
        return Ok(());
    }
    match selected_electives(store, student_id, round)? {
        Some(sel) if sel.contains(subject) => Ok(()),
        _ => Err(ExamError::ElectiveNotSelected {
            student_id: student_id.to_string(),
            round: round.to_string(),
            subject: subject.to_string(),
        }),
    }
}
