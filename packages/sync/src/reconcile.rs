//! Recent-grades reconciliation.
//!
//! Joins the exam calendar with the grades table on `(code, group)` to
//! find grades for exams that already happened.

use std::collections::{BTreeMap, BTreeSet};

use campus_portal_models::{ExamRecord, GradeKey, GradeRecord, RecentGrade};
use chrono::NaiveDate;

/// Computes the most recent graded exams.
///
/// Keeps exams dated on or before `today` that are not retakes and whose
/// grade is neither blank nor rejected by `is_ungraded`. Each `(code, group)`
/// appears once, with its latest exam date. The result holds at most
/// `max_entries` items, newest first.
///
/// Either input being empty yields an empty list.
#[must_use]
pub fn compute_recent_grades(
    exams: &[ExamRecord],
    grades: &[GradeRecord],
    today: NaiveDate,
    max_entries: usize,
    is_ungraded: impl Fn(&str) -> bool,
) -> Vec<RecentGrade> {
    if exams.is_empty() || grades.is_empty() {
        return vec![];
    }

    let by_key: BTreeMap<GradeKey, &GradeRecord> =
        grades.iter().map(|grade| (grade.key(), grade)).collect();

    let mut past: Vec<&ExamRecord> = exams
        .iter()
        .filter(|exam| exam.date <= today && !exam.is_retake())
        .collect();
    past.sort_by(|a, b| b.date.cmp(&a.date));

    let mut seen = BTreeSet::new();
    let mut recent: Vec<RecentGrade> = past
        .into_iter()
        .filter_map(|exam| {
            let key = exam.key();
            let grade = by_key.get(&key)?;
            let value = grade.value.trim();
            if value.is_empty() || is_ungraded(value) {
                return None;
            }
            seen.insert(key).then(|| RecentGrade {
                code: exam.code.clone(),
                group: exam.group,
                value: value.to_owned(),
                date: exam.date,
            })
        })
        .take(max_entries)
        .collect();

    recent.sort_by(|a, b| b.date.cmp(&a.date));
    recent
}

/// Whether `fresh` differs from the previously stored list. Comparison is
/// over every field, exam date included.
#[must_use]
pub fn has_changed(previous: Option<&[RecentGrade]>, fresh: &[RecentGrade]) -> bool {
    previous.is_none_or(|previous| previous != fresh)
}
