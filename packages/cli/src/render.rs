//! Plain-text rendering of screen states.

use std::fmt::Write as _;

use campus_portal_models::screen::{DataOrigin, ScreenState};
use campus_portal_models::{ExamRecord, RecentGrade, WeekSchedule};

/// Renders `state`, using `body` for content.
pub fn state<T>(title: &str, state: &ScreenState<T>, body: impl FnOnce(&T) -> String) -> String {
    match state {
        ScreenState::Idle => format!("{title}: not loaded"),
        ScreenState::Loading => format!("{title}: loading..."),
        ScreenState::Content { data, origin } => {
            let badge = match origin {
                DataOrigin::Network => String::new(),
                DataOrigin::Cache { written_at } => {
                    format!(" (cached {})", written_at.format("%Y-%m-%d %H:%M UTC"))
                }
            };
            format!("{title}{badge}\n{}", body(data))
        }
        ScreenState::Empty { message } => format!(
            "{title}: {}",
            message.as_deref().unwrap_or("nothing to show")
        ),
        ScreenState::Offline => format!("{title}: offline and nothing cached"),
        ScreenState::LoginRequired => {
            format!("{title}: session expired, log in again and pass a new cookie")
        }
    }
}

pub fn exams(exams: &[ExamRecord]) -> String {
    let mut out = String::new();
    for exam in exams {
        let _ = writeln!(
            out,
            "  {}  {:<8} {:<14} g{}  {}",
            exam.date.format("%d/%m"),
            exam.code,
            exam.kind_label,
            exam.group,
            exam.subject
        );
    }
    out
}

pub fn recent_grades(grades: &[RecentGrade]) -> String {
    let mut out = String::new();
    for grade in grades {
        let _ = writeln!(
            out,
            "  {}  {:<8} g{}  {}",
            grade.date.format("%d/%m"),
            grade.code,
            grade.group,
            grade.value
        );
    }
    out
}

/// Renders one weekday (1 = Monday) of `schedule`.
pub fn schedule_day(schedule: &WeekSchedule, day: u8) -> String {
    let slots = schedule.slots_for(day);
    if slots.is_empty() {
        return "  no classes\n".to_string();
    }

    let mut out = String::new();
    for slot in slots {
        let marker = if slot.highlighted { "*" } else { " " };
        let _ = writeln!(out, " {marker}{:<6} {}", slot.time_label, slot.description);
    }
    out
}

#[cfg(test)]
mod tests {
    use campus_portal_models::{ClassSlot, ExamKind};
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    #[test]
    fn cached_content_carries_a_badge() {
        let grades = vec![RecentGrade {
            code: "MAT101".to_string(),
            group: 2,
            value: "8.5".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        }];
        let cached = ScreenState::Content {
            data: grades,
            origin: DataOrigin::Cache {
                written_at: Utc.with_ymd_and_hms(2025, 3, 20, 9, 30, 0).unwrap(),
            },
        };

        let text = state("Recent grades", &cached, |g| recent_grades(g));
        assert_eq!(
            text,
            "Recent grades (cached 2025-03-20 09:30 UTC)\n  10/03  MAT101   g2  8.5\n"
        );
    }

    #[test]
    fn empty_state_prefers_the_portal_message() {
        let empty: ScreenState<Vec<ExamRecord>> = ScreenState::Empty {
            message: Some("Nenhuma prova a ser mostrada".to_string()),
        };
        assert_eq!(
            state("Exams", &empty, |e| exams(e)),
            "Exams: Nenhuma prova a ser mostrada"
        );

        let bare: ScreenState<Vec<ExamRecord>> = ScreenState::Empty { message: None };
        assert_eq!(state("Exams", &bare, |e| exams(e)), "Exams: nothing to show");
    }

    #[test]
    fn exam_rows_list_every_field() {
        let rows = vec![ExamRecord {
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            code: "MAT101".to_string(),
            kind: ExamKind::Exam,
            kind_label: "Prova".to_string(),
            group: 2,
            subject: "Matemática".to_string(),
            link: None,
        }];
        assert_eq!(
            exams(&rows),
            "  10/03  MAT101   Prova          g2  Matemática\n"
        );
    }

    #[test]
    fn highlighted_slots_are_marked() {
        let mut week = WeekSchedule::new();
        week.push(ClassSlot {
            time_label: "07:15".to_string(),
            day: 2,
            description: "Física".to_string(),
            highlighted: false,
        });
        week.push(ClassSlot {
            time_label: "09:00".to_string(),
            day: 2,
            description: "Intervalo".to_string(),
            highlighted: true,
        });

        assert_eq!(
            schedule_day(&week, 2),
            "  07:15  Física\n *09:00  Intervalo\n"
        );
        assert_eq!(schedule_day(&week, 3), "  no classes\n");
    }
}
