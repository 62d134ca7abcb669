#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Domain records scraped from the campus portal.
//!
//! Every record here is rebuilt from HTML on each parse. Only
//! [`RecentGrade`] lists (and the exam calendar aggregate used to derive
//! them) are persisted, as JSON payloads in the cache store.

pub mod screen;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Whether a calendar entry is a regular exam or a retake.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExamKind {
    /// A regular exam.
    Exam,
    /// A retake ("recuperação") session.
    Retake,
}

impl ExamKind {
    /// Classifies a raw type label: any label containing `retake_marker`
    /// (case-insensitive) is a retake.
    #[must_use]
    pub fn from_label(label: &str, retake_marker: &str) -> Self {
        if label
            .to_lowercase()
            .contains(&retake_marker.to_lowercase())
        {
            Self::Retake
        } else {
            Self::Exam
        }
    }
}

/// One row of the exam calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    /// Calendar day of the exam.
    pub date: NaiveDate,
    /// Subject code (e.g. `"MAT101"`).
    pub code: String,
    /// Exam or retake, derived from [`Self::kind_label`].
    pub kind: ExamKind,
    /// Type label exactly as shown by the portal (e.g. `"Prova"`).
    pub kind_label: String,
    /// Exam group ("conjunto") number.
    pub group: u32,
    /// Subject name shown next to the code.
    pub subject: String,
    /// Link to the exam's content page, when the code cell has one.
    #[serde(default)]
    pub link: Option<String>,
}

impl ExamRecord {
    /// Join key shared with [`GradeRecord`].
    #[must_use]
    pub fn key(&self) -> GradeKey {
        GradeKey::new(&self.code, self.group)
    }

    #[must_use]
    pub fn is_retake(&self) -> bool {
        self.kind == ExamKind::Retake
    }
}

/// One graded cell of the grades table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    /// Subject code.
    pub code: String,
    /// Group number taken from the column header.
    pub group: u32,
    /// Grade text. May be the portal's "ungraded" placeholder.
    pub value: String,
}

impl GradeRecord {
    #[must_use]
    pub fn key(&self) -> GradeKey {
        GradeKey::new(&self.code, self.group)
    }
}

/// `(code, group)` pair used to join exams with grades.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GradeKey {
    pub code: String,
    pub group: u32,
}

impl GradeKey {
    #[must_use]
    pub fn new(code: &str, group: u32) -> Self {
        Self {
            code: code.to_owned(),
            group,
        }
    }
}

/// A grade joined to the date of its exam.
///
/// Equality covers every field, including the date, so a corrected exam
/// date upstream is treated as a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentGrade {
    pub code: String,
    pub group: u32,
    pub value: String,
    pub date: NaiveDate,
}

impl RecentGrade {
    #[must_use]
    pub fn key(&self) -> GradeKey {
        GradeKey::new(&self.code, self.group)
    }
}

/// Which calendar rows to show.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExamFilter {
    /// Every row.
    #[default]
    All,
    /// Regular exams only.
    Exams,
    /// Retakes only.
    Retakes,
}

impl ExamFilter {
    #[must_use]
    pub const fn matches(self, exam: &ExamRecord) -> bool {
        match self {
            Self::All => true,
            Self::Exams => !matches!(exam.kind, ExamKind::Retake),
            Self::Retakes => matches!(exam.kind, ExamKind::Retake),
        }
    }

    /// Returns the rows of `exams` accepted by this filter, in order.
    #[must_use]
    pub fn apply(self, exams: &[ExamRecord]) -> Vec<ExamRecord> {
        exams.iter().filter(|e| self.matches(e)).cloned().collect()
    }
}

/// A single cell of the weekly class timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSlot {
    /// Time label from the first column (e.g. `"07:15"`).
    pub time_label: String,
    /// 1 = Monday .. 5 = Friday.
    pub day: u8,
    /// Teacher/subject text, or a break/exam marker.
    pub description: String,
    /// Set for exams, breaks and cells the portal highlights.
    pub highlighted: bool,
}

/// Class slots grouped by weekday (1..=5). Days without classes are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSchedule {
    days: BTreeMap<u8, Vec<ClassSlot>>,
}

impl WeekSchedule {
    pub const FIRST_DAY: u8 = 1;
    pub const LAST_DAY: u8 = 5;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a slot to its day, preserving row order.
    pub fn push(&mut self, slot: ClassSlot) {
        self.days.entry(slot.day).or_default().push(slot);
    }

    /// Slots for `day` (1..=5). Empty for days without classes.
    #[must_use]
    pub fn slots_for(&self, day: u8) -> &[ClassSlot] {
        self.days.get(&day).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.values().all(Vec::is_empty)
    }

    /// Total number of slots across the week.
    #[must_use]
    pub fn len(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    /// The day to show first for `date`: its weekday, or Monday on weekends.
    #[must_use]
    pub fn default_day(date: NaiveDate) -> u8 {
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => Self::FIRST_DAY,
            weekday => {
                // Monday = 0 from `num_days_from_monday`, always < 5 here.
                u8::try_from(weekday.num_days_from_monday()).map_or(Self::FIRST_DAY, |d| d + 1)
            }
        }
    }
}
