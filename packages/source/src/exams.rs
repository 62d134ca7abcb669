//! Exam calendar schema.
//!
//! Columns: date (`dd/MM`, optionally followed by a weekday), code (with an
//! optional link to the exam's content page), type label, group, subject.

use campus_portal_models::{ExamKind, ExamRecord};
use campus_portal_scraper::classify::{BannerRule, Classification, Classifier};
use campus_portal_scraper::table::{CellExtractor, TableSchema, parse_rows};
use chrono::NaiveDate;
use scraper::{ElementRef, Html};

use crate::ConfigError;
use crate::config::CalendarConfig;

const DATE: usize = 0;
const CODE: usize = 1;
const KIND: usize = 2;
const GROUP: usize = 3;
const SUBJECT: usize = 4;

/// Parses exam calendar pages.
#[derive(Debug, Clone)]
pub struct ExamSchema {
    classifier: Classifier,
    table: TableSchema,
    link: CellExtractor,
    retake_marker: String,
}

impl ExamSchema {
    /// Compiles the calendar selectors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Selector`] if a selector is not valid CSS.
    pub fn from_config(config: &CalendarConfig) -> Result<Self, ConfigError> {
        let banner = BannerRule::new(&config.banner.selector, config.banner.phrases.clone())?;
        Ok(Self {
            classifier: Classifier::new(&config.table_selector, Some(banner))?,
            table: TableSchema::new(&config.table_selector, config.min_columns.max(SUBJECT + 1))?,
            link: CellExtractor::attribute("a", "href")?,
            retake_marker: config.retake_marker.clone(),
        })
    }

    #[must_use]
    pub fn classify<'a>(&self, document: &'a Html) -> Classification<'a> {
        self.classifier.classify(document)
    }

    /// Parses the rows of a classified calendar table. Dates carry no year,
    /// so `year` is applied to every row.
    #[must_use]
    pub fn parse_table(&self, table: ElementRef<'_>, year: i32) -> Vec<ExamRecord> {
        parse_rows(table, &self.table, |cells| self.parse_row(cells, year))
    }

    /// Re-parses a table fragment stored in the cache.
    #[must_use]
    pub fn parse_cached(&self, markup: &str, year: i32) -> Vec<ExamRecord> {
        let fragment = Html::parse_fragment(markup);
        self.table
            .find_cached_table(&fragment)
            .map_or_else(Vec::new, |table| self.parse_table(table, year))
    }

    fn parse_row(&self, cells: &[ElementRef<'_>], year: i32) -> Option<ExamRecord> {
        let date = parse_exam_date(&CellExtractor::Text.extract(cells[DATE]), year)?;

        let code = CellExtractor::OwnText.extract(cells[CODE]);
        let code = if code.is_empty() {
            CellExtractor::Text.extract(cells[CODE])
        } else {
            code
        };
        if code.is_empty() {
            return None;
        }

        let group = CellExtractor::Digits.extract(cells[GROUP]).parse().ok()?;
        let kind_label = CellExtractor::Text.extract(cells[KIND]);
        let link = Some(self.link.extract(cells[CODE])).filter(|href| !href.is_empty());

        Some(ExamRecord {
            date,
            code,
            kind: ExamKind::from_label(&kind_label, &self.retake_marker),
            kind_label,
            group,
            subject: CellExtractor::Text.extract(cells[SUBJECT]),
            link,
        })
    }
}

/// Parses a `dd/MM` calendar cell. Anything after the first space (usually
/// the weekday) is ignored.
#[must_use]
pub fn parse_exam_date(text: &str, year: i32) -> Option<NaiveDate> {
    let day_month = text.split_whitespace().next()?;
    let (day, month) = day_month.split_once('/')?;
    let day = day.trim().parse().ok()?;
    let month = month.trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
