//! Weekly class schedule schema.
//!
//! The first column holds the time label and the next five hold Monday to
//! Friday. The portal marks class-free rows with an informational banner
//! inside the row, and replaces the whole table with a page-level banner
//! when there is no schedule at all.

use campus_portal_models::{ClassSlot, WeekSchedule};
use campus_portal_scraper::classify::{BannerRule, Classification};
use campus_portal_scraper::table::{
    CellExtractor, TableSchema, contains_ci, has_class, parse_rows, parse_selector,
};
use scraper::{ElementRef, Html, Selector};

use crate::ConfigError;
use crate::config::ScheduleConfig;

/// Parses the class schedule page.
#[derive(Debug, Clone)]
pub struct ScheduleSchema {
    table: TableSchema,
    banner: BannerRule,
    row_banner: Selector,
    field: Selector,
    header_label: String,
    blank_cell: String,
    no_class_phrases: Vec<String>,
    highlight_class: String,
    highlight_keywords: Vec<String>,
}

impl ScheduleSchema {
    /// Compiles the schedule selectors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Selector`] if a selector is not valid CSS.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        let min_columns = config
            .min_columns
            .max(usize::from(WeekSchedule::LAST_DAY) + 1);
        Ok(Self {
            table: TableSchema::new(&config.table_selector, min_columns)?
                .with_cell_selector("td, th")?,
            banner: BannerRule::new(&config.banner.selector, config.banner.phrases.clone())?,
            row_banner: parse_selector(&config.row_banner_selector)?,
            field: parse_selector(&config.field_selector)?,
            header_label: config.header_label.clone(),
            blank_cell: config.blank_cell.clone(),
            no_class_phrases: config.no_class_phrases.clone(),
            highlight_class: config.highlight_class.clone(),
            highlight_keywords: config.highlight_keywords.clone(),
        })
    }

    /// A table counts only if at least one row carries classes. A table of
    /// banners, breaks and "no classes" rows falls through to the page
    /// banner check.
    #[must_use]
    pub fn classify<'a>(&self, document: &'a Html) -> Classification<'a> {
        match self.table.find_table(document) {
            Some(table) if self.has_data_rows(table) => Classification::HasTable(table),
            table => {
                if let Some(banner) = self.banner.find(document) {
                    return Classification::ExplicitlyEmpty(banner);
                }
                if table.is_some() {
                    log::debug!("Schedule table has no class rows and no banner");
                }
                Classification::Unparseable
            }
        }
    }

    fn has_data_rows(&self, table: ElementRef<'_>) -> bool {
        self.table.rows(table).any(|row| {
            row.select(&self.row_banner).next().is_none()
                || row
                    .select(&self.field)
                    .any(|cell| self.is_class(&CellExtractor::Text.extract(cell)))
        })
    }

    fn is_class(&self, text: &str) -> bool {
        !text.is_empty()
            && text != self.blank_cell
            && !self
                .no_class_phrases
                .iter()
                .any(|phrase| contains_ci(text, phrase))
    }

    /// Groups the table's cells by weekday.
    #[must_use]
    pub fn parse_table(&self, table: ElementRef<'_>) -> WeekSchedule {
        let mut week = WeekSchedule::new();
        let rows = parse_rows(table, &self.table, |cells| self.parse_row(cells));
        for slot in rows.into_iter().flatten() {
            week.push(slot);
        }
        log::debug!("Parsed {} class slots", week.len());
        week
    }

    /// Re-parses a table fragment stored in the cache.
    #[must_use]
    pub fn parse_cached(&self, markup: &str) -> WeekSchedule {
        let fragment = Html::parse_fragment(markup);
        self.table
            .find_cached_table(&fragment)
            .map_or_else(WeekSchedule::new, |table| self.parse_table(table))
    }

    fn parse_row(&self, cells: &[ElementRef<'_>]) -> Option<Vec<ClassSlot>> {
        if cells
            .iter()
            .any(|cell| cell.select(&self.row_banner).next().is_some())
        {
            return None;
        }

        let time_label = CellExtractor::Text.extract(cells[0]);
        if time_label.is_empty() || time_label.eq_ignore_ascii_case(&self.header_label) {
            return None;
        }

        let slots = (WeekSchedule::FIRST_DAY..=WeekSchedule::LAST_DAY)
            .filter_map(|day| {
                let cell = cells[usize::from(day)];
                let description = CellExtractor::Text.extract(cell);
                if description.is_empty() || description == self.blank_cell {
                    return None;
                }
                let highlighted = has_class(cell, &self.highlight_class)
                    || self
                        .highlight_keywords
                        .iter()
                        .any(|keyword| contains_ci(&description, keyword));
                Some(ClassSlot {
                    time_label: time_label.clone(),
                    day,
                    description,
                    highlighted,
                })
            })
            .collect();

        Some(slots)
    }
}
