//! Portal configuration.
//!
//! The default configuration is `portal.toml`, embedded at compile time.
//! Setting `CAMPUS_PORTAL_CONFIG` to a file path replaces it at runtime.
//! Every selector, sentinel phrase, timeout and staleness horizon used by
//! the pipeline lives here.

use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::ConfigError;

/// Embedded default configuration.
const DEFAULT_TOML: &str = include_str!("../portal.toml");

/// Environment variable naming an override configuration file.
pub const CONFIG_ENV: &str = "CAMPUS_PORTAL_CONFIG";

/// Longest timeout allowed for a single page fetch.
pub const MAX_TIMEOUT_SECS: u64 = 20;

/// Longest staleness horizon accepted for any cached dataset (one year).
pub const MAX_HORIZON_HOURS: i64 = 24 * 366;

/// Longest background refresh interval (one day).
pub const MAX_REFRESH_MINS: u64 = 24 * 60;

/// Complete portal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    /// Scheme and host, without a trailing slash.
    pub base_url: String,
    /// User agent sent on every request.
    pub user_agent: String,
    pub timeouts: TimeoutConfig,
    pub session: SessionConfig,
    pub calendar: CalendarConfig,
    pub grades: GradesConfig,
    pub schedule: ScheduleConfig,
    pub recent_grades: RecentGradesConfig,
    pub refresh: RefreshConfig,
}

/// Request timeouts, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Single-screen fetches (calendar month, schedule).
    pub page_secs: u64,
    /// Landing page, grades, and the month fan-out behind recent grades.
    pub aggregate_secs: u64,
}

/// Landing page and the marker proving the session is authenticated.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub landing_path: String,
    pub anchor_selector: String,
}

/// "No records" banner recognition.
#[derive(Debug, Clone, Deserialize)]
pub struct BannerConfig {
    pub selector: String,
    /// Case-insensitive phrases, any of which marks the banner as an
    /// explicit empty result. Empty accepts any matching banner.
    #[serde(default)]
    pub phrases: Vec<String>,
}

/// Exam calendar page.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    pub path: String,
    /// Query parameter (already URL-encoded) selecting a month.
    pub month_param: String,
    /// Number of months fetched when rebuilding the full calendar.
    pub months: u32,
    pub table_selector: String,
    pub min_columns: usize,
    /// Type labels containing this (case-insensitive) are retakes.
    pub retake_marker: String,
    pub horizon_hours: i64,
    pub banner: BannerConfig,
}

/// Grades page.
#[derive(Debug, Clone, Deserialize)]
pub struct GradesConfig {
    pub path: String,
    pub table_selector: String,
    pub header_selector: String,
    /// Column holding the subject code.
    pub code_column: usize,
    /// First column whose header names a group.
    pub first_group_column: usize,
    pub grade_block_selector: String,
    pub grade_label_selector: String,
    pub grade_label: String,
    /// Value the portal shows for a grade not yet released.
    pub ungraded_placeholder: String,
}

/// Class schedule page.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub path: String,
    pub table_selector: String,
    pub min_columns: usize,
    /// Banner found inside a row that carries no classes.
    pub row_banner_selector: String,
    pub field_selector: String,
    /// First-column text of header rows.
    pub header_label: String,
    /// Cell text meaning "no class in this slot".
    pub blank_cell: String,
    pub no_class_phrases: Vec<String>,
    pub highlight_class: String,
    pub highlight_keywords: Vec<String>,
    pub banner: BannerConfig,
}

/// Derived recent-grades view.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentGradesConfig {
    pub max_entries: usize,
    pub horizon_hours: i64,
}

/// Background refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    pub interval_mins: u64,
}

impl PortalConfig {
    /// Loads the override file named by [`CONFIG_ENV`], or the embedded
    /// default when the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the override cannot be read, or if the
    /// configuration does not parse or validate.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(&path)),
            _ => Self::embedded(),
        }
    }

    /// The embedded default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded file is invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::parse(DEFAULT_TOML)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        log::info!("Loading portal config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is out of
    /// range.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, secs) in [
            ("timeouts.page_secs", self.timeouts.page_secs),
            ("timeouts.aggregate_secs", self.timeouts.aggregate_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must be between 1 and {MAX_TIMEOUT_SECS}, got {secs}"),
                });
            }
        }
        if !(1..=12).contains(&self.calendar.months) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "calendar.months must be between 1 and 12, got {}",
                    self.calendar.months
                ),
            });
        }
        for (name, hours) in [
            ("calendar.horizon_hours", self.calendar.horizon_hours),
            ("recent_grades.horizon_hours", self.recent_grades.horizon_hours),
        ] {
            if !(1..=MAX_HORIZON_HOURS).contains(&hours) {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "{name} must be between 1 and {MAX_HORIZON_HOURS}, got {hours}"
                    ),
                });
            }
        }
        if self.recent_grades.max_entries == 0 {
            return Err(ConfigError::Invalid {
                message: "recent_grades.max_entries must be positive".to_string(),
            });
        }
        if !(1..=MAX_REFRESH_MINS).contains(&self.refresh.interval_mins) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "refresh.interval_mins must be between 1 and {MAX_REFRESH_MINS}, got {}",
                    self.refresh.interval_mins
                ),
            });
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    #[must_use]
    pub fn landing_url(&self) -> String {
        self.url(&self.session.landing_path)
    }

    #[must_use]
    pub fn grades_url(&self) -> String {
        self.url(&self.grades.path)
    }

    #[must_use]
    pub fn schedule_url(&self) -> String {
        self.url(&self.schedule.path)
    }

    /// Calendar listing URL. Month `0` is the portal's default listing;
    /// `1..=12` select a month.
    #[must_use]
    pub fn calendar_url(&self, month: u32) -> String {
        let base = self.url(&self.calendar.path);
        if month == 0 {
            base
        } else {
            format!("{base}?{}={month}", self.calendar.month_param)
        }
    }

    #[must_use]
    pub const fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.page_secs)
    }

    #[must_use]
    pub const fn aggregate_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.aggregate_secs)
    }

    /// How long the aggregated exam calendar is trusted.
    #[must_use]
    pub const fn calendar_horizon(&self) -> TimeDelta {
        TimeDelta::hours(self.calendar.horizon_hours)
    }

    /// How long the recent-grades view is trusted.
    #[must_use]
    pub const fn recent_grades_horizon(&self) -> TimeDelta {
        TimeDelta::hours(self.recent_grades.horizon_hours)
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_mins * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_parses() {
        let config = PortalConfig::embedded().unwrap();
        assert_eq!(config.calendar.months, 12);
        assert_eq!(config.recent_grades.max_entries, 3);
        assert_eq!(config.grades.ungraded_placeholder, "--");
        assert_eq!(config.calendar_horizon(), TimeDelta::days(7));
        assert_eq!(config.recent_grades_horizon(), TimeDelta::hours(24));
        assert_eq!(config.refresh_interval(), Duration::from_secs(15 * 60));
        assert!(config.aggregate_timeout() <= Duration::from_secs(MAX_TIMEOUT_SECS));
    }

    #[test]
    fn builds_calendar_urls() {
        let config = PortalConfig::embedded().unwrap();
        assert_eq!(
            config.calendar_url(0),
            "https://areaexclusiva.colegioetapa.com.br/provas/datas"
        );
        assert_eq!(
            config.calendar_url(3),
            "https://areaexclusiva.colegioetapa.com.br/provas/datas?mes%5B%5D=3"
        );
        assert_eq!(
            config.landing_url(),
            "https://areaexclusiva.colegioetapa.com.br/home"
        );
    }

    #[test]
    fn rejects_timeouts_above_limit() {
        let toml = DEFAULT_TOML.replace("aggregate_secs = 20", "aggregate_secs = 60");
        let err = PortalConfig::parse(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "{err}");
    }

    #[test]
    fn rejects_out_of_range_horizons_and_interval() {
        for (from, to) in [
            ("horizon_hours = 168", "horizon_hours = 9223372036854775807"),
            ("horizon_hours = 24", "horizon_hours = 0"),
            ("horizon_hours = 24", "horizon_hours = -5"),
            ("interval_mins = 15", "interval_mins = 9223372036854775807"),
        ] {
            let toml = DEFAULT_TOML.replace(from, to);
            let err = PortalConfig::parse(&toml).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{to}: {err}");
        }
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            PortalConfig::parse("base_url = "),
            Err(ConfigError::Toml(_))
        ));
    }
}
