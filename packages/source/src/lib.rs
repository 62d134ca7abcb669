#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Campus portal configuration and page schemas.
//!
//! [`config::PortalConfig`] holds every endpoint, selector and sentinel
//! phrase. The three page schemas ([`exams::ExamSchema`],
//! [`grades::GradeSchema`], [`schedule::ScheduleSchema`]) are built from it
//! and turn fetched documents into typed records. The landing page's
//! session check is compiled alongside them.

pub mod config;
pub mod exams;
pub mod grades;
pub mod schedule;

use campus_portal_scraper::classify::SessionCheck;
use campus_portal_scraper::table::SelectorError;

use crate::config::PortalConfig;
use crate::exams::ExamSchema;
use crate::grades::GradeSchema;
use crate::schedule::ScheduleSchema;

/// Errors that can occur while loading the portal configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error reading an override file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },

    /// A configured selector is not valid CSS.
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// Every page schema, compiled once from a [`PortalConfig`].
#[derive(Debug, Clone)]
pub struct PortalSchemas {
    pub session: SessionCheck,
    pub exams: ExamSchema,
    pub grades: GradeSchema,
    pub schedule: ScheduleSchema,
}

impl PortalSchemas {
    /// Compiles every selector in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Selector`] if any configured selector is not
    /// valid CSS.
    pub fn from_config(config: &PortalConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            session: SessionCheck::new(&config.session.anchor_selector)?,
            exams: ExamSchema::from_config(&config.calendar)?,
            grades: GradeSchema::from_config(&config.grades)?,
            schedule: ScheduleSchema::from_config(&config.schedule)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_selectors_compile() {
        let config = PortalConfig::embedded().unwrap();
        assert!(PortalSchemas::from_config(&config).is_ok());
    }

    #[test]
    fn bad_selector_is_reported() {
        let mut config = PortalConfig::embedded().unwrap();
        config.grades.header_selector = "thead >> th[".to_string();
        let err = PortalSchemas::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Selector(_)), "{err}");
    }
}
