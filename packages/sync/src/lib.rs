#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetch orchestration for the campus portal client.
//!
//! Every screen follows the same sequence: show whatever the cache holds,
//! probe connectivity, fetch, classify, persist, and show the result. A
//! failed or unreadable fetch falls back to the cache and never overwrites
//! it. Each screen has at most one fetch in flight; starting another
//! cancels the first.
//!
//! - [`dataset::DatasetScreen`] drives single-document screens (exam
//!   calendar, class schedule).
//! - [`home::HomeScreen`] aggregates the calendar and the grades table into
//!   the recent-grades view ([`reconcile`]).
//! - [`refresh`] re-runs screens on login and on a fixed interval.

pub mod collaborators;
pub mod dataset;
pub mod home;
pub mod reconcile;
pub mod refresh;
pub mod screen;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use campus_portal_cache::{CacheError, CacheStore};
use campus_portal_scraper::{FetchError, PageFetcher, PageRequest};
use campus_portal_source::config::PortalConfig;
use campus_portal_source::{ConfigError, PortalSchemas};
use tokio_util::sync::CancellationToken;

use crate::collaborators::{Clock, ConnectivityProbe, CookieProvider};

/// Errors that can occur while refreshing a screen.
///
/// Only [`SyncError::Cancelled`] ever escapes a screen load; every other
/// failure ends in a rendered state.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The page could not be fetched.
    #[error("Network failure: {0}")]
    Network(FetchError),

    /// The page arrived but held neither the expected table nor a
    /// "no records" banner.
    #[error("Parse failure: {message}")]
    Parse {
        /// Description of what was missing.
        message: String,
    },

    /// The landing page lacks the authenticated-session marker.
    #[error("Session is no longer valid")]
    SessionInvalid,

    /// The load was superseded or the screen was torn down.
    #[error("Cancelled")]
    Cancelled,

    /// Cache read or write failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl From<FetchError> for SyncError {
    fn from(e: FetchError) -> Self {
        if e.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Network(e)
        }
    }
}

/// Returns [`SyncError::Cancelled`] once `token` has fired.
///
/// # Errors
///
/// Returns [`SyncError::Cancelled`] if the token is cancelled.
pub fn ensure_active(token: &CancellationToken) -> Result<(), SyncError> {
    if token.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

/// Everything a screen needs: configuration, compiled schemas, the cache,
/// and the host's capabilities.
pub struct PortalContext {
    pub config: PortalConfig,
    pub schemas: PortalSchemas,
    pub cache: Arc<CacheStore>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub cookies: Arc<dyn CookieProvider>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PortalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalContext")
            .field("base_url", &self.config.base_url)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl PortalContext {
    /// Compiles the schemas in `config` and bundles the collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Selector`] if a configured selector is not
    /// valid CSS.
    pub fn new(
        config: PortalConfig,
        cache: Arc<CacheStore>,
        fetcher: Arc<dyn PageFetcher>,
        cookies: Arc<dyn CookieProvider>,
        connectivity: Arc<dyn ConnectivityProbe>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let schemas = PortalSchemas::from_config(&config)?;
        Ok(Self {
            config,
            schemas,
            cache,
            fetcher,
            cookies,
            connectivity,
            clock,
        })
    }

    /// A GET for `url` carrying the current session cookie.
    #[must_use]
    pub fn request(&self, url: String, timeout: Duration) -> PageRequest {
        let cookie = self.cookies.cookie_header(&url);
        PageRequest::new(url, timeout).with_cookie(cookie)
    }

    /// Clears every cache namespace. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`] if a delete fails.
    pub fn clear_all_data(&self) -> Result<usize, SyncError> {
        Ok(self.cache.clear_all()?)
    }
}
