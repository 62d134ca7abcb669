#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Page fetching and HTML scraping primitives for the campus portal.
//!
//! Provides the [`PageFetcher`] trait with an HTTP implementation
//! ([`fetch::HttpPageFetcher`]), a schema-driven table parser
//! ([`table`]), and the empty-state / session classifier ([`classify`]).
//!
//! This crate knows nothing about exams or grades. It turns URLs into
//! [`Page`]s and HTML tables into rows of cells; the portal-specific
//! schemas live in `campus_portal_source`.

pub mod classify;
pub mod fetch;
pub mod table;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Errors that can occur while fetching a page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request failed (DNS, TLS, connection reset, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP status {status} for {url}")]
    Status {
        /// Status code returned by the server.
        status: u16,
        /// URL that was requested.
        url: String,
    },

    /// The request did not complete within its timeout.
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout {
        /// URL that was requested.
        url: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The owning operation was cancelled before the page arrived.
    #[error("Request cancelled")]
    Cancelled,

    /// A header value (cookie or user agent) could not be encoded.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl FetchError {
    /// Whether this error is a cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A single GET request against the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Absolute URL to fetch.
    pub url: String,
    /// `Cookie` header value supplied by the session provider.
    pub cookie: Option<String>,
    /// Upper bound for the whole request, body included.
    pub timeout: Duration,
}

impl PageRequest {
    /// Creates a request with no cookie and the given timeout.
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            cookie: None,
            timeout,
        }
    }

    /// Attaches a `Cookie` header value. Empty values are ignored.
    #[must_use]
    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie.filter(|c| !c.trim().is_empty());
        self
    }
}

/// A successfully fetched HTML page.
///
/// Holds the body as a `String` so it can cross `.await` points and task
/// boundaries; call [`Page::document`] to parse it when needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    /// Raw response body.
    pub body: String,
}

impl Page {
    #[must_use]
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    /// Parses the body into an HTML document.
    #[must_use]
    pub fn document(&self) -> scraper::Html {
        scraper::Html::parse_document(&self.body)
    }
}

/// Retrieves HTML pages.
///
/// Implementations must abandon the request and return
/// [`FetchError::Cancelled`] once `cancel` fires, and must never retry;
/// retrying is a caller policy.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a single page.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, timeout, non-success
    /// status, or cancellation.
    async fn fetch(
        &self,
        request: &PageRequest,
        cancel: &CancellationToken,
    ) -> Result<Page, FetchError>;
}
