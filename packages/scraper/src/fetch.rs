//! HTTP page fetcher.
//!
//! Sends a single GET with a browser user agent and the caller's cookie
//! header. No retries: a failed request is reported once and the caller
//! falls back to its cache.

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use tokio_util::sync::CancellationToken;

use crate::{FetchError, Page, PageFetcher, PageRequest};

/// User agent sent when none is configured. The portal serves a reduced
/// page to unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// [`PageFetcher`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    /// Builds a fetcher that sends `user_agent` on every request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the user agent is not a valid header value
    /// or the client cannot be built.
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(user_agent)
            .map_err(|e| FetchError::InvalidHeader(format!("user agent '{user_agent}': {e}")))?;
        headers.insert(USER_AGENT, value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(FetchError::Http)?;

        Ok(Self { client })
    }

    async fn send(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let mut builder = self.client.get(&request.url).timeout(request.timeout);

        if let Some(cookie) = &request.cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| FetchError::InvalidHeader(format!("cookie: {e}")))?;
            builder = builder.header(COOKIE, value);
        }

        let response = builder.send().await.map_err(|e| map_error(e, request))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        let url = response.url().to_string();
        let body = response.text().await.map_err(|e| map_error(e, request))?;

        Ok(Page { url, body })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(
        &self,
        request: &PageRequest,
        cancel: &CancellationToken,
    ) -> Result<Page, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        log::debug!("GET {}", request.url);

        let result = tokio::select! {
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.send(request) => result,
        };

        match &result {
            Ok(page) => log::debug!("Fetched {} ({} bytes)", page.url, page.body.len()),
            Err(FetchError::Cancelled) => log::debug!("Abandoned {}", request.url),
            Err(e) => log::warn!("Fetch failed: {e}"),
        }

        result
    }
}

fn map_error(e: reqwest::Error, request: &PageRequest) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: request.url.clone(),
            timeout: request.timeout,
        }
    } else {
        FetchError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rejects_unencodable_user_agent() {
        let err = HttpPageFetcher::new("bad\nagent").unwrap_err();
        assert!(matches!(err, FetchError::InvalidHeader(_)));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let fetcher = HttpPageFetcher::new(DEFAULT_USER_AGENT).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let request = PageRequest::new("https://example.invalid/", Duration::from_secs(1));
        let err = fetcher.fetch(&request, &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
