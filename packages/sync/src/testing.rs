//! In-process fakes for orchestration tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use campus_portal_cache::CacheStore;
use campus_portal_scraper::{FetchError, Page, PageFetcher, PageRequest};
use campus_portal_source::config::PortalConfig;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::PortalContext;
use crate::collaborators::{ConnectivityProbe, FixedClock, StaticCookie};

pub const COOKIE: &str = "PHPSESSID=test";

#[derive(Debug, Clone)]
pub enum Stub {
    Body(String),
    Timeout,
}

/// Serves canned responses by URL. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct StubFetcher {
    pages: Mutex<BTreeMap<String, (Stub, Duration)>>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.serve_after(url, body, Duration::ZERO);
    }

    pub fn serve_after(&self, url: &str, body: &str, delay: Duration) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (Stub::Body(body.to_string()), delay));
    }

    pub fn time_out(&self, url: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (Stub::Timeout, Duration::ZERO));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(
        &self,
        request: &PageRequest,
        cancel: &CancellationToken,
    ) -> Result<Page, FetchError> {
        assert_eq!(request.cookie.as_deref(), Some(COOKIE));
        self.calls.lock().unwrap().push(request.url.clone());
        let stub = self.pages.lock().unwrap().get(&request.url).cloned();

        let Some((stub, delay)) = stub else {
            return Err(FetchError::Status {
                status: 404,
                url: request.url.clone(),
            });
        };

        tokio::select! {
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }

        match stub {
            Stub::Body(body) => Ok(Page::new(request.url.clone(), body)),
            Stub::Timeout => Err(FetchError::Timeout {
                url: request.url.clone(),
                timeout: request.timeout,
            }),
        }
    }
}

/// Connectivity that tests can switch on and off. Counts every check.
#[derive(Debug)]
pub struct FakeProbe {
    online: AtomicBool,
    checks: AtomicUsize,
}

impl FakeProbe {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for FakeProbe {
    async fn is_online(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap()
}

/// A context wired to fakes, plus handles on the fakes.
pub struct Harness {
    pub ctx: Arc<PortalContext>,
    pub fetcher: Arc<StubFetcher>,
    pub probe: Arc<FakeProbe>,
    pub clock: Arc<FixedClock>,
}

impl std::ops::Deref for Harness {
    type Target = PortalContext;

    fn deref(&self) -> &PortalContext {
        &self.ctx
    }
}

pub fn context(fetcher: Arc<StubFetcher>, online: bool) -> Harness {
    let probe = Arc::new(FakeProbe {
        online: AtomicBool::new(online),
        checks: AtomicUsize::new(0),
    });
    let clock = Arc::new(FixedClock::new(start()));
    let ctx = PortalContext::new(
        PortalConfig::embedded().unwrap(),
        Arc::new(CacheStore::open_in_memory().unwrap()),
        fetcher.clone(),
        Arc::new(StaticCookie(Some(COOKIE.to_string()))),
        probe.clone(),
        clock.clone(),
    )
    .unwrap();

    Harness {
        ctx: Arc::new(ctx),
        fetcher,
        probe,
        clock,
    }
}

pub fn calendar_page(rows: &[[&str; 5]]) -> String {
    let body: String = rows
        .iter()
        .map(|cells| {
            let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
            format!("<tr>{tds}</tr>")
        })
        .collect();
    format!(
        "<html><body><table><thead><tr><th>Data</th><th>Código</th><th>Tipo</th>\
         <th>Conjunto</th><th>Matéria</th></tr></thead><tbody>{body}</tbody></table></body></html>"
    )
}

pub const NO_EXAMS_PAGE: &str = "<html><body><div class=\"alert alert-info\">\
    Nenhuma prova a ser mostrada</div></body></html>";

pub const LOGIN_PAGE: &str = "<html><body><form action=\"/login\"></form></body></html>";

pub const LANDING_PAGE: &str =
    "<html><body><div id=\"home_banners_carousel\"></div></body></html>";

pub fn grades_page(rows: &[(&str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(code, grade)| {
            format!(
                "<tr><td>Matéria</td><td>{code}</td><td>--</td><td>\
                 <div class=\"d-flex flex-column\"><span class=\"font-weight-bold\">Nota</span>: {grade}</div>\
                 </td></tr>"
            )
        })
        .collect();
    format!(
        "<html><body><table><thead><tr><th>Matéria</th><th>Código</th><th>1º conj.</th>\
         <th>2º conj.</th></tr></thead><tbody>{body}</tbody></table></body></html>"
    )
}
