//! Capabilities the orchestrator receives from its host: session cookies,
//! connectivity, and the current time.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeDelta, Utc};

/// Supplies the `Cookie` header for portal requests. Login happens
/// elsewhere; this only reports the current session.
pub trait CookieProvider: Send + Sync {
    fn cookie_header(&self, url: &str) -> Option<String>;
}

/// A fixed cookie header, e.g. read from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticCookie(pub Option<String>);

impl CookieProvider for StaticCookie {
    fn cookie_header(&self, _url: &str) -> Option<String> {
        self.0.clone()
    }
}

/// Reports whether the network is reachable right now.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probes connectivity by opening a TCP connection to the portal host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    /// Builds a probe for the host of `url`, on its explicit port or the
    /// scheme's default.
    #[must_use]
    pub fn for_url(url: &str, timeout: Duration) -> Self {
        let (default_port, rest) = url.strip_prefix("http://").map_or_else(
            || (443, url.strip_prefix("https://").unwrap_or(url)),
            |rest| (80, rest),
        );
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let address = if host.contains(':') {
            host.to_owned()
        } else {
            format!("{host}:{default_port}")
        };
        Self { address, timeout }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&self.address))
            .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                log::debug!("Connectivity probe to {} failed: {e}", self.address);
                false
            }
            Err(_) => {
                log::debug!("Connectivity probe to {} timed out", self.address);
                false
            }
        }
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The local calendar day, used to decide which exams already happened.
    fn today(&self) -> NaiveDate;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock that only moves when told to. `today` is the UTC date.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn probe_address_uses_scheme_default_port() {
        let probe = TcpProbe::for_url(
            "https://areaexclusiva.colegioetapa.com.br/home",
            Duration::from_secs(3),
        );
        assert_eq!(probe.address(), "areaexclusiva.colegioetapa.com.br:443");

        let probe = TcpProbe::for_url("http://localhost:8080/x", Duration::from_secs(3));
        assert_eq!(probe.address(), "localhost:8080");

        let probe = TcpProbe::for_url("http://portal.local", Duration::from_secs(3));
        assert_eq!(probe.address(), "portal.local:80");
    }

    #[tokio::test]
    async fn probe_reports_unreachable_host_as_offline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::for_url(&format!("http://127.0.0.1:{port}"), Duration::from_secs(1));
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn probe_reports_listening_host_as_online() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::for_url(&format!("http://127.0.0.1:{port}"), Duration::from_secs(1));
        assert!(probe.is_online().await);
    }

    #[test]
    fn fixed_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2025, 3, 12, 23, 30, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(TimeDelta::hours(1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 3, 13).unwrap());
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn static_cookie_ignores_url() {
        let cookies = StaticCookie(Some("PHPSESSID=abc".to_string()));
        assert_eq!(
            cookies.cookie_header("https://example.com/any").as_deref(),
            Some("PHPSESSID=abc")
        );
    }
}
