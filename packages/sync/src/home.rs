//! Home screen: the recent-grades view.
//!
//! A load checks the session on the landing page, then gathers the exam
//! calendar and the grades table and reconciles them. The calendar is
//! rebuilt from every month concurrently, at most once per calendar
//! horizon; a month that fails counts as a month without exams. The
//! grades table is fetched on every load.

use std::sync::Arc;

use async_trait::async_trait;
use campus_portal_cache::{CacheKey, Namespace, StalenessHorizon, StoredRecords};
use campus_portal_models::screen::{DataOrigin, ScreenState};
use campus_portal_models::{ExamRecord, GradeRecord, RecentGrade};
use campus_portal_scraper::Page;
use campus_portal_scraper::classify::Classification;
use chrono::{DateTime, Datelike, Utc};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::reconcile::{compute_recent_grades, has_changed};
use crate::refresh::Refreshable;
use crate::screen::ScreenController;
use crate::{PortalContext, SyncError, ensure_active};

const RECENT_GRADES_KEY: &str = "recent_grades";
const EXAMS_KEY: &str = "exams";

/// Orchestrates the home screen.
#[derive(Debug)]
pub struct HomeScreen {
    ctx: Arc<PortalContext>,
    controller: ScreenController<Vec<RecentGrade>>,
}

impl HomeScreen {
    #[must_use]
    pub fn new(ctx: Arc<PortalContext>) -> Self {
        Self {
            ctx,
            controller: ScreenController::new(),
        }
    }

    #[must_use]
    pub const fn controller(&self) -> &ScreenController<Vec<RecentGrade>> {
        &self.controller
    }

    fn recent_grades_key() -> CacheKey {
        CacheKey::new(Namespace::Home, RECENT_GRADES_KEY)
    }

    fn exams_key() -> CacheKey {
        CacheKey::new(Namespace::Home, EXAMS_KEY)
    }

    /// Loads the recent grades, cancelling any load already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if a newer load or teardown
    /// superseded this one. Every other outcome is a rendered state.
    pub async fn load(&self) -> Result<ScreenState<Vec<RecentGrade>>, SyncError> {
        let token = self.controller.begin();
        ensure_active(&token)?;
        let now = self.ctx.clock.now();

        let previous = self.cached_recent_grades(now);
        let cached = previous.as_ref().map(|stored| {
            grades_state(
                stored.records.clone(),
                DataOrigin::Cache {
                    written_at: stored.written_at,
                },
            )
        });
        self.controller
            .render(&token, cached.clone().unwrap_or(ScreenState::Loading));

        if !self.ctx.connectivity.is_online().await {
            log::info!("Offline; showing cached recent grades");
            return self.finish(&token, cached.unwrap_or(ScreenState::Offline));
        }

        match self.fetch_recent_grades(&token).await {
            Ok(fresh) => {
                ensure_active(&token)?;
                let previous = previous.as_ref().map(|stored| stored.records.as_slice());
                if has_changed(previous, &fresh) {
                    log::info!("Recent grades changed ({} entries)", fresh.len());
                    if let Err(e) =
                        self.ctx
                            .cache
                            .put_records(&Self::recent_grades_key(), &fresh, now)
                    {
                        log::warn!("Failed to cache recent grades: {e}");
                    }
                } else {
                    log::debug!("Recent grades unchanged; skipping write");
                }
                self.finish(&token, grades_state(fresh, DataOrigin::Network))
            }
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(SyncError::SessionInvalid) => {
                ensure_active(&token)?;
                log::warn!("Session is no longer valid; clearing home cache");
                if let Err(e) = self.ctx.cache.clear_namespace(Namespace::Home) {
                    log::warn!("Failed to clear home cache: {e}");
                }
                self.finish(&token, ScreenState::LoginRequired)
            }
            Err(e) => {
                log::warn!("Refreshing recent grades failed, falling back to cache: {e}");
                self.finish(&token, cached.unwrap_or(ScreenState::Offline))
            }
        }
    }

    /// Cached recent grades within their horizon. An expired entry is
    /// removed and reported as a miss.
    fn cached_recent_grades(&self, now: DateTime<Utc>) -> Option<StoredRecords<RecentGrade>> {
        let key = Self::recent_grades_key();
        let horizon = StalenessHorizon::Within(self.ctx.config.recent_grades_horizon());

        match self.ctx.cache.get_records::<RecentGrade>(&key) {
            Ok(Some(stored)) if horizon.is_fresh(stored.written_at, now) => Some(stored),
            Ok(Some(_)) => {
                log::info!("Cached recent grades expired; discarding");
                if let Err(e) = self.ctx.cache.remove(&key) {
                    log::warn!("Failed to remove expired recent grades: {e}");
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Reading recent grades from cache failed: {e}");
                None
            }
        }
    }

    async fn fetch_recent_grades(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<RecentGrade>, SyncError> {
        let landing = self.fetch(self.ctx.config.landing_url(), token).await?;
        if !self.session_is_valid(&landing) {
            return Err(SyncError::SessionInvalid);
        }

        let exams = self.exam_calendar(token).await?;
        let grades = self.grades(token).await?;

        let schema = &self.ctx.schemas.grades;
        Ok(compute_recent_grades(
            &exams,
            &grades,
            self.ctx.clock.today(),
            self.ctx.config.recent_grades.max_entries,
            |value| schema.is_ungraded(value),
        ))
    }

    async fn fetch(&self, url: String, token: &CancellationToken) -> Result<Page, SyncError> {
        ensure_active(token)?;
        let request = self.ctx.request(url, self.ctx.config.aggregate_timeout());
        let page = self.ctx.fetcher.fetch(&request, token).await?;
        ensure_active(token)?;
        Ok(page)
    }

    fn session_is_valid(&self, landing: &Page) -> bool {
        self.ctx
            .schemas
            .session
            .is_valid_session(&landing.document())
    }

    /// Non-retake exams across every month, from the cache while it is
    /// within the calendar horizon and lists at least one exam.
    async fn exam_calendar(&self, token: &CancellationToken) -> Result<Vec<ExamRecord>, SyncError> {
        let key = Self::exams_key();
        let now = self.ctx.clock.now();
        let horizon = StalenessHorizon::Within(self.ctx.config.calendar_horizon());

        match self.ctx.cache.get_records::<ExamRecord>(&key) {
            Ok(Some(stored))
                if horizon.is_fresh(stored.written_at, now) && !stored.records.is_empty() =>
            {
                log::debug!("Using cached exam calendar ({} exams)", stored.records.len());
                return Ok(stored.records);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Reading exam calendar from cache failed: {e}"),
        }

        let months = 1..=self.ctx.config.calendar.months;
        let results = join_all(months.map(|month| self.month_exams(month, token))).await;
        ensure_active(token)?;

        let answered = results.iter().filter(|month| month.is_some()).count();
        let mut exams: Vec<ExamRecord> = results.into_iter().flatten().flatten().collect();
        exams.retain(|exam| !exam.is_retake());
        log::info!(
            "Rebuilt exam calendar: {} exams from {answered} months",
            exams.len()
        );

        if answered == 0 {
            log::warn!("No month answered; exam calendar not cached");
        } else if let Err(e) = self.ctx.cache.put_records(&key, &exams, now) {
            log::warn!("Failed to cache exam calendar: {e}");
        }
        Ok(exams)
    }

    /// Exams listed for `month`, or `None` if the month could not be read.
    async fn month_exams(&self, month: u32, token: &CancellationToken) -> Option<Vec<ExamRecord>> {
        let page = match self.fetch(self.ctx.config.calendar_url(month), token).await {
            Ok(page) => page,
            Err(SyncError::Cancelled) => return None,
            Err(e) => {
                log::warn!("Month {month} unavailable, treating as no exams: {e}");
                return None;
            }
        };

        let document = page.document();
        let schema = &self.ctx.schemas.exams;
        match schema.classify(&document) {
            Classification::HasTable(table) => {
                Some(schema.parse_table(table, self.ctx.clock.today().year()))
            }
            Classification::ExplicitlyEmpty(_) => Some(vec![]),
            Classification::Unparseable => {
                log::warn!("Month {month} page unreadable, treating as no exams");
                None
            }
        }
    }

    async fn grades(&self, token: &CancellationToken) -> Result<Vec<GradeRecord>, SyncError> {
        let page = self.fetch(self.ctx.config.grades_url(), token).await?;
        let document = page.document();
        let schema = &self.ctx.schemas.grades;
        match schema.classify(&document) {
            Classification::HasTable(table) => Ok(schema.parse_table(table)),
            _ => Err(SyncError::Parse {
                message: format!("no grades table in {}", page.url),
            }),
        }
    }

    fn finish(
        &self,
        token: &CancellationToken,
        state: ScreenState<Vec<RecentGrade>>,
    ) -> Result<ScreenState<Vec<RecentGrade>>, SyncError> {
        ensure_active(token)?;
        self.controller.render(token, state.clone());
        Ok(state)
    }
}

fn grades_state(grades: Vec<RecentGrade>, origin: DataOrigin) -> ScreenState<Vec<RecentGrade>> {
    if grades.is_empty() {
        ScreenState::Empty { message: None }
    } else {
        ScreenState::Content {
            data: grades,
            origin,
        }
    }
}

#[async_trait]
impl Refreshable for HomeScreen {
    fn namespace(&self) -> Namespace {
        Namespace::Home
    }

    async fn refresh(&self) -> Result<(), SyncError> {
        self.load().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta, TimeZone};

    use super::*;
    use crate::collaborators::Clock;
    use crate::testing::{
        self, Harness, LANDING_PAGE, LOGIN_PAGE, NO_EXAMS_PAGE, StubFetcher, calendar_page,
        grades_page,
    };

    fn mat101() -> RecentGrade {
        RecentGrade {
            code: "MAT101".to_string(),
            group: 2,
            value: "8.5".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        }
    }

    /// Month 3 lists MAT101 and a retake, month 4 has no exams, every
    /// other month is missing (404).
    fn portal(online: bool) -> (Harness, HomeScreen) {
        let h = testing::context(StubFetcher::new(), online);
        h.fetcher.serve(&h.config.landing_url(), LANDING_PAGE);
        h.fetcher.serve(
            &h.config.calendar_url(3),
            &calendar_page(&[
                ["10/03", "MAT101", "Prova", "2", "Matemática"],
                ["14/03", "FIS202", "Rec", "2", "Física"],
            ]),
        );
        h.fetcher.serve(&h.config.calendar_url(4), NO_EXAMS_PAGE);
        h.fetcher.serve(
            &h.config.grades_url(),
            &grades_page(&[("MAT101", "8.5"), ("FIS202", "9.0")]),
        );
        let screen = HomeScreen::new(h.ctx.clone());
        (h, screen)
    }

    #[tokio::test]
    async fn joins_calendar_and_grades() {
        let (h, screen) = portal(true);

        let state = screen.load().await.unwrap();
        assert_eq!(
            state,
            ScreenState::Content {
                data: vec![mat101()],
                origin: DataOrigin::Network,
            }
        );

        let stored = h
            .cache
            .get_records::<RecentGrade>(&HomeScreen::recent_grades_key())
            .unwrap()
            .unwrap();
        assert_eq!(stored.records, vec![mat101()]);

        let exams = h
            .cache
            .get_records::<ExamRecord>(&HomeScreen::exams_key())
            .unwrap()
            .unwrap();
        assert_eq!(exams.records.len(), 1);
        assert!(exams.records.iter().all(|exam| !exam.is_retake()));

        let month_calls = h
            .fetcher
            .calls()
            .iter()
            .filter(|url| url.contains("/provas/datas"))
            .count();
        assert_eq!(month_calls, 12);
    }

    #[tokio::test]
    async fn future_exam_yields_empty() {
        let (h, screen) = portal(true);
        h.clock.set(Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap());

        assert_eq!(
            screen.load().await.unwrap(),
            ScreenState::Empty { message: None }
        );
    }

    #[tokio::test]
    async fn torn_down_screen_skips_probe_and_fetch() {
        let (h, screen) = portal(true);
        screen.controller().teardown();

        assert!(matches!(screen.load().await, Err(SyncError::Cancelled)));
        assert_eq!(screen.controller().state(), ScreenState::Idle);
        assert_eq!(h.probe.checks(), 0);
        assert!(h.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn ungraded_placeholder_is_not_a_recent_grade() {
        let (h, screen) = portal(true);
        h.fetcher
            .serve(&h.config.grades_url(), &grades_page(&[("MAT101", "--")]));

        assert_eq!(
            screen.load().await.unwrap(),
            ScreenState::Empty { message: None }
        );
    }

    #[tokio::test]
    async fn unchanged_grades_are_not_rewritten() {
        let (h, screen) = portal(true);
        screen.load().await.unwrap();
        let first = h.cache.get(&HomeScreen::recent_grades_key()).unwrap().unwrap();

        h.fetcher.clear_calls();
        h.clock.advance(TimeDelta::hours(2));
        let state = screen.load().await.unwrap();
        assert_eq!(state.content(), Some(&vec![mat101()]));

        let second = h.cache.get(&HomeScreen::recent_grades_key()).unwrap().unwrap();
        assert_eq!(second.written_at, first.written_at);
        assert_eq!(
            h.fetcher.calls(),
            vec![h.config.landing_url(), h.config.grades_url()]
        );
    }

    #[tokio::test]
    async fn regraded_exam_is_rewritten() {
        let (h, screen) = portal(true);
        screen.load().await.unwrap();

        h.fetcher
            .serve(&h.config.grades_url(), &grades_page(&[("MAT101", "9.5")]));
        h.clock.advance(TimeDelta::hours(2));
        let state = screen.load().await.unwrap();
        assert_eq!(state.content().unwrap()[0].value, "9.5");

        let stored = h.cache.get(&HomeScreen::recent_grades_key()).unwrap().unwrap();
        assert_eq!(stored.written_at, h.clock.now());
    }

    #[tokio::test]
    async fn stale_calendar_is_rebuilt() {
        let (h, screen) = portal(true);
        screen.load().await.unwrap();

        h.fetcher.clear_calls();
        h.clock.advance(TimeDelta::days(8));
        screen.load().await.unwrap();
        assert_eq!(h.fetcher.calls().len(), 14);
    }

    #[tokio::test]
    async fn empty_cached_calendar_is_rebuilt_within_horizon() {
        let h = testing::context(StubFetcher::new(), true);
        h.fetcher.serve(&h.config.landing_url(), LANDING_PAGE);
        h.fetcher.serve(&h.config.calendar_url(4), NO_EXAMS_PAGE);
        h.fetcher
            .serve(&h.config.grades_url(), &grades_page(&[("MAT101", "8.5")]));
        let screen = HomeScreen::new(h.ctx.clone());

        assert_eq!(
            screen.load().await.unwrap(),
            ScreenState::Empty { message: None }
        );
        let cached = h
            .cache
            .get_records::<ExamRecord>(&HomeScreen::exams_key())
            .unwrap()
            .unwrap();
        assert!(cached.records.is_empty());

        h.fetcher.serve(
            &h.config.calendar_url(3),
            &calendar_page(&[["10/03", "MAT101", "Prova", "2", "Matemática"]]),
        );
        h.fetcher.clear_calls();
        h.clock.advance(TimeDelta::hours(1));

        let state = screen.load().await.unwrap();
        assert_eq!(state.content(), Some(&vec![mat101()]));
        assert_eq!(h.fetcher.calls().len(), 14);
    }

    #[tokio::test]
    async fn invalid_session_clears_home_and_asks_for_login() {
        let (h, screen) = portal(true);
        screen.load().await.unwrap();

        h.fetcher.serve(&h.config.landing_url(), LOGIN_PAGE);
        assert_eq!(screen.load().await.unwrap(), ScreenState::LoginRequired);
        assert!(
            h.cache
                .get(&HomeScreen::recent_grades_key())
                .unwrap()
                .is_none()
        );
        assert!(h.cache.get(&HomeScreen::exams_key()).unwrap().is_none());
    }

    #[tokio::test]
    async fn grades_failure_falls_back_to_cache() {
        let (h, screen) = portal(true);
        screen.load().await.unwrap();

        h.fetcher.time_out(&h.config.grades_url());
        h.clock.advance(TimeDelta::hours(1));
        let state = screen.load().await.unwrap();
        assert_eq!(state.content(), Some(&vec![mat101()]));
        assert!(matches!(state.origin(), Some(DataOrigin::Cache { .. })));
    }

    #[tokio::test]
    async fn expired_recent_grades_are_discarded() {
        let (h, screen) = portal(true);
        screen.load().await.unwrap();

        h.probe.set_online(false);
        h.clock.advance(TimeDelta::hours(25));
        assert_eq!(screen.load().await.unwrap(), ScreenState::Offline);
        assert!(
            h.cache
                .get(&HomeScreen::recent_grades_key())
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn all_months_failing_is_not_cached() {
        let h = testing::context(StubFetcher::new(), true);
        h.fetcher.serve(&h.config.landing_url(), LANDING_PAGE);
        h.fetcher
            .serve(&h.config.grades_url(), &grades_page(&[("MAT101", "8.5")]));
        let screen = HomeScreen::new(h.ctx.clone());

        assert_eq!(
            screen.load().await.unwrap(),
            ScreenState::Empty { message: None }
        );
        assert!(h.cache.get(&HomeScreen::exams_key()).unwrap().is_none());
    }
}
