//! Single-document screens: exam calendar and class schedule.
//!
//! A [`DocumentDataset`] names its cache key and request, and knows how to
//! read a fetched page or a cached table fragment. [`DatasetScreen`] runs
//! the load sequence for any dataset:
//!
//! 1. Cached data or sentinel is shown at once; otherwise `Loading`.
//! 2. Offline: keep what the cache showed, or show `Offline`.
//! 3. Fetch and classify. A table is stored as markup and shown; a
//!    "no records" banner replaces the cache with the empty sentinel.
//! 4. A failed fetch or an unreadable page leaves the cache untouched and
//!    shows what it holds.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use campus_portal_cache::{CacheKey, Namespace, Payload};
use campus_portal_models::screen::{DataOrigin, ScreenState};
use campus_portal_models::{ExamFilter, ExamRecord, WeekSchedule};
use campus_portal_scraper::classify::Classification;
use campus_portal_scraper::table::table_markup;
use campus_portal_scraper::{Page, PageRequest};
use chrono::Datelike;
use tokio_util::sync::CancellationToken;

use crate::refresh::Refreshable;
use crate::screen::ScreenController;
use crate::{PortalContext, SyncError, ensure_active};

/// What a fetched page turned out to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpreted<T> {
    /// The data table, as markup to cache and as parsed data to show.
    Data { markup: String, data: T },
    /// The portal's "no records" banner.
    Empty { message: Option<String> },
    /// Neither table nor banner.
    Unparseable,
}

impl<T> Interpreted<T> {
    fn from_classification(
        classification: Classification<'_>,
        parse: impl FnOnce(scraper::ElementRef<'_>) -> T,
    ) -> Self {
        match classification {
            Classification::HasTable(table) => Self::Data {
                markup: table_markup(table),
                data: parse(table),
            },
            Classification::ExplicitlyEmpty(_) => Self::Empty {
                message: classification.empty_message(),
            },
            Classification::Unparseable => Self::Unparseable,
        }
    }
}

/// One page-backed dataset.
pub trait DocumentDataset: Clone + std::fmt::Debug + Send + Sync + 'static {
    type Data: Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static;

    /// Cache namespace owned by the dataset's screen.
    const NAMESPACE: Namespace;

    fn key(&self) -> CacheKey;

    fn request(&self, ctx: &PortalContext) -> PageRequest;

    /// Classifies and parses a fetched page.
    fn interpret(&self, ctx: &PortalContext, page: &Page) -> Interpreted<Self::Data>;

    /// Parses table markup previously stored by [`Self::interpret`].
    fn decode(&self, ctx: &PortalContext, markup: &str) -> Self::Data;
}

/// Exam calendar for one month. Month `0` is the portal's default listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarDataset {
    pub month: u32,
    pub filter: ExamFilter,
}

impl CalendarDataset {
    #[must_use]
    pub const fn new(month: u32, filter: ExamFilter) -> Self {
        Self { month, filter }
    }
}

impl DocumentDataset for CalendarDataset {
    type Data = Vec<ExamRecord>;

    const NAMESPACE: Namespace = Namespace::Calendar;

    fn key(&self) -> CacheKey {
        CacheKey::partitioned(Self::NAMESPACE, "exams", self.month)
    }

    fn request(&self, ctx: &PortalContext) -> PageRequest {
        ctx.request(ctx.config.calendar_url(self.month), ctx.config.page_timeout())
    }

    fn interpret(&self, ctx: &PortalContext, page: &Page) -> Interpreted<Self::Data> {
        let document = page.document();
        let year = ctx.clock.today().year();
        let schema = &ctx.schemas.exams;
        Interpreted::from_classification(schema.classify(&document), |table| {
            self.filter.apply(&schema.parse_table(table, year))
        })
    }

    fn decode(&self, ctx: &PortalContext, markup: &str) -> Self::Data {
        let year = ctx.clock.today().year();
        self.filter
            .apply(&ctx.schemas.exams.parse_cached(markup, year))
    }
}

/// The weekly class schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleDataset;

impl DocumentDataset for ScheduleDataset {
    type Data = WeekSchedule;

    const NAMESPACE: Namespace = Namespace::Schedule;

    fn key(&self) -> CacheKey {
        CacheKey::new(Self::NAMESPACE, "table")
    }

    fn request(&self, ctx: &PortalContext) -> PageRequest {
        ctx.request(ctx.config.schedule_url(), ctx.config.page_timeout())
    }

    fn interpret(&self, ctx: &PortalContext, page: &Page) -> Interpreted<Self::Data> {
        let document = page.document();
        let schema = &ctx.schemas.schedule;
        Interpreted::from_classification(schema.classify(&document), |table| {
            schema.parse_table(table)
        })
    }

    fn decode(&self, ctx: &PortalContext, markup: &str) -> Self::Data {
        ctx.schemas.schedule.parse_cached(markup)
    }
}

/// Screen showing one [`DocumentDataset`] at a time.
#[derive(Debug)]
pub struct DatasetScreen<D: DocumentDataset> {
    ctx: Arc<PortalContext>,
    controller: ScreenController<D::Data>,
    current: Mutex<Option<D>>,
}

impl<D: DocumentDataset> DatasetScreen<D> {
    #[must_use]
    pub fn new(ctx: Arc<PortalContext>) -> Self {
        Self {
            ctx,
            controller: ScreenController::new(),
            current: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn controller(&self) -> &ScreenController<D::Data> {
        &self.controller
    }

    /// Loads `dataset`, cancelling any load already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if a newer load or teardown
    /// superseded this one. Every other outcome is a rendered state.
    pub async fn load(&self, dataset: D) -> Result<ScreenState<D::Data>, SyncError> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(dataset.clone());
        let token = self.controller.begin();
        self.run(&dataset, &token).await
    }

    /// Re-runs the last loaded dataset. Returns `None` if nothing was
    /// loaded yet.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if superseded.
    pub async fn reload(&self) -> Result<Option<ScreenState<D::Data>>, SyncError> {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match current {
            Some(dataset) => self.load(dataset).await.map(Some),
            None => Ok(None),
        }
    }

    async fn run(
        &self,
        dataset: &D,
        token: &CancellationToken,
    ) -> Result<ScreenState<D::Data>, SyncError> {
        ensure_active(token)?;
        let key = dataset.key();
        let cached = self.cached_state(dataset, &key);
        self.controller
            .render(token, cached.clone().unwrap_or(ScreenState::Loading));

        if !self.ctx.connectivity.is_online().await {
            log::info!("Offline; showing cached {key}");
            return self.finish(token, cached.unwrap_or(ScreenState::Offline));
        }

        match self.fetch_fresh(dataset, &key, token).await {
            Ok(state) => self.finish(token, state),
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) => {
                log::warn!("Refreshing {key} failed, falling back to cache: {e}");
                let fallback = self.cached_state(dataset, &key);
                self.finish(token, fallback.unwrap_or(ScreenState::Offline))
            }
        }
    }

    async fn fetch_fresh(
        &self,
        dataset: &D,
        key: &CacheKey,
        token: &CancellationToken,
    ) -> Result<ScreenState<D::Data>, SyncError> {
        ensure_active(token)?;
        let request = dataset.request(&self.ctx);
        let page = self.ctx.fetcher.fetch(&request, token).await?;
        ensure_active(token)?;

        let now = self.ctx.clock.now();
        match dataset.interpret(&self.ctx, &page) {
            Interpreted::Data { markup, data } => {
                ensure_active(token)?;
                if let Err(e) = self.ctx.cache.put_html(key, &markup, now) {
                    log::warn!("Failed to cache {key}: {e}");
                }
                Ok(ScreenState::Content {
                    data,
                    origin: DataOrigin::Network,
                })
            }
            Interpreted::Empty { message } => {
                ensure_active(token)?;
                if let Err(e) = self.ctx.cache.put_empty(key, message.as_deref(), now) {
                    log::warn!("Failed to cache empty state for {key}: {e}");
                }
                Ok(ScreenState::Empty { message })
            }
            Interpreted::Unparseable => Err(SyncError::Parse {
                message: format!("no table or banner in {}", page.url),
            }),
        }
    }

    /// What the cache alone would show, if anything.
    fn cached_state(&self, dataset: &D, key: &CacheKey) -> Option<ScreenState<D::Data>> {
        let entry = match self.ctx.cache.get(key) {
            Ok(entry) => entry?,
            Err(e) => {
                log::warn!("Reading {key} from cache failed: {e}");
                return None;
            }
        };
        match entry.payload {
            Payload::Html(markup) => Some(ScreenState::Content {
                data: dataset.decode(&self.ctx, &markup),
                origin: DataOrigin::Cache {
                    written_at: entry.written_at,
                },
            }),
            Payload::Empty { message } => Some(ScreenState::Empty { message }),
            Payload::Records(_) => {
                log::warn!("Unexpected record payload at {key}");
                None
            }
        }
    }

    fn finish(
        &self,
        token: &CancellationToken,
        state: ScreenState<D::Data>,
    ) -> Result<ScreenState<D::Data>, SyncError> {
        ensure_active(token)?;
        self.controller.render(token, state.clone());
        Ok(state)
    }
}

#[async_trait]
impl<D: DocumentDataset> Refreshable for DatasetScreen<D> {
    fn namespace(&self) -> Namespace {
        D::NAMESPACE
    }

    async fn refresh(&self) -> Result<(), SyncError> {
        self.reload().await.map(|_| ())
    }
}
