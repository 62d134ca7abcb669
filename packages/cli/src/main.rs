#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the campus portal client.
//!
//! Each subcommand runs one screen's load sequence against the on-disk
//! cache and prints the resulting state. `watch` keeps every screen open
//! and prints each change until interrupted.

mod render;

use std::sync::Arc;
use std::time::Duration;

use campus_portal_cache::{CacheStore, paths};
use campus_portal_models::screen::ScreenState;
use campus_portal_models::{ExamFilter, WeekSchedule};
use campus_portal_scraper::fetch::HttpPageFetcher;
use campus_portal_source::config::PortalConfig;
use campus_portal_sync::PortalContext;
use campus_portal_sync::collaborators::{StaticCookie, SystemClock, TcpProbe};
use campus_portal_sync::dataset::{CalendarDataset, DatasetScreen, ScheduleDataset};
use campus_portal_sync::home::HomeScreen;
use campus_portal_sync::refresh::{Refreshable, spawn_periodic_refresh};
use chrono::Weekday;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Env var holding the session cookie header when `--cookie` is not given.
const COOKIE_ENV: &str = "CAMPUS_PORTAL_COOKIE";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "campus_portal", about = "Campus portal client")]
struct Cli {
    /// Session cookie header, e.g. "PHPSESSID=..." (overrides `CAMPUS_PORTAL_COOKIE`)
    #[arg(long, global = true)]
    cookie: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the exam calendar
    Calendar {
        /// Month 1-12. 0 shows the portal's default listing.
        #[arg(long, default_value = "0", value_parser = clap::value_parser!(u32).range(0..=12))]
        month: u32,
        /// Rows to show: `all`, `exams` or `retakes`
        #[arg(long, default_value = "all")]
        filter: ExamFilter,
    },
    /// Show the most recent graded exams
    Home,
    /// Show the class schedule for one weekday
    Schedule {
        /// Weekday 1-5 (Monday is 1). Defaults to today, or Monday on weekends.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        day: Option<u8>,
    },
    /// Delete every cached page and record
    Clear,
    /// Show every screen and refresh them periodically until interrupted
    Watch {
        /// Minutes between refreshes (default from the portal config)
        #[arg(long)]
        interval_mins: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = PortalConfig::load()?;
    let cookie = cli.cookie.or_else(|| std::env::var(COOKIE_ENV).ok());
    if cookie.is_none() {
        log::warn!("No session cookie given; the portal will ask for a login");
    }
    let ctx = Arc::new(build_context(config, cookie)?);

    match cli.command {
        Commands::Calendar { month, filter } => {
            let screen = DatasetScreen::new(ctx.clone());
            let state = screen.load(CalendarDataset::new(month, filter)).await?;
            println!(
                "{}",
                render::state(&calendar_title(month, filter), &state, |e| render::exams(e))
            );
        }
        Commands::Home => {
            let screen = HomeScreen::new(ctx.clone());
            let state = screen.load().await?;
            println!(
                "{}",
                render::state("Recent grades", &state, |g| render::recent_grades(g))
            );
        }
        Commands::Schedule { day } => {
            let day = day.unwrap_or_else(|| WeekSchedule::default_day(ctx.clock.today()));
            let screen = DatasetScreen::new(ctx.clone());
            let state = screen.load(ScheduleDataset).await?;
            println!(
                "{}",
                render::state(&schedule_title(day), &state, |s| render::schedule_day(s, day))
            );
        }
        Commands::Clear => {
            let removed = ctx.clear_all_data()?;
            println!("Removed {removed} cached entries");
        }
        Commands::Watch { interval_mins } => {
            let period = interval_mins.map_or_else(
                || ctx.config.refresh_interval(),
                |mins| Duration::from_secs(mins * 60),
            );
            watch_screens(ctx, period).await?;
        }
    }

    Ok(())
}

fn build_context(
    config: PortalConfig,
    cookie: Option<String>,
) -> Result<PortalContext, Box<dyn std::error::Error>> {
    let dir = paths::data_dir();
    paths::ensure_dir(&dir)?;
    let db_path = paths::cache_db_path(&dir);
    log::debug!("Opening cache at {}", db_path.display());

    let cache = Arc::new(CacheStore::open(&db_path)?);
    let fetcher = Arc::new(HttpPageFetcher::new(&config.user_agent)?);
    let probe = Arc::new(TcpProbe::for_url(&config.base_url, PROBE_TIMEOUT));

    Ok(PortalContext::new(
        config,
        cache,
        fetcher,
        Arc::new(StaticCookie(cookie)),
        probe,
        Arc::new(SystemClock),
    )?)
}

fn calendar_title(month: u32, filter: ExamFilter) -> String {
    let listing = if month == 0 {
        "current listing".to_string()
    } else {
        format!("month {month}")
    };
    format!("Exams, {listing} ({filter})")
}

fn schedule_title(day: u8) -> String {
    Weekday::try_from(day.saturating_sub(1))
        .map_or_else(|_| format!("Schedule, day {day}"), |weekday| format!("Schedule, {weekday}"))
}

/// Loads the home, calendar and schedule screens, prints every state they
/// render, and refreshes them each `period` until Ctrl-C.
async fn watch_screens(
    ctx: Arc<PortalContext>,
    period: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let home = Arc::new(HomeScreen::new(ctx.clone()));
    let calendar = Arc::new(DatasetScreen::<CalendarDataset>::new(ctx.clone()));
    let schedule = Arc::new(DatasetScreen::<ScheduleDataset>::new(ctx.clone()));
    let day = WeekSchedule::default_day(ctx.clock.today());

    let cancel = CancellationToken::new();
    let printers = [
        print_changes(
            "Recent grades".to_string(),
            home.controller().subscribe(),
            |g| render::recent_grades(g),
            cancel.clone(),
        ),
        print_changes(
            calendar_title(0, ExamFilter::All),
            calendar.controller().subscribe(),
            |e| render::exams(e),
            cancel.clone(),
        ),
        print_changes(
            schedule_title(day),
            schedule.controller().subscribe(),
            move |s| render::schedule_day(s, day),
            cancel.clone(),
        ),
    ];

    let (home_state, calendar_state, schedule_state) = tokio::join!(
        home.load(),
        calendar.load(CalendarDataset::default()),
        schedule.load(ScheduleDataset),
    );
    for result in [
        home_state.map(|_| ()),
        calendar_state.map(|_| ()),
        schedule_state.map(|_| ()),
    ] {
        if let Err(e) = result {
            log::warn!("Initial load did not finish: {e}");
        }
    }

    log::info!("Refreshing every {} minutes", period.as_secs() / 60);
    let targets: Vec<Arc<dyn Refreshable>> = vec![home.clone(), calendar.clone(), schedule.clone()];
    let refresher = spawn_periodic_refresh(targets, period, cancel.clone());

    tokio::signal::ctrl_c().await?;
    log::info!("Stopping");
    cancel.cancel();
    home.controller().teardown();
    calendar.controller().teardown();
    schedule.controller().teardown();

    refresher.await?;
    for printer in printers {
        printer.await?;
    }
    Ok(())
}

fn print_changes<T, F>(
    title: String,
    mut rx: watch::Receiver<ScreenState<T>>,
    body: F,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&T) -> String + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let state = rx.borrow_and_update().clone();
            if !matches!(state, ScreenState::Idle) {
                println!("{}", render::state(&title, &state, &body));
            }
        }
    })
}
