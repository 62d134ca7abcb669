//! Display state of a data screen.
//!
//! A screen is always in exactly one [`ScreenState`]; [`Visibility`] is the
//! single mapping from that state to the elements a UI shows, so partial or
//! contradictory combinations cannot be expressed.

use chrono::{DateTime, Utc};

/// Where the data currently on screen came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    /// Read back from the local cache, written at the given time.
    Cache { written_at: DateTime<Utc> },
    /// Parsed from a response received during this load.
    Network,
}

/// Finite display state of one screen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScreenState<T> {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// A fetch is in flight and there is nothing cached to show.
    Loading,
    /// Data to show.
    Content { data: T, origin: DataOrigin },
    /// The portal confirmed there is nothing to show. Carries the portal's
    /// own message when it provided one.
    Empty { message: Option<String> },
    /// No connectivity and no cached answer.
    Offline,
    /// The session cookie is no longer accepted; the user must log in again.
    LoginRequired,
}

impl<T> ScreenState<T> {
    /// Whether this state already shows an answer (content or a confirmed
    /// empty result). Such a state is never downgraded to [`Self::Offline`].
    #[must_use]
    pub const fn has_answer(&self) -> bool {
        matches!(self, Self::Content { .. } | Self::Empty { .. })
    }

    #[must_use]
    pub const fn content(&self) -> Option<&T> {
        match self {
            Self::Content { data, .. } => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> Option<DataOrigin> {
        match self {
            Self::Content { origin, .. } => Some(*origin),
            _ => None,
        }
    }

    /// Maps the content payload, keeping every other state as is.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ScreenState<U> {
        match self {
            Self::Idle => ScreenState::Idle,
            Self::Loading => ScreenState::Loading,
            Self::Content { data, origin } => ScreenState::Content {
                data: f(data),
                origin,
            },
            Self::Empty { message } => ScreenState::Empty { message },
            Self::Offline => ScreenState::Offline,
            Self::LoginRequired => ScreenState::LoginRequired,
        }
    }
}

/// Visible elements of a screen.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Visibility {
    pub progress: bool,
    pub content: bool,
    pub empty_message: bool,
    pub offline_notice: bool,
    /// Shown alongside cached content to signal the data may be outdated.
    pub cached_badge: bool,
    pub login_prompt: bool,
}

impl<T> From<&ScreenState<T>> for Visibility {
    fn from(state: &ScreenState<T>) -> Self {
        match state {
            ScreenState::Idle => Self::default(),
            ScreenState::Loading => Self {
                progress: true,
                ..Self::default()
            },
            ScreenState::Content { origin, .. } => Self {
                content: true,
                cached_badge: matches!(origin, DataOrigin::Cache { .. }),
                ..Self::default()
            },
            ScreenState::Empty { .. } => Self {
                empty_message: true,
                ..Self::default()
            },
            ScreenState::Offline => Self {
                offline_notice: true,
                ..Self::default()
            },
            ScreenState::LoginRequired => Self {
                login_prompt: true,
                ..Self::default()
            },
        }
    }
}
