//! Per-screen display state and fetch cancellation.

use std::sync::{Mutex, PoisonError};

use campus_portal_models::screen::ScreenState;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Owns one screen's [`ScreenState`] and the token of its in-flight load.
///
/// [`Self::begin`] cancels the previous load before handing out a new
/// token, so at most one load per screen is ever live. Renders carrying a
/// cancelled token are dropped.
#[derive(Debug)]
pub struct ScreenController<T> {
    state: watch::Sender<ScreenState<T>>,
    current: Mutex<CancellationToken>,
    root: CancellationToken,
}

impl<T: Clone + PartialEq> Default for ScreenController<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq> ScreenController<T> {
    #[must_use]
    pub fn new() -> Self {
        let root = CancellationToken::new();
        Self {
            state: watch::Sender::new(ScreenState::Idle),
            current: Mutex::new(root.child_token()),
            root,
        }
    }

    /// Receives every rendered state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScreenState<T>> {
        self.state.subscribe()
    }

    /// The state currently on screen.
    #[must_use]
    pub fn state(&self) -> ScreenState<T> {
        self.state.borrow().clone()
    }

    /// Cancels the in-flight load, if any, and returns the token for a new
    /// one. After [`Self::teardown`] the returned token is already
    /// cancelled.
    pub fn begin(&self) -> CancellationToken {
        let next = self.root.child_token();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();
        *current = next.clone();
        next
    }

    /// Shows `next` unless `token` was cancelled. Subscribers are only
    /// notified when the state actually changes.
    ///
    /// Holds the same lock as [`Self::begin`], so a load superseded while
    /// rendering can never overwrite its successor's state.
    pub fn render(&self, token: &CancellationToken, next: ScreenState<T>) -> bool {
        let _current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            log::debug!("Dropping render from a cancelled load");
            return false;
        }
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        true
    }

    /// Cancels the in-flight load and every future one.
    pub fn teardown(&self) {
        self.root.cancel();
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.root.is_cancelled()
    }
}
