// 🔁 Refresh Tracker - Latest-request-wins state for dashboard fetches
//
// Every refresh takes a ticket. A finished fetch publishes only if its ticket
// is still the newest one issued; results of superseded fetches are dropped.

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum LoadState<T> {
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug)]
struct Inner<T> {
    generation: AtomicU64,
    state: RwLock<LoadState<T>>,
}

/// Shared, cloneable handle around one piece of dashboard state
#[derive(Debug)]
pub struct StatsTracker<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for StatsTracker<T> {
    fn clone(&self) -> Self {
        StatsTracker {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for StatsTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StatsTracker<T> {
    pub fn new() -> Self {
        StatsTracker {
            inner: Arc::new(Inner {
                generation: AtomicU64::new(0),
                state: RwLock::new(LoadState::Loading),
            }),
        }
    }

    /// Start a refresh: newer than every ticket issued before it
    pub fn begin(&self) -> Ticket {
        let ticket = Ticket(self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1);
        if let Ok(mut state) = self.inner.state.write() {
            *state = LoadState::Loading;
        }
        ticket
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Publish a finished fetch. Returns false when the ticket was superseded.
    pub fn complete(&self, ticket: Ticket, result: Result<T>) -> bool {
        let Ok(mut state) = self.inner.state.write() else {
            return false;
        };

        // Checked under the write lock so a newer begin() cannot interleave
        if !self.is_current(ticket) {
            debug!("Discarding superseded result for ticket {}", ticket.0);
            return false;
        }

        *state = match result {
            Ok(value) => LoadState::Ready(value),
            Err(err) => LoadState::Failed(err.to_string()),
        };
        true
    }

    /// begin → await fetch → complete
    pub async fn refresh<F>(&self, fetch: F) -> bool
    where
        F: Future<Output = Result<T>>,
    {
        let ticket = self.begin();
        let result = fetch.await;
        self.complete(ticket, result)
    }
}

impl<T: Clone> StatsTracker<T> {
    pub fn snapshot(&self) -> LoadState<T> {
        match self.inner.state.read() {
            Ok(state) => state.clone(),
            Err(_) => LoadState::Failed("state lock poisoned".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdminError;

    #[test]
    fn test_superseded_result_is_dropped() {
        let tracker: StatsTracker<u32> = StatsTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();

        assert!(tracker.complete(second, Ok(2)));
        assert!(!tracker.complete(first, Ok(1)));
        assert_eq!(tracker.snapshot(), LoadState::Ready(2));
    }

    #[test]
    fn test_failure_is_published_as_message() {
        let tracker: StatsTracker<u32> = StatsTracker::new();
        let ticket = tracker.begin();
        tracker.complete(ticket, Err(AdminError::Database("no such table: clusters".into())));

        assert_eq!(tracker.snapshot().error(), Some("Database error: no such table: clusters"));
    }

    #[tokio::test]
    async fn test_refresh_sets_ready() {
        let tracker: StatsTracker<&'static str> = StatsTracker::new();
        assert!(tracker.snapshot().is_loading());

        assert!(tracker.refresh(async { Ok("done") }).await);
        assert_eq!(tracker.snapshot().ready(), Some(&"done"));
    }

    #[tokio::test]
    async fn test_clones_share_generation() {
        let tracker: StatsTracker<u32> = StatsTracker::new();
        let other = tracker.clone();

        let stale = tracker.begin();
        let fresh = other.begin();
        assert!(!tracker.is_current(stale));
        assert!(tracker.is_current(fresh));
    }
}
