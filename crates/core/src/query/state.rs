//! Observable per-task state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RequestError;

/// Settlement of a cached task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never settled.
    Pending,
    /// Last run produced a value.
    Success,
    /// Last run failed before producing a value.
    Error,
}

/// Snapshot of one cache entry.
#[derive(Debug)]
pub struct QueryState<T> {
    /// Settlement of the last finished run.
    pub status: QueryStatus,
    /// Value from the last successful run. Kept while a later run fails.
    pub data: Option<Arc<T>>,
    /// Error from the last run, if it failed.
    pub error: Option<RequestError>,
    /// A run is currently in flight.
    pub is_fetching: bool,
    /// The entry was invalidated and will refetch on next use.
    pub is_invalidated: bool,
    /// When `data` was stored.
    pub updated_at: Option<Instant>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            is_invalidated: self.is_invalidated,
            updated_at: self.updated_at,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T> QueryState<T> {
    /// State of a key the cache has never seen.
    pub fn pending() -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            is_fetching: false,
            is_invalidated: false,
            updated_at: None,
        }
    }

    /// No settled result yet and a run is in flight.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Pending && self.is_fetching
    }

    /// The last run produced a value.
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// The last run failed at the transport or processing level.
    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Whether the value must be refetched before it is served again.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        if self.status != QueryStatus::Success || self.is_invalidated {
            return true;
        }
        self.updated_at
            .is_none_or(|updated_at| updated_at.elapsed() >= stale_time)
    }
}
