//! In-process task cache.
//!
//! `QueryClient` runs request futures on the caller's task, stores their
//! outcome by [`QueryKey`] and exposes per-key [`QueryState`]. It carries no
//! policy of its own: freshness comes from the caller's `stale_time`, and
//! nothing is retried, timed out or refetched in the background.
//!
//! Concurrent fetches of one key share a single in-flight future. The entry
//! lock is never held across an `.await`.

mod key;
mod state;

use futures_util::FutureExt;
use futures_util::future::{AbortHandle, Abortable, BoxFuture, Shared};
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

use crate::error::RequestError;

pub use key::QueryKey;
pub use state::{QueryState, QueryStatus};

type AnyData = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<AnyData, RequestError>>>;

struct InFlight {
    id: u64,
    future: SharedFetch,
    abort: AbortHandle,
    awaiters: usize,
}

struct Entry {
    status: QueryStatus,
    data: Option<AnyData>,
    error: Option<RequestError>,
    updated_at: Option<Instant>,
    invalidated: bool,
    in_flight: Option<InFlight>,
}

impl Entry {
    fn new() -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            updated_at: None,
            invalidated: false,
            in_flight: None,
        }
    }

    /// Cached value of type `T` that may be served without refetching.
    fn fresh_data<T: Any>(&self, stale_time: Duration) -> Option<AnyData> {
        if self.status != QueryStatus::Success || self.invalidated {
            return None;
        }
        let updated_at = self.updated_at?;
        if updated_at.elapsed() >= stale_time {
            return None;
        }
        self.data.as_ref().filter(|data| data.is::<T>()).cloned()
    }

    fn state<T: Send + Sync + 'static>(&self) -> QueryState<T> {
        QueryState {
            status: self.status,
            data: self
                .data
                .as_ref()
                .and_then(|data| Arc::clone(data).downcast::<T>().ok()),
            error: self.error.clone(),
            is_fetching: self.in_flight.is_some(),
            is_invalidated: self.invalidated,
            updated_at: self.updated_at,
        }
    }
}

struct Inner {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    version: watch::Sender<u64>,
    next_fetch_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.version.send_modify(|version| *version += 1);
    }

    /// Record the outcome of fetch `id`, unless it was cancelled or superseded.
    fn settle(&self, key: &QueryKey, id: u64, result: &Result<AnyData, RequestError>) {
        {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            if entry.in_flight.as_ref().map(|f| f.id) != Some(id) {
                debug!(%key, "Discarding result of a cancelled fetch.");
                return;
            }
            entry.in_flight = None;
            match result {
                Ok(data) => {
                    entry.status = QueryStatus::Success;
                    entry.data = Some(Arc::clone(data));
                    entry.error = None;
                    entry.updated_at = Some(Instant::now());
                    entry.invalidated = false;
                    debug!(%key, "Query settled.");
                }
                Err(err) => {
                    entry.status = QueryStatus::Error;
                    entry.error = Some(err.clone());
                    debug!(%key, error = %err, "Query failed.");
                }
            }
        }
        self.notify();
    }

    /// Drop one awaiter of fetch `id`. The last one to leave aborts it.
    fn release(&self, key: &QueryKey, id: u64) {
        let aborted = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            let Some(in_flight) = entry.in_flight.as_mut().filter(|f| f.id == id) else {
                return;
            };
            in_flight.awaiters = in_flight.awaiters.saturating_sub(1);
            if in_flight.awaiters > 0 {
                return;
            }
            entry.in_flight.take()
        };
        if let Some(in_flight) = aborted {
            in_flight.abort.abort();
            debug!(%key, fetch_id = id, "Last awaiter dropped, fetch aborted.");
            self.notify();
        }
    }
}

enum FetchStart {
    Cached(AnyData),
    Running { id: u64, future: SharedFetch },
}

/// Holds one awaiter slot of an in-flight fetch until the fetch settles.
struct AwaitGuard<'a> {
    inner: &'a Inner,
    key: &'a QueryKey,
    id: u64,
    armed: bool,
}

impl AwaitGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AwaitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.release(self.key, self.id);
        }
    }
}

/// Keyed cache of request tasks and their outcomes.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.inner.lock().len())
            .field("version", &*self.inner.version.borrow())
            .finish()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    /// Create an empty cache.
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                version,
                next_fetch_id: AtomicU64::new(0),
            }),
        }
    }

    /// Serve `key` from cache while fresh, otherwise run `fetcher`.
    ///
    /// A fetch already in flight for `key` is joined instead of started again.
    /// `fetcher` is only invoked when a new run is needed. Dropping the
    /// returned future before it resolves leaves the fetch to its other
    /// awaiters; when none remain the fetch is aborted and the entry keeps
    /// its last settled state.
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: F,
    ) -> Result<Arc<T>, RequestError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    {
        match self.begin_fetch::<T, F, Fut>(key, stale_time, fetcher) {
            FetchStart::Cached(data) => downcast(data),
            FetchStart::Running { id, future } => {
                let guard = AwaitGuard {
                    inner: &self.inner,
                    key,
                    id,
                    armed: true,
                };
                let result = future.await;
                guard.disarm();
                result.and_then(downcast)
            }
        }
    }

    fn begin_fetch<T, F, Fut>(&self, key: &QueryKey, stale_time: Duration, fetcher: F) -> FetchStart
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    {
        let (id, future) = {
            let mut entries = self.inner.lock();
            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);

            if let Some(data) = entry.fresh_data::<T>(stale_time) {
                debug!(%key, "Query cache hit.");
                return FetchStart::Cached(data);
            }
            if let Some(in_flight) = &mut entry.in_flight {
                debug!(%key, "Joining in-flight query.");
                in_flight.awaiters += 1;
                return FetchStart::Running {
                    id: in_flight.id,
                    future: in_flight.future.clone(),
                };
            }

            let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
            let (abort, registration) = AbortHandle::new_pair();
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let settle_key = key.clone();

            let future = async move {
                let work = async move { fetcher().await.map(into_any) };
                let result = Abortable::new(work, registration)
                    .await
                    .unwrap_or(Err(RequestError::Cancelled));
                if let Some(inner) = weak.upgrade() {
                    inner.settle(&settle_key, id, &result);
                }
                result
            }
            .boxed()
            .shared();

            entry.in_flight = Some(InFlight {
                id,
                future: future.clone(),
                abort,
                awaiters: 1,
            });
            debug!(%key, fetch_id = id, "Query cache miss, fetching.");
            (id, future)
        };

        self.inner.notify();
        FetchStart::Running { id, future }
    }

    /// Current state of `key`. Unknown keys report [`QueryStatus::Pending`].
    pub fn query_state<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        self.inner
            .lock()
            .get(key)
            .map(Entry::state)
            .unwrap_or_default()
    }

    /// Mark every entry whose key starts with `prefix` as stale.
    ///
    /// Returns the number of entries affected.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        let count = {
            let mut entries = self.inner.lock();
            let mut count = 0;
            for (_, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
                entry.invalidated = true;
                count += 1;
            }
            count
        };
        debug!(%prefix, count, "Invalidated queries.");
        if count > 0 {
            self.inner.notify();
        }
        count
    }

    /// Abort in-flight fetches under `prefix`, restoring their last settled state.
    ///
    /// Every awaiter of an aborted fetch receives [`RequestError::Cancelled`].
    pub fn cancel_queries(&self, prefix: &QueryKey) -> usize {
        let count = {
            let mut entries = self.inner.lock();
            let mut count = 0;
            for (_, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
                if let Some(in_flight) = entry.in_flight.take() {
                    in_flight.abort.abort();
                    count += 1;
                }
            }
            count
        };
        debug!(%prefix, count, "Cancelled in-flight queries.");
        if count > 0 {
            self.inner.notify();
        }
        count
    }

    /// Drop every entry under `prefix`, aborting fetches in flight.
    pub fn remove_queries(&self, prefix: &QueryKey) -> usize {
        let removed: Vec<Entry> = {
            let mut entries = self.inner.lock();
            let keys: Vec<QueryKey> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };
        for in_flight in removed.iter().filter_map(|entry| entry.in_flight.as_ref()) {
            in_flight.abort.abort();
        }
        debug!(%prefix, count = removed.len(), "Removed queries.");
        if !removed.is_empty() {
            self.inner.notify();
        }
        removed.len()
    }

    /// Receiver of a version number bumped on every cache state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }
}

fn into_any<T: Send + Sync + 'static>(data: T) -> AnyData {
    Arc::new(data)
}

fn downcast<T: Send + Sync + 'static>(data: AnyData) -> Result<Arc<T>, RequestError> {
    data.downcast::<T>()
        .map_err(|_| RequestError::Internal(format!("cached value is not a {}", type_name::<T>())))
}
