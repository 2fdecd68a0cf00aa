//! Single-entity queries keyed by identifier.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use meridian_common::QueryDefaults;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::envelope::Envelope;
use crate::error::RequestError;
use crate::query::{QueryClient, QueryKey, QueryState};

type EntityRequestFn<E> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<E, RequestError>> + Send + Sync>;

/// Predicate deciding whether an identifier can be fetched at all.
pub type IdValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// What the cache stores for an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Extraction {
    /// Cache the whole envelope and unwrap it on every read.
    #[default]
    AfterFetch,
    /// Unwrap inside the request task and cache only the payload.
    Inline,
}

/// Configuration of an [`EntityQuery`].
#[derive(Clone, Default)]
pub struct EntityQueryConfig {
    /// How long a settled entity is served without refetching.
    pub stale_time: Duration,
    /// Identifiers rejected by this predicate resolve to "not found" with
    /// no request.
    pub is_valid_id: Option<IdValidator>,
    /// Where the envelope is unwrapped.
    pub extraction: Extraction,
}

impl EntityQueryConfig {
    /// Set the freshness window.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Reject identifiers for which `is_valid_id` returns `false`.
    pub fn with_id_validator<V>(mut self, is_valid_id: V) -> Self
    where
        V: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.is_valid_id = Some(Arc::new(is_valid_id));
        self
    }

    /// Choose where the envelope is unwrapped.
    pub fn with_extraction(mut self, extraction: Extraction) -> Self {
        self.extraction = extraction;
        self
    }

    fn accepts(&self, id: &str) -> bool {
        self.is_valid_id.as_ref().is_none_or(|is_valid| is_valid(id))
    }
}

impl From<&QueryDefaults> for EntityQueryConfig {
    fn from(defaults: &QueryDefaults) -> Self {
        Self::default().with_stale_time(defaults.entity_stale_time())
    }
}

impl fmt::Debug for EntityQueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityQueryConfig")
            .field("stale_time", &self.stale_time)
            .field("validates_id", &self.is_valid_id.is_some())
            .field("extraction", &self.extraction)
            .finish()
    }
}

/// Re-runs an entity query after invalidating its cache entry.
pub struct Refetch<S> {
    run: Arc<dyn Fn() -> BoxFuture<'static, EntityResult<S>> + Send + Sync>,
}

impl<S> Refetch<S> {
    /// Invalidate the entity and fetch it again.
    pub fn run(&self) -> BoxFuture<'static, EntityResult<S>> {
        (self.run)()
    }
}

impl<S> Clone for Refetch<S> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
        }
    }
}

impl<S> fmt::Debug for Refetch<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refetch").finish_non_exhaustive()
    }
}

/// Observable state of one entity.
#[derive(Debug, Clone)]
pub struct EntityResult<S> {
    /// The success payload, absent until loaded or when the response was
    /// an error-family envelope.
    pub data: Option<S>,
    /// Nothing settled yet and a request is in flight.
    pub is_loading: bool,
    /// The last request failed before producing a response.
    pub is_error: bool,
    /// The failure behind `is_error`.
    pub error: Option<RequestError>,
    /// The identifier was rejected without issuing a request.
    pub not_found: bool,
    /// Handle to invalidate and fetch again. `None` for rejected identifiers.
    pub refetch: Option<Refetch<S>>,
}

impl<S> EntityResult<S> {
    /// Result for an identifier that was rejected up front.
    pub fn not_found() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_error: false,
            error: None,
            not_found: true,
            refetch: None,
        }
    }

    fn from_state<C>(state: QueryState<C>, data: Option<S>, refetch: Refetch<S>) -> Self {
        Self {
            data,
            is_loading: state.is_loading(),
            is_error: state.is_error(),
            error: state.error,
            not_found: false,
            refetch: Some(refetch),
        }
    }
}

/// Query loading one entity by identifier through a [`QueryClient`].
///
/// Entities are cached under `[base_key, id]`.
pub struct EntityQuery<E> {
    base_key: String,
    request: EntityRequestFn<E>,
    config: EntityQueryConfig,
}

impl<E> EntityQuery<E>
where
    E: Envelope + Send + Sync + 'static,
    E::Success: Clone + Send + Sync + 'static,
{
    /// Create a query over `request`, which loads the entity for an id.
    pub fn new<R, Fut>(base_key: impl Into<String>, request: R, config: EntityQueryConfig) -> Self
    where
        R: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<E, RequestError>> + Send + 'static,
    {
        Self {
            base_key: base_key.into(),
            request: Arc::new(move |id: String| request(id).boxed()),
            config,
        }
    }

    /// Cache key of the entity `id`.
    pub fn query_key(&self, id: &str) -> QueryKey {
        QueryKey::new(self.base_key.as_str()).segment(id)
    }

    /// Load `id`, serving it from cache while fresh.
    pub async fn fetch(&self, client: &QueryClient, id: &str) -> EntityResult<E::Success> {
        if !self.config.accepts(id) {
            debug!(base_key = %self.base_key, id, "Identifier rejected; not fetching.");
            return EntityResult::not_found();
        }

        let key = self.query_key(id);
        let request = Arc::clone(&self.request);
        let owned_id = id.to_owned();
        let stale_time = self.config.stale_time;

        let outcome = match self.config.extraction {
            Extraction::AfterFetch => client
                .fetch_query(&key, stale_time, move || request(owned_id))
                .await
                .map(drop),
            Extraction::Inline => client
                .fetch_query(&key, stale_time, move || {
                    let pending = request(owned_id);
                    async move { pending.await.map(Envelope::into_success) }
                })
                .await
                .map(drop),
        };
        if let Err(err) = outcome {
            debug!(%key, error = %err, "Entity request failed.");
        }

        self.snapshot(client, id)
    }

    /// Current state of `id` without scheduling a request.
    pub fn snapshot(&self, client: &QueryClient, id: &str) -> EntityResult<E::Success> {
        if !self.config.accepts(id) {
            return EntityResult::not_found();
        }

        let key = self.query_key(id);
        let refetch = self.refetch_handle(client, id);
        match self.config.extraction {
            Extraction::AfterFetch => {
                let state = client.query_state::<E>(&key);
                let data = state
                    .data
                    .as_deref()
                    .and_then(|envelope| envelope.success())
                    .cloned();
                EntityResult::from_state(state, data, refetch)
            }
            Extraction::Inline => {
                let state = client.query_state::<Option<E::Success>>(&key);
                let data = state.data.as_deref().cloned().flatten();
                EntityResult::from_state(state, data, refetch)
            }
        }
    }

    fn refetch_handle(&self, client: &QueryClient, id: &str) -> Refetch<E::Success> {
        let query = self.clone();
        let client = client.clone();
        let id = id.to_owned();
        Refetch {
            run: Arc::new(move || {
                let query = query.clone();
                let client = client.clone();
                let id = id.clone();
                async move {
                    client.invalidate_queries(&query.query_key(&id));
                    query.fetch(&client, &id).await
                }
                .boxed()
            }),
        }
    }
}

impl<E> Clone for EntityQuery<E> {
    fn clone(&self) -> Self {
        Self {
            base_key: self.base_key.clone(),
            request: Arc::clone(&self.request),
            config: self.config.clone(),
        }
    }
}

impl<E> fmt::Debug for EntityQuery<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityQuery")
            .field("base_key", &self.base_key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::envelope::{FailureStatus, ResponseEnvelope};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        name: String,
    }

    type ItemEnvelope = ResponseEnvelope<Item, String>;

    fn item_query(calls: &Arc<AtomicUsize>, config: EntityQueryConfig) -> EntityQuery<ItemEnvelope> {
        let calls = Arc::clone(calls);
        EntityQuery::new(
            "/items",
            move |id: String| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match id.as_str() {
                        "missing" => Ok(ResponseEnvelope::failure(FailureStatus::NotFound, "no such item".into())),
                        "broken" => Err(RequestError::Transport("connection reset".into())),
                        _ => Ok(ResponseEnvelope::ok(Item {
                            name: format!("Item {id}"),
                            id,
                        })),
                    }
                }
            },
            config,
        )
    }

    fn numeric_only() -> EntityQueryConfig {
        EntityQueryConfig::default()
            .with_stale_time(Duration::from_secs(60))
            .with_id_validator(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
    }

    #[tokio::test]
    async fn test_fetch_extracts_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueryClient::new();
        let result = item_query(&calls, numeric_only()).fetch(&client, "42").await;

        assert_eq!(result.data.map(|item| item.name), Some("Item 42".to_string()));
        assert!(!result.is_loading);
        assert!(!result.not_found);
        assert!(result.refetch.is_some());
    }

    #[tokio::test]
    async fn test_rejected_id_issues_no_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueryClient::new();
        let query = item_query(&calls, numeric_only());

        let result = query.fetch(&client, "not-a-number").await;

        assert!(result.not_found);
        assert!(result.data.is_none());
        assert!(!result.is_error);
        assert!(result.refetch.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!client.query_state::<ItemEnvelope>(&query.query_key("not-a-number")).is_fetching);
    }

    #[tokio::test]
    async fn test_error_envelope_yields_no_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueryClient::new();
        let result = item_query(&calls, EntityQueryConfig::default())
            .fetch(&client, "missing")
            .await;

        assert!(result.data.is_none());
        assert!(!result.is_error);
        assert!(!result.not_found);
    }

    #[tokio::test]
    async fn test_task_error_is_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueryClient::new();
        let result = item_query(&calls, EntityQueryConfig::default())
            .fetch(&client, "broken")
            .await;

        assert!(result.is_error);
        assert_eq!(
            result.error,
            Some(RequestError::Transport("connection reset".into()))
        );
    }

    #[tokio::test]
    async fn test_refetch_bypasses_fresh_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueryClient::new();
        let query = item_query(&calls, numeric_only());

        let first = query.fetch(&client, "7").await;
        query.fetch(&client, "7").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let refetched = first.refetch.unwrap().run().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refetched.data.map(|item| item.id), Some("7".to_string()));
    }

    #[tokio::test]
    async fn test_snapshot_does_not_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = QueryClient::new();
        let query = item_query(&calls, EntityQueryConfig::default());

        let result = query.snapshot(&client, "1");
        assert!(result.data.is_none());
        assert!(!result.is_loading);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_config_from_defaults() {
        let config = EntityQueryConfig::from(&QueryDefaults::default());
        assert_eq!(config.stale_time, Duration::from_secs(60));
        assert_eq!(config.extraction, Extraction::AfterFetch);
        assert!(config.accepts("anything"));
    }
}
