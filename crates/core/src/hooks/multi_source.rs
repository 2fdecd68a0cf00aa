//! Fan-out of one list request over many data sources.

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use meridian_common::QueryDefaults;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{MergeParams, SourceDescriptor};
use crate::envelope::{Envelope, flat_map_many, sum_total};
use crate::error::RequestError;
use crate::query::{QueryClient, QueryKey, QueryStatus};

type KeyFn<P> = Arc<dyn Fn(&P) -> QueryKey + Send + Sync>;
type RequestFn<P, E> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<E, RequestError>> + Send + Sync>;
type ItemsFn<S, T> = Arc<dyn Fn(&S) -> Vec<T> + Send + Sync>;
type TotalFn<S> = Arc<dyn Fn(&S) -> u64 + Send + Sync>;
type ParamsFn<P> = Arc<dyn Fn(&SourceDescriptor) -> P + Send + Sync>;

/// Per-call options of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// When `false`, no request is issued and only cached state is folded.
    pub enabled: bool,
    /// How long a settled source result is reused without refetching.
    pub stale_time: Duration,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: Duration::ZERO,
        }
    }
}

impl From<&QueryDefaults> for AggregateOptions {
    fn from(defaults: &QueryDefaults) -> Self {
        Self {
            enabled: true,
            stale_time: defaults.stale_time(),
        }
    }
}

/// Items of every successful source, in descriptor order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult<T> {
    /// Concatenated items of successful sources.
    pub items: Vec<T>,
    /// Sum of the totals reported by successful sources.
    pub total: u64,
    /// At least one enabled source is in flight without a settled result.
    pub is_loading: bool,
    /// Error of the first failing source, in descriptor order.
    pub error: Option<RequestError>,
}

impl<T> AggregatedResult<T> {
    /// The aggregate of zero sources.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            is_loading: false,
            error: None,
        }
    }
}

impl<T> Default for AggregatedResult<T> {
    fn default() -> Self {
        Self::empty()
    }
}

struct Source<'a, P> {
    descriptor: &'a SourceDescriptor,
    params: P,
    key: QueryKey,
}

/// A list query fanned out over a set of [`SourceDescriptor`]s.
///
/// Each descriptor gets its own cache entry keyed by
/// `query_key(base_params.merge(map_profile_to_params(descriptor)))`.
/// Descriptors that resolve to the same key are fetched once and contribute
/// once, at the position of their first occurrence.
pub struct MultiSourceQuery<P, E: Envelope, T> {
    query_key: KeyFn<P>,
    request: RequestFn<P, E>,
    items_of: ItemsFn<E::Success, T>,
    total_of: TotalFn<E::Success>,
    map_profile_to_params: Option<ParamsFn<P>>,
    base_params: P,
}

/// Builder returned by [`MultiSourceQuery::builder`].
pub struct MultiSourceQueryBuilder<P, E: Envelope, T> {
    query: MultiSourceQuery<P, E, T>,
}

impl<P, E, T> MultiSourceQuery<P, E, T>
where
    P: MergeParams + Default,
    E: Envelope,
{
    /// Start building a query from its key derivation, request function and
    /// payload accessors.
    pub fn builder<K, R, Fut, I, N>(
        query_key: K,
        request: R,
        items_of: I,
        total_of: N,
    ) -> MultiSourceQueryBuilder<P, E, T>
    where
        K: Fn(&P) -> QueryKey + Send + Sync + 'static,
        R: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<E, RequestError>> + Send + 'static,
        I: Fn(&E::Success) -> Vec<T> + Send + Sync + 'static,
        N: Fn(&E::Success) -> u64 + Send + Sync + 'static,
    {
        MultiSourceQueryBuilder {
            query: MultiSourceQuery {
                query_key: Arc::new(query_key),
                request: Arc::new(move |params: P| request(params).boxed()),
                items_of: Arc::new(items_of),
                total_of: Arc::new(total_of),
                map_profile_to_params: None,
                base_params: P::default(),
            },
        }
    }
}

impl<P, E: Envelope, T> MultiSourceQueryBuilder<P, E, T> {
    /// Per-source parameters, merged over the base parameters.
    pub fn map_profile_to_params<M>(mut self, map: M) -> Self
    where
        M: Fn(&SourceDescriptor) -> P + Send + Sync + 'static,
    {
        self.query.map_profile_to_params = Some(Arc::new(map));
        self
    }

    /// Parameters shared by every source request.
    pub fn base_params(mut self, params: P) -> Self {
        self.query.base_params = params;
        self
    }

    /// Finish the query.
    pub fn build(self) -> MultiSourceQuery<P, E, T> {
        self.query
    }
}

impl<P, E, T> MultiSourceQuery<P, E, T>
where
    P: MergeParams,
    E: Envelope,
{
    /// Request parameters used for `descriptor`.
    pub fn params_for(&self, descriptor: &SourceDescriptor) -> P {
        match &self.map_profile_to_params {
            Some(map) => self.base_params.merge(&map(descriptor)),
            None => self.base_params.clone(),
        }
    }

    /// Cache keys of the sources `descriptors` resolve to, in order.
    pub fn query_keys(&self, descriptors: &[SourceDescriptor]) -> Vec<QueryKey> {
        self.sources(descriptors)
            .into_iter()
            .map(|source| source.key)
            .collect()
    }

    fn sources<'a>(&self, descriptors: &'a [SourceDescriptor]) -> Vec<Source<'a, P>> {
        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let params = self.params_for(descriptor);
            let key = (self.query_key)(&params);
            if !seen.insert(key.clone()) {
                debug!(source = %descriptor, %key, "Source shares a key with an earlier one; skipping.");
                continue;
            }
            sources.push(Source {
                descriptor,
                params,
                key,
            });
        }
        sources
    }
}

impl<P, E, T> MultiSourceQuery<P, E, T>
where
    P: MergeParams + Send + 'static,
    E: Envelope + Send + Sync + 'static,
{
    /// Fetch every source concurrently, then fold the cache state.
    ///
    /// Sources still fresh under `options.stale_time` are served from cache.
    /// With an empty `descriptors` slice nothing is scheduled and the empty
    /// aggregate is returned.
    pub async fn fetch(
        &self,
        client: &QueryClient,
        descriptors: &[SourceDescriptor],
        options: &AggregateOptions,
    ) -> AggregatedResult<T> {
        let sources = self.sources(descriptors);
        if sources.is_empty() {
            debug!("No sources to aggregate.");
            return AggregatedResult::empty();
        }

        let failures = if options.enabled {
            let runs = sources.iter().map(|source| {
                let request = Arc::clone(&self.request);
                let params = source.params.clone();
                async move {
                    let outcome = client
                        .fetch_query(&source.key, options.stale_time, move || request(params))
                        .await;
                    let err = outcome.err()?;
                    warn!(
                        source = %source.descriptor,
                        key = %source.key,
                        error = %err,
                        "Source request failed."
                    );
                    Some(err)
                }
            });
            join_all(runs).await
        } else {
            Vec::new()
        };

        self.fold(client, &sources, options, &failures)
    }

    /// Fold the current cache state of every source without scheduling
    /// anything.
    pub fn snapshot(
        &self,
        client: &QueryClient,
        descriptors: &[SourceDescriptor],
        options: &AggregateOptions,
    ) -> AggregatedResult<T> {
        let sources = self.sources(descriptors);
        if sources.is_empty() {
            return AggregatedResult::empty();
        }
        self.fold(client, &sources, options, &[])
    }

    /// `failures` holds the outcome of this call's run per source. It covers
    /// runs that never reached the cache, such as cancelled ones.
    fn fold(
        &self,
        client: &QueryClient,
        sources: &[Source<'_, P>],
        options: &AggregateOptions,
        failures: &[Option<RequestError>],
    ) -> AggregatedResult<T> {
        let mut settled = Vec::with_capacity(sources.len());
        let mut is_loading = false;
        let mut error = None;

        for (idx, source) in sources.iter().enumerate() {
            let state = client.query_state::<E>(&source.key);
            if options.enabled && state.is_loading() {
                is_loading = true;
            }
            if error.is_none() {
                error = state
                    .error
                    .or_else(|| failures.get(idx).cloned().flatten());
            }
            if state.status == QueryStatus::Success {
                settled.extend(state.data);
            }
        }

        let envelopes = || settled.iter().map(Arc::as_ref);
        let items = flat_map_many(envelopes(), |payload| (self.items_of)(payload));
        let total = sum_total(envelopes(), |payload| (self.total_of)(payload));

        debug!(
            sources = sources.len(),
            settled = settled.len(),
            items = items.len(),
            total,
            is_loading,
            failed = error.is_some(),
            "Aggregated sources."
        );

        AggregatedResult {
            items,
            total,
            is_loading,
            error,
        }
    }
}

impl<P: Clone, E: Envelope, T> Clone for MultiSourceQuery<P, E, T> {
    fn clone(&self) -> Self {
        Self {
            query_key: Arc::clone(&self.query_key),
            request: Arc::clone(&self.request),
            items_of: Arc::clone(&self.items_of),
            total_of: Arc::clone(&self.total_of),
            map_profile_to_params: self.map_profile_to_params.clone(),
            base_params: self.base_params.clone(),
        }
    }
}

impl<P: fmt::Debug, E: Envelope, T> fmt::Debug for MultiSourceQuery<P, E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiSourceQuery")
            .field("base_params", &self.base_params)
            .field("maps_params", &self.map_profile_to_params.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: fmt::Debug, E: Envelope, T> fmt::Debug for MultiSourceQueryBuilder<P, E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiSourceQueryBuilder")
            .field("query", &self.query)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::envelope::{FailureStatus, ResponseEnvelope};
    use serde_json::{Value, json};

    #[derive(Debug, Clone, PartialEq)]
    struct Page {
        items: Vec<String>,
        total: u64,
    }

    type PageEnvelope = ResponseEnvelope<Page, String>;

    fn respond(params: &Value) -> Result<PageEnvelope, RequestError> {
        match params["profile_id"].as_str() {
            Some("down") => Err(RequestError::Transport("connection refused".into())),
            Some("denied") => Ok(ResponseEnvelope::failure(
                FailureStatus::Forbidden,
                "forbidden".into(),
            )),
            Some(profile) => Ok(ResponseEnvelope::ok(Page {
                items: vec![format!("{profile}-a"), format!("{profile}-b")],
                total: 10,
            })),
            None => Ok(ResponseEnvelope::ok(Page {
                items: vec!["shared".into()],
                total: 1,
            })),
        }
    }

    fn items_query() -> MultiSourceQuery<Value, PageEnvelope, String> {
        MultiSourceQuery::<Value, PageEnvelope, String>::builder(
            |params: &Value| QueryKey::new("/items").with_params(params),
            |params: Value| async move { respond(&params) },
            |page: &Page| page.items.clone(),
            |page: &Page| page.total,
        )
        .base_params(json!({ "limit": 2 }))
        .map_profile_to_params(|descriptor: &SourceDescriptor| json!({ "profile_id": descriptor.as_str() }))
        .build()
    }

    fn descriptors(ids: &[&str]) -> Vec<SourceDescriptor> {
        ids.iter().copied().map(SourceDescriptor::from).collect()
    }

    #[test]
    fn test_params_merge_base_and_source() {
        let query = items_query();
        assert_eq!(
            query.params_for(&"p1".into()),
            json!({ "limit": 2, "profile_id": "p1" })
        );
    }

    #[test]
    fn test_query_keys_follow_descriptor_order() {
        let query = items_query();
        let keys = query.query_keys(&descriptors(&["p2", "p1"]));
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].segments()[1], r#"{"limit":2,"profile_id":"p2"}"#);
        assert_eq!(keys[1].segments()[1], r#"{"limit":2,"profile_id":"p1"}"#);
    }

    #[tokio::test]
    async fn test_fetch_concatenates_successful_sources() {
        let client = QueryClient::new();
        let result = items_query()
            .fetch(&client, &descriptors(&["p1", "p2"]), &AggregateOptions::default())
            .await;

        assert_eq!(result.items, vec!["p1-a", "p1-b", "p2-a", "p2-b"]);
        assert_eq!(result.total, 20);
        assert!(!result.is_loading);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_failure_envelope_contributes_nothing() {
        let client = QueryClient::new();
        let result = items_query()
            .fetch(&client, &descriptors(&["denied", "p1"]), &AggregateOptions::default())
            .await;

        assert_eq!(result.items, vec!["p1-a", "p1-b"]);
        assert_eq!(result.total, 10);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_first_error_wins() {
        let client = QueryClient::new();
        let result = items_query()
            .fetch(&client, &descriptors(&["p1", "down", "p2"]), &AggregateOptions::default())
            .await;

        assert_eq!(result.items, vec!["p1-a", "p1-b", "p2-a", "p2-b"]);
        assert_eq!(result.total, 20);
        assert_eq!(
            result.error,
            Some(RequestError::Transport("connection refused".into()))
        );
    }

    #[tokio::test]
    async fn test_disabled_reads_cache_only() {
        let client = QueryClient::new();
        let options = AggregateOptions {
            enabled: false,
            ..AggregateOptions::default()
        };
        let result = items_query()
            .fetch(&client, &descriptors(&["p1"]), &options)
            .await;

        assert_eq!(result, AggregatedResult::empty());
    }

    #[tokio::test]
    async fn test_without_mapping_sources_collapse() {
        let client = QueryClient::new();
        let query = MultiSourceQuery::<Value, PageEnvelope, String>::builder(
            |params: &Value| QueryKey::new("/items").with_params(params),
            |params: Value| async move { respond(&params) },
            |page: &Page| page.items.clone(),
            |page: &Page| page.total,
        )
        .build();

        let ids = descriptors(&["p1", "p2"]);
        assert_eq!(query.query_keys(&ids).len(), 1);
        let result = query.fetch(&client, &ids, &AggregateOptions::default()).await;
        assert_eq!(result.items, vec!["shared"]);
        assert_eq!(result.total, 1);
    }

    #[test]
    fn test_options_from_config() {
        let options = AggregateOptions::from(&QueryDefaults::default());
        assert!(options.enabled);
        assert_eq!(options.stale_time, Duration::from_secs(30));
    }
}
