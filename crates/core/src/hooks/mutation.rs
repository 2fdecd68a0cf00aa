//! Mutations and the cache entries they invalidate.

use std::future::Future;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::error::RequestError;
use crate::query::{QueryClient, QueryKey};

/// Await a mutating request and invalidate cached reads it affects.
///
/// Every entry whose key starts with one of `invalidate` is marked stale,
/// but only when the request produced a success envelope. Error envelopes
/// and failed tasks leave the cache untouched.
pub async fn run_mutation<E, Fut>(
    client: &QueryClient,
    request: Fut,
    invalidate: &[QueryKey],
) -> Result<E, RequestError>
where
    E: Envelope,
    Fut: Future<Output = Result<E, RequestError>>,
{
    let envelope = request
        .await
        .inspect_err(|err| warn!(error = %err, "Mutation request failed."))?;

    if envelope.is_success() {
        let invalidated: usize = invalidate
            .iter()
            .map(|prefix| client.invalidate_queries(prefix))
            .sum();
        debug!(status = envelope.status(), invalidated, "Mutation succeeded.");
    } else {
        debug!(
            status = envelope.status(),
            "Mutation returned an error response; cache left untouched."
        );
    }

    Ok(envelope)
}
