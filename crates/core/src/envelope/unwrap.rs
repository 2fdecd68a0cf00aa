//! Narrowing operations over envelopes and sequences of envelopes.
//!
//! None of these functions look at the payload of an error-family envelope.

use super::Envelope;

/// Whether the envelope's status is in the success family.
pub fn is_success<E: Envelope>(envelope: &E) -> bool {
    envelope.is_success()
}

/// Whether the task producing an envelope failed before a response arrived.
///
/// An error-family envelope is a successfully received response and does not
/// count as an error here.
pub fn is_error<E, X>(outcome: &Result<E, X>) -> bool {
    outcome.is_err()
}

/// The success payload, or `None` when the envelope is absent or not a success.
pub fn extract<E: Envelope>(envelope: Option<&E>) -> Option<&E::Success> {
    envelope.and_then(|envelope| envelope.success())
}

/// The success payload, or `fallback`.
pub fn extract_or<E>(envelope: Option<&E>, fallback: E::Success) -> E::Success
where
    E: Envelope,
    E::Success: Clone,
{
    extract(envelope).cloned().unwrap_or(fallback)
}

/// Success payloads of every successful envelope, in input order.
pub fn extract_many<'a, E, I>(envelopes: I) -> Vec<&'a E::Success>
where
    E: Envelope + 'a,
    I: IntoIterator<Item = &'a E>,
{
    envelopes.into_iter().filter_map(|envelope| envelope.success()).collect()
}

/// Concatenate `accessor(payload)` for every successful envelope, in input order.
pub fn flat_map_many<'a, E, I, T, U, F>(envelopes: I, mut accessor: F) -> Vec<T>
where
    E: Envelope + 'a,
    I: IntoIterator<Item = &'a E>,
    U: IntoIterator<Item = T>,
    F: FnMut(&'a E::Success) -> U,
{
    let mut out = Vec::new();
    for payload in envelopes.into_iter().filter_map(|envelope| envelope.success()) {
        out.extend(accessor(payload));
    }
    out
}

/// Left-fold over the payloads of successful envelopes, in input order.
pub fn reduce_many<'a, E, I, A, F>(envelopes: I, seed: A, reducer: F) -> A
where
    E: Envelope + 'a,
    I: IntoIterator<Item = &'a E>,
    F: FnMut(A, &'a E::Success) -> A,
{
    envelopes
        .into_iter()
        .filter_map(|envelope| envelope.success())
        .fold(seed, reducer)
}

/// Sum a per-payload total across successful envelopes.
pub fn sum_total<'a, E, I, F>(envelopes: I, mut total_of: F) -> u64
where
    E: Envelope + 'a,
    I: IntoIterator<Item = &'a E>,
    F: FnMut(&'a E::Success) -> u64,
{
    reduce_many(envelopes, 0, |acc, payload| acc.saturating_add(total_of(payload)))
}
