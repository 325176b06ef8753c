use thiserror::Error;

/// Errors surfaced at the boundary of the queue crates. Internal glue code
/// is free to use `anyhow::Result`; anything that crosses a `StateStore`,
/// `RunLedger` or `ArtifactSink` trait method comes back as one of these so
/// callers can match on it instead of parsing a string.
///
/// Ownership loss and missing rows are not modeled as variants here: every
/// `StateStore` method that can lose a race (`renew_lease`, `complete`,
/// `fail`) reports it by returning `Ok(false)`, and `get` reports a missing
/// row with `Ok(None)` - both are routine outcomes a caller is expected to
/// handle, not exceptional ones.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("dedupe key exceeds {max} bytes: {key}")]
    DedupeKeyTooLong { key: String, max: usize },

    #[error("invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: &'static str },

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
