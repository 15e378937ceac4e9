/// Classification of retrieval failures.
///
/// Transient conditions (network faults, timeouts, 5xx, 429) are retried
/// by the backoff combinator; permanent conditions (other 4xx, malformed
/// requests) fail immediately. `RetryExhausted` is the terminal state
/// after the attempt budget is spent on transient failures.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transient fetch error: {0}")]
    Transient(String),
    #[error("permanent fetch error: {0}")]
    Permanent(String),
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// Map a reqwest error into the taxonomy. Builder errors mean the
    /// request itself was malformed and will never succeed; everything
    /// else reqwest surfaces (connect, timeout, body) is a network-level
    /// condition worth retrying.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            FetchError::Permanent(format!("invalid request: {err}"))
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}
