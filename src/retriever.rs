use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::fetch_error::FetchError;
use crate::retry::{retry_with_backoff, RetryError, RetryPolicy};

/// Outcome of one successful retrieval. Ephemeral: owned by the
/// orchestrator for the duration of a run, never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub bytes: Vec<u8>,
    /// SHA-256 of the raw bytes, for deduplication and audit.
    pub content_hash: String,
    pub retrieved_at: DateTime<Utc>,
    pub attempt_count: u32,
}

/// HTTP retriever with bounded per-attempt timeout and retry-with-backoff
/// for transient failures.
#[derive(Clone)]
pub struct Retriever {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Retriever {
    pub fn new(timeout: Duration, user_agent: &str, policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(user_agent.to_string())
                .build()
                .expect("Failed to create HTTP client"),
            policy,
        }
    }

    /// Fetch a remote document, retrying transient failures per the
    /// configured policy. Returns the raw bytes with their content hash.
    #[instrument(skip(self))]
    pub async fn retrieve(&self, url: &str) -> Result<RetrievalResult, FetchError> {
        let outcome = retry_with_backoff(&self.policy, FetchError::is_transient, || {
            self.fetch_once(url)
        })
        .await;

        match outcome {
            Ok((bytes, attempts)) => {
                let content_hash = sha256_hex(&bytes);
                info!(
                    size_bytes = bytes.len(),
                    attempts,
                    hash = %&content_hash[..8],
                    "download successful"
                );
                Ok(RetrievalResult {
                    bytes,
                    content_hash,
                    retrieved_at: Utc::now(),
                    attempt_count: attempts,
                })
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "retry budget exhausted");
                Err(FetchError::RetryExhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
            Err(RetryError::Permanent(err)) => Err(err),
        }
    }

    /// One attempt: issue the GET and classify the outcome by status code.
    /// 429 and 5xx are transient (server may recover); other non-success
    /// statuses are permanent client-side conditions.
    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await.map_err(FetchError::from_reqwest)?;
            debug!(size_bytes = body.len(), "received response body");
            Ok(body.to_vec())
        } else if status.as_u16() == 429 || status.is_server_error() {
            Err(FetchError::Transient(format!("HTTP {status}")))
        } else {
            Err(FetchError::Permanent(format!("HTTP {status}")))
        }
    }
}

/// Hex-encoded SHA-256 digest of a byte buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
