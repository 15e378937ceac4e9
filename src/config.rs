use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration failures are the only errors fatal to a whole run:
/// without a valid registry and settings no station can be processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("failed to read sources file {path}: {source}")]
    SourcesFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid source configuration: {0}")]
    InvalidSources(#[from] serde_json::Error),
    #[error("station '{station_id}': {reason}")]
    InvalidStation { station_id: String, reason: String },
}

/// Runtime settings for one collection run, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub http_timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
    /// Target bucket; when absent the run writes to an in-memory store
    /// (local development without object storage).
    pub bucket: Option<String>,
    pub region: String,
    /// Custom endpoint for S3-compatible local stores.
    pub endpoint_url: Option<String>,
    pub raw_prefix: String,
    pub parsed_prefix: String,
    pub aggregated_prefix: String,
    pub compress_parsed: bool,
    pub collector_concurrency: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "river-data-collector/0.3".to_string()),
            retry: RetryPolicy {
                max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse::<u32>()
                    .unwrap_or(3)
                    .max(1),
                initial_backoff: Duration::from_millis(
                    env::var("RETRY_INITIAL_BACKOFF_MS")
                        .unwrap_or_else(|_| "1000".to_string())
                        .parse()
                        .unwrap_or(1000),
                ),
                max_backoff: Duration::from_millis(
                    env::var("RETRY_MAX_BACKOFF_MS")
                        .unwrap_or_else(|_| "60000".to_string())
                        .parse()
                        .unwrap_or(60000),
                ),
                jitter: env::var("RETRY_JITTER")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(true),
            },
            bucket: env::var("S3_BUCKET_NAME").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
            endpoint_url: env::var("S3_ENDPOINT_URL").ok(),
            raw_prefix: env::var("S3_RAW_PREFIX").unwrap_or_else(|_| "raw".to_string()),
            parsed_prefix: env::var("S3_PARSED_PREFIX").unwrap_or_else(|_| "parsed".to_string()),
            aggregated_prefix: env::var("S3_AGGREGATED_PREFIX")
                .unwrap_or_else(|_| "aggregated".to_string()),
            compress_parsed: env::var("COMPRESS_PARSED")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            collector_concurrency: env::var("COLLECTOR_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
        }
    }
}
