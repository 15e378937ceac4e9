use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage a station failed in. Reports name the stage so an
/// operator can tell a flaky publisher from a storage outage at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Retrieve,
    Parse,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Retrieve => write!(f, "retrieve"),
            Stage::Parse => write!(f, "parse"),
            Stage::Store => write!(f, "store"),
        }
    }
}

/// Terminal outcome of one station's collection. A failure is data, not an
/// error: it is reported and the run moves on.
#[derive(Debug, Clone)]
pub enum StationOutcome {
    Success {
        station_id: String,
        size_bytes: usize,
        content_hash: String,
        attempts: u32,
        reading_count: usize,
    },
    Failure {
        station_id: String,
        stage: Stage,
        reason: String,
    },
}

impl StationOutcome {
    pub fn station_id(&self) -> &str {
        match self {
            StationOutcome::Success { station_id, .. } => station_id,
            StationOutcome::Failure { station_id, .. } => station_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StationOutcome::Success { .. })
    }
}

/// One station's entry in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationReport {
    pub station_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reading_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl From<&StationOutcome> for StationReport {
    fn from(outcome: &StationOutcome) -> Self {
        match outcome {
            StationOutcome::Success {
                station_id,
                size_bytes,
                content_hash,
                attempts,
                reading_count,
            } => StationReport {
                station_id: station_id.clone(),
                success: true,
                size_bytes: Some(*size_bytes),
                content_hash: Some(content_hash.clone()),
                attempts: Some(*attempts),
                reading_count: Some(*reading_count),
                error: None,
            },
            StationOutcome::Failure {
                station_id,
                stage,
                reason,
            } => StationReport {
                station_id: station_id.clone(),
                success: false,
                size_bytes: None,
                content_hash: None,
                attempts: None,
                reading_count: None,
                error: Some(format!("{stage}: {reason}")),
            },
        }
    }
}

/// Summary of one collection run across all enabled stations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// True when at least one station succeeded: the run kept the dashboard
    /// fed even if degraded. Per-station entries carry the failures.
    pub success: bool,
    pub total_sources: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<StationReport>,
    pub timestamp: DateTime<Utc>,
}

impl RunReport {
    pub fn from_outcomes(outcomes: &[StationOutcome]) -> Self {
        let successful = outcomes.iter().filter(|o| o.is_success()).count();
        let failed = outcomes.len() - successful;
        Self {
            success: successful > 0,
            total_sources: outcomes.len(),
            successful,
            failed,
            results: outcomes.iter().map(StationReport::from).collect(),
            timestamp: Utc::now(),
        }
    }
}
