use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use tracing::debug;

use crate::config::ConfigError;

/// Placeholder token in a station URL, substituted with a sensor code for
/// per-sensor feeds.
pub const SENSOR_PLACEHOLDER: &str = "{sensor}";

/// Kind of source document a station publishes. A closed set so parser
/// dispatch stays exhaustively checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Semi-structured document (PDF) containing a tabular flow series.
    DocumentTable,
    /// Per-sensor CSV feeds addressed via a `{sensor}` URL placeholder.
    PerSensorSeries,
}

impl SourceType {
    /// Metric name used in storage keys for the station's primary series.
    pub fn primary_metric(&self) -> &'static str {
        match self {
            SourceType::DocumentTable => "flow",
            SourceType::PerSensorSeries => "level",
        }
    }

    /// File extension of the raw source document.
    pub fn raw_extension(&self) -> &'static str {
        match self {
            SourceType::DocumentTable => "pdf",
            SourceType::PerSensorSeries => "csv",
        }
    }
}

/// One monitored station. Defined in static configuration at startup,
/// immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub station_id: String,
    /// Display name, e.g. "Inniscarra".
    pub name: String,
    pub river: String,
    pub url: String,
    pub source_type: SourceType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Station {
    /// Substitute the `{sensor}` placeholder with a concrete sensor code.
    pub fn sensor_url(&self, sensor_code: &str) -> String {
        self.url.replace(SENSOR_PLACEHOLDER, sensor_code)
    }
}

/// Immutable set of station definitions, constructed once at startup and
/// threaded through the orchestrator explicitly.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    stations: Vec<Station>,
}

impl SourceRegistry {
    /// Validate and wrap a station list. Fails fast naming the offending
    /// station so a bad deploy surfaces immediately.
    pub fn new(stations: Vec<Station>) -> Result<Self, ConfigError> {
        for station in &stations {
            Self::validate(station)?;
        }
        debug!(count = stations.len(), "source registry validated");
        Ok(Self { stations })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let mut stations = Vec::with_capacity(entries.len());
        for entry in entries {
            let id_hint = entry
                .get("station_id")
                .and_then(|v| v.as_str())
                .unwrap_or("<unknown>")
                .to_string();
            let station: Station =
                serde_json::from_value(entry).map_err(|e| ConfigError::InvalidStation {
                    station_id: id_hint,
                    reason: e.to_string(),
                })?;
            stations.push(station);
        }
        Self::new(stations)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::SourcesFile {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load from the DATA_SOURCES_JSON environment variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let json =
            env::var("DATA_SOURCES_JSON").map_err(|_| ConfigError::MissingEnv("DATA_SOURCES_JSON"))?;
        Self::from_json(&json)
    }

    fn validate(station: &Station) -> Result<(), ConfigError> {
        let fail = |reason: &str| {
            Err(ConfigError::InvalidStation {
                station_id: if station.station_id.is_empty() {
                    "<unknown>".to_string()
                } else {
                    station.station_id.clone()
                },
                reason: reason.to_string(),
            })
        };

        if station.station_id.trim().is_empty() {
            return fail("station_id must not be empty");
        }
        if station.name.trim().is_empty() {
            return fail("name must not be empty");
        }
        if station.river.trim().is_empty() {
            return fail("river must not be empty");
        }
        if station.url.trim().is_empty() {
            return fail("url must not be empty");
        }
        let has_placeholder = station.url.contains(SENSOR_PLACEHOLDER);
        match station.source_type {
            SourceType::PerSensorSeries if !has_placeholder => {
                fail("per_sensor_series url must contain the {sensor} placeholder")
            }
            SourceType::DocumentTable if has_placeholder => {
                fail("document_table url must not contain a {sensor} placeholder")
            }
            _ => Ok(()),
        }
    }

    /// Stations eligible for this run.
    pub fn enabled(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter().filter(|s| s.enabled)
    }

    pub fn get(&self, station_id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.station_id == station_id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
