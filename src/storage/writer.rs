use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, instrument};

use crate::model::{AggregatedLatest, ParsedSeries};
use crate::registry::Station;
use crate::storage::keys::{KeyLayout, Tier};
use crate::storage::{ObjectStore, PutOptions, StorageError};

/// Latest aggregates are polled by dashboards; cap how long an edge cache
/// may serve a stale copy.
const LATEST_CACHE_CONTROL: &str = "max-age=1800";

/// Writes pipeline artifacts to their tier. Owns the key layout so callers
/// never assemble keys by hand.
pub struct StorageWriter {
    store: Arc<dyn ObjectStore>,
    layout: KeyLayout,
}

impl StorageWriter {
    pub fn new(store: Arc<dyn ObjectStore>, layout: KeyLayout) -> Self {
        Self { store, layout }
    }

    /// Archive one source document exactly as retrieved. Returns the key.
    #[instrument(skip(self, bytes, station), fields(station_id = %station.station_id))]
    pub async fn write_raw(
        &self,
        station: &Station,
        metric: &str,
        timestamp: DateTime<Utc>,
        bytes: Vec<u8>,
        content_hash: &str,
    ) -> Result<String, StorageError> {
        let extension = station.source_type.raw_extension();
        let key = self
            .layout
            .raw_key(&station.station_id, metric, timestamp, extension);

        let content_type = match extension {
            "pdf" => "application/pdf",
            "csv" => "text/csv",
            _ => "application/octet-stream",
        };
        let mut options = PutOptions {
            content_type: Some(content_type.to_string()),
            ..Default::default()
        };
        options
            .metadata
            .insert("station-id".to_string(), station.station_id.clone());
        options
            .metadata
            .insert("timestamp".to_string(), timestamp.to_rfc3339());
        options
            .metadata
            .insert("content-hash".to_string(), content_hash.to_string());

        self.store.put(&key, bytes, options).await?;
        Ok(key)
    }

    /// Write the canonical parsed series to its monthly object. Runs within
    /// the same month replace each other; the object always reflects the
    /// most recent retrieval.
    #[instrument(skip(self, series, station), fields(station_id = %station.station_id))]
    pub async fn write_parsed(
        &self,
        station: &Station,
        series: &ParsedSeries,
        compress: bool,
    ) -> Result<String, StorageError> {
        let metric = station.source_type.primary_metric();
        let key = self.layout.parsed_key(
            &station.station_id,
            metric,
            series.current_reading.timestamp,
            compress,
        );

        let json = serde_json::to_vec_pretty(series).map_err(|e| StorageError::Encode {
            key: key.clone(),
            message: e.to_string(),
        })?;
        let (body, content_encoding) = if compress {
            (gzip(&json, &key)?, Some("gzip".to_string()))
        } else {
            (json, None)
        };
        debug!(key, size_bytes = body.len(), "writing parsed series");

        let mut options = PutOptions {
            content_type: Some("application/json".to_string()),
            content_encoding,
            ..Default::default()
        };
        options
            .metadata
            .insert("station-id".to_string(), station.station_id.clone());
        options
            .metadata
            .insert("content-hash".to_string(), series.content_hash.clone());
        options.metadata.insert(
            "reading-count".to_string(),
            series.reading_count.to_string(),
        );

        self.store.put(&key, body, options).await?;
        Ok(key)
    }

    /// Replace the station's latest-aggregate object wholesale.
    #[instrument(skip(self, latest, station), fields(station_id = %station.station_id))]
    pub async fn write_latest(
        &self,
        station: &Station,
        latest: &AggregatedLatest,
    ) -> Result<String, StorageError> {
        let key = self.layout.latest_key(&station.station_id);
        let json = serde_json::to_vec_pretty(latest).map_err(|e| StorageError::Encode {
            key: key.clone(),
            message: e.to_string(),
        })?;

        let options = PutOptions {
            content_type: Some("application/json".to_string()),
            cache_control: Some(LATEST_CACHE_CONTROL.to_string()),
            ..Default::default()
        };
        self.store.put(&key, json, options).await?;
        Ok(key)
    }

    pub async fn read_latest(
        &self,
        station_id: &str,
    ) -> Result<Option<AggregatedLatest>, StorageError> {
        let key = self.layout.latest_key(station_id);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let latest = serde_json::from_slice(&bytes).map_err(|e| StorageError::Read {
            key,
            message: format!("stored aggregate is not valid JSON: {e}"),
        })?;
        Ok(Some(latest))
    }

    pub async fn list_keys(&self, tier: Tier) -> Result<Vec<String>, StorageError> {
        self.store.list(&self.layout.tier_prefix(tier)).await
    }
}

fn gzip(bytes: &[u8], key: &str) -> Result<Vec<u8>, StorageError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(|e| StorageError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    encoder.finish().map_err(|e| StorageError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })
}
