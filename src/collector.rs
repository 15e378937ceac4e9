use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info, instrument, warn};

use crate::fetch_error::FetchError;
use crate::model::{AggregatedLatest, ParsedSeries};
use crate::parsers::flow_table::FlowTableParser;
use crate::parsers::sensor_csv::{
    SensorCsvParser, LEVEL_SENSOR_CODE, TEMPERATURE_SENSOR_CODE,
};
use crate::parsers::ParseError;
use crate::registry::{SourceRegistry, SourceType, Station};
use crate::report::{RunReport, Stage, StationOutcome};
use crate::retriever::{sha256_hex, Retriever};
use crate::storage::writer::StorageWriter;
use crate::storage::StorageError;

/// Where in the pipeline a station gave up.
#[derive(Debug, thiserror::Error)]
enum StationError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StorageError),
}

impl StationError {
    fn stage(&self) -> Stage {
        match self {
            StationError::Fetch(_) => Stage::Retrieve,
            StationError::Parse(_) => Stage::Parse,
            StationError::Store(_) => Stage::Store,
        }
    }
}

/// Everything a successful station contributes to the run report.
struct StationSuccess {
    size_bytes: usize,
    content_hash: String,
    attempts: u32,
    reading_count: usize,
}

/// One raw document destined for the archive tier.
struct RawDocument {
    metric: &'static str,
    bytes: Vec<u8>,
}

/// Orchestrates one collection run: every enabled station is retrieved,
/// parsed, and written, with a bounded number in flight at once. Station
/// failures are isolated; one bad publisher never blocks the rest.
pub struct Collector {
    registry: SourceRegistry,
    retriever: Retriever,
    writer: Arc<StorageWriter>,
    compress_parsed: bool,
    concurrency: usize,
}

impl Collector {
    pub fn new(
        registry: SourceRegistry,
        retriever: Retriever,
        writer: Arc<StorageWriter>,
        compress_parsed: bool,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            retriever,
            writer,
            compress_parsed,
            concurrency,
        }
    }

    /// Run the pipeline over all enabled stations and summarize the
    /// outcomes. Never fails: every error lands in the report instead.
    pub async fn run(&self) -> RunReport {
        let stations: Vec<&Station> = self.registry.enabled().collect();
        info!(
            stations = stations.len(),
            concurrency = self.concurrency,
            "starting collection run"
        );

        let outcomes: Vec<StationOutcome> = stream::iter(stations)
            .map(|station| self.process_station(station))
            .buffer_unordered(self.concurrency.max(1))
            .collect()
            .await;

        let report = RunReport::from_outcomes(&outcomes);
        info!(
            successful = report.successful,
            failed = report.failed,
            "collection run finished"
        );
        report
    }

    #[instrument(skip(self, station), fields(station_id = %station.station_id))]
    async fn process_station(&self, station: &Station) -> StationOutcome {
        match self.collect_one(station).await {
            Ok(success) => {
                info!(
                    readings = success.reading_count,
                    attempts = success.attempts,
                    "station collected"
                );
                StationOutcome::Success {
                    station_id: station.station_id.clone(),
                    size_bytes: success.size_bytes,
                    content_hash: success.content_hash,
                    attempts: success.attempts,
                    reading_count: success.reading_count,
                }
            }
            Err(err) => {
                error!(stage = %err.stage(), error = %err, "station failed");
                StationOutcome::Failure {
                    station_id: station.station_id.clone(),
                    stage: err.stage(),
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn collect_one(&self, station: &Station) -> Result<StationSuccess, StationError> {
        let (series, raws, attempts, size_bytes) = match station.source_type {
            SourceType::DocumentTable => self.collect_document(station).await?,
            SourceType::PerSensorSeries => self.collect_sensors(station).await?,
        };

        self.store_all(station, &series, raws).await?;

        Ok(StationSuccess {
            size_bytes,
            content_hash: series.content_hash.clone(),
            attempts,
            reading_count: series.reading_count,
        })
    }

    async fn collect_document(
        &self,
        station: &Station,
    ) -> Result<(ParsedSeries, Vec<RawDocument>, u32, usize), StationError> {
        let retrieval = self.retriever.retrieve(&station.url).await?;
        let series = FlowTableParser::parse(&retrieval.bytes, station, &retrieval.content_hash)?;
        let size = retrieval.bytes.len();
        let raws = vec![RawDocument {
            metric: "flow",
            bytes: retrieval.bytes,
        }];
        Ok((series, raws, retrieval.attempt_count, size))
    }

    async fn collect_sensors(
        &self,
        station: &Station,
    ) -> Result<(ParsedSeries, Vec<RawDocument>, u32, usize), StationError> {
        let level = self
            .retriever
            .retrieve(&station.sensor_url(LEVEL_SENSOR_CODE))
            .await?;
        let temperature = self
            .retriever
            .retrieve(&station.sensor_url(TEMPERATURE_SENSOR_CODE))
            .await?;

        // one hash covering both feeds, level first
        let mut combined = level.bytes.clone();
        combined.extend_from_slice(&temperature.bytes);
        let content_hash = sha256_hex(&combined);

        let series =
            SensorCsvParser::parse(&level.bytes, &temperature.bytes, station, &content_hash)?;

        let attempts = level.attempt_count.max(temperature.attempt_count);
        let size = level.bytes.len() + temperature.bytes.len();
        let raws = vec![
            RawDocument {
                metric: "level",
                bytes: level.bytes,
            },
            RawDocument {
                metric: "temperature",
                bytes: temperature.bytes,
            },
        ];
        Ok((series, raws, attempts, size))
    }

    /// Write all three tiers. Each tier is attempted even after an earlier
    /// one fails, so a transient raw-tier outage does not also lose the
    /// parsed series; the first failure still fails the station.
    async fn store_all(
        &self,
        station: &Station,
        series: &ParsedSeries,
        raws: Vec<RawDocument>,
    ) -> Result<(), StationError> {
        let timestamp = series.current_reading.timestamp;
        let mut tier_error: Option<StorageError> = None;

        for raw in raws {
            if let Err(e) = self
                .writer
                .write_raw(station, raw.metric, timestamp, raw.bytes, &series.content_hash)
                .await
            {
                warn!(error = %e, "raw tier write failed");
                tier_error.get_or_insert(e);
            }
        }

        if let Err(e) = self
            .writer
            .write_parsed(station, series, self.compress_parsed)
            .await
        {
            warn!(error = %e, "parsed tier write failed");
            tier_error.get_or_insert(e);
        }

        let latest = AggregatedLatest::from_series(station, series);
        if let Err(e) = self.writer.write_latest(station, &latest).await {
            warn!(error = %e, "aggregated tier write failed");
            tier_error.get_or_insert(e);
        }

        match tier_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
