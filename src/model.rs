use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped numeric observation of a single physical quantity.
///
/// Readings are immutable once parsed; a newer document covering the same
/// time window supersedes them, it never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quality: Option<String>,
    /// A second metric observed at (or near) the same instant, e.g. water
    /// temperature paired with a level sample.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub paired: Option<PairedValue>,
}

/// Secondary metric riding on a [`Reading`] when two sensor feeds align
/// within the merge tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedValue {
    pub value: f64,
    pub unit: String,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: f64, unit: &str) -> Self {
        Self {
            timestamp,
            value,
            unit: unit.to_string(),
            quality: None,
            paired: None,
        }
    }
}

/// Parser output for a single retrieval.
///
/// Invariants: `readings` is ordered oldest to newest and non-empty;
/// `current_reading` is the newest element. An empty list is a parse
/// failure, never an empty-but-valid series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSeries {
    pub station_id: String,
    pub readings: Vec<Reading>,
    pub current_reading: Reading,
    pub reading_count: usize,
    /// SHA-256 of the raw source document(s), linking back to the raw tier.
    pub content_hash: String,
    pub parsed_at: DateTime<Utc>,
}

impl ParsedSeries {
    /// Build a series from an ordered, non-empty reading list. Returns
    /// `None` when the list is empty so parsers can surface that as a
    /// parse failure.
    pub fn from_readings(
        station_id: String,
        readings: Vec<Reading>,
        content_hash: String,
    ) -> Option<Self> {
        let current_reading = readings.last()?.clone();
        let reading_count = readings.len();
        Some(Self {
            station_id,
            readings,
            current_reading,
            reading_count,
            content_hash,
            parsed_at: Utc::now(),
        })
    }
}

/// Lightweight descriptive statistics over one retrieval's readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub reading_count: usize,
}

impl SeriesStatistics {
    /// Statistics over the series' primary metric: the readings sharing the
    /// current reading's unit. Merged series may carry standalone readings
    /// in a second unit; mixing units into min/max/mean would be
    /// meaningless, so those are excluded. `reading_count` still counts
    /// every entry in the series.
    pub fn for_series(series: &ParsedSeries) -> Self {
        let unit = &series.current_reading.unit;
        let values: Vec<f64> = series
            .readings
            .iter()
            .filter(|r| &r.unit == unit)
            .map(|r| r.value)
            .collect();

        // The current reading always shares its own unit, so `values` is
        // non-empty whenever the series invariant holds.
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for v in &values {
            min = min.min(*v);
            max = max.max(*v);
            sum += *v;
        }
        let mean = if values.is_empty() {
            series.current_reading.value
        } else {
            sum / values.len() as f64
        };
        if values.is_empty() {
            min = series.current_reading.value;
            max = series.current_reading.value;
        }

        Self {
            min,
            max,
            mean,
            reading_count: series.readings.len(),
        }
    }
}

/// Per-station latest-only projection consumed by the dashboard read API.
///
/// The only mutable persisted entity: every successful run replaces it
/// wholesale, never field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedLatest {
    /// Station display name.
    pub station: String,
    pub river: String,
    pub latest_reading: Reading,
    pub statistics: SeriesStatistics,
    pub updated_at: DateTime<Utc>,
    pub source_hash: String,
}

impl AggregatedLatest {
    pub fn from_series(station: &crate::registry::Station, series: &ParsedSeries) -> Self {
        Self {
            station: station.name.clone(),
            river: station.river.clone(),
            latest_reading: series.current_reading.clone(),
            statistics: SeriesStatistics::for_series(series),
            updated_at: Utc::now(),
            source_hash: series.content_hash.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 5, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_from_readings_rejects_empty() {
        let series = ParsedSeries::from_readings("x".into(), vec![], "hash".into());
        assert!(series.is_none());
    }

    #[test]
    fn test_from_readings_distinguishes_current() {
        let readings = vec![
            Reading::new(ts(1), 100.0, "m3/s"),
            Reading::new(ts(2), 110.0, "m3/s"),
            Reading::new(ts(3), 95.0, "m3/s"),
        ];
        let series =
            ParsedSeries::from_readings("inniscarra".into(), readings, "abc".into()).unwrap();
        assert_eq!(series.reading_count, 3);
        assert_eq!(series.current_reading.value, 95.0);
        assert_eq!(series.current_reading.timestamp, ts(3));
    }

    #[test]
    fn test_statistics_over_primary_unit_only() {
        let mut level = Reading::new(ts(2), 1.5, "m");
        level.paired = Some(PairedValue {
            value: 9.8,
            unit: "°C".into(),
        });
        let readings = vec![
            Reading::new(ts(0), 12.0, "°C"),
            Reading::new(ts(1), 1.3, "m"),
            level,
        ];
        let series = ParsedSeries::from_readings("weir".into(), readings, "h".into()).unwrap();
        let stats = SeriesStatistics::for_series(&series);

        // min/max/mean only consider the level values; the standalone
        // temperature stays out of the aggregate but is still counted
        assert_eq!(stats.min, 1.3);
        assert_eq!(stats.max, 1.5);
        assert!((stats.mean - 1.4).abs() < 1e-9);
        assert_eq!(stats.reading_count, 3);
    }

    #[test]
    fn test_reading_serializes_without_empty_optionals() {
        let reading = Reading::new(ts(4), 127.0, "m3/s");
        let json = serde_json::to_value(&reading).unwrap();
        assert!(json.get("quality").is_none());
        assert!(json.get("paired").is_none());
        assert_eq!(json["value"], 127.0);
        assert_eq!(json["timestamp"], "2025-12-05T04:00:00Z");
    }
}
