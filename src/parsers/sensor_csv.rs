use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::model::{PairedValue, ParsedSeries, Reading};
use crate::parsers::ParseError;
use crate::registry::Station;

/// Sensor code for the water level feed.
pub const LEVEL_SENSOR_CODE: &str = "0001";
/// Sensor code for the water temperature feed.
pub const TEMPERATURE_SENSOR_CODE: &str = "0002";

pub const LEVEL_UNIT: &str = "m";
pub const TEMPERATURE_UNIT: &str = "°C";

/// Two sensor samples taken within this window of each other count as one
/// observation. Feeds are nominally on the same 15-minute cadence but drift
/// a little either side.
pub const ALIGNMENT_TOLERANCE_SECS: i64 = 300;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parser for the per-sensor CSV feeds: one feed per physical quantity,
/// merged into a single level-primary series.
pub struct SensorCsvParser;

impl SensorCsvParser {
    /// Parse both sensor feeds and merge them. The level feed is the
    /// primary series; temperature samples within the alignment tolerance
    /// ride on their level reading, the rest stand alone.
    #[instrument(skip_all, fields(station_id = %station.station_id))]
    pub fn parse(
        level_csv: &[u8],
        temperature_csv: &[u8],
        station: &Station,
        content_hash: &str,
    ) -> Result<ParsedSeries, ParseError> {
        let levels = Self::parse_feed(level_csv, LEVEL_UNIT)?;
        if levels.is_empty() {
            return Err(ParseError::EmptySeries);
        }
        // A missing temperature feed degrades gracefully; a missing level
        // feed does not, since level is the series backbone.
        let temperatures = match Self::parse_feed(temperature_csv, TEMPERATURE_UNIT) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "temperature feed unusable, continuing with level only");
                Vec::new()
            }
        };
        debug!(
            levels = levels.len(),
            temperatures = temperatures.len(),
            "parsed sensor feeds"
        );

        let readings = Self::merge(levels, temperatures);
        ParsedSeries::from_readings(
            station.station_id.clone(),
            readings,
            content_hash.to_string(),
        )
        .ok_or(ParseError::EmptySeries)
    }

    /// Parse one feed into (timestamp, value) pairs ordered oldest first.
    /// Empty value cells are sensor gaps and are skipped; an unparseable
    /// timestamp or value is corruption and fails the feed.
    pub fn parse_feed(raw: &[u8], unit: &str) -> Result<Vec<(DateTime<Utc>, f64)>, ParseError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| ParseError::CsvDecode(format!("feed is not UTF-8: {e}")))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows: Vec<(DateTime<Utc>, f64)> = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ParseError::CsvDecode(e.to_string()))?;
            let stamp = record.get(0).unwrap_or("").trim();
            let cell = record.get(1).unwrap_or("").trim();

            if stamp.is_empty() && cell.is_empty() {
                continue;
            }
            let timestamp = match parse_flexible_timestamp(stamp) {
                Some(ts) => ts,
                // a header row is only legitimate in first position
                None if idx == 0 => continue,
                None => {
                    return Err(ParseError::MalformedRow(format!(
                        "unrecognized timestamp '{stamp}' at row {idx}"
                    )))
                }
            };
            if cell.is_empty() {
                continue;
            }
            let value: f64 = cell.parse().map_err(|_| {
                ParseError::MalformedRow(format!("non-numeric {unit} value '{cell}' at row {idx}"))
            })?;
            rows.push((timestamp, value));
        }

        Self::normalize_order(rows)
    }

    fn normalize_order(
        mut rows: Vec<(DateTime<Utc>, f64)>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, ParseError> {
        if rows.len() < 2 {
            return Ok(rows);
        }
        if rows.windows(2).all(|w| w[0].0 <= w[1].0) {
            return Ok(rows);
        }
        if rows.windows(2).all(|w| w[0].0 >= w[1].0) {
            rows.reverse();
            return Ok(rows);
        }
        Err(ParseError::OutOfOrder(
            "feed rows are not in time order".to_string(),
        ))
    }

    /// Merge level and temperature rows. Both inputs are oldest-first; a
    /// forward cursor pairs each temperature with the nearest level sample
    /// within tolerance, each level claiming at most one temperature.
    fn merge(
        levels: Vec<(DateTime<Utc>, f64)>,
        temperatures: Vec<(DateTime<Utc>, f64)>,
    ) -> Vec<Reading> {
        let mut readings: Vec<Reading> = levels
            .into_iter()
            .map(|(ts, v)| Reading::new(ts, v, LEVEL_UNIT))
            .collect();

        let mut cursor = 0usize;
        let mut standalone: Vec<Reading> = Vec::new();

        for (ts, value) in temperatures {
            // advance past level readings that can no longer be the nearest
            while cursor + 1 < readings.len() {
                let here = (readings[cursor].timestamp - ts).num_seconds().abs();
                let next = (readings[cursor + 1].timestamp - ts).num_seconds().abs();
                if next <= here {
                    cursor += 1;
                } else {
                    break;
                }
            }

            let candidate = &mut readings[cursor];
            let gap = (candidate.timestamp - ts).num_seconds().abs();
            if gap <= ALIGNMENT_TOLERANCE_SECS && candidate.paired.is_none() {
                candidate.paired = Some(PairedValue {
                    value,
                    unit: TEMPERATURE_UNIT.to_string(),
                });
            } else {
                standalone.push(Reading::new(ts, value, TEMPERATURE_UNIT));
            }
        }

        readings.extend(standalone);
        readings.sort_by_key(|r| r.timestamp);
        readings
    }
}

fn parse_flexible_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceType;
    use chrono::TimeZone;

    fn station() -> Station {
        Station {
            station_id: "waterworks-weir".to_string(),
            name: "Waterworks Weir".to_string(),
            river: "River Lee".to_string(),
            url: "http://example.test/data/19102_{sensor}.csv".to_string(),
            source_type: SourceType::PerSensorSeries,
            enabled: true,
        }
    }

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 5, h, m, 0).unwrap()
    }

    #[test]
    fn test_parses_feed_with_header_row() {
        let csv = b"timestamp,value\n2025-12-05 08:00:00,1.21\n2025-12-05 08:15:00,1.23\n";
        let rows = SensorCsvParser::parse_feed(csv, LEVEL_UNIT).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (ts(8, 0), 1.21));
        assert_eq!(rows[1], (ts(8, 15), 1.23));
    }

    #[test]
    fn test_header_only_legitimate_in_first_row() {
        let csv = b"2025-12-05 08:00:00,1.21\ntimestamp,value\n";
        let err = SensorCsvParser::parse_feed(csv, LEVEL_UNIT).unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow(_)));
    }

    #[test]
    fn test_empty_value_cell_is_a_gap() {
        let csv = b"2025-12-05 08:00:00,1.21\n2025-12-05 08:15:00,\n2025-12-05 08:30:00,1.25\n";
        let rows = SensorCsvParser::parse_feed(csv, LEVEL_UNIT).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], (ts(8, 30), 1.25));
    }

    #[test]
    fn test_non_numeric_value_is_corruption() {
        let csv = b"2025-12-05 08:00:00,offline\n";
        let err = SensorCsvParser::parse_feed(csv, LEVEL_UNIT).unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow(_)));
    }

    #[test]
    fn test_alternate_timestamp_formats_accepted() {
        let csv = b"05/12/2025 08:00,1.21\n05/12/2025 08:15,1.22\n";
        let rows = SensorCsvParser::parse_feed(csv, LEVEL_UNIT).unwrap();
        assert_eq!(rows[0].0, ts(8, 0));
        let csv = b"2025-12-05T08:00:00Z,1.21\n";
        let rows = SensorCsvParser::parse_feed(csv, LEVEL_UNIT).unwrap();
        assert_eq!(rows[0].0, ts(8, 0));
    }

    #[test]
    fn test_newest_first_feed_normalized() {
        let csv = b"2025-12-05 08:30:00,1.25\n2025-12-05 08:15:00,1.23\n2025-12-05 08:00:00,1.21\n";
        let rows = SensorCsvParser::parse_feed(csv, LEVEL_UNIT).unwrap();
        assert_eq!(rows[0].0, ts(8, 0));
        assert_eq!(rows[2].0, ts(8, 30));
    }

    #[test]
    fn test_shuffled_feed_rejected() {
        let csv = b"2025-12-05 08:30:00,1.25\n2025-12-05 08:00:00,1.21\n2025-12-05 08:15:00,1.23\n";
        let err = SensorCsvParser::parse_feed(csv, LEVEL_UNIT).unwrap_err();
        assert!(matches!(err, ParseError::OutOfOrder(_)));
    }

    #[test]
    fn test_aligned_temperatures_ride_on_level_readings() {
        let level = b"2025-12-05 08:00:00,1.21\n2025-12-05 08:15:00,1.23\n";
        // second sample drifts 3 minutes but stays within tolerance
        let temp = b"2025-12-05 08:00:00,9.5\n2025-12-05 08:18:00,9.6\n";
        let series = SensorCsvParser::parse(level, temp, &station(), "hash").unwrap();

        assert_eq!(series.reading_count, 2);
        assert_eq!(series.readings[0].paired.as_ref().unwrap().value, 9.5);
        assert_eq!(series.readings[1].paired.as_ref().unwrap().value, 9.6);
        assert_eq!(series.current_reading.value, 1.23);
        assert_eq!(series.current_reading.unit, LEVEL_UNIT);
    }

    #[test]
    fn test_unmatched_temperature_kept_standalone() {
        let level = b"2025-12-05 08:00:00,1.21\n";
        let temp = b"2025-12-05 08:00:00,9.5\n2025-12-05 12:00:00,10.2\n";
        let series = SensorCsvParser::parse(level, temp, &station(), "hash").unwrap();

        assert_eq!(series.reading_count, 2);
        assert_eq!(series.readings[0].paired.as_ref().unwrap().value, 9.5);
        let standalone = &series.readings[1];
        assert_eq!(standalone.unit, TEMPERATURE_UNIT);
        assert_eq!(standalone.value, 10.2);
        assert!(standalone.paired.is_none());
        // newest sample wins current, whichever feed it came from
        assert_eq!(series.current_reading.unit, TEMPERATURE_UNIT);
    }

    #[test]
    fn test_sample_outside_tolerance_not_paired() {
        let level = b"2025-12-05 08:00:00,1.21\n";
        let temp = b"2025-12-05 08:06:00,9.5\n";
        let series = SensorCsvParser::parse(level, temp, &station(), "hash").unwrap();

        assert_eq!(series.reading_count, 2);
        assert!(series.readings[0].paired.is_none());
        assert_eq!(series.readings[1].unit, TEMPERATURE_UNIT);
    }

    #[test]
    fn test_empty_level_feed_fails() {
        let err =
            SensorCsvParser::parse(b"", b"2025-12-05 08:00:00,9.5\n", &station(), "h").unwrap_err();
        assert!(matches!(err, ParseError::EmptySeries));
    }

    #[test]
    fn test_broken_temperature_feed_degrades_to_level_only() {
        let level = b"2025-12-05 08:00:00,1.21\n";
        let temp = b"2025-12-05 08:00:00,not-a-number\n";
        let series = SensorCsvParser::parse(level, temp, &station(), "hash").unwrap();
        assert_eq!(series.reading_count, 1);
        assert!(series.readings[0].paired.is_none());
    }
}
