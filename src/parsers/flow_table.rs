use chrono::{DateTime, NaiveDateTime, Utc};
use pdf_extract::extract_text_from_mem;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, instrument};

use crate::model::{ParsedSeries, Reading};
use crate::parsers::ParseError;
use crate::registry::Station;

/// Unit attached when a document row carries none.
const DEFAULT_FLOW_UNIT: &str = "m3/s";

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-[A-Za-z]{3}-\d{2}$").expect("valid pattern"))
}

fn time_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}:\d{2}(:\d{2})?$").expect("valid pattern"))
}

/// One timestamp/value row extracted from the document text.
#[derive(Debug, Clone)]
struct RawRow {
    timestamp: NaiveDateTime,
    value: f64,
    unit: String,
}

/// Parser for the publisher's tabular flow PDF.
///
/// The document carries a single current-reading banner on page one and a
/// table of the last ~30 hourly readings on page two. Rows look like
/// `05-Dec-25 17:00:00  127.0  Cumecs`; small structural drift (extra
/// whitespace, value before timestamp) is tolerated, anything less
/// recognizable fails fast rather than guessing.
pub struct FlowTableParser;

impl FlowTableParser {
    #[instrument(skip(raw, station), fields(station_id = %station.station_id, size_bytes = raw.len()))]
    pub fn parse(
        raw: &[u8],
        station: &Station,
        content_hash: &str,
    ) -> Result<ParsedSeries, ParseError> {
        let text =
            extract_text_from_mem(raw).map_err(|e| ParseError::PdfExtraction(e.to_string()))?;
        Self::parse_text(&text, station, content_hash)
    }

    /// Parse already-extracted document text. Split out from [`parse`] so
    /// the row scanner can be exercised without a real PDF byte stream.
    pub fn parse_text(
        text: &str,
        station: &Station,
        content_hash: &str,
    ) -> Result<ParsedSeries, ParseError> {
        let regions = Self::scan_regions(text)?;
        debug!(regions = regions.len(), "located tabular regions");

        let mut normalized: Vec<Vec<RawRow>> = Vec::with_capacity(regions.len());
        for region in regions {
            normalized.push(Self::normalize_region(region)?);
        }

        // Publisher layout: a one-row current-reading banner precedes the
        // historical table. When the banner holds the newest sample, it
        // belongs after the table in oldest-first order.
        if normalized.len() == 2 && normalized[0].len() == 1 {
            let banner_ts = normalized[0][0].timestamp;
            let table_last = normalized[1].last().map(|r| r.timestamp);
            if table_last.is_some_and(|t| banner_ts >= t) {
                normalized.swap(0, 1);
            }
        }

        let mut rows: Vec<RawRow> = normalized.into_iter().flatten().collect();
        // the banner often repeats the table's newest row verbatim
        rows.dedup_by(|a, b| a.timestamp == b.timestamp && a.value == b.value);

        for window in rows.windows(2) {
            if window[1].timestamp < window[0].timestamp {
                return Err(ParseError::OutOfOrder(format!(
                    "{} follows {}",
                    window[1].timestamp, window[0].timestamp
                )));
            }
        }

        let readings: Vec<Reading> = rows
            .into_iter()
            .map(|row| Reading {
                timestamp: DateTime::<Utc>::from_naive_utc_and_offset(row.timestamp, Utc),
                value: row.value,
                unit: row.unit,
                quality: None,
                paired: None,
            })
            .collect();

        debug!(count = readings.len(), "extracted flow readings");

        ParsedSeries::from_readings(
            station.station_id.clone(),
            readings,
            content_hash.to_string(),
        )
        .ok_or(ParseError::EmptySeries)
    }

    /// Group consecutive data rows into tabular regions. Furniture lines
    /// (titles, column headers) close a region; blank lines do not, since
    /// text extraction pads rows unpredictably.
    fn scan_regions(text: &str) -> Result<Vec<Vec<RawRow>>, ParseError> {
        let mut regions: Vec<Vec<RawRow>> = Vec::new();
        let mut current: Vec<RawRow> = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match Self::parse_row(trimmed)? {
                Some(row) => current.push(row),
                None => {
                    if !current.is_empty() {
                        regions.push(std::mem::take(&mut current));
                    }
                }
            }
        }
        if !current.is_empty() {
            regions.push(current);
        }

        if regions.is_empty() {
            return Err(ParseError::NoTable(
                "no timestamp/value rows found in document".to_string(),
            ));
        }
        Ok(regions)
    }

    /// Extract a timestamp/value pair from one line. Returns `Ok(None)`
    /// for furniture lines; a line that contains a timestamp but no
    /// parseable value is treated as corruption, not furniture.
    fn parse_row(line: &str) -> Result<Option<RawRow>, ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let mut ts_idx = None;
        for i in 0..tokens.len().saturating_sub(1) {
            if date_pattern().is_match(tokens[i]) && time_pattern().is_match(tokens[i + 1]) {
                ts_idx = Some(i);
                break;
            }
        }
        let Some(i) = ts_idx else {
            return Ok(None);
        };

        let stamp = format!("{} {}", tokens[i], tokens[i + 1]);
        let timestamp = NaiveDateTime::parse_from_str(&stamp, "%d-%b-%y %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(&stamp, "%d-%b-%y %H:%M"))
            .map_err(|e| ParseError::MalformedRow(format!("bad timestamp in '{line}': {e}")))?;

        let mut value: Option<f64> = None;
        let mut unit_tokens: Vec<&str> = Vec::new();
        for (j, token) in tokens.iter().enumerate() {
            if j == i || j == i + 1 {
                continue;
            }
            if value.is_none() {
                if let Ok(v) = token.parse::<f64>() {
                    value = Some(v);
                    continue;
                }
            }
            unit_tokens.push(token);
        }

        let value = value.ok_or_else(|| {
            ParseError::MalformedRow(format!("no numeric value in '{line}'"))
        })?;
        let unit = if unit_tokens.is_empty() {
            DEFAULT_FLOW_UNIT.to_string()
        } else {
            unit_tokens.join(" ")
        };

        Ok(Some(RawRow {
            timestamp,
            value,
            unit,
        }))
    }

    /// A region must be uniformly ordered in time. Newest-first tables are
    /// reversed into oldest-first; shuffled rows are rejected rather than
    /// sorted, since re-ordering would hide document corruption.
    fn normalize_region(mut rows: Vec<RawRow>) -> Result<Vec<RawRow>, ParseError> {
        if rows.len() < 2 {
            return Ok(rows);
        }
        let ascending = rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp);
        if ascending {
            return Ok(rows);
        }
        let descending = rows.windows(2).all(|w| w[0].timestamp >= w[1].timestamp);
        if descending {
            rows.reverse();
            return Ok(rows);
        }
        Err(ParseError::OutOfOrder(
            "table rows are not in time order".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SeriesStatistics;
    use crate::registry::SourceType;
    use chrono::Timelike;

    fn station() -> Station {
        Station {
            station_id: "inniscarra".to_string(),
            name: "Inniscarra".to_string(),
            river: "River Lee".to_string(),
            url: "http://example.test/04-Inniscarra-Flow.pdf".to_string(),
            source_type: SourceType::DocumentTable,
            enabled: true,
        }
    }

    /// Document text shaped like the publisher's: current-reading banner,
    /// then a newest-first table of hourly rows.
    fn document_with_rows(count: usize) -> String {
        let mut text = String::from(
            "Current Total Average Hourly Inniscarra Flow\n\n05-Dec-25 23:00:00 123.0 Cumecs\n\nLast readings for Total Average Hourly Inniscarra Flow\nTimestamp Value Units\n",
        );
        for i in 0..count {
            let hour = 23 - i;
            text.push_str(&format!(
                "05-Dec-25 {hour:02}:00:00 {:.1} Cumecs\n",
                100.0 + hour as f64
            ));
        }
        text
    }

    #[test]
    fn test_parses_all_rows_in_ascending_order() {
        let text = document_with_rows(24);
        let series = FlowTableParser::parse_text(&text, &station(), "hash").unwrap();

        assert_eq!(series.reading_count, 24);
        for window in series.readings.windows(2) {
            assert!(window[0].timestamp <= window[1].timestamp);
        }
        // banner duplicates the newest table row and is deduplicated
        assert_eq!(series.current_reading.value, 123.0);
        assert_eq!(series.current_reading.timestamp.hour(), 23);
        assert_eq!(series.current_reading.unit, "Cumecs");
    }

    #[test]
    fn test_thirty_row_document_statistics() {
        let mut text = String::from("Flow report\n");
        for i in 0..24 {
            text.push_str(&format!("05-Dec-25 {i:02}:00:00 {:.1}\n", 50.0 + i as f64));
        }
        for i in 0..6 {
            text.push_str(&format!("06-Dec-25 {i:02}:00:00 {:.1}\n", 74.0 + i as f64));
        }
        let series = FlowTableParser::parse_text(&text, &station(), "hash").unwrap();
        assert_eq!(series.reading_count, 30);
        assert_eq!(series.current_reading.value, 79.0);

        let stats = SeriesStatistics::for_series(&series);
        assert_eq!(stats.reading_count, 30);
        assert_eq!(stats.min, 50.0);
        assert_eq!(stats.max, 79.0);
        assert!((stats.mean - 64.5).abs() < 1e-9);
    }

    #[test]
    fn test_value_before_timestamp_tolerated() {
        let text = "127.5 05-Dec-25 17:00:00 Cumecs\n128.0 05-Dec-25 18:00:00 Cumecs\n";
        let series = FlowTableParser::parse_text(text, &station(), "hash").unwrap();
        assert_eq!(series.reading_count, 2);
        assert_eq!(series.current_reading.value, 128.0);
    }

    #[test]
    fn test_missing_unit_defaults() {
        let text = "05-Dec-25 17:00:00 127.5\n";
        let series = FlowTableParser::parse_text(text, &station(), "hash").unwrap();
        assert_eq!(series.current_reading.unit, DEFAULT_FLOW_UNIT);
    }

    #[test]
    fn test_no_table_is_an_error() {
        let text = "Quarterly maintenance notice\nNo readings are published today.\n";
        let err = FlowTableParser::parse_text(text, &station(), "hash").unwrap_err();
        assert!(matches!(err, ParseError::NoTable(_)));
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let err = FlowTableParser::parse_text("", &station(), "hash").unwrap_err();
        assert!(matches!(err, ParseError::NoTable(_)));
    }

    #[test]
    fn test_row_with_timestamp_but_no_value_is_corruption() {
        let text = "05-Dec-25 17:00:00 127.5 Cumecs\n05-Dec-25 18:00:00 ---- Cumecs\n";
        let err = FlowTableParser::parse_text(text, &station(), "hash").unwrap_err();
        assert!(matches!(err, ParseError::MalformedRow(_)));
    }

    #[test]
    fn test_shuffled_timestamps_rejected() {
        let text = "05-Dec-25 17:00:00 127.5\n05-Dec-25 15:00:00 126.0\n05-Dec-25 16:00:00 125.0\n";
        let err = FlowTableParser::parse_text(text, &station(), "hash").unwrap_err();
        assert!(matches!(err, ParseError::OutOfOrder(_)));
    }

    #[test]
    fn test_newest_first_table_normalized() {
        let text = "05-Dec-25 19:00:00 130.0\n05-Dec-25 18:00:00 129.0\n05-Dec-25 17:00:00 128.0\n";
        let series = FlowTableParser::parse_text(text, &station(), "hash").unwrap();
        assert_eq!(series.readings[0].value, 128.0);
        assert_eq!(series.current_reading.value, 130.0);
    }

    #[test]
    fn test_invalid_pdf_bytes_fail_extraction() {
        let err = FlowTableParser::parse(b"not a pdf", &station(), "hash").unwrap_err();
        assert!(matches!(err, ParseError::PdfExtraction(_)));
    }
}
