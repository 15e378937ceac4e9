use chrono::{DateTime, Datelike, Utc};

/// The three storage tiers, oldest-to-freshest in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Raw,
    Parsed,
    Aggregated,
}

/// Deterministic key construction for all three tiers. Key shape is an API
/// contract with downstream consumers; every template lives here and
/// nowhere else.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    pub raw_prefix: String,
    pub parsed_prefix: String,
    pub aggregated_prefix: String,
}

impl KeyLayout {
    pub fn new(raw_prefix: &str, parsed_prefix: &str, aggregated_prefix: &str) -> Self {
        Self {
            raw_prefix: raw_prefix.trim_matches('/').to_string(),
            parsed_prefix: parsed_prefix.trim_matches('/').to_string(),
            aggregated_prefix: aggregated_prefix.trim_matches('/').to_string(),
        }
    }

    /// `raw/{station}/{Y}/{M}/{D}/{station}_{metric}_{YYYYMMDD_HHMMSS}.{ext}`
    ///
    /// Second-resolution timestamps make every retrieval a distinct object,
    /// so the raw tier is append-only in practice.
    pub fn raw_key(
        &self,
        station_id: &str,
        metric: &str,
        timestamp: DateTime<Utc>,
        extension: &str,
    ) -> String {
        format!(
            "{}/{}/{:04}/{:02}/{:02}/{}_{}_{}.{}",
            self.raw_prefix,
            station_id,
            timestamp.year(),
            timestamp.month(),
            timestamp.day(),
            station_id,
            metric,
            timestamp.format("%Y%m%d_%H%M%S"),
            extension,
        )
    }

    /// `parsed/{station}/{Y}/{M}/{station}_{metric}_{YYYYMM}.json[.gz]`
    ///
    /// Month-resolution keys mean successive runs within a month overwrite
    /// the same object; last write wins by design of the tier.
    pub fn parsed_key(
        &self,
        station_id: &str,
        metric: &str,
        timestamp: DateTime<Utc>,
        compressed: bool,
    ) -> String {
        let suffix = if compressed { ".json.gz" } else { ".json" };
        format!(
            "{}/{}/{:04}/{:02}/{}_{}_{}{}",
            self.parsed_prefix,
            station_id,
            timestamp.year(),
            timestamp.month(),
            station_id,
            metric,
            timestamp.format("%Y%m"),
            suffix,
        )
    }

    /// `aggregated/{station}_latest.json` — one fixed key per station.
    pub fn latest_key(&self, station_id: &str) -> String {
        format!("{}/{}_latest.json", self.aggregated_prefix, station_id)
    }

    /// Prefix covering a whole tier, for listings.
    pub fn tier_prefix(&self, tier: Tier) -> String {
        let prefix = match tier {
            Tier::Raw => &self.raw_prefix,
            Tier::Parsed => &self.parsed_prefix,
            Tier::Aggregated => &self.aggregated_prefix,
        };
        format!("{prefix}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn layout() -> KeyLayout {
        KeyLayout::new("raw", "parsed", "aggregated")
    }

    #[test]
    fn test_raw_key_shape() {
        let ts = Utc.with_ymd_and_hms(2025, 12, 5, 17, 0, 0).unwrap();
        assert_eq!(
            layout().raw_key("inniscarra", "flow", ts, "pdf"),
            "raw/inniscarra/2025/12/05/inniscarra_flow_20251205_170000.pdf"
        );
    }

    #[test]
    fn test_raw_key_zero_pads_date_parts() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 3, 4, 5, 6).unwrap();
        assert_eq!(
            layout().raw_key("weir", "level", ts, "csv"),
            "raw/weir/2026/01/03/weir_level_20260103_040506.csv"
        );
    }

    #[test]
    fn test_parsed_key_monthly_resolution() {
        let a = Utc.with_ymd_and_hms(2025, 12, 5, 17, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 12, 28, 9, 30, 0).unwrap();
        let layout = layout();
        // same month collapses onto one key regardless of day or time
        assert_eq!(
            layout.parsed_key("inniscarra", "flow", a, true),
            layout.parsed_key("inniscarra", "flow", b, true)
        );
        assert_eq!(
            layout.parsed_key("inniscarra", "flow", a, true),
            "parsed/inniscarra/2025/12/inniscarra_flow_202512.json.gz"
        );
    }

    #[test]
    fn test_parsed_key_uncompressed_suffix() {
        let ts = Utc.with_ymd_and_hms(2025, 12, 5, 17, 0, 0).unwrap();
        assert_eq!(
            layout().parsed_key("weir", "level", ts, false),
            "parsed/weir/2025/12/weir_level_202512.json"
        );
    }

    #[test]
    fn test_latest_key_fixed_per_station() {
        assert_eq!(
            layout().latest_key("inniscarra"),
            "aggregated/inniscarra_latest.json"
        );
    }

    #[test]
    fn test_custom_prefixes_trimmed() {
        let layout = KeyLayout::new("archive/raw/", "/archive/parsed", "latest");
        let ts = Utc.with_ymd_and_hms(2025, 12, 5, 17, 0, 0).unwrap();
        assert!(layout
            .raw_key("x", "flow", ts, "pdf")
            .starts_with("archive/raw/x/"));
        assert_eq!(layout.tier_prefix(Tier::Parsed), "archive/parsed/");
        assert_eq!(layout.tier_prefix(Tier::Aggregated), "latest/");
    }
}
