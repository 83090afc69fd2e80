//! L1: the canonical weather-sample record shared by every data source and
//! every downstream consumer. See spec §3: fields are a fixed union set
//! across device variants, and a zero value is the convention for "not
//! provided by this source" rather than a sentinel `Option`.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrecipitationType {
    None,
    Rain,
    Hail,
}

impl Default for PrecipitationType {
    fn default() -> Self {
        PrecipitationType::None
    }
}

impl From<i64> for PrecipitationType {
    fn from(raw: i64) -> Self {
        match raw {
            1 => PrecipitationType::Rain,
            2 | 3 => PrecipitationType::Hail,
            _ => PrecipitationType::None,
        }
    }
}

/// One normalized weather sample. Immutable after construction; missing
/// fields for a given source are represented by the zero value of their
/// type rather than `Option`, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub timestamp: i64,

    pub temperature_c: f64,
    pub relative_humidity_pct: f64,
    pub station_pressure_mb: f64,

    pub wind_lull_ms: f64,
    pub wind_avg_ms: f64,
    pub wind_gust_ms: f64,
    pub wind_direction_deg: f64,

    pub illuminance_lux: f64,
    pub uv_index: i64,
    pub solar_radiation_wm2: f64,

    pub rain_rate_mm: f64,
    pub rain_daily_mm: f64,
    pub precipitation_type: PrecipitationType,

    pub lightning_strike_count: i64,
    pub lightning_avg_distance_km: f64,

    pub battery_volts: f64,
    pub report_interval_s: i64,
}

impl Observation {
    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp,
            temperature_c: 0.0,
            relative_humidity_pct: 0.0,
            station_pressure_mb: 0.0,
            wind_lull_ms: 0.0,
            wind_avg_ms: 0.0,
            wind_gust_ms: 0.0,
            wind_direction_deg: 0.0,
            illuminance_lux: 0.0,
            uv_index: 0,
            solar_radiation_wm2: 0.0,
            rain_rate_mm: 0.0,
            rain_daily_mm: 0.0,
            precipitation_type: PrecipitationType::None,
            lightning_strike_count: 0,
            lightning_avg_distance_km: 0.0,
            battery_volts: 0.0,
            report_interval_s: 0,
        }
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_utc(
            chrono::NaiveDateTime::from_timestamp_opt(self.timestamp, 0).unwrap_or_default(),
            Utc,
        )
    }
}

/// Opaque forecast payload. The core only stores and forwards this; its
/// shape belongs to whichever cloud-capable data source fetched it.
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub fetched_at: i64,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    Api,
    Udp,
    Generated,
}

/// Status/diagnostics surface for whichever `DataSource` is active.
#[derive(Debug, Clone, Serialize)]
pub struct DataSourceStatus {
    #[serde(rename = "type")]
    pub kind: DataSourceKind,
    pub active: bool,
    pub last_update: Option<i64>,
    pub station_id: Option<String>,
    pub station_name: Option<String>,
    pub observation_count: u64,
    pub packet_count: Option<u64>,
    pub station_ip: Option<String>,
    pub serial_number: Option<String>,
    pub custom_url: Option<String>,
}

impl DataSourceStatus {
    pub fn new(kind: DataSourceKind) -> Self {
        Self {
            kind,
            active: false,
            last_update: None,
            station_id: None,
            station_name: None,
            observation_count: 0,
            packet_count: None,
            station_ip: None,
            serial_number: None,
            custom_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_value_is_default_absence() {
        let obs = Observation::at(100);
        assert_eq!(obs.temperature_c, 0.0);
        assert_eq!(obs.precipitation_type, PrecipitationType::None);
    }

    #[test]
    fn precip_type_mapping() {
        assert_eq!(PrecipitationType::from(0), PrecipitationType::None);
        assert_eq!(PrecipitationType::from(1), PrecipitationType::Rain);
        assert_eq!(PrecipitationType::from(2), PrecipitationType::Hail);
    }
}
