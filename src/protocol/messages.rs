//! Wire structs for Tempest LAN UDP broadcast datagrams (spec §4.1, §6).
//! Each datagram is a self-contained JSON document discriminated by a
//! `type` field. Payloads shorter than the minimum field count for their
//! type fail to deserialize (serde rejects short fixed-size arrays), which
//! gives us "discarded, no partial parse" for free, matching P1.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// An integer field that is supposed to be numeric but is occasionally
/// emitted as a quoted string by real hubs (notably `firmware_revision`).
/// Accepts either representation; a non-numeric string degrades to zero
/// rather than failing the whole datagram (P2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlexInt(pub i64);

impl<'de> Deserialize<'de> for FlexInt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FlexIntVisitor;

        impl<'de> Visitor<'de> for FlexIntVisitor {
            type Value = FlexInt;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or a string containing one")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(FlexInt(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(FlexInt(v as i64))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
                Ok(FlexInt(v as i64))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(FlexInt(v.trim().parse().unwrap_or(0)))
            }
        }

        deserializer.deserialize_any(FlexIntVisitor)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum RawTempestMsg {
    #[serde(rename = "evt_precip")]
    PrecipEvent(RawPrecipEvent),
    #[serde(rename = "evt_strike")]
    StrikeEvent(RawStrikeEvent),
    #[serde(rename = "rapid_wind")]
    RapidWind(RawRapidWind),
    #[serde(rename = "obs_st")]
    ObservationSt(RawObservationSt),
    #[serde(rename = "obs_air")]
    ObservationAir(RawObservationAir),
    #[serde(rename = "obs_sky")]
    ObservationSky(RawObservationSky),
    #[serde(rename = "device_status")]
    DeviceStatus(RawDeviceStatus),
    #[serde(rename = "hub_status")]
    HubStatus(RawHubStatus),
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawPrecipEvent {
    pub serial_number: String,
    pub hub_sn: String,
    pub evt: (i64,),
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawStrikeEvent {
    pub serial_number: String,
    pub hub_sn: String,
    pub evt: (i64, f64, f64),
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawRapidWind {
    pub serial_number: String,
    pub hub_sn: String,
    pub ob: (i64, f64, f64),
}

/// `obs_st` — 18 fixed-position numeric fields, per spec §4.1.
#[derive(Deserialize, Debug, Clone)]
pub struct RawObservationSt {
    pub serial_number: String,
    pub hub_sn: String,
    pub obs: [[f64; 18]; 1],
    #[serde(default)]
    pub firmware_revision: FlexInt,
}

/// `obs_air` — 8 fixed-position numeric fields (AIR device), per spec §4.1.
#[derive(Deserialize, Debug, Clone)]
pub struct RawObservationAir {
    pub serial_number: String,
    pub hub_sn: String,
    pub obs: [[f64; 8]; 1],
    #[serde(default)]
    pub firmware_revision: FlexInt,
}

/// `obs_sky` — 14 fixed-position numeric fields (SKY device), per spec §4.1.
#[derive(Deserialize, Debug, Clone)]
pub struct RawObservationSky {
    pub serial_number: String,
    pub hub_sn: String,
    pub obs: [[f64; 14]; 1],
    #[serde(default)]
    pub firmware_revision: FlexInt,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawDeviceStatus {
    pub serial_number: String,
    pub hub_sn: String,
    pub timestamp: i64,
    pub uptime: i64,
    pub voltage: f64,
    #[serde(default)]
    pub firmware_revision: FlexInt,
    pub rssi: f64,
    pub hub_rssi: f64,
    pub sensor_status: u32,
    pub debug: i32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RawHubStatus {
    pub serial_number: String,
    #[serde(default)]
    pub firmware_revision: FlexInt,
    pub uptime: i64,
    pub rssi: f64,
    pub timestamp: i64,
    pub reset_flags: String,
    pub seq: i32,
    #[serde(default)]
    pub radio_stats: Vec<i32>,
}

/// Parse one UDP datagram body into a typed message. Any JSON syntax error
/// or schema mismatch (including too-short field arrays) is reported to
/// the caller, which is expected to log at debug and drop the datagram.
pub fn parse(datagram: &str) -> Result<RawTempestMsg, serde_json::Error> {
    serde_json::from_str(datagram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p1_obs_st_requires_18_fields() {
        let short = r#"{"type":"obs_st","serial_number":"ST-1","hub_sn":"HB-1","obs":[[1,2,3]]}"#;
        assert!(parse(short).is_err());

        let full = format!(
            r#"{{"type":"obs_st","serial_number":"ST-1","hub_sn":"HB-1","obs":[[{}]]}}"#,
            (1..=18).map(|n| n.to_string()).collect::<Vec<_>>().join(",")
        );
        assert!(parse(&full).is_ok());
    }

    #[test]
    fn p2_flex_int_accepts_string_and_number() {
        let as_string = r#"{"type":"hub_status","serial_number":"HB-1","firmware_revision":"35","uptime":1,"rssi":1.0,"timestamp":1,"reset_flags":"","seq":1,"radio_stats":[]}"#;
        let as_number = r#"{"type":"hub_status","serial_number":"HB-1","firmware_revision":35,"uptime":1,"rssi":1.0,"timestamp":1,"reset_flags":"","seq":1,"radio_stats":[]}"#;
        let a = parse(as_string).unwrap();
        let b = parse(as_number).unwrap();
        match (a, b) {
            (RawTempestMsg::HubStatus(a), RawTempestMsg::HubStatus(b)) => {
                assert_eq!(a.firmware_revision, FlexInt(35));
                assert_eq!(b.firmware_revision, FlexInt(35));
            }
            _ => panic!("expected hub_status"),
        }
    }

    #[test]
    fn p2_flex_int_non_numeric_string_degrades_to_zero() {
        let msg = r#"{"type":"hub_status","serial_number":"HB-1","firmware_revision":"not-a-number","uptime":1,"rssi":1.0,"timestamp":1,"reset_flags":"","seq":1,"radio_stats":[]}"#;
        match parse(msg).unwrap() {
            RawTempestMsg::HubStatus(hs) => assert_eq!(hs.firmware_revision, FlexInt(0)),
            _ => panic!("expected hub_status"),
        }
    }
}
