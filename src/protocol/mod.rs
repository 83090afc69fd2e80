//! L3: UDPProtocol. Listens on UDP/50222 for Tempest LAN broadcasts,
//! normalizes `obs_st`/`obs_air`/`obs_sky` payloads into `Observation`s,
//! maintains a bounded history ring and device/hub status snapshots, and
//! fans parsed observations out on a bounded, non-blocking channel.
//!
//! See spec §4.1 and §5 for the exact concurrency and error-handling
//! contract this module implements.

pub mod messages;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::observation::{Observation, PrecipitationType};
use messages::{RawDeviceStatus, RawHubStatus, RawTempestMsg};

const PORT: u16 = 50222;
const OBSERVATION_CHANNEL_CAPACITY: usize = 100;
const UDP_READ_TIMEOUT_SECS: u64 = 1;
const RECEIVING_DATA_WINDOW_SECS: i64 = 5 * 60;

pub fn clamp_history_capacity(requested: usize) -> usize {
    requested.clamp(10, 100_000)
}

#[derive(Debug, Clone)]
pub struct DeviceStatus {
    pub serial_number: String,
    pub hub_serial_number: String,
    pub timestamp: i64,
    pub uptime_s: i64,
    pub voltage: f64,
    pub firmware_revision: i64,
    pub rssi: f64,
    pub hub_rssi: f64,
    pub sensor_status: u32,
    pub debug: bool,
}

impl From<RawDeviceStatus> for DeviceStatus {
    fn from(raw: RawDeviceStatus) -> Self {
        Self {
            serial_number: raw.serial_number,
            hub_serial_number: raw.hub_sn,
            timestamp: raw.timestamp,
            uptime_s: raw.uptime,
            voltage: raw.voltage,
            firmware_revision: raw.firmware_revision.0,
            rssi: raw.rssi,
            hub_rssi: raw.hub_rssi,
            sensor_status: raw.sensor_status,
            debug: raw.debug != 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubStatus {
    pub serial_number: String,
    pub firmware_revision: i64,
    pub uptime_s: i64,
    pub rssi: f64,
    pub timestamp: i64,
    pub reset_flags: String,
    pub seq: i32,
}

impl From<RawHubStatus> for HubStatus {
    fn from(raw: RawHubStatus) -> Self {
        Self {
            serial_number: raw.serial_number,
            firmware_revision: raw.firmware_revision.0,
            uptime_s: raw.uptime,
            rssi: raw.rssi,
            timestamp: raw.timestamp,
            reset_flags: raw.reset_flags,
            seq: raw.seq,
        }
    }
}

fn observation_from_st(raw: &messages::RawObservationSt) -> Observation {
    let f = raw.obs[0];
    let mut obs = Observation::at(f[0] as i64);
    obs.wind_lull_ms = f[1];
    obs.wind_avg_ms = f[2];
    obs.wind_gust_ms = f[3];
    obs.wind_direction_deg = f[4];
    obs.report_interval_s = f[5] as i64;
    obs.station_pressure_mb = f[6];
    obs.temperature_c = f[7];
    obs.relative_humidity_pct = f[8];
    obs.illuminance_lux = f[9];
    obs.uv_index = f[10] as i64;
    obs.solar_radiation_wm2 = f[11];
    obs.rain_rate_mm = f[12];
    obs.precipitation_type = PrecipitationType::from(f[13] as i64);
    obs.lightning_avg_distance_km = f[14];
    obs.lightning_strike_count = f[15] as i64;
    obs.battery_volts = f[16];
    obs.report_interval_s = f[17] as i64;
    obs
}

fn observation_from_air(raw: &messages::RawObservationAir, timestamp: i64) -> Observation {
    let f = raw.obs[0];
    let mut obs = Observation::at(timestamp);
    obs.station_pressure_mb = f[1];
    obs.temperature_c = f[2];
    obs.relative_humidity_pct = f[3];
    obs.lightning_strike_count = f[4] as i64;
    obs.lightning_avg_distance_km = f[5];
    obs.battery_volts = f[6];
    obs.report_interval_s = f[7] as i64;
    obs
}

fn observation_from_sky(raw: &messages::RawObservationSky, timestamp: i64) -> Observation {
    let f = raw.obs[0];
    let mut obs = Observation::at(timestamp);
    obs.illuminance_lux = f[1];
    obs.uv_index = f[2] as i64;
    obs.rain_rate_mm = f[3];
    obs.wind_lull_ms = f[4];
    obs.wind_avg_ms = f[5];
    obs.wind_gust_ms = f[6];
    obs.wind_direction_deg = f[7];
    obs.battery_volts = f[8];
    obs.report_interval_s = f[9] as i64;
    obs.solar_radiation_wm2 = f[10];
    obs.precipitation_type = PrecipitationType::from(f[11] as i64);
    obs
}

#[derive(Default)]
struct Stats {
    packet_count: AtomicU64,
    observation_count: AtomicU64,
    last_packet_at: std::sync::Mutex<Option<i64>>,
    station_ip: std::sync::Mutex<Option<String>>,
    serial_number: std::sync::Mutex<Option<String>>,
}

struct Inner {
    history: RwLock<VecDeque<Observation>>,
    history_capacity: usize,
    latest: RwLock<Option<Observation>>,
    device_status: RwLock<Option<DeviceStatus>>,
    hub_status: RwLock<Option<HubStatus>>,
    stats: Stats,
    cancel: CancellationToken,
}

/// Owns the UDP listener task and the state it publishes: latest/history
/// observations, device/hub status, and reception stats.
pub struct UdpProtocol {
    inner: Arc<Inner>,
    sender: mpsc::Sender<Observation>,
    receiver: std::sync::Mutex<Option<mpsc::Receiver<Observation>>>,
}

impl UdpProtocol {
    pub fn new(history_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(OBSERVATION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                history: RwLock::new(VecDeque::with_capacity(clamp_history_capacity(
                    history_capacity,
                ))),
                history_capacity: clamp_history_capacity(history_capacity),
                latest: RwLock::new(None),
                device_status: RwLock::new(None),
                hub_status: RwLock::new(None),
                stats: Stats::default(),
                cancel: CancellationToken::new(),
            }),
            sender,
            receiver: std::sync::Mutex::new(Some(receiver)),
        }
    }

    /// Bind the socket and spawn the listener loop. Returns the channel end
    /// consumers read observations from; only the first call receives it.
    pub async fn start(&self) -> anyhow::Result<mpsc::Receiver<Observation>> {
        let socket = UdpSocket::bind(("0.0.0.0", PORT))
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind UDP {PORT}: {e}"))?;
        let inner = self.inner.clone();
        let sender = self.sender.clone();
        tokio::spawn(listener_loop(socket, inner, sender));
        self.receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("UdpProtocol::start called more than once"))
    }

    /// Signal the listener loop to stop. Closes the socket and causes the
    /// observation channel to close once the loop observes the signal
    /// (bounded by the 1s read deadline, per spec §5).
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    pub async fn latest_observation(&self) -> Option<Observation> {
        *self.inner.latest.read().await
    }

    pub async fn history_snapshot(&self) -> Vec<Observation> {
        self.inner.history.read().await.iter().copied().collect()
    }

    pub async fn device_status(&self) -> Option<DeviceStatus> {
        self.inner.device_status.read().await.clone()
    }

    pub async fn hub_status(&self) -> Option<HubStatus> {
        self.inner.hub_status.read().await.clone()
    }

    pub fn stats(&self) -> (u64, Option<i64>, Option<String>, Option<String>) {
        (
            self.inner.stats.packet_count.load(Ordering::Relaxed),
            *self.inner.stats.last_packet_at.lock().unwrap(),
            self.inner.stats.station_ip.lock().unwrap().clone(),
            self.inner.stats.serial_number.lock().unwrap().clone(),
        )
    }

    pub fn is_receiving_data(&self) -> bool {
        match *self.inner.stats.last_packet_at.lock().unwrap() {
            Some(last) => Utc::now().timestamp() - last <= RECEIVING_DATA_WINDOW_SECS,
            None => false,
        }
    }
}

async fn push_history(inner: &Arc<Inner>, obs: Observation) {
    let mut history = inner.history.write().await;
    if history.len() >= inner.history_capacity {
        history.pop_front();
    }
    history.push_back(obs);
}

async fn record_packet(inner: &Arc<Inner>, remote: SocketAddr, serial: Option<&str>) {
    inner.stats.packet_count.fetch_add(1, Ordering::Relaxed);
    *inner.stats.last_packet_at.lock().unwrap() = Some(Utc::now().timestamp());

    let mut ip_guard = inner.stats.station_ip.lock().unwrap();
    if ip_guard.is_none() {
        *ip_guard = Some(remote.ip().to_string());
        info!("UDP protocol: station IP set to {}", remote.ip());
    }
    drop(ip_guard);

    if let Some(serial) = serial {
        if !serial.is_empty() {
            let mut serial_guard = inner.stats.serial_number.lock().unwrap();
            if serial_guard.is_none() {
                *serial_guard = Some(serial.to_string());
                info!("UDP protocol: serial number set to {}", serial);
            }
        }
    }
}

async fn handle_datagram(
    inner: &Arc<Inner>,
    sender: &mpsc::Sender<Observation>,
    remote: SocketAddr,
    body: &str,
) {
    let msg = match messages::parse(body) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("UDP protocol: dropped undecodable datagram from {remote}: {e}");
            return;
        }
    };

    let serial = match &msg {
        RawTempestMsg::ObservationSt(r) => Some(r.serial_number.as_str()),
        RawTempestMsg::ObservationAir(r) => Some(r.serial_number.as_str()),
        RawTempestMsg::ObservationSky(r) => Some(r.serial_number.as_str()),
        RawTempestMsg::DeviceStatus(r) => Some(r.serial_number.as_str()),
        RawTempestMsg::HubStatus(r) => Some(r.serial_number.as_str()),
        _ => None,
    };
    record_packet(inner, remote, serial).await;

    match msg {
        RawTempestMsg::ObservationSt(raw) => {
            let obs = observation_from_st(&raw);
            publish_observation(inner, sender, obs).await;
        }
        RawTempestMsg::ObservationAir(raw) => {
            let obs = observation_from_air(&raw, Utc::now().timestamp());
            publish_observation(inner, sender, obs).await;
        }
        RawTempestMsg::ObservationSky(raw) => {
            let obs = observation_from_sky(&raw, Utc::now().timestamp());
            publish_observation(inner, sender, obs).await;
        }
        RawTempestMsg::DeviceStatus(raw) => {
            *inner.device_status.write().await = Some(raw.into());
        }
        RawTempestMsg::HubStatus(raw) => {
            *inner.hub_status.write().await = Some(raw.into());
        }
        RawTempestMsg::RapidWind(_) | RawTempestMsg::PrecipEvent(_) | RawTempestMsg::StrikeEvent(_) => {
            // Event-only messages: no Observation is produced, but the
            // packet has already counted toward stats/liveness above.
        }
    }
}

async fn publish_observation(
    inner: &Arc<Inner>,
    sender: &mpsc::Sender<Observation>,
    obs: Observation,
) {
    // History always gets the observation even if the channel is full or
    // has no receiver yet (P3): the send is best-effort, the ring is not.
    push_history(inner, obs).await;
    *inner.latest.write().await = Some(obs);
    inner
        .stats
        .observation_count
        .fetch_add(1, Ordering::Relaxed);
    if sender.try_send(obs).is_err() {
        debug!("UDP protocol: observation channel full, dropping send (history retained)");
    }
}

async fn listener_loop(socket: UdpSocket, inner: Arc<Inner>, sender: mpsc::Sender<Observation>) {
    let mut buf = [0u8; 2048];
    loop {
        if inner.cancel.is_cancelled() {
            break;
        }
        let recv = tokio::time::timeout(
            std::time::Duration::from_secs(UDP_READ_TIMEOUT_SECS),
            socket.recv_from(&mut buf),
        );
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            result = recv => match result {
                Err(_elapsed) => continue, // read timeout: expected, re-check cancel and loop
                Ok(Err(e)) => {
                    warn!("UDP protocol: socket read error: {e}");
                    continue;
                }
                Ok(Ok((len, remote))) => {
                    match std::str::from_utf8(&buf[..len]) {
                        Ok(body) => handle_datagram(&inner, &sender, remote, body).await,
                        Err(e) => warn!("UDP protocol: non-UTF8 datagram from {remote}: {e}"),
                    }
                }
            }
        }
    }
    debug!("UDP protocol: listener loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_capacity_is_clamped() {
        assert_eq!(clamp_history_capacity(1), 10);
        assert_eq!(clamp_history_capacity(1_000_000), 100_000);
        assert_eq!(clamp_history_capacity(500), 500);
    }

    #[test]
    fn p1_obs_st_field_mapping() {
        let raw = messages::RawObservationSt {
            serial_number: "ST-1".into(),
            hub_sn: "HB-1".into(),
            obs: [[
                1_600_000_000.0, // timestamp
                0.1,             // wind lull
                0.2,             // wind avg
                0.3,             // wind gust
                180.0,           // wind direction
                3.0,             // wind sample interval
                1013.0,          // pressure
                22.5,            // temperature
                55.0,            // humidity
                1000.0,          // illuminance
                5.0,             // UV
                200.0,           // solar radiation
                0.0,             // rain interval
                0.0,             // precip type
                10.0,            // lightning avg distance
                2.0,             // lightning strike count
                2.7,             // battery
                60.0,            // report interval
            ]],
            firmware_revision: messages::FlexInt(1),
        };
        let obs = observation_from_st(&raw);
        assert_eq!(obs.timestamp, 1_600_000_000);
        assert_eq!(obs.wind_avg_ms, 0.2);
        assert_eq!(obs.station_pressure_mb, 1013.0);
        assert_eq!(obs.temperature_c, 22.5);
        assert_eq!(obs.relative_humidity_pct, 55.0);
        assert_eq!(obs.lightning_strike_count, 2);
        assert_eq!(obs.battery_volts, 2.7);
        assert_eq!(obs.report_interval_s, 60);
    }

    #[tokio::test]
    async fn p3_backpressure_preserves_history_bound() {
        let proto = UdpProtocol::new(10);
        let inner = proto.inner.clone();
        let (tx, _rx) = mpsc::channel(1);
        // Fill the channel so subsequent sends are dropped.
        tx.try_send(Observation::at(0)).unwrap();

        for i in 0..25 {
            publish_observation(&inner, &tx, Observation::at(i)).await;
        }

        let history = proto.history_snapshot().await;
        assert!(history.len() <= 10);
        assert_eq!(proto.latest_observation().await.unwrap().timestamp, 24);
    }
}
