//! Scenario-level tests exercising the full pipeline: data source →
//! orchestrator fan-out → accessory/dashboard caches → alarm manager.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use tempest_bridge::accessory::AccessoryState;
use tempest_bridge::alarm::AlarmManager;
use tempest_bridge::dashboard::DashboardState;
use tempest_bridge::observation::{DataSourceKind, DataSourceStatus, Forecast, Observation};
use tempest_bridge::orchestrator::ServiceOrchestrator;
use tempest_bridge::protocol::messages::{self, RawTempestMsg, FlexInt};
use tempest_bridge::source::DataSource;

/// A `DataSource` a test can push observations into on demand, standing in
/// for a real station or cloud poll.
struct TestSource {
    sender: Mutex<Option<mpsc::Sender<Observation>>>,
}

impl TestSource {
    fn new() -> Self {
        Self {
            sender: Mutex::new(None),
        }
    }

    async fn push(&self, obs: Observation) {
        if let Some(tx) = self.sender.lock().await.as_ref() {
            let _ = tx.send(obs).await;
        }
    }
}

#[async_trait]
impl DataSource for TestSource {
    async fn start(&self) -> anyhow::Result<mpsc::Receiver<Observation>> {
        let (tx, rx) = mpsc::channel(16);
        *self.sender.lock().await = Some(tx);
        Ok(rx)
    }

    async fn stop(&self) {
        *self.sender.lock().await = None;
    }

    async fn latest(&self) -> Option<Observation> {
        None
    }

    async fn status(&self) -> DataSourceStatus {
        DataSourceStatus::new(DataSourceKind::Generated)
    }

    async fn forecast(&self) -> Option<Forecast> {
        None
    }

    fn type_tag(&self) -> DataSourceKind {
        DataSourceKind::Generated
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn s1_hot_alarm_fires_and_then_cools_down() {
    let source = Arc::new(TestSource::new());
    let accessory = Arc::new(AccessoryState::new());
    let dashboard = Arc::new(DashboardState::new());
    let config = r#"{"alarms":[{"name":"Hot","condition":"temperature > 80F","cooldown":3600,
        "enabled":true,"channels":[{"type":"console","template":"{{alarm_name}}:{{temperature_f}}"}]}]}"#;
    let manager = Arc::new(AlarmManager::load(config, "Backyard").unwrap());

    let source_handle: Arc<dyn DataSource> = source.clone();
    let orchestrator = ServiceOrchestrator::new(
        source_handle,
        accessory.clone(),
        dashboard.clone(),
        Some(manager.clone()),
        0,
    );
    orchestrator.start().await.unwrap();

    let mut obs = Observation::at(1_700_000_000);
    obs.temperature_c = 27.5; // 81.5F, above the 80F threshold
    source.push(obs).await;
    settle().await;

    assert_eq!(dashboard.latest().await.unwrap().temperature_c, 27.5);
    assert_eq!(accessory.latest().await.unwrap().temperature_c, 27.5);
    let status = manager.alarm_status();
    assert_eq!(status.len(), 1);
    assert!(status[0].last_triggered.is_some());
    assert!(status[0].in_cooldown);

    // A second hot reading within the cooldown window must not re-arm.
    let first_trigger = status[0].last_triggered;
    let mut obs2 = Observation::at(1_700_000_060);
    obs2.temperature_c = 30.0;
    source.push(obs2).await;
    settle().await;
    assert_eq!(manager.alarm_status()[0].last_triggered, first_trigger);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn s3_hot_reload_picks_up_new_alarm_set() {
    let path = std::env::temp_dir().join(format!(
        "tempest_bridge_e2e_alarms_{}_{}.json",
        std::process::id(),
        "s3"
    ));
    std::fs::write(
        &path,
        r#"{"alarms":[{"name":"A","condition":"temperature > 20","cooldown":0,
            "enabled":true,"channels":[{"type":"console","template":"x"}]}]}"#,
    )
    .unwrap();

    let config_ref = format!("@{}", path.display());
    let manager = AlarmManager::load(&config_ref, "Station").unwrap();
    assert_eq!(manager.summary().0, 1);

    std::fs::write(
        &path,
        r#"{"alarms":[
            {"name":"A","condition":"temperature > 20","cooldown":0,
             "enabled":true,"channels":[{"type":"console","template":"x"}]},
            {"name":"B","condition":"humidity > 50","cooldown":0,
             "enabled":true,"channels":[{"type":"console","template":"y"}]}
        ]}"#,
    )
    .unwrap();

    // The watcher debounces on real filesystem events; hot_reload is the
    // same codepath the watcher drives and completes well within 1s.
    manager.hot_reload().await;
    assert_eq!(manager.summary().0, 2);

    std::fs::remove_file(&path).ok();
}

#[test]
fn s4_flex_int_firmware_revision_string_and_number_agree() {
    let as_string = r#"{"type":"device_status","serial_number":"ST-1","hub_sn":"HB-1",
        "timestamp":1,"uptime":1,"voltage":2.6,"firmware_revision":"171",
        "rssi":-60.0,"hub_rssi":-50.0,"sensor_status":0,"debug":0}"#;
    let as_number = r#"{"type":"device_status","serial_number":"ST-1","hub_sn":"HB-1",
        "timestamp":1,"uptime":1,"voltage":2.6,"firmware_revision":171,
        "rssi":-60.0,"hub_rssi":-50.0,"sensor_status":0,"debug":0}"#;

    let a = messages::parse(as_string).unwrap();
    let b = messages::parse(as_number).unwrap();
    match (a, b) {
        (RawTempestMsg::DeviceStatus(a), RawTempestMsg::DeviceStatus(b)) => {
            assert_eq!(a.firmware_revision, FlexInt(171));
            assert_eq!(b.firmware_revision, FlexInt(171));
        }
        _ => panic!("expected device_status"),
    }
}

#[tokio::test]
async fn s6_offline_udp_source_reports_no_forecast() {
    use tempest_bridge::source::{udp::UdpSource, SourceConfig};

    let source = UdpSource::new(SourceConfig {
        offline: true,
        history_capacity: 50,
        ..Default::default()
    });
    // With offline set, the forecast-poll task is never spawned, so the
    // forecast cache stays empty regardless of how long the source runs
    // (no outbound HTTP call is ever made to populate it).
    assert!(source.forecast().await.is_none());
}
