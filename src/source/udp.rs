//! UDP-backed `DataSource`: wraps `protocol::UdpProtocol`, optionally
//! supplementing it with a background forecast poll against the cloud
//! API. Skipped entirely when `offline` is set (P6/S6): the UDP feed
//! never needs the internet, and `--offline` guarantees no outbound
//! HTTP call is made.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::observation::{DataSourceKind, DataSourceStatus, Forecast, Observation};
use crate::protocol::UdpProtocol;
use super::{DataSource, SourceConfig};

const FORECAST_POLL_INTERVAL_SECS: u64 = 900;

pub struct UdpSource {
    protocol: Arc<UdpProtocol>,
    config: SourceConfig,
    forecast: Arc<RwLock<Option<Forecast>>>,
    cancel: CancellationToken,
}

impl UdpSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            protocol: Arc::new(UdpProtocol::new(config.history_capacity)),
            config,
            forecast: Arc::new(RwLock::new(None)),
            cancel: CancellationToken::new(),
        }
    }
}

async fn forecast_loop(
    client: reqwest::Client,
    cloud_url: String,
    token: Option<String>,
    forecast: Arc<RwLock<Option<Forecast>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_secs(FORECAST_POLL_INTERVAL_SECS)) => {}
        }
        let mut request = client.get(format!("{cloud_url}/forecast"));
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(resp) => match resp.json::<serde_json::Value>().await {
                Ok(raw) => {
                    *forecast.write().await = Some(Forecast {
                        fetched_at: chrono::Utc::now().timestamp(),
                        raw,
                    });
                }
                Err(e) => warn!("udp source: forecast parse failed: {e}"),
            },
            Err(e) => warn!("udp source: forecast request failed: {e}"),
        }
    }
}

#[async_trait]
impl DataSource for UdpSource {
    async fn start(&self) -> anyhow::Result<mpsc::Receiver<Observation>> {
        let rx = self.protocol.start().await?;

        if !self.config.offline {
            tokio::spawn(forecast_loop(
                reqwest::Client::new(),
                self.config.cloud_url.clone(),
                self.config.cloud_api_token.clone(),
                self.forecast.clone(),
                self.cancel.clone(),
            ));
        }

        Ok(rx)
    }

    async fn stop(&self) {
        self.protocol.stop();
        self.cancel.cancel();
    }

    async fn latest(&self) -> Option<Observation> {
        self.protocol.latest_observation().await
    }

    async fn status(&self) -> DataSourceStatus {
        let (packet_count, _last_packet_at, station_ip, serial_number) = self.protocol.stats();
        let latest = self.protocol.latest_observation().await;
        let mut status = DataSourceStatus::new(DataSourceKind::Udp);
        status.active = self.protocol.is_receiving_data();
        status.last_update = latest.map(|o| o.timestamp);
        status.packet_count = Some(packet_count);
        status.station_ip = station_ip;
        status.serial_number = serial_number;
        status
    }

    async fn forecast(&self) -> Option<Forecast> {
        self.forecast.read().await.clone()
    }

    fn type_tag(&self) -> DataSourceKind {
        DataSourceKind::Udp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_flag_reports_no_forecast() {
        let source = UdpSource::new(SourceConfig {
            offline: true,
            history_capacity: 10,
            ..Default::default()
        });
        assert!(source.forecast().await.is_none());
        assert_eq!(source.type_tag(), DataSourceKind::Udp);
    }
}
