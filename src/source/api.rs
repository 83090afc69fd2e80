//! API-backed `DataSource`: polls the WeatherFlow cloud REST API (or a
//! custom URL) every 60s. A custom URL disables forecast polling, per
//! spec §4.2.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::observation::{DataSourceKind, DataSourceStatus, Forecast, Observation};
use super::{DataSource, SourceConfig};

const POLL_INTERVAL_SECS: u64 = 60;
const POLL_TIMEOUT_SECS: u64 = 10;

#[derive(Deserialize, Debug)]
struct RawCloudObservation {
    timestamp: i64,
    #[serde(default)]
    air_temperature: f64,
    #[serde(default)]
    relative_humidity: f64,
    #[serde(default)]
    station_pressure: f64,
    #[serde(default)]
    wind_lull: f64,
    #[serde(default)]
    wind_avg: f64,
    #[serde(default)]
    wind_gust: f64,
    #[serde(default)]
    wind_direction: f64,
    #[serde(default)]
    brightness: f64,
    #[serde(default)]
    uv: i64,
    #[serde(default)]
    solar_radiation: f64,
    #[serde(default)]
    precip: f64,
    #[serde(default)]
    precip_accum_local_day: f64,
    #[serde(default)]
    precip_type: i64,
    #[serde(default)]
    strike_count: i64,
    #[serde(default)]
    strike_last_dist: f64,
    #[serde(default)]
    battery: f64,
    #[serde(default)]
    report_interval: i64,
}

#[derive(Deserialize, Debug)]
struct RawCloudResponse {
    station_id: Option<String>,
    station_name: Option<String>,
    obs: Vec<RawCloudObservation>,
}

impl From<RawCloudObservation> for Observation {
    fn from(raw: RawCloudObservation) -> Self {
        let mut obs = Observation::at(raw.timestamp);
        obs.temperature_c = raw.air_temperature;
        obs.relative_humidity_pct = raw.relative_humidity;
        obs.station_pressure_mb = raw.station_pressure;
        obs.wind_lull_ms = raw.wind_lull;
        obs.wind_avg_ms = raw.wind_avg;
        obs.wind_gust_ms = raw.wind_gust;
        obs.wind_direction_deg = raw.wind_direction;
        obs.illuminance_lux = raw.brightness;
        obs.uv_index = raw.uv;
        obs.solar_radiation_wm2 = raw.solar_radiation;
        obs.rain_rate_mm = raw.precip;
        obs.rain_daily_mm = raw.precip_accum_local_day;
        obs.precipitation_type = raw.precip_type.into();
        obs.lightning_strike_count = raw.strike_count;
        obs.lightning_avg_distance_km = raw.strike_last_dist;
        obs.battery_volts = raw.battery;
        obs.report_interval_s = raw.report_interval;
        obs
    }
}

struct Inner {
    client: reqwest::Client,
    config: SourceConfig,
    custom_url: Option<String>,
    status: RwLock<DataSourceStatus>,
    latest: RwLock<Option<Observation>>,
    forecast: RwLock<Option<Forecast>>,
    cancel: CancellationToken,
}

impl Inner {
    fn url(&self) -> String {
        self.custom_url
            .clone()
            .unwrap_or_else(|| self.config.cloud_url.clone())
    }
}

pub struct ApiSource {
    inner: Arc<Inner>,
}

impl ApiSource {
    pub fn new(config: SourceConfig, custom_url: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client: reqwest::Client::new(),
                config,
                custom_url,
                status: RwLock::new(DataSourceStatus::new(DataSourceKind::Api)),
                latest: RwLock::new(None),
                forecast: RwLock::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }
}

async fn poll_once(inner: &Arc<Inner>, sender: &mpsc::Sender<Observation>) {
    let request = inner.client.get(inner.url());
    let request = match &inner.config.cloud_api_token {
        Some(token) => request.bearer_auth(token),
        None => request,
    };
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(POLL_TIMEOUT_SECS),
        request.send(),
    )
    .await;

    let response = match result {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            warn!("api source: poll request failed: {e}");
            return;
        }
        Err(_) => {
            warn!("api source: poll request timed out");
            return;
        }
    };

    let parsed: RawCloudResponse = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            warn!("api source: could not parse response: {e}");
            return;
        }
    };

    let mut status = inner.status.write().await;
    status.station_id = parsed.station_id.clone();
    status.station_name = parsed.station_name.clone();
    status.active = true;
    drop(status);

    if let Some(raw_obs) = parsed.obs.into_iter().next() {
        let obs: Observation = raw_obs.into();
        *inner.latest.write().await = Some(obs);
        let mut status = inner.status.write().await;
        status.last_update = Some(obs.timestamp);
        status.observation_count += 1;
        drop(status);
        if sender.try_send(obs).is_err() {
            warn!("api source: observation channel full, dropping send");
        }
    }
}

async fn refresh_forecast(inner: &Arc<Inner>) {
    if inner.custom_url.is_some() {
        return;
    }
    // Forecast payload is opaque (spec §3): stored and forwarded
    // without interpretation.
    let forecast_url = format!("{}/forecast", inner.config.cloud_url);
    match inner.client.get(&forecast_url).send().await {
        Ok(resp) => match resp.json::<serde_json::Value>().await {
            Ok(raw) => {
                *inner.forecast.write().await = Some(Forecast {
                    fetched_at: chrono::Utc::now().timestamp(),
                    raw,
                });
            }
            Err(e) => warn!("api source: forecast parse failed: {e}"),
        },
        Err(e) => warn!("api source: forecast request failed: {e}"),
    }
}

async fn poll_loop(inner: Arc<Inner>, sender: mpsc::Sender<Observation>) {
    loop {
        poll_once(&inner, &sender).await;
        refresh_forecast(&inner).await;
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_secs(POLL_INTERVAL_SECS)) => {}
        }
    }
}

#[async_trait]
impl DataSource for ApiSource {
    async fn start(&self) -> anyhow::Result<mpsc::Receiver<Observation>> {
        let (tx, rx) = mpsc::channel(16);
        self.inner.status.write().await.active = true;
        tokio::spawn(poll_loop(self.inner.clone(), tx));
        Ok(rx)
    }

    async fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.status.write().await.active = false;
    }

    async fn latest(&self) -> Option<Observation> {
        *self.inner.latest.read().await
    }

    async fn status(&self) -> DataSourceStatus {
        self.inner.status.read().await.clone()
    }

    async fn forecast(&self) -> Option<Forecast> {
        self.inner.forecast.read().await.clone()
    }

    fn type_tag(&self) -> DataSourceKind {
        DataSourceKind::Api
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_url_overrides_cloud_url() {
        let inner = Inner {
            client: reqwest::Client::new(),
            config: SourceConfig {
                cloud_url: "https://swd.weatherflow.com/swd/rest/observations".into(),
                ..Default::default()
            },
            custom_url: Some("http://example.test/obs".into()),
            status: RwLock::new(DataSourceStatus::new(DataSourceKind::Api)),
            latest: RwLock::new(None),
            forecast: RwLock::new(None),
            cancel: CancellationToken::new(),
        };
        assert_eq!(inner.url(), "http://example.test/obs");
    }

    #[tokio::test]
    async fn custom_url_source_reports_api_kind() {
        let source = ApiSource::new(SourceConfig::default(), Some("http://example.test".into()));
        assert_eq!(source.type_tag(), DataSourceKind::Api);
        assert!(source.latest().await.is_none());
    }
}
