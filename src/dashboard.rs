//! L7: in-memory dashboard cache plus the thin `GET /api/weather`,
//! `/api/status`, `/api/alarm-status` surface spec §6 publishes. The
//! HTML/JS front-end itself is out of scope; this is the emitter the
//! orchestrator feeds and `warp` serves JSON from.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use warp::Filter;

use crate::alarm::{AlarmManager, AlarmStatus};
use crate::observation::{DataSourceStatus, Forecast, Observation};

const HISTORY_CAPACITY: usize = 500;

#[derive(Default)]
struct State {
    latest: Option<Observation>,
    history: VecDeque<Observation>,
    forecast: Option<Forecast>,
    source_status: Option<DataSourceStatus>,
}

/// Cache fed by the orchestrator's fan-out loop; independent of whatever
/// HTTP framework ends up serving it.
pub struct DashboardState {
    state: RwLock<State>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    pub async fn update(&self, obs: Observation) {
        let mut state = self.state.write().await;
        state.latest = Some(obs);
        if state.history.len() >= HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back(obs);
    }

    pub async fn update_forecast(&self, forecast: Option<Forecast>) {
        self.state.write().await.forecast = forecast;
    }

    pub async fn update_data_source_status(&self, status: DataSourceStatus) {
        self.state.write().await.source_status = Some(status);
    }

    pub async fn latest(&self) -> Option<Observation> {
        self.state.read().await.latest
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct WeatherResponse {
    latest: Option<Observation>,
    history: Vec<Observation>,
    forecast: Option<Forecast>,
}

#[derive(Serialize)]
struct AlarmStatusEntry {
    name: String,
    enabled: bool,
    last_triggered: Option<i64>,
    in_cooldown: bool,
    cooldown_remaining: i64,
}

impl From<&AlarmStatus> for AlarmStatusEntry {
    fn from(s: &AlarmStatus) -> Self {
        Self {
            name: s.name.clone(),
            enabled: s.enabled,
            last_triggered: s.last_triggered,
            in_cooldown: s.in_cooldown,
            cooldown_remaining: s.cooldown_remaining,
        }
    }
}

/// Build the `warp` filter chain for the dashboard's read-only JSON API.
/// The teacher wires its `/healthz`/`/metrics` routes the same way in
/// `main.rs`; this generalizes that to three routes over the new state.
pub fn routes(
    dashboard: Arc<DashboardState>,
    alarms: Option<Arc<AlarmManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    let weather = warp::path!("api" / "weather").and_then({
        let dashboard = dashboard.clone();
        move || {
            let dashboard = dashboard.clone();
            async move {
                let state = dashboard.state.read().await;
                let body = WeatherResponse {
                    latest: state.latest,
                    history: state.history.iter().copied().collect(),
                    forecast: state.forecast.clone(),
                };
                Ok::<_, Infallible>(warp::reply::json(&body))
            }
        }
    });

    let status = warp::path!("api" / "status").and_then({
        let dashboard = dashboard.clone();
        move || {
            let dashboard = dashboard.clone();
            async move {
                let state = dashboard.state.read().await;
                Ok::<_, Infallible>(warp::reply::json(&state.source_status))
            }
        }
    });

    let alarm_status = warp::path!("api" / "alarm-status").and_then(move || {
        let alarms = alarms.clone();
        async move {
            let body: Vec<AlarmStatusEntry> = alarms
                .as_ref()
                .map(|m| m.alarm_status().iter().map(AlarmStatusEntry::from).collect())
                .unwrap_or_default();
            Ok::<_, Infallible>(warp::reply::json(&body))
        }
    });

    weather.or(status).or(alarm_status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_appends_to_history_and_bounds_it() {
        let dashboard = DashboardState::new();
        for i in 0..(HISTORY_CAPACITY + 10) {
            dashboard.update(Observation::at(i as i64)).await;
        }
        let state = dashboard.state.read().await;
        assert_eq!(state.history.len(), HISTORY_CAPACITY);
        assert_eq!(dashboard.latest().await.unwrap().timestamp, (HISTORY_CAPACITY + 9) as i64);
    }

    #[tokio::test]
    async fn forecast_and_status_round_trip() {
        let dashboard = DashboardState::new();
        dashboard
            .update_data_source_status(DataSourceStatus::new(
                crate::observation::DataSourceKind::Udp,
            ))
            .await;
        let state = dashboard.state.read().await;
        assert!(state.source_status.is_some());
    }
}
