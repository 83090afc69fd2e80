//! L... ServiceOrchestrator: generalizes the teacher's `main.rs` message
//! pump (`tokio::spawn` loop + `tokio::select!` over server/pump/ctrl_c +
//! `oneshot`-pair graceful shutdown) into an ordered set of lifecycle
//! components. Startup order is config → station discovery → HomeKit
//! bridge → dashboard → alarm manager → data source; shutdown reverses
//! it. Each component's stop is idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::accessory::AccessoryState;
use crate::alarm::AlarmManager;
use crate::dashboard::{self, DashboardState};
use crate::source::DataSource;

#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self);
    fn name(&self) -> &str;
}

struct DashboardServerLifecycle {
    dashboard: Arc<DashboardState>,
    alarms: Option<Arc<AlarmManager>>,
    port: u16,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl Lifecycle for DashboardServerLifecycle {
    async fn start(&self) -> anyhow::Result<()> {
        let routes = dashboard::routes(self.dashboard.clone(), self.alarms.clone());
        let (tx, rx) = oneshot::channel();
        let port = self.port;
        let (_addr, server) = warp::serve(routes).bind_with_graceful_shutdown(
            ([0, 0, 0, 0], port),
            async move {
                rx.await.ok();
                info!("dashboard server stopping");
            },
        );
        tokio::spawn(server);
        *self.shutdown_tx.lock().await = Some(tx);
        info!("dashboard server listening on :{port}");
        Ok(())
    }

    async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }

    fn name(&self) -> &str {
        "dashboard-server"
    }
}

struct AlarmManagerLifecycle {
    manager: Arc<AlarmManager>,
}

#[async_trait]
impl Lifecycle for AlarmManagerLifecycle {
    async fn start(&self) -> anyhow::Result<()> {
        self.manager.start_watching();
        Ok(())
    }

    async fn stop(&self) {
        self.manager.stop();
    }

    fn name(&self) -> &str {
        "alarm-manager"
    }
}

struct SourceLifecycle {
    source: Arc<dyn DataSource>,
    accessory: Arc<AccessoryState>,
    dashboard: Arc<DashboardState>,
    alarms: Option<Arc<AlarmManager>>,
    cancel: CancellationToken,
}

async fn fan_out_loop(
    mut rx: tokio::sync::mpsc::Receiver<crate::observation::Observation>,
    accessory: Arc<AccessoryState>,
    dashboard: Arc<DashboardState>,
    alarms: Option<Arc<AlarmManager>>,
    source: Arc<dyn DataSource>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            obs = rx.recv() => {
                let Some(obs) = obs else { break };
                accessory.update(obs).await;
                dashboard.update(obs).await;
                dashboard.update_data_source_status(source.status().await).await;
                dashboard.update_forecast(source.forecast().await).await;
                if let Some(alarms) = &alarms {
                    alarms.process_observation(obs).await;
                }
            }
        }
    }
    info!("orchestrator fan-out loop stopped");
}

#[async_trait]
impl Lifecycle for SourceLifecycle {
    async fn start(&self) -> anyhow::Result<()> {
        let rx = self.source.start().await?;
        tokio::spawn(fan_out_loop(
            rx,
            self.accessory.clone(),
            self.dashboard.clone(),
            self.alarms.clone(),
            self.source.clone(),
            self.cancel.clone(),
        ));
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.source.stop().await;
    }

    fn name(&self) -> &str {
        "data-source"
    }
}

/// Owns the ordered lifecycle component list and drives forward-start,
/// reverse-stop. A direct generalization of the teacher's two-oneshot
/// shutdown pair to N components.
pub struct ServiceOrchestrator {
    components: Vec<Box<dyn Lifecycle>>,
}

impl ServiceOrchestrator {
    pub fn new(
        source: Arc<dyn DataSource>,
        accessory: Arc<AccessoryState>,
        dashboard: Arc<DashboardState>,
        alarms: Option<Arc<AlarmManager>>,
        dashboard_port: u16,
    ) -> Self {
        let mut components: Vec<Box<dyn Lifecycle>> = Vec::new();

        components.push(Box::new(DashboardServerLifecycle {
            dashboard: dashboard.clone(),
            alarms: alarms.clone(),
            port: dashboard_port,
            shutdown_tx: Mutex::new(None),
        }));

        if let Some(manager) = &alarms {
            components.push(Box::new(AlarmManagerLifecycle {
                manager: manager.clone(),
            }));
        }

        components.push(Box::new(SourceLifecycle {
            source,
            accessory,
            dashboard,
            alarms,
            cancel: CancellationToken::new(),
        }));

        Self { components }
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        for component in &self.components {
            info!("starting {}", component.name());
            component.start().await?;
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        for component in self.components.iter().rev() {
            info!("stopping {}", component.name());
            component.stop().await;
        }
    }

    pub async fn run_until_shutdown_signal(&self) -> anyhow::Result<()> {
        self.start().await?;
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("terminating on interrupt signal"),
            Err(e) => error!("interrupt signal handling failure: {e}"),
        }
        self.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{DataSourceKind, DataSourceStatus, Forecast, Observation};
    use async_trait::async_trait as at;
    use tokio::sync::mpsc;

    struct NullSource;

    #[at]
    impl DataSource for NullSource {
        async fn start(&self) -> anyhow::Result<mpsc::Receiver<Observation>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
        async fn stop(&self) {}
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

    #[tokio::test]
    async fn fan_out_loop_stops_on_channel_close() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let accessory = Arc::new(AccessoryState::new());
        let dashboard = Arc::new(DashboardState::new());
        let cancel = CancellationToken::new();
        fan_out_loop(
            rx,
            accessory,
            dashboard,
            None,
            Arc::new(NullSource),
            cancel,
        )
        .await;
    }
}
