//! L4: DataSource abstraction. A polymorphic producer of observations —
//! cloud API, UDP broadcast, or synthetic generator — selected by a
//! process-wide, test-injectable factory, per spec §4.2.

pub mod api;
pub mod generated;
pub mod udp;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::observation::{DataSourceKind, DataSourceStatus, Forecast, Observation};

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn start(&self) -> anyhow::Result<mpsc::Receiver<Observation>>;
    async fn stop(&self);
    async fn latest(&self) -> Option<Observation>;
    async fn status(&self) -> DataSourceStatus;
    async fn forecast(&self) -> Option<Forecast>;
    fn type_tag(&self) -> DataSourceKind;
}

/// Parameters the factory needs to build any of the three source kinds.
/// Mirrors the CLI flags `main.rs` exposes (spec §6).
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    pub udp_stream: bool,
    pub generated_weather: bool,
    pub custom_url: Option<String>,
    pub cloud_url: String,
    pub cloud_api_token: Option<String>,
    pub offline: bool,
    pub history_capacity: usize,
    pub location_seed: Option<String>,
}

pub type DataSourceFactoryFn = fn(&SourceConfig) -> Arc<dyn DataSource>;

static FACTORY_OVERRIDE: OnceCell<RwLock<Option<DataSourceFactoryFn>>> = OnceCell::new();

fn override_slot() -> &'static RwLock<Option<DataSourceFactoryFn>> {
    FACTORY_OVERRIDE.get_or_init(|| RwLock::new(None))
}

/// Substitute the process-wide factory function, e.g. in tests that need
/// to inject a fake `DataSource` without touching production call sites.
/// This is the single sanctioned hidden global in the crate (spec §9).
pub fn set_factory_override(factory: Option<DataSourceFactoryFn>) {
    *override_slot().write().unwrap() = factory;
}

/// Build the configured `DataSource`. Priority order (P10): UDP-stream
/// flag wins, then generated-weather flag, then a custom URL, else the
/// default cloud API.
pub fn build_data_source(config: &SourceConfig) -> Arc<dyn DataSource> {
    if let Some(factory) = *override_slot().read().unwrap() {
        return factory(config);
    }
    default_factory(config)
}

fn default_factory(config: &SourceConfig) -> Arc<dyn DataSource> {
    if config.udp_stream {
        Arc::new(udp::UdpSource::new(config.clone()))
    } else if config.generated_weather {
        Arc::new(generated::GeneratedSource::new(config.clone()))
    } else if let Some(url) = &config.custom_url {
        Arc::new(api::ApiSource::new(config.clone(), Some(url.clone())))
    } else {
        Arc::new(api::ApiSource::new(config.clone(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource(DataSourceKind);

    #[async_trait]
    impl DataSource for FakeSource {
        async fn start(&self) -> anyhow::Result<mpsc::Receiver<Observation>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
        async fn stop(&self) {}
        async fn latest(&self) -> Option<Observation> {
            None
        }
        async fn status(&self) -> DataSourceStatus {
            DataSourceStatus::new(self.0)
        }
        async fn forecast(&self) -> Option<Forecast> {
            None
        }
        fn type_tag(&self) -> DataSourceKind {
            self.0
        }
    }

    #[test]
    fn p10_factory_priority_udp_over_generated() {
        let config = SourceConfig {
            udp_stream: true,
            generated_weather: true,
            ..Default::default()
        };
        let source = default_factory(&config);
        assert_eq!(source.type_tag(), DataSourceKind::Udp);
    }

    #[test]
    fn p10_factory_priority_custom_url_over_cloud() {
        let config = SourceConfig {
            custom_url: Some("http://example.test/obs".to_string()),
            ..Default::default()
        };
        let source = default_factory(&config);
        assert_eq!(source.type_tag(), DataSourceKind::Api);
    }

    #[test]
    fn factory_override_is_injectable() {
        fn fake_factory(_: &SourceConfig) -> Arc<dyn DataSource> {
            Arc::new(FakeSource(DataSourceKind::Generated))
        }
        set_factory_override(Some(fake_factory));
        let source = build_data_source(&SourceConfig::default());
        assert_eq!(source.type_tag(), DataSourceKind::Generated);
        set_factory_override(None);
    }
}
