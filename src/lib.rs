pub mod accessory;
pub mod alarm;
pub mod condition;
pub mod dashboard;
pub mod error;
pub mod log_control;
pub mod notify;
pub mod observation;
pub mod orchestrator;
pub mod protocol;
pub mod source;
pub mod units;

use std::sync::Arc;

use anyhow::Context;
use log::info;
use structopt::StructOpt;

use orchestrator::ServiceOrchestrator;
use source::SourceConfig;

const DEFAULT_CLOUD_URL: &str = "https://swd.weatherflow.com/swd/rest/observations";

#[derive(StructOpt, Clone, Debug)]
pub struct StationParams {
    /// Human-readable station name, used in notification templates.
    #[structopt(long = "station-name", default_value = "Tempest Station")]
    pub name: String,

    /// Station elevation in meters.
    #[structopt(long = "station-elevation", default_value = "0")]
    pub elevation: f64,
}

#[derive(StructOpt, Debug)]
pub struct SourceParams {
    /// Listen for LAN UDP broadcasts instead of polling the cloud API.
    #[structopt(long)]
    pub udp_stream: bool,

    /// Generate synthetic observations instead of using a real station.
    #[structopt(long)]
    pub generated_weather: bool,

    /// Poll a custom observation URL instead of the WeatherFlow cloud API.
    /// Disables forecast polling.
    #[structopt(long)]
    pub custom_url: Option<String>,

    /// WeatherFlow cloud API base URL.
    #[structopt(long, default_value = DEFAULT_CLOUD_URL)]
    pub cloud_url: String,

    /// Bearer token for the cloud API / custom URL, if required.
    #[structopt(long)]
    pub cloud_api_token: Option<String>,

    /// Never make outbound HTTP calls (forecast polling is skipped).
    #[structopt(long)]
    pub offline: bool,

    /// Number of observations retained in the in-memory history ring.
    #[structopt(long, default_value = "500")]
    pub history_capacity: usize,

    /// Seed string for the synthetic generator, for reproducible demos.
    #[structopt(long)]
    pub location_seed: Option<String>,
}

#[derive(StructOpt, Debug)]
pub struct Opt {
    /// Log verbosity level.
    #[structopt(long, default_value = "info")]
    pub log_level: log::LevelFilter,

    /// Only emit log records whose message contains this substring.
    #[structopt(long)]
    pub log_filter: Option<String>,

    /// Port to bind the dashboard JSON API.
    #[structopt(long, default_value = "8080")]
    pub dashboard_port: u16,

    /// Alarm configuration: `@/path/to/file.json` or an inline JSON blob.
    /// Omit to run with no alarms configured.
    #[structopt(long)]
    pub alarm_config: Option<String>,

    #[structopt(flatten)]
    pub source_params: SourceParams,

    #[structopt(flatten)]
    pub station_params: StationParams,
}

impl From<&SourceParams> for SourceConfig {
    fn from(p: &SourceParams) -> Self {
        Self {
            udp_stream: p.udp_stream,
            generated_weather: p.generated_weather,
            custom_url: p.custom_url.clone(),
            cloud_url: p.cloud_url.clone(),
            cloud_api_token: p.cloud_api_token.clone(),
            offline: p.offline,
            history_capacity: p.history_capacity,
            location_seed: p.location_seed.clone(),
        }
    }
}

/// Build the orchestrator and its dependencies from parsed options, but
/// do not start or run anything. Exposed separately from `run` so
/// integration tests can assemble the same graph around a fake
/// `DataSource`.
pub fn build(opt: &Opt) -> anyhow::Result<ServiceOrchestrator> {
    let source_config: SourceConfig = (&opt.source_params).into();
    let data_source = source::build_data_source(&source_config);

    let accessory_state = Arc::new(accessory::AccessoryState::new());
    let dashboard_state = Arc::new(dashboard::DashboardState::new());

    let alarm_manager = match &opt.alarm_config {
        Some(config_ref) => {
            let manager = alarm::AlarmManager::load(config_ref, &opt.station_params.name)
                .context("failed to load alarm configuration")?;
            Some(Arc::new(manager))
        }
        None => {
            info!("no --alarm-config given, running with no alarms");
            None
        }
    };

    Ok(ServiceOrchestrator::new(
        data_source,
        accessory_state,
        dashboard_state,
        alarm_manager,
        opt.dashboard_port,
    ))
}

pub async fn run(opt: Opt) -> anyhow::Result<()> {
    log_control::init(opt.log_level, opt.log_filter.clone()).context("logging setup failed")?;
    info!("starting tempest-bridge");

    let orchestrator = build(&opt)?;
    orchestrator.run_until_shutdown_signal().await?;
    info!("terminating");
    Ok(())
}
