//! Charging station connectivity
//!
//! Each supported station type implements [`StationClient`], which covers
//! both the command surface the control loop needs and the protocol hooks the
//! [`ChargerManager`] uses to keep a normalized view of the station.

pub mod go_echarger;
pub mod manager;
pub mod mqtt;
pub mod openevse;
mod station;

pub use go_echarger::GoEChargerClient;
pub use manager::{ChargerManager, LinkState};
pub use mqtt::{MqttSubscriber, TopicEvent, TopicSession, TopicSubscriber};
pub use openevse::OpenEvseClient;
pub use station::{ChargerControl, StationClient, StationCommands, StationStatus};

use crate::config::{ChargerConfig, ChargerKind};
use crate::error::Result;
use crate::logging::StructuredLogger;
use std::sync::Arc;

/// Build the client for the configured station type
pub fn build_station_client(
    config: &ChargerConfig,
    voltage: f64,
    logger: StructuredLogger,
) -> Result<Arc<dyn StationClient>> {
    let client: Arc<dyn StationClient> = match config.kind {
        ChargerKind::GoECharger => Arc::new(GoEChargerClient::new(config, voltage, logger)?),
        ChargerKind::OpenEvse => Arc::new(OpenEvseClient::new(config, voltage, logger)?),
    };
    Ok(client)
}

/// HTTP client shared by the station implementations
pub(crate) fn http_client(config: &ChargerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(
            config.request_timeout_secs.max(1),
        ))
        .user_agent(concat!("sevc/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
