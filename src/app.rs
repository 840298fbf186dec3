//! Process wiring
//!
//! Starts the metering aggregator, the charger manager and the control loop
//! in dependency order under one cancellation token, and stops them again.

use crate::chargers::{ChargerManager, MqttSubscriber, StationClient, TopicSubscriber, build_station_client};
use crate::config::{Config, TransportMode};
use crate::controller::ControlLoop;
use crate::dbus::{MeteringAggregator, PowerBus, SystemPowerBus};
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::worker::WorkerHandle;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the snapshot channels feeding the control loop
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 10;

/// The three running workers
pub struct App {
    token: CancellationToken,
    aggregator: WorkerHandle,
    charger: WorkerHandle,
    controller: WorkerHandle,
    logger: StructuredLogger,
}

impl App {
    /// Connect to the system bus and the station and start everything
    pub async fn start(config: &Config) -> Result<Self> {
        let bus: Arc<dyn PowerBus> = Arc::new(SystemPowerBus::connect(get_logger("dbus")).await?);
        let client = build_station_client(
            &config.charger,
            f64::from(config.electrical_pressure),
            get_logger("station"),
        )?;
        let subscriber: Option<Arc<dyn TopicSubscriber>> = match config.charger.transport {
            TransportMode::Mqtt => Some(Arc::new(MqttSubscriber::new(
                config.charger.mqtt.clone(),
                get_logger("mqtt"),
            ))),
            TransportMode::Polling => None,
        };
        Self::start_with(config, bus, client, subscriber, CancellationToken::new()).await
    }

    /// Start the workers on the given connections
    pub async fn start_with(
        config: &Config,
        bus: Arc<dyn PowerBus>,
        client: Arc<dyn StationClient>,
        subscriber: Option<Arc<dyn TopicSubscriber>>,
        token: CancellationToken,
    ) -> Result<Self> {
        let logger = get_logger("app");
        let (metering_tx, metering_rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (charger_tx, charger_rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);

        let aggregator = MeteringAggregator::new(bus, config, get_logger("aggregator"))
            .start(&token, metering_tx)
            .await?;

        let manager = ChargerManager::new(client, &config.charger, subscriber, get_logger("charger"));
        let commands = manager.commands();
        let charger = match manager.start(&token, charger_tx).await {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(stop_err) = aggregator.stop().await {
                    logger.warn(&format!("Stopping aggregator: {}", stop_err));
                }
                return Err(e);
            }
        };

        let controller = ControlLoop::new(config, commands, get_logger("controller"))
            .start(&token, metering_rx, charger_rx);

        logger.info("All workers started");
        Ok(Self {
            token,
            aggregator,
            charger,
            controller,
            logger,
        })
    }

    /// Resolve when any worker exits on its own; returns its name
    pub async fn wait_for_exit(&mut self) -> String {
        tokio::select! {
            _ = self.aggregator.closed() => self.aggregator.name().to_string(),
            _ = self.charger.closed() => self.charger.name().to_string(),
            _ = self.controller.closed() => self.controller.name().to_string(),
        }
    }

    /// Cancel every worker and wait for each, consumers first
    pub async fn shutdown(self) -> Result<()> {
        self.token.cancel();
        let mut first_error = None;
        for handle in [self.controller, self.charger, self.aggregator] {
            let name = handle.name().to_string();
            match handle.stop().await {
                Ok(()) => self.logger.debug(&format!("{} stopped", name)),
                Err(e) => {
                    self.logger.error(&format!("Stopping {}: {}", name, e));
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
