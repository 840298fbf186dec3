use super::{Decision, ThrottleSettings, decide};
use crate::chargers::ChargerControl;
use crate::config::Config;
use crate::error::{Result, SevcError};
use crate::logging::StructuredLogger;
use crate::snapshot::{ChargerState, MeteringSnapshot};
use crate::worker::WorkerHandle;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct LatestFeeds {
    metering: Option<MeteringSnapshot>,
    charger: Option<ChargerState>,
}

/// Applies a throttling decision to the station every backoff interval
pub struct ControlLoop {
    settings: ThrottleSettings,
    commands: Arc<dyn ChargerControl>,
    interval: Duration,
    feeds: Mutex<LatestFeeds>,
    logger: StructuredLogger,
}

impl ControlLoop {
    pub fn new(config: &Config, commands: Arc<dyn ChargerControl>, logger: StructuredLogger) -> Self {
        Self {
            settings: ThrottleSettings::from_config(config),
            commands,
            interval: Duration::from_secs(config.backoff_interval.max(1)),
            feeds: Mutex::new(LatestFeeds::default()),
            logger,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn record_metering(&self, snapshot: MeteringSnapshot) {
        if let Ok(mut feeds) = self.feeds.lock() {
            feeds.metering = Some(snapshot);
        }
    }

    pub fn record_charger(&self, state: ChargerState) {
        if let Ok(mut feeds) = self.feeds.lock() {
            feeds.charger = Some(state);
        }
    }

    /// Run one control cycle.
    ///
    /// Returns `Ok(None)` while either feed is still missing. A failed
    /// command ends the cycle; the next one starts from fresh readings.
    pub async fn sync_state(&self) -> Result<Option<Decision>> {
        let (metering, charger) = {
            let feeds = self
                .feeds
                .lock()
                .map_err(|_| SevcError::generic("control loop state lock poisoned"))?;
            match (&feeds.metering, &feeds.charger) {
                (Some(m), Some(c)) => (m.clone(), *c),
                _ => {
                    self.logger
                        .info("Empty charger or metering state. Waiting for readings.");
                    return Ok(None);
                }
            }
        };

        let decision = decide(&self.settings, &metering, &charger);
        self.logger.debug(&format!(
            "charger usage: {:.2}, total usage: {:.2}, production: {:.2}, available: {:.2}",
            charger.current_usage,
            metering.total_consumption(),
            metering.total_production(),
            decision.available_watts
        ));
        self.logger.trace(&format!(
            "Desired state is {}, available amps is {}, station amps is {}",
            decision.desired_active, decision.available_amps, decision.station_amps
        ));

        if decision.start {
            self.logger.info(&format!(
                "Enabling charging station; available amps: {}",
                decision.available_amps
            ));
            self.commands
                .start()
                .await
                .map_err(|e| e.context("starting charger"))?;
        }

        if decision.stop {
            self.logger.info(&format!(
                "Disabling charging station; available amps: {}",
                decision.available_amps
            ));
            self.commands
                .stop()
                .await
                .map_err(|e| e.context("stopping charger"))?;
        }

        if let Some(amps) = decision.set_amperage {
            self.logger.info(&format!(
                "Setting station amps to {}. Previous setting was {}",
                amps, charger.current_amp_setting
            ));
            self.commands
                .set_amperage(amps)
                .await
                .map_err(|e| e.context("setting station amps"))?;
        }

        Ok(Some(decision))
    }

    /// Spawn the loop. It ends on cancellation or when either feed closes.
    pub fn start(
        self,
        parent: &CancellationToken,
        mut metering_rx: mpsc::Receiver<MeteringSnapshot>,
        mut charger_rx: mpsc::Receiver<ChargerState>,
    ) -> WorkerHandle {
        WorkerHandle::spawn("controller", parent, move |quit| async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.logger.info(&format!(
                "Control loop running every {}s",
                self.interval.as_secs_f64()
            ));

            loop {
                tokio::select! {
                    _ = quit.cancelled() => break,
                    _ = ticker.tick() => {
                        // A started command runs to completion; the request
                        // timeout bounds it
                        if let Err(e) = self.sync_state().await {
                            self.logger.error(&format!("Failed to sync state: {}", e));
                        }
                    }
                    snapshot = metering_rx.recv() => match snapshot {
                        Some(snapshot) => self.record_metering(snapshot),
                        None => {
                            self.logger.warn("Metering feed closed");
                            break;
                        }
                    },
                    state = charger_rx.recv() => match state {
                        Some(state) => self.record_charger(state),
                        None => {
                            self.logger.warn("Charger feed closed");
                            break;
                        }
                    },
                }
            }
            self.logger.info("Control loop stopped");
        })
    }
}
