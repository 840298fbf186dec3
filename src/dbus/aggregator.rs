use super::bus::{ChangeBatch, PowerBus};
use super::values::value_as_f64;
use crate::config::{Config, Consumer, InputSensor};
use crate::error::{Result, SevcError};
use crate::logging::StructuredLogger;
use crate::snapshot::MeteringSnapshot;
use crate::worker::{PUBLISH_TIMEOUT, WorkerHandle, publish};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Keeps the latest reading of every configured producer and consumer and
/// publishes a full [`MeteringSnapshot`] whenever one of them changes.
pub struct MeteringAggregator {
    bus: Arc<dyn PowerBus>,
    producers: Vec<InputSensor>,
    consumers: Vec<Consumer>,
    state: Mutex<MeteringSnapshot>,
    publish_timeout: Duration,
    logger: StructuredLogger,
}

impl MeteringAggregator {
    pub fn new(bus: Arc<dyn PowerBus>, config: &Config, logger: StructuredLogger) -> Self {
        Self {
            bus,
            producers: config.input_sensors.clone(),
            consumers: config.consumers.clone(),
            state: Mutex::new(MeteringSnapshot::default()),
            publish_timeout: PUBLISH_TIMEOUT,
            logger,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Copy of the cached readings
    pub fn snapshot(&self) -> MeteringSnapshot {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    async fn fetch_reading(&self, service: &str, path: &str) -> Result<f64> {
        let raw = self
            .bus
            .get_value(service, path)
            .await
            .map_err(|e| e.context(&format!("fetching {}{}", service, path)))?;
        value_as_f64(&raw).ok_or_else(|| {
            SevcError::dbus(format!(
                "invalid value {} for {}{}: not a number",
                raw, service, path
            ))
        })
    }

    /// Read every configured item once. Any failure aborts initialization.
    pub async fn init_state(&self) -> Result<()> {
        let mut fresh = MeteringSnapshot::default();

        for consumer in &self.consumers {
            let value = self.fetch_reading(&consumer.service, &consumer.path).await?;
            fresh.consumers.insert(consumer.path.clone(), value);
        }

        for sensor in &self.producers {
            let value = self.fetch_reading(&sensor.service, &sensor.path).await?;
            fresh
                .producers
                .insert(sensor.path.clone(), value * sensor.multiplier);
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| SevcError::generic("metering state lock poisoned"))?;
        *state = fresh;
        Ok(())
    }

    /// Merge one signal batch into the cache. Returns whether anything changed.
    pub fn apply_changes(&self, batch: &ChangeBatch) -> bool {
        let Ok(mut state) = self.state.lock() else {
            self.logger.error("Metering state lock poisoned; dropping batch");
            return false;
        };
        let mut changed = false;

        for (path, raw) in batch {
            if self.consumers.iter().any(|c| &c.path == path) {
                let Some(value) = value_as_f64(raw) else {
                    self.logger
                        .warn(&format!("Invalid value for {}: {}", path, raw));
                    continue;
                };
                if let Some(current) = state.consumers.get_mut(path)
                    && *current != value
                {
                    *current = value;
                    changed = true;
                }
            } else if let Some(sensor) = self.producers.iter().find(|s| &s.path == path) {
                let Some(value) = value_as_f64(raw) else {
                    self.logger
                        .warn(&format!("Invalid value for {}: {}", path, raw));
                    continue;
                };
                let value = value * sensor.multiplier;
                if let Some(current) = state.producers.get_mut(path)
                    && *current != value
                {
                    *current = value;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Fetch the baseline, subscribe to changes and spawn the worker.
    ///
    /// The baseline is published once so the control loop does not have to
    /// wait for the first change.
    pub async fn start(
        self,
        parent: &CancellationToken,
        tx: mpsc::Sender<MeteringSnapshot>,
    ) -> Result<WorkerHandle> {
        self.init_state()
            .await
            .map_err(|e| e.context("initializing metering state"))?;
        let mut changes = self.bus.watch_items().await?;
        self.logger.info(&format!(
            "Watching {} producers and {} consumers",
            self.producers.len(),
            self.consumers.len()
        ));

        Ok(WorkerHandle::spawn("aggregator", parent, move |quit| async move {
            let mut pending = Some(self.snapshot());
            loop {
                if let Some(snapshot) = pending.take() {
                    tokio::select! {
                        _ = quit.cancelled() => break,
                        res = publish(&tx, snapshot, self.publish_timeout) => {
                            if let Err(e) = res {
                                self.logger.warn(&format!("Dropping metering snapshot: {}", e));
                            }
                        }
                    }
                }

                tokio::select! {
                    _ = quit.cancelled() => break,
                    batch = changes.next() => match batch {
                        Some(batch) => {
                            if self.apply_changes(&batch) {
                                pending = Some(self.snapshot());
                            }
                        }
                        None => {
                            self.logger.error("Bus signal stream ended");
                            break;
                        }
                    }
                }
            }

            drop(changes);
            if let Err(e) = self.bus.close().await {
                self.logger.warn(&format!("Closing bus: {}", e));
            }
            self.logger.info("Metering aggregator stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::get_logger;
    use std::collections::HashMap;

    struct StaticBus(HashMap<String, serde_json::Value>);

    #[async_trait::async_trait]
    impl PowerBus for StaticBus {
        async fn get_value(&self, _service: &str, path: &str) -> Result<serde_json::Value> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| SevcError::dbus(format!("no such item {}", path)))
        }

        async fn watch_items(&self) -> Result<super::super::ChangeStream> {
            Ok(Box::pin(tokio_stream::empty()))
        }
    }

    fn config() -> Config {
        Config {
            input_sensors: vec![InputSensor {
                service: "com.victronenergy.pvinverter.pv0".to_string(),
                path: "/Ac/Power".to_string(),
                multiplier: 2.0,
            }],
            consumers: vec![Consumer {
                service: "com.victronenergy.grid.cgwacs_ttyUSB0".to_string(),
                path: "/Ac/L1/Power".to_string(),
            }],
            ..Default::default()
        }
    }

    fn aggregator(values: &[(&str, serde_json::Value)]) -> MeteringAggregator {
        let bus = StaticBus(
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        );
        MeteringAggregator::new(Arc::new(bus), &config(), get_logger("aggregator"))
    }

    #[tokio::test]
    async fn init_applies_multiplier() {
        let agg = aggregator(&[
            ("/Ac/Power", serde_json::json!(1500)),
            ("/Ac/L1/Power", serde_json::json!(800.5)),
        ]);
        agg.init_state().await.unwrap();
        let snap = agg.snapshot();
        assert_eq!(snap.producers["/Ac/Power"], 3000.0);
        assert_eq!(snap.consumers["/Ac/L1/Power"], 800.5);
    }

    #[tokio::test]
    async fn init_rejects_non_numeric_value() {
        let agg = aggregator(&[
            ("/Ac/Power", serde_json::json!([])),
            ("/Ac/L1/Power", serde_json::json!(800)),
        ]);
        assert!(agg.init_state().await.is_err());
    }

    #[tokio::test]
    async fn unchanged_and_unknown_paths_do_not_count() {
        let agg = aggregator(&[
            ("/Ac/Power", serde_json::json!(1000)),
            ("/Ac/L1/Power", serde_json::json!(400)),
        ]);
        agg.init_state().await.unwrap();

        let batch = HashMap::from([
            ("/Ac/L1/Power".to_string(), serde_json::json!(400)),
            ("/Dc/Battery/Soc".to_string(), serde_json::json!(80)),
        ]);
        assert!(!agg.apply_changes(&batch));

        let batch = HashMap::from([
            ("/Ac/Power".to_string(), serde_json::json!("bogus")),
            ("/Ac/L1/Power".to_string(), serde_json::json!(450)),
        ]);
        assert!(agg.apply_changes(&batch));
        let snap = agg.snapshot();
        assert_eq!(snap.producers["/Ac/Power"], 2000.0);
        assert_eq!(snap.consumers["/Ac/L1/Power"], 450.0);
    }
}
