//! Keeps a normalized view of the charging station
//!
//! The manager fetches one authoritative baseline, then follows the station
//! either by polling its status endpoint or through a broker subscription,
//! publishing a [`ChargerState`] for every reading it parses.

use super::mqtt::{TopicEvent, TopicSession, TopicSubscriber};
use super::station::{ChargerControl, StationClient, StationCommands, StationStatus};
use crate::config::{ChargerConfig, TransportMode};
use crate::error::{Result, SevcError};
use crate::logging::StructuredLogger;
use crate::snapshot::ChargerState;
use crate::worker::{PUBLISH_TIMEOUT, WorkerHandle, publish};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OnceCell, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Broker link as seen by the subscription loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

enum SessionStep {
    Quit,
    Event(TopicEvent),
    Refresh,
}

pub struct ChargerManager {
    client: Arc<dyn StationClient>,
    subscriber: Option<Arc<dyn TopicSubscriber>>,
    transport: TransportMode,
    poll_interval: Duration,
    reconnect_delay: Duration,
    publish_timeout: Duration,
    baseline: OnceCell<StationStatus>,
    latest: Mutex<Option<StationStatus>>,
    link: watch::Sender<LinkState>,
    logger: StructuredLogger,
}

impl ChargerManager {
    pub fn new(
        client: Arc<dyn StationClient>,
        config: &ChargerConfig,
        subscriber: Option<Arc<dyn TopicSubscriber>>,
        logger: StructuredLogger,
    ) -> Self {
        let (link, _) = watch::channel(LinkState::Disconnected);
        Self {
            client,
            subscriber,
            transport: config.transport,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs.max(1)),
            publish_timeout: PUBLISH_TIMEOUT,
            baseline: OnceCell::new(),
            latest: Mutex::new(None),
            link,
            logger,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Command surface for the control loop
    pub fn commands(&self) -> Arc<dyn ChargerControl> {
        Arc::new(StationCommands(self.client.clone()))
    }

    /// Follow the broker link state
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.subscribe()
    }

    /// Most recent successfully parsed status
    pub fn latest(&self) -> Option<StationStatus> {
        self.latest.lock().ok().and_then(|s| s.clone())
    }

    fn remember(&self, status: &StationStatus) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(status.clone());
        }
    }

    fn set_link(&self, state: LinkState) {
        let previous = self.link.send_replace(state);
        if previous != state {
            self.logger
                .debug(&format!("Link state {:?} -> {:?}", previous, state));
        }
    }

    /// Fetch the baseline status once. Later calls return the stored value.
    pub async fn init_state(&self) -> Result<StationStatus> {
        let baseline = self
            .baseline
            .get_or_try_init(|| async {
                let status = self.client.fetch_status().await?;
                self.remember(&status);
                Ok::<_, SevcError>(status)
            })
            .await?;
        Ok(baseline.clone())
    }

    /// Fetch the baseline and spawn the polling or subscription loop
    pub async fn start(
        mut self,
        parent: &CancellationToken,
        tx: mpsc::Sender<ChargerState>,
    ) -> Result<WorkerHandle> {
        let baseline = self
            .init_state()
            .await
            .map_err(|e| e.context("initializing station state"))?;
        if !baseline.identity.is_empty() {
            self.logger = self.logger.with_station(&baseline.identity);
        }
        self.logger.info(&format!(
            "Station baseline: enabled={}, amps={}, usage={:.0}W",
            baseline.enabled, baseline.amp_setting, baseline.own_usage_w
        ));

        let transport = self.transport;
        match transport {
            TransportMode::Polling => Ok(WorkerHandle::spawn("charger", parent, move |quit| {
                async move { self.run_polling(quit, tx, baseline).await }
            })),
            TransportMode::Mqtt => {
                let subscriber = self
                    .subscriber
                    .clone()
                    .ok_or_else(|| SevcError::config("mqtt transport without a subscriber"))?;
                let topic = self.client.state_topic(&baseline).ok_or_else(|| {
                    SevcError::config("station does not provide a state topic")
                })?;
                Ok(WorkerHandle::spawn("charger", parent, move |quit| async move {
                    self.run_subscribed(quit, tx, subscriber, topic, baseline)
                        .await
                }))
            }
        }
    }

    /// Publish a state, giving up early on cancellation. Returns false when
    /// the worker should quit.
    async fn send_state(
        &self,
        tx: &mpsc::Sender<ChargerState>,
        status: &StationStatus,
        quit: &CancellationToken,
    ) -> bool {
        let state = ChargerState::from(status);
        tokio::select! {
            _ = quit.cancelled() => false,
            res = publish(tx, state, self.publish_timeout) => {
                if let Err(e) = res {
                    self.logger.warn(&format!("Dropping charger state: {}", e));
                }
                true
            }
        }
    }

    async fn run_polling(
        self,
        quit: CancellationToken,
        tx: mpsc::Sender<ChargerState>,
        baseline: StationStatus,
    ) {
        self.logger.info(&format!(
            "Polling station every {}s",
            self.poll_interval.as_secs_f64()
        ));
        if self.send_state(&tx, &baseline, &quit).await {
            let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = quit.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.client.fetch_status().await {
                            Ok(status) => {
                                self.remember(&status);
                                if !self.send_state(&tx, &status, &quit).await {
                                    break;
                                }
                            }
                            Err(e) => self.logger.error(&format!("Failed to fetch status: {}", e)),
                        }
                    }
                }
            }
        }
        self.logger.info("Charger manager stopped");
    }

    async fn run_subscribed(
        self,
        quit: CancellationToken,
        tx: mpsc::Sender<ChargerState>,
        subscriber: Arc<dyn TopicSubscriber>,
        topic: String,
        baseline: StationStatus,
    ) {
        let refreshes = self.client.refreshes_while_subscribed();
        let mut refresh = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut session: Option<Box<dyn TopicSession>> = None;

        if !self.send_state(&tx, &baseline, &quit).await {
            self.set_link(LinkState::Disconnected);
            return;
        }

        loop {
            let Some(active) = session.as_mut() else {
                self.set_link(LinkState::Connecting);
                let attempt = tokio::select! {
                    _ = quit.cancelled() => break,
                    res = subscriber.subscribe(&topic) => res,
                };
                match attempt {
                    Ok(s) => {
                        session = Some(s);
                        self.set_link(LinkState::Connected);
                    }
                    Err(e) => {
                        self.set_link(LinkState::Disconnected);
                        self.logger.error(&format!(
                            "Failed to subscribe to {}: {}; retrying in {}s",
                            topic,
                            e,
                            self.reconnect_delay.as_secs_f64()
                        ));
                        if !self.wait_reconnect(&quit).await {
                            break;
                        }
                    }
                }
                continue;
            };

            let step = tokio::select! {
                _ = quit.cancelled() => SessionStep::Quit,
                event = active.next_event() => SessionStep::Event(event),
                _ = refresh.tick(), if refreshes => SessionStep::Refresh,
            };

            match step {
                SessionStep::Quit => break,
                SessionStep::Event(TopicEvent::Message { topic, payload }) => {
                    if let Some(status) = self.apply_message(&topic, &payload)
                        && !self.send_state(&tx, &status, &quit).await
                    {
                        break;
                    }
                }
                SessionStep::Event(TopicEvent::Disconnected(reason)) => {
                    session = None;
                    self.set_link(LinkState::Disconnected);
                    self.logger.warn(&format!(
                        "Connection to broker lost: {}; reconnecting in {}s",
                        reason,
                        self.reconnect_delay.as_secs_f64()
                    ));
                    if !self.wait_reconnect(&quit).await {
                        break;
                    }
                }
                SessionStep::Refresh => {
                    let Some(current) = self.latest() else {
                        continue;
                    };
                    match self.client.refresh(&current).await {
                        Ok(Some(status)) => {
                            self.remember(&status);
                            if !self.send_state(&tx, &status, &quit).await {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => self.logger.error(&format!("Failed to refresh status: {}", e)),
                    }
                }
            }
        }

        if let Some(mut active) = session.take() {
            active.close().await;
        }
        self.set_link(LinkState::Disconnected);
        self.logger.info("Charger manager stopped");
    }

    fn apply_message(&self, topic: &str, payload: &[u8]) -> Option<StationStatus> {
        let current = self.latest()?;
        match self.client.apply_message(&current, topic, payload) {
            Ok(Some(status)) => {
                self.remember(&status);
                Some(status)
            }
            Ok(None) => {
                self.logger.trace(&format!("Ignoring message on {}", topic));
                None
            }
            Err(e) => {
                self.logger
                    .error(&format!("Failed to decode message on {}: {}", topic, e));
                None
            }
        }
    }

    async fn wait_reconnect(&self, quit: &CancellationToken) -> bool {
        tokio::select! {
            _ = quit.cancelled() => false,
            _ = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }
}
