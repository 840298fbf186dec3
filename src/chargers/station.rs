use crate::error::Result;
use crate::snapshot::ChargerState;
use std::sync::Arc;

/// What a station reports about itself, independent of its protocol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationStatus {
    /// Charging is allowed
    pub enabled: bool,
    /// Station's own draw in watts
    pub own_usage_w: f64,
    /// Configured maximum amperage
    pub amp_setting: u32,
    /// Serial number or address identifying the station
    pub identity: String,
    /// Last supply voltage the station measured, in mV. Zero when unknown.
    pub measured_mv: u64,
}

impl From<&StationStatus> for ChargerState {
    fn from(status: &StationStatus) -> Self {
        ChargerState {
            active: status.enabled,
            current_usage: status.own_usage_w,
            current_amp_setting: f64::from(status.amp_setting),
        }
    }
}

/// Commands the control loop may send to the station.
/// Each is a single network call; failures are returned, not retried.
#[async_trait::async_trait]
pub trait ChargerControl: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn set_amperage(&self, amps: u32) -> Result<()>;
}

/// A station protocol
#[async_trait::async_trait]
pub trait StationClient: ChargerControl {
    /// Read the full status over the station's request/response API
    async fn fetch_status(&self) -> Result<StationStatus>;

    /// Topic filter to subscribe to, derived from the baseline status.
    /// `None` means the station cannot be followed over MQTT.
    fn state_topic(&self, baseline: &StationStatus) -> Option<String>;

    /// Fold one broker message into the current status.
    /// `Ok(None)` means the message carried nothing of interest.
    fn apply_message(
        &self,
        current: &StationStatus,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<StationStatus>>;

    /// Fill in what the broker does not publish
    async fn refresh(&self, _current: &StationStatus) -> Result<Option<StationStatus>> {
        Ok(None)
    }

    /// Whether [`StationClient::refresh`] should run every poll interval
    /// while subscribed
    fn refreshes_while_subscribed(&self) -> bool {
        false
    }
}

/// Command-only view of a station client
pub struct StationCommands(pub Arc<dyn StationClient>);

#[async_trait::async_trait]
impl ChargerControl for StationCommands {
    async fn start(&self) -> Result<()> {
        self.0.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.0.stop().await
    }

    async fn set_amperage(&self, amps: u32) -> Result<()> {
        self.0.set_amperage(amps).await
    }
}
