//! go-eCharger HTTP API v1
//!
//! `GET /status` returns the full station state as JSON. Settings are
//! changed through `GET /mqtt?payload=<key>=<value>`. When the station is
//! connected to a broker it publishes the same JSON document on
//! `go-eCharger/<serial>/status`.

use super::station::{ChargerControl, StationClient, StationStatus};
use crate::config::ChargerConfig;
use crate::error::{Result, SevcError};
use crate::logging::StructuredLogger;
use serde::{Deserialize, Deserializer};

/// The fields of the status document we use
#[derive(Debug, Clone, Deserialize)]
pub struct GoEStatus {
    /// Energy sensors; indices 4..=6 are the phase currents in 0.1 A
    #[serde(default)]
    pub nrg: Vec<i64>,
    /// Serial number
    #[serde(default)]
    pub sse: String,
    /// Configured amperage
    #[serde(deserialize_with = "int_or_string")]
    pub amp: u32,
    /// Charging allowed (1) or not (0)
    #[serde(deserialize_with = "int_or_string")]
    pub alw: u32,
}

// The firmware encodes most integers as strings
fn int_or_string<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid integer {:?}: {}", s, e))),
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid integer {}", n))),
        other => Err(D::Error::custom(format!("expected integer, got {}", other))),
    }
}

impl GoEStatus {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| SevcError::protocol(format!("decoding go-eCharger status: {}", e)))
    }

    /// Own draw in watts from the per-phase currents
    pub fn usage_watts(&self, voltage: f64) -> f64 {
        let deci_amps: i64 = self.nrg.iter().skip(4).take(3).sum();
        if deci_amps <= 0 {
            return 0.0;
        }
        deci_amps as f64 / 10.0 * voltage
    }

    pub fn to_status(&self, voltage: f64) -> StationStatus {
        StationStatus {
            enabled: self.alw == 1,
            own_usage_w: self.usage_watts(voltage),
            amp_setting: self.amp,
            identity: self.sse.clone(),
            measured_mv: 0,
        }
    }
}

pub struct GoEChargerClient {
    http: reqwest::Client,
    base_url: String,
    voltage: f64,
    logger: StructuredLogger,
}

impl GoEChargerClient {
    pub fn new(config: &ChargerConfig, voltage: f64, logger: StructuredLogger) -> Result<Self> {
        Ok(Self {
            http: super::http_client(config)?,
            base_url: format!("http://{}", config.address.trim_end_matches('/')),
            voltage,
            logger,
        })
    }

    async fn send_setting(&self, key: &str, value: u32) -> Result<()> {
        let payload = format!("{}={}", key, value);
        self.logger.debug(&format!("Sending {}", payload));
        self.http
            .get(format!("{}/mqtt", self.base_url))
            .query(&[("payload", payload.as_str())])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SevcError::network(format!("setting {}: {}", payload, e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChargerControl for GoEChargerClient {
    async fn start(&self) -> Result<()> {
        self.send_setting("alw", 1).await
    }

    async fn stop(&self) -> Result<()> {
        self.send_setting("alw", 0).await
    }

    async fn set_amperage(&self, amps: u32) -> Result<()> {
        self.send_setting("amp", amps).await
    }
}

#[async_trait::async_trait]
impl StationClient for GoEChargerClient {
    async fn fetch_status(&self) -> Result<StationStatus> {
        let body = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(GoEStatus::parse(&body)?.to_status(self.voltage))
    }

    fn state_topic(&self, baseline: &StationStatus) -> Option<String> {
        (!baseline.identity.is_empty()).then(|| format!("go-eCharger/{}/status", baseline.identity))
    }

    fn apply_message(
        &self,
        current: &StationStatus,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<StationStatus>> {
        if self.state_topic(current).as_deref() != Some(topic) {
            return Ok(None);
        }
        let mut status = GoEStatus::parse(payload)?.to_status(self.voltage);
        if status.identity.is_empty() {
            status.identity = current.identity.clone();
        }
        Ok(Some(status))
    }
}
