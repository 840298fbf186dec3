//! OpenEVSE stations behind the WiFi gateway
//!
//! Commands and queries are RAPI strings sent through the gateway's
//! `/r?json=1&rapi=<cmd>` endpoint with HTTP basic auth. Over MQTT the
//! gateway publishes individual readings under `<base_topic>/<name>`.

pub mod rapi;

use super::station::{ChargerControl, StationClient, StationStatus};
use crate::config::ChargerConfig;
use crate::error::{Result, SevcError};
use crate::logging::StructuredLogger;
use rapi::{CapacityInfo, ChargeReading, RapiResponse, StateInfo};

pub struct OpenEvseClient {
    http: reqwest::Client,
    base_url: String,
    address: String,
    username: String,
    password: String,
    base_topic: String,
    voltage: f64,
    logger: StructuredLogger,
}

impl OpenEvseClient {
    pub fn new(config: &ChargerConfig, voltage: f64, logger: StructuredLogger) -> Result<Self> {
        let address = config.address.trim_end_matches('/').to_string();
        Ok(Self {
            http: super::http_client(config)?,
            base_url: format!("http://{}", address),
            address,
            username: config.username.clone(),
            password: config.password.clone(),
            base_topic: config.base_topic.trim_end_matches('/').to_string(),
            voltage,
            logger,
        })
    }

    async fn rapi(&self, cmd: &str) -> Result<RapiResponse> {
        self.logger.trace(&format!("RAPI {}", cmd));
        let mut request = self
            .http
            .get(format!("{}/r", self.base_url))
            .query(&[("json", "1"), ("rapi", cmd)]);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }
        let body = request.send().await?.error_for_status()?.bytes().await?;
        let response: RapiResponse = serde_json::from_slice(&body)
            .map_err(|e| SevcError::protocol(format!("decoding reply to {}: {}", cmd, e)))?;
        response.validate()?;
        Ok(response)
    }

    pub async fn capacity_info(&self) -> Result<CapacityInfo> {
        let resp = self.rapi("$GC").await?;
        rapi::parse_capacity(&resp.ret)
    }

    pub async fn charge_reading(&self) -> Result<ChargeReading> {
        let resp = self.rapi("$GG").await?;
        rapi::parse_charge(&resp.ret)
    }

    pub async fn state_info(&self) -> Result<StateInfo> {
        let resp = self.rapi("$GS").await?;
        rapi::parse_state(&resp.ret)
    }

    /// Watts drawn at `milli_amps`, using the measured voltage when there is one
    pub fn usage_watts(&self, milli_amps: f64, milli_volts: u64) -> f64 {
        if milli_amps <= 0.0 {
            return 0.0;
        }
        let volts = if milli_volts > 0 {
            milli_volts as f64 / 1000.0
        } else {
            self.voltage
        };
        milli_amps / 1000.0 * volts
    }

    fn parse_payload<T: std::str::FromStr>(topic: &str, payload: &[u8]) -> Result<T> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| SevcError::protocol(format!("non UTF-8 payload on {}", topic)))?;
        text.trim()
            .parse()
            .map_err(|_| SevcError::protocol(format!("invalid payload on {}: {:?}", topic, text)))
    }
}

#[async_trait::async_trait]
impl ChargerControl for OpenEvseClient {
    async fn start(&self) -> Result<()> {
        self.rapi("$FE")
            .await
            .map_err(|e| e.context("enabling station"))?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.rapi("$FS")
            .await
            .map_err(|e| e.context("disabling station"))?;
        Ok(())
    }

    async fn set_amperage(&self, amps: u32) -> Result<()> {
        let resp = self
            .rapi(&format!("$SC {}", amps))
            .await
            .map_err(|e| e.context("setting amperage"))?;
        resp.expect_ok()
    }
}

#[async_trait::async_trait]
impl StationClient for OpenEvseClient {
    async fn fetch_status(&self) -> Result<StationStatus> {
        let charge = self
            .charge_reading()
            .await
            .map_err(|e| e.context("getting charge current and voltage"))?;
        let capacity = self
            .capacity_info()
            .await
            .map_err(|e| e.context("getting current capacity info"))?;
        let state = self
            .state_info()
            .await
            .map_err(|e| e.context("getting state"))?;

        Ok(StationStatus {
            enabled: state.is_enabled(),
            own_usage_w: self.usage_watts(charge.milli_amps as f64, charge.milli_volts),
            amp_setting: capacity.current_max_amps,
            identity: self.address.clone(),
            measured_mv: charge.milli_volts,
        })
    }

    fn state_topic(&self, _baseline: &StationStatus) -> Option<String> {
        (!self.base_topic.is_empty()).then(|| format!("{}/#", self.base_topic))
    }

    fn apply_message(
        &self,
        current: &StationStatus,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<StationStatus>> {
        let Some(name) = topic
            .strip_prefix(self.base_topic.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return Ok(None);
        };

        let mut status = current.clone();
        match name {
            "amp" => {
                let milli_amps: f64 = Self::parse_payload(topic, payload)?;
                status.own_usage_w = self.usage_watts(milli_amps, current.measured_mv);
            }
            "voltage" => {
                let volts: f64 = Self::parse_payload(topic, payload)?;
                if volts > 0.0 {
                    status.measured_mv = (volts * 1000.0).round() as u64;
                }
            }
            "state" => {
                let state: u64 = Self::parse_payload(topic, payload)?;
                status.enabled = rapi::is_enabled_state(state);
            }
            _ => return Ok(None),
        }
        Ok(Some(status))
    }

    async fn refresh(&self, current: &StationStatus) -> Result<Option<StationStatus>> {
        let capacity = self
            .capacity_info()
            .await
            .map_err(|e| e.context("refreshing current capacity info"))?;
        Ok(Some(StationStatus {
            amp_setting: capacity.current_max_amps,
            ..current.clone()
        }))
    }

    fn refreshes_while_subscribed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::get_logger;

    fn client() -> OpenEvseClient {
        let config = ChargerConfig {
            kind: crate::config::ChargerKind::OpenEvse,
            address: "10.0.0.7".to_string(),
            base_topic: "openevse".to_string(),
            ..Default::default()
        };
        OpenEvseClient::new(&config, 230.0, get_logger("openevse")).unwrap()
    }

    #[test]
    fn broker_messages_update_usage_and_state() {
        let client = client();
        let current = StationStatus {
            enabled: true,
            own_usage_w: 0.0,
            amp_setting: 16,
            identity: "10.0.0.7".to_string(),
            measured_mv: 0,
        };

        let next = client
            .apply_message(&current, "openevse/amp", b"10000")
            .unwrap()
            .unwrap();
        assert_eq!(next.own_usage_w, 2300.0);
        assert_eq!(next.amp_setting, 16);

        let next = client
            .apply_message(&next, "openevse/state", b"254")
            .unwrap()
            .unwrap();
        assert!(!next.enabled);

        assert_eq!(
            client
                .apply_message(&current, "openevse/temp1", b"312")
                .unwrap(),
            None
        );
        assert_eq!(
            client.apply_message(&current, "other/amp", b"1").unwrap(),
            None
        );
        assert!(
            client
                .apply_message(&current, "openevse/amp", b"lots")
                .is_err()
        );
    }

    #[test]
    fn broker_amps_use_last_measured_voltage() {
        let client = client();
        let polled = StationStatus {
            enabled: true,
            own_usage_w: 16.0 * 240.0,
            amp_setting: 16,
            identity: "10.0.0.7".to_string(),
            measured_mv: 240000,
        };

        // Same current as the poll reported, same watts
        let next = client
            .apply_message(&polled, "openevse/amp", b"16000")
            .unwrap()
            .unwrap();
        assert_eq!(next.own_usage_w, polled.own_usage_w);

        let next = client
            .apply_message(&next, "openevse/voltage", b"235")
            .unwrap()
            .unwrap();
        assert_eq!(next.measured_mv, 235000);
        let next = client
            .apply_message(&next, "openevse/amp", b"10000")
            .unwrap()
            .unwrap();
        assert_eq!(next.own_usage_w, 2350.0);
    }

    #[test]
    fn usage_prefers_measured_voltage() {
        let client = client();
        assert_eq!(client.usage_watts(16000.0, 240000), 16.0 * 240.0);
        assert_eq!(client.usage_watts(16000.0, 0), 16.0 * 230.0);
        assert_eq!(client.usage_watts(0.0, 240000), 0.0);
        assert_eq!(client.state_topic(&StationStatus::default()).unwrap(), "openevse/#");
    }
}
