//! Configuration management for sevc
//!
//! This module handles loading and validation of the application
//! configuration from YAML files. The loaded configuration is treated as an
//! immutable snapshot for the lifetime of the process.

use crate::error::{Result, SevcError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Grid voltage used to convert watts into amps
    pub electrical_pressure: u32,

    /// D-Bus items measuring power production
    pub input_sensors: Vec<InputSensor>,

    /// D-Bus items measuring power consumption (including the station)
    pub consumers: Vec<Consumer>,

    /// Maximum amperage we will ever set on the station
    pub max_amp_limit: u32,

    /// Lowest amperage set on the station while it is enabled
    pub min_amp_threshold: u32,

    /// Available amps at or below which charging is disabled
    pub disable_charging_threshold: u32,

    /// Available amps at or above which charging is enabled
    pub enable_charging_threshold: u32,

    /// Whether the station is switched on and off automatically
    pub toggle_station_on_threshold: bool,

    /// Seconds between two control decisions. Metering updates arrive
    /// frequently and vary with cloud cover, so we do not act on each one.
    pub backoff_interval: u64,

    /// Charging station connection
    pub charger: ChargerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// A D-Bus item gauging power production
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSensor {
    /// D-Bus service name, e.g. `com.victronenergy.pvinverter.pv0`
    pub service: String,

    /// Object path of the item, e.g. `/Ac/Power`
    pub path: String,

    /// Multiplier for the raw sensor value.
    ///
    /// A single sensor often measures only part of the installation (one
    /// string, or a reference cell reporting volts). Set this to the number
    /// of watts the whole system produces per unit the sensor reports.
    /// Zero is treated as one.
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,
}

/// A D-Bus item gauging power consumption
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Consumer {
    /// D-Bus service name, e.g. `com.victronenergy.grid.cgwacs_ttyUSB0`
    pub service: String,

    /// Object path of the item
    pub path: String,
}

/// Supported charging station protocols
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChargerKind {
    /// go-eCharger HTTP API v1
    #[serde(rename = "go_echarger", alias = "go-echarger")]
    GoECharger,
    /// OpenEVSE WiFi gateway speaking RAPI over HTTP
    #[serde(rename = "openevse", alias = "open_evse")]
    OpenEvse,
}

/// How station state is obtained
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Periodically request the status endpoint
    Polling,
    /// Subscribe to the topics the station publishes to an MQTT broker
    Mqtt,
}

/// Charging station connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargerConfig {
    /// Station protocol
    pub kind: ChargerKind,

    /// Host (and optional port) of the station API
    pub address: String,

    /// HTTP basic auth user (OpenEVSE)
    pub username: String,

    /// HTTP basic auth password (OpenEVSE)
    pub password: String,

    /// Polling or MQTT subscription
    pub transport: TransportMode,

    /// Seconds between status requests
    pub poll_interval_secs: u64,

    /// Seconds to wait before reconnecting to the broker
    pub reconnect_delay_secs: u64,

    /// Base topic the OpenEVSE gateway publishes under
    pub base_topic: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// MQTT broker settings
    pub mqtt: MqttConfig,
}

/// MQTT broker parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or IP
    pub host: String,

    /// Broker TCP port
    pub port: u16,

    /// Client identifier; generated when empty
    pub client_id: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Log file path or directory; empty logs to console only
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.normalize();
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "sevc_config.yaml",
            "/data/sevc_config.yaml",
            "/etc/sevc/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Err(SevcError::config(format!(
            "no configuration file found (searched {})",
            default_paths.join(", ")
        )))
    }

    /// Fill in values left at zero that have a sensible meaning
    pub fn normalize(&mut self) {
        for sensor in &mut self.input_sensors {
            if sensor.multiplier == 0.0 {
                sensor.multiplier = 1.0;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.consumers.is_empty() {
            return Err(SevcError::validation("consumers", "no consumers defined"));
        }

        if self.input_sensors.is_empty() {
            return Err(SevcError::validation(
                "input_sensors",
                "no input sensors defined",
            ));
        }

        if self.electrical_pressure == 0 {
            return Err(SevcError::validation(
                "electrical_pressure",
                "Must be greater than 0",
            ));
        }

        // Snapshots and bus signals are keyed by object path
        let mut seen = HashSet::new();
        for (service, path) in self
            .consumers
            .iter()
            .map(|c| (&c.service, &c.path))
            .chain(self.input_sensors.iter().map(|s| (&s.service, &s.path)))
        {
            if service.is_empty() || !path.starts_with('/') {
                return Err(SevcError::validation(
                    "consumers/input_sensors".to_string(),
                    format!("invalid D-Bus item {}:{}", service, path),
                ));
            }
            if !seen.insert(path.as_str()) {
                return Err(SevcError::validation(
                    "consumers/input_sensors".to_string(),
                    format!("path {} is configured more than once", path),
                ));
            }
        }

        if self.min_amp_threshold > self.max_amp_limit {
            return Err(SevcError::validation(
                "min_amp_threshold",
                "Must not exceed max_amp_limit",
            ));
        }

        if self.disable_charging_threshold >= self.enable_charging_threshold {
            return Err(SevcError::validation(
                "disable_charging_threshold",
                "Must be lower than enable_charging_threshold",
            ));
        }

        if self.backoff_interval == 0 {
            return Err(SevcError::validation(
                "backoff_interval",
                "Must be greater than 0",
            ));
        }

        if self.charger.address.trim().is_empty() {
            return Err(SevcError::validation(
                "charger.address",
                "Station address cannot be empty",
            ));
        }

        if self.charger.address.contains("://") {
            return Err(SevcError::validation(
                "charger.address",
                "Use a bare host[:port] without scheme",
            ));
        }

        if self.charger.poll_interval_secs == 0 {
            return Err(SevcError::validation(
                "charger.poll_interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.charger.reconnect_delay_secs == 0 {
            return Err(SevcError::validation(
                "charger.reconnect_delay_secs",
                "Must be greater than 0",
            ));
        }

        if self.charger.transport == TransportMode::Mqtt {
            if self.charger.mqtt.host.trim().is_empty() {
                return Err(SevcError::validation(
                    "charger.mqtt.host",
                    "Broker host is required for mqtt transport",
                ));
            }
            if self.charger.mqtt.port == 0 {
                return Err(SevcError::validation(
                    "charger.mqtt.port",
                    "Port must be greater than 0",
                ));
            }
            if self.charger.kind == ChargerKind::OpenEvse
                && self.charger.base_topic.trim().is_empty()
            {
                return Err(SevcError::validation(
                    "charger.base_topic",
                    "Base topic is required for OpenEVSE over mqtt",
                ));
            }
        }

        crate::logging::parse_log_level(&self.logging.level).map_err(|_| {
            SevcError::validation(
                "logging.level".to_string(),
                format!("unknown level {}", self.logging.level),
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            input_sensors: vec![InputSensor {
                service: "com.victronenergy.pvinverter.pv0".to_string(),
                path: "/Ac/Power".to_string(),
                multiplier: 1.0,
            }],
            consumers: vec![Consumer {
                service: "com.victronenergy.grid.cgwacs_ttyUSB0".to_string(),
                path: "/Ac/L1/Power".to_string(),
            }],
            charger: ChargerConfig {
                address: "192.168.1.50".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.electrical_pressure, 230);
        assert_eq!(config.backoff_interval, 30);
        assert_eq!(config.charger.poll_interval_secs, 5);
        assert_eq!(config.charger.reconnect_delay_secs, 5);
        assert!(config.toggle_station_on_threshold);
    }

    #[test]
    fn test_config_validation() {
        let config = valid_config();
        assert!(config.validate().is_ok());

        let mut config = valid_config();
        config.consumers.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.electrical_pressure = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.charger.address = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn thresholds_must_leave_a_dead_band() {
        let mut config = valid_config();
        config.disable_charging_threshold = 8;
        config.enable_charging_threshold = 8;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("disable_charging_threshold"));
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut config = valid_config();
        config.consumers.push(Consumer {
            service: "com.victronenergy.acload.cg_1".to_string(),
            path: "/Ac/Power".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn mqtt_transport_requires_broker() {
        let mut config = valid_config();
        config.charger.transport = TransportMode::Mqtt;
        config.charger.mqtt.host = String::new();
        assert!(config.validate().is_err());
        config.charger.mqtt.host = "192.168.1.2".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_multiplier_is_normalized() {
        let yaml = r#"
input_sensors:
  - service: com.victronenergy.pvinverter.pv0
    path: /Ac/Power
    multiplier: 0
consumers:
  - service: com.victronenergy.grid.cgwacs_ttyUSB0
    path: /Ac/L1/Power
charger:
  kind: openevse
  address: 10.0.0.7
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.input_sensors[0].multiplier, 1.0);
        assert_eq!(config.charger.kind, ChargerKind::OpenEvse);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = valid_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.input_sensors, deserialized.input_sensors);
        assert_eq!(config.charger.address, deserialized.charger.address);
    }
}
