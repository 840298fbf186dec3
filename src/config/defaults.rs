use super::*;

pub(super) fn multiplier() -> f64 {
    1.0
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            kind: ChargerKind::GoECharger,
            address: String::new(),
            username: String::new(),
            password: String::new(),
            transport: TransportMode::Polling,
            poll_interval_secs: 5,
            reconnect_delay_secs: 5,
            base_topic: "openevse".to_string(),
            request_timeout_secs: 10,
            mqtt: MqttConfig::default(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            client_id: String::new(),
            username: None,
            password: None,
            keep_alive_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: String::new(),
            backup_count: 2,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            electrical_pressure: 230,
            input_sensors: Vec::new(),
            consumers: Vec::new(),
            max_amp_limit: 16,
            min_amp_threshold: 6,
            disable_charging_threshold: 6,
            enable_charging_threshold: 8,
            toggle_station_on_threshold: true,
            backoff_interval: 30,
            charger: ChargerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
