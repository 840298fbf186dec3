use solar_ev_charger::config::{
    ChargerKind, Config, Consumer, InputSensor, TransportMode,
};
use solar_ev_charger::error::SevcError;
use std::fs;

fn valid_config() -> Config {
    let mut cfg = Config::default();
    cfg.input_sensors.push(InputSensor {
        service: "com.victronenergy.pvinverter.pv0".to_string(),
        path: "/Ac/Power".to_string(),
        multiplier: 1.0,
    });
    cfg.consumers.push(Consumer {
        service: "com.victronenergy.grid.cgwacs_ttyUSB0".to_string(),
        path: "/Ac/L1/Power".to_string(),
    });
    cfg.charger.address = "192.168.1.50".to_string();
    cfg
}

#[test]
fn yaml_roundtrip_through_file() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = valid_config();
    cfg.charger.kind = ChargerKind::OpenEvse;
    cfg.charger.transport = TransportMode::Mqtt;
    cfg.charger.mqtt.host = "10.0.0.2".to_string();
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    fs::write(&path, serde_yaml::to_string(&cfg).unwrap()).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.charger.kind, ChargerKind::OpenEvse);
    assert_eq!(loaded.charger.transport, TransportMode::Mqtt);
    assert_eq!(loaded.charger.mqtt.host, "10.0.0.2");
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert!(loaded.validate().is_ok());
}

#[test]
fn minimal_yaml_takes_defaults() {
    let yaml = r#"
electrical_pressure: 240
input_sensors:
  - service: com.victronenergy.pvinverter.pv0
    path: /Ac/Power
    multiplier: 3.5
consumers:
  - service: com.victronenergy.grid.cgwacs_ttyUSB0
    path: /Ac/L1/Power
charger:
  kind: go_echarger
  address: 192.168.1.60
"#;
    let cfg = Config::from_yaml(yaml).unwrap();
    assert_eq!(cfg.electrical_pressure, 240);
    assert_eq!(cfg.input_sensors[0].multiplier, 3.5);
    assert_eq!(cfg.charger.kind, ChargerKind::GoECharger);
    assert_eq!(cfg.charger.transport, TransportMode::Polling);
    assert_eq!(cfg.max_amp_limit, 16);
    assert_eq!(cfg.backoff_interval, 30);
    assert!(cfg.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    let mut cfg = valid_config();
    cfg.input_sensors.clear();
    assert!(cfg.validate().is_err());

    cfg = valid_config();
    cfg.min_amp_threshold = 20;
    assert!(cfg.validate().is_err());

    cfg = valid_config();
    cfg.backoff_interval = 0;
    assert!(cfg.validate().is_err());

    cfg = valid_config();
    cfg.charger.address = "http://192.168.1.50".to_string();
    assert!(cfg.validate().is_err());

    cfg = valid_config();
    cfg.consumers[0].path = "Ac/L1/Power".to_string();
    assert!(cfg.validate().is_err());

    cfg = valid_config();
    cfg.logging.level = "LOUD".to_string();
    assert!(cfg.validate().is_err());

    cfg = valid_config();
    cfg.charger.kind = ChargerKind::OpenEvse;
    cfg.charger.transport = TransportMode::Mqtt;
    cfg.charger.mqtt.host = "10.0.0.2".to_string();
    cfg.charger.base_topic.clear();
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn from_file_missing_is_io_error() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(tmp_dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("I/O error"));
}

#[test]
fn zero_reconnect_delay_is_rejected() {
    let yaml = r#"
input_sensors:
  - service: com.victronenergy.pvinverter.pv0
    path: /Ac/Power
consumers:
  - service: com.victronenergy.grid.cgwacs_ttyUSB0
    path: /Ac/L1/Power
charger:
  kind: go_echarger
  address: 192.168.1.60
  transport: mqtt
  reconnect_delay_secs: 0
  mqtt:
    host: 10.0.0.2
"#;
    let cfg = Config::from_yaml(yaml).unwrap();
    match cfg.validate().unwrap_err() {
        SevcError::Validation { field, .. } => {
            assert_eq!(field, "charger.reconnect_delay_secs")
        }
        other => panic!("unexpected error: {}", other),
    }
}
