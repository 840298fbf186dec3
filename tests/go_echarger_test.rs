use solar_ev_charger::chargers::{ChargerControl, GoEChargerClient, StationClient};
use solar_ev_charger::config::{ChargerConfig, ChargerKind};
use solar_ev_charger::logging::get_logger;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GoEChargerClient {
    let config = ChargerConfig {
        kind: ChargerKind::GoECharger,
        address: server.address().to_string(),
        request_timeout_secs: 2,
        ..Default::default()
    };
    GoEChargerClient::new(&config, 230.0, get_logger("go-echarger")).unwrap()
}

#[tokio::test]
async fn fetches_and_normalizes_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sse": "009876",
            "amp": "10",
            "alw": "1",
            "nrg": [231, 230, 229, 2, 100, 0, 0, 0, 0, 0, 0, 230, 0, 0, 0, 0]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let status = client.fetch_status().await.unwrap();
    assert!(status.enabled);
    assert_eq!(status.amp_setting, 10);
    assert_eq!(status.identity, "009876");
    assert_eq!(status.own_usage_w, 2300.0);
    assert_eq!(
        client.state_topic(&status).as_deref(),
        Some("go-eCharger/009876/status")
    );
}

#[tokio::test]
async fn commands_use_the_settings_endpoint() {
    let server = MockServer::start().await;
    for payload in ["alw=1", "alw=0", "amp=12"] {
        Mock::given(method("GET"))
            .and(path("/mqtt"))
            .and(query_param("payload", payload))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client(&server);
    client.start().await.unwrap();
    client.stop().await.unwrap();
    client.set_amperage(12).await.unwrap();
}

#[tokio::test]
async fn http_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.fetch_status().await.is_err());
    assert!(client.set_amperage(8).await.is_err());
}

#[tokio::test]
async fn broker_payload_replaces_status() {
    let server = MockServer::start().await;
    let client = client(&server);
    let current = solar_ev_charger::chargers::StationStatus {
        enabled: false,
        own_usage_w: 0.0,
        amp_setting: 6,
        identity: "009876".to_string(),
        measured_mv: 0,
    };
    let payload = br#"{"amp":"16","alw":"1","nrg":[0,0,0,0,160,0,0]}"#;

    let next = client
        .apply_message(&current, "go-eCharger/009876/status", payload)
        .unwrap()
        .unwrap();
    assert!(next.enabled);
    assert_eq!(next.amp_setting, 16);
    assert_eq!(next.identity, "009876");
    assert_eq!(next.own_usage_w, 16.0 * 230.0);

    assert_eq!(
        client
            .apply_message(&current, "go-eCharger/111111/status", payload)
            .unwrap(),
        None
    );
}
