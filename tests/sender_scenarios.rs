//! Sender scenarios against a mocked ingest endpoint (S4, S5).

use chrono::Utc;
use radar_ingest_client::config::{ApiConfig, AppConfig, Config, CyclesConfig, DatabaseConfig, DecoderConfig};
use radar_ingest_client::sender::{self, CycleOutcome};
use radar_ingest_client::store::{NewTrackFields, Store};
use radar_ingest_client::types::SentState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(ingest_url: String) -> Config {
    Config {
        app: AppConfig {
            version: "1.0.0".to_string(),
            timezone: "UTC".to_string(),
        },
        decoder: DecoderConfig {
            executable: "/bin/true".to_string(),
            command_args: String::new(),
            host: "127.0.0.1".to_string(),
            port: 31003,
            timeout: 10,
            reconnect_delay: 5,
        },
        api: ApiConfig {
            url: ingest_url,
            status_url: "http://localhost/status".to_string(),
            client_id: 7,
            secret_key: "shh".to_string(),
            bearer_token: "tok".to_string(),
            timeout: 5,
            ping_interval: 30,
        },
        database: DatabaseConfig { file: "unused.db".to_string() },
        cycles: CyclesConfig {
            parser_interval: 1,
            analyser_interval: 5,
            sender_interval: 10,
            batch_size: 100,
            ntp_sync_interval: 3600,
            correlation_window: 5,
            stale_threshold: 60,
        },
    }
}

async fn seed_one_pending_track(store: &Store) -> u64 {
    use radar_ingest_client::types::{PacketType, RawPacket};

    let now = Utc::now();
    let k1 = RawPacket {
        id: 0,
        event_time: now,
        packet_type: PacketType::K1,
        callsign: Some("10437".to_string()),
        height_m: None,
        fuel_pct: None,
        alarm: 0,
        faithfulness: 50,
        sent: SentState::Pending,
        bound_to_track: None,
        created_at: now,
        updated_at: now,
    };
    let k2 = RawPacket {
        id: 0,
        event_time: now,
        packet_type: PacketType::K2,
        callsign: None,
        height_m: Some(5360),
        fuel_pct: Some(40),
        alarm: 0,
        faithfulness: 0,
        sent: SentState::Pending,
        bound_to_track: None,
        created_at: now,
        updated_at: now,
    };
    let k1_id = store.insert_packet(k1).unwrap();
    let k2_id = store.insert_packet(k2).unwrap();
    store
        .create_track_and_bind(
            k1_id,
            k2_id,
            NewTrackFields {
                callsign: "10437".to_string(),
                height_m: 5360,
                fuel_pct: 40,
                timestamp: now,
            },
        )
        .unwrap()
}

/// S4: a 5xx leaves the batch pending for the next cycle to retry, and a
/// later 200 marks it done.
#[tokio::test]
async fn s4_transient_failure_then_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("db")).unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let cfg = test_config(format!("{}/ingest", mock_server.uri()));
    let client = reqwest::Client::new();
    let track_id = seed_one_pending_track(&store).await;

    let first = sender::run_cycle(&store, &cfg, &client).await;
    assert!(matches!(first, CycleOutcome::Retrying(_)));
    let still_pending = store.select_pending_tracks(10).unwrap();
    assert_eq!(still_pending.len(), 1);
    assert_eq!(still_pending[0].id, track_id);

    let second = sender::run_cycle(&store, &cfg, &client).await;
    assert!(matches!(second, CycleOutcome::Sent(1)));
    assert!(store.select_pending_tracks(10).unwrap().is_empty());
}

/// S5: a 400 is a permanent rejection; the track is marked failed and never
/// retried.
#[tokio::test]
async fn s5_permanent_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("db")).unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(400).set_body_string("malformed tracks payload"))
        .mount(&mock_server)
        .await;

    let cfg = test_config(format!("{}/ingest", mock_server.uri()));
    let client = reqwest::Client::new();
    let track_id = seed_one_pending_track(&store).await;

    let outcome = sender::run_cycle(&store, &cfg, &client).await;
    assert!(matches!(outcome, CycleOutcome::Rejected(1)));
    assert!(store.select_pending_tracks(10).unwrap().is_empty());

    // Rejected tracks do not come back on a later cycle (no retry on 4xx).
    let outcome2 = sender::run_cycle(&store, &cfg, &client).await;
    assert!(matches!(outcome2, CycleOutcome::Idle));
    let _ = track_id;
}

/// An idle queue with nothing pending is a no-op, not an error.
#[tokio::test]
async fn idle_queue_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("db")).unwrap();
    let mock_server = MockServer::start().await;
    let cfg = test_config(format!("{}/ingest", mock_server.uri()));
    let client = reqwest::Client::new();

    let outcome = sender::run_cycle(&store, &cfg, &client).await;
    assert!(matches!(outcome, CycleOutcome::Idle));
}
