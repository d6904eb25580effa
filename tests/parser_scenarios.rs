//! Parser scenarios against a fake decoder TCP server (S6: reconnect).

use std::time::Duration;

use radar_ingest_client::config::{ApiConfig, AppConfig, Config, CyclesConfig, DatabaseConfig, DecoderConfig};
use radar_ingest_client::parser;
use radar_ingest_client::status::StatusHandle;
use radar_ingest_client::store::Store;
use radar_ingest_client::types::PacketType;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn test_config(port: u16) -> Config {
    Config {
        app: AppConfig {
            version: "1.0.0".to_string(),
            timezone: "UTC".to_string(),
        },
        decoder: DecoderConfig {
            executable: "/bin/true".to_string(),
            command_args: String::new(),
            host: "127.0.0.1".to_string(),
            port,
            timeout: 2,
            reconnect_delay: 1,
        },
        api: ApiConfig {
            url: "http://localhost/ingest".to_string(),
            status_url: "http://localhost/status".to_string(),
            client_id: 1,
            secret_key: "secret".to_string(),
            bearer_token: "token".to_string(),
            timeout: 30,
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

/// S6: the decoder drops the connection, and the parser reconnects and
/// keeps ingesting once a new connection is accepted.
#[tokio::test]
async fn s6_reconnects_after_decoder_drop_and_keeps_parsing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("db")).unwrap();
    let status = StatusHandle::new("test-host".to_string());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cfg = test_config(addr.port());
    let cancel = CancellationToken::new();

    let server_task = tokio::spawn(async move {
        // First connection: send one K1 line, then drop.
        let (mut sock, _) = listener.accept().await.unwrap();
        sock.write_all(b"K1 11:11:38.370.366 [ 8832] {018} **** :10437\n")
            .await
            .unwrap();
        drop(sock);

        // Second connection: send one K2 line, then hold it open.
        let (mut sock, _) = listener.accept().await.unwrap();
        sock.write_all(b"K2 11:11:40.082.632 [ 8706] {017} **** FL 5360m [F176]+ F:40%\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(sock);
    });

    let parser_cancel = cancel.clone();
    let parser_task = tokio::spawn(parser::run(store.clone(), status, cfg, parser_cancel));

    // Give the parser time to connect twice and ingest both lines.
    tokio::time::sleep(Duration::from_millis(800)).await;

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), parser_task).await;
    server_task.abort();

    let k1s = store.select_unbound_packets(PacketType::K1, 10).unwrap();
    let k2s = store.select_unbound_packets(PacketType::K2, 10).unwrap();
    assert_eq!(k1s.len(), 1);
    assert_eq!(k2s.len(), 1);
    assert_eq!(k1s[0].callsign.as_deref(), Some("10437"));
    assert_eq!(k2s[0].height_m, Some(5360));
}
