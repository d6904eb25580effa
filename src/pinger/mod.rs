//! Status heartbeat (§4.5): posts a signed snapshot of liveness and bringup
//! health to the status endpoint on a fixed cadence. No local persistence —
//! failures are logged and otherwise ignored.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{Config, STATUS_HTTP_TIMEOUT_SECS};
use crate::sender::signing;
use crate::status::StatusHandle;

/// Runs the Pinger worker until `cancel` fires.
pub async fn run(status: StatusHandle, cfg: Config, cancel: CancellationToken) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(STATUS_HTTP_TIMEOUT_SECS))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "pinger failed to build HTTP client, worker exiting");
            return;
        }
    };

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.api.ping_interval));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        let snapshot = status.load();
        let body = json!({
            "client_id": cfg.api.client_id,
            "version": cfg.app.version,
            "stages": {
                "dependencies": snapshot.stages.dependencies,
                "config": snapshot.stages.config,
                "database": snapshot.stages.database,
                "time_sync": snapshot.stages.time_sync,
                "decoder": snapshot.stages.decoder,
                "tcp_connection": snapshot.stages.tcp_connection,
            },
            "tcp_connected": snapshot.tcp_connected,
            "uptime": snapshot.uptime_secs(),
            "system_info": snapshot.system_info,
        });

        let body_bytes = match signing::canonical_bytes(&body) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to encode status body");
                continue;
            }
        };
        let signature = signing::sign(&cfg.api.secret_key, &body_bytes);

        let result = client
            .post(&cfg.api.status_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", cfg.api.bearer_token))
            .header("X-Signature", signature)
            .body(body_bytes)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(status = %resp.status(), "status ping rejected"),
            Err(e) => warn!(error = %e, "status ping failed"),
        }
    }
}
