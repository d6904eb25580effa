//! Durable outbound sender (§4.4): batches pending tracks, signs and POSTs
//! them, and records the outcome.

pub mod signing;

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, MAX_BACKOFF_SECS, MAX_ERROR_BODY_LEN};
use crate::store::Store;
use crate::types::{FlightTrack, LogLevel, SentState};

/// Runs the Sender worker until `cancel` fires.
pub async fn run(store: Store, cfg: Config, cancel: CancellationToken) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.api.timeout))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "sender failed to build HTTP client, worker exiting");
            return;
        }
    };

    let base_delay = Duration::from_secs(cfg.cycles.sender_interval);
    let mut consecutive_failures: u32 = 0;

    loop {
        if wait_or_cancel(base_delay, &cancel).await {
            return;
        }

        match run_cycle(&store, &cfg, &client).await {
            CycleOutcome::Idle | CycleOutcome::Sent(_) | CycleOutcome::Rejected(_) => {
                consecutive_failures = 0;
            }
            CycleOutcome::LoadFailed | CycleOutcome::Retrying(_) => {
                consecutive_failures += 1;
                let delay = backoff_delay(base_delay, consecutive_failures);
                if wait_or_cancel(delay, &cancel).await {
                    return;
                }
            }
        }
    }
}

/// What happened on one pass over the pending-tracks queue (§4.4).
#[derive(Debug)]
pub enum CycleOutcome {
    /// No pending tracks; nothing to do.
    Idle,
    /// Batch accepted by the ingest endpoint; holds the track count.
    Sent(usize),
    /// Batch rejected with a 4xx; holds the track count marked failed.
    Rejected(usize),
    /// Failed to load the batch from the Store.
    LoadFailed,
    /// Transient failure (5xx/timeout/network); batch left pending for retry.
    Retrying(String),
}

/// Runs a single send cycle: load up to 100 pending tracks, POST them, and
/// record the outcome. Exposed so tests can drive one cycle deterministically.
pub async fn run_cycle(store: &Store, cfg: &Config, client: &reqwest::Client) -> CycleOutcome {
    let batch = match store.select_pending_tracks(100) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "sender failed to load pending tracks");
            return CycleOutcome::LoadFailed;
        }
    };

    if batch.is_empty() {
        return CycleOutcome::Idle;
    }

    match send_batch(client, cfg, &batch).await {
        Outcome::Success => {
            let ids: Vec<u64> = batch.iter().map(|t| t.id).collect();
            if let Err(e) = store.mark_tracks(&ids, SentState::Done, None, Some(Utc::now())) {
                warn!(error = %e, "failed to mark tracks done");
            }
            info!(count = ids.len(), "batch sent");
            CycleOutcome::Sent(ids.len())
        }
        Outcome::Permanent { status, body } => {
            let ids: Vec<u64> = batch.iter().map(|t| t.id).collect();
            let error = format!("status={status} body={body}");
            if let Err(e) = store.mark_tracks(&ids, SentState::Failed, Some(error.clone()), None) {
                warn!(error = %e, "failed to mark tracks failed");
            }
            store.append_log(LogLevel::Error, "sender", "ingest rejected batch", &error);
            CycleOutcome::Rejected(ids.len())
        }
        Outcome::Transient(reason) => {
            warn!(reason = %reason, "ingest batch will be retried");
            CycleOutcome::Retrying(reason)
        }
    }
}

enum Outcome {
    Success,
    Permanent { status: u16, body: String },
    Transient(String),
}

async fn send_batch(client: &reqwest::Client, cfg: &Config, batch: &[FlightTrack]) -> Outcome {
    let tracks: Vec<_> = batch
        .iter()
        .map(|t| {
            json!({
                "callsign": t.callsign,
                "height": t.height_m,
                "fuel": t.fuel_pct,
                "timestamp": t.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            })
        })
        .collect();

    let body = json!({
        "client_id": cfg.api.client_id,
        "tracks": tracks,
    });

    let body_bytes = match signing::canonical_bytes(&body) {
        Ok(b) => b,
        Err(e) => return Outcome::Transient(format!("body encode error: {e}")),
    };
    let signature = signing::sign(&cfg.api.secret_key, &body_bytes);

    let response = client
        .post(&cfg.api.url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", cfg.api.bearer_token))
        .header("X-Signature", signature)
        .body(body_bytes)
        .send()
        .await;

    match response {
        Ok(resp) => classify(resp).await,
        Err(e) if e.is_timeout() => Outcome::Transient(format!("timeout: {e}")),
        Err(e) => Outcome::Transient(format!("network error: {e}")),
    }
}

async fn classify(resp: reqwest::Response) -> Outcome {
    let status = resp.status();

    if status.is_success() {
        return Outcome::Success;
    }

    if status.is_client_error() {
        let body = resp.text().await.unwrap_or_default();
        let truncated: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        return Outcome::Permanent {
            status: status.as_u16(),
            body: truncated,
        };
    }

    Outcome::Transient(format!("server returned {status}"))
}

fn backoff_delay(base: Duration, consecutive_failures: u32) -> Duration {
    let doubled = base.saturating_mul(1u32.checked_shl(consecutive_failures).unwrap_or(u32::MAX));
    let capped = doubled.min(Duration::from_secs(MAX_BACKOFF_SECS));
    let jitter_ms = rand::thread_rng().gen_range(0..=500);
    capped + Duration::from_millis(jitter_ms)
}

async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(10);
        assert!(backoff_delay(base, 1) >= Duration::from_secs(20));
        assert!(backoff_delay(base, 10) <= Duration::from_secs(MAX_BACKOFF_SECS) + Duration::from_millis(500));
    }
}
