//! Correlation engine (§4.3): pairs unbound K1/K2 packets into flight tracks
//! on a fixed cadence, and ages out packets that stay unmatched too long.

mod pairing;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::store::{NewTrackFields, Store, StoreError};
use crate::types::{LogLevel, PacketType};

/// Runs the Correlator worker until `cancel` fires.
pub async fn run(store: Store, cfg: Config, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
        cfg.cycles.analyser_interval,
    ));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        if let Err(e) = run_cycle(&store, &cfg) {
            // Store I/O errors abort the cycle; the next tick retries cleanly (§4.3).
            error!(error = %e, "correlator cycle aborted");
        }
    }
}

/// Runs a single correlation cycle synchronously. Exposed (not just used by
/// the `run` loop) so tests can drive deterministic cycles without waiting
/// on the configured interval.
pub fn run_cycle(store: &Store, cfg: &Config) -> Result<(), StoreError> {
    let batch_size = cfg.cycles.batch_size;
    let window_secs = cfg.cycles.correlation_window as i64;
    let stale_threshold = chrono::Duration::seconds(cfg.cycles.stale_threshold as i64);

    let k1s = store.select_unbound_packets(PacketType::K1, batch_size)?;
    let k2s = store.select_unbound_packets(PacketType::K2, batch_size)?;

    let result = pairing::pair_cycle(k1s, k2s, window_secs);

    for (k1, k2) in result.matched {
        let fields = NewTrackFields {
            callsign: k1.callsign.clone().unwrap_or_default(),
            height_m: k2.height_m.unwrap_or_default(),
            fuel_pct: k2.fuel_pct.unwrap_or_default(),
            // K2 carries the dynamic quantities; its event_time is authoritative (§4.3 step 4).
            timestamp: k2.event_time,
        };

        match store.create_track_and_bind(k1.id, k2.id, fields) {
            Ok(track_id) => {
                info!(track_id, k1_id = k1.id, k2_id = k2.id, "flight track created");
            }
            Err(StoreError::AlreadyBound) => {
                // Another instance raced us; retry next cycle (§4.3).
                warn!(k1_id = k1.id, k2_id = k2.id, "binding collision, will retry next cycle");
            }
            Err(e) => return Err(e),
        }
    }

    // Staleness is measured against wall-clock time, not the newest event_time
    // seen this cycle: a packet whose opposing type has stopped arriving
    // altogether must still age out eventually, which a same-cycle reference
    // can never detect once it goes quiet (§4.3 step 5).
    let now = Utc::now();
    for k1 in result.leftover_k1 {
        if now - k1.event_time > stale_threshold {
            age_out(store, k1.id, PacketType::K1)?;
        }
    }
    for k2 in result.leftover_k2 {
        if now - k2.event_time > stale_threshold {
            age_out(store, k2.id, PacketType::K2)?;
        }
    }

    Ok(())
}

fn age_out(store: &Store, id: u64, packet_type: PacketType) -> Result<(), StoreError> {
    store.fail_unbound_packet(id, packet_type)?;
    info!(id, ?packet_type, "packet aged out as unmatched");
    store.append_log(
        LogLevel::Info,
        "correlator",
        "unmatched packet aged out",
        &format!("id={id} type={packet_type:?}"),
    );
    Ok(())
}
