//! Supervisor (§4.6): ordered bringup, then concurrent worker launch, then
//! signal-driven shutdown.

mod decoder;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, WORKER_SHUTDOWN_GRACE_SECS};
use crate::status::StatusHandle;
use crate::store::Store;
use crate::{correlator, parser, pinger, sender};
use decoder::DecoderProcess;

/// Runs the full bringup-to-shutdown lifecycle. Returns `Err` only for a
/// fatal bringup failure; a clean signal-driven shutdown returns `Ok(())`.
pub async fn run(cfg: Config, db_path: std::path::PathBuf) -> Result<()> {
    let system_info = format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH);
    let status = StatusHandle::new(system_info);

    // Step 1: configuration is already loaded by the caller.
    status.update(|s| s.stages.dependencies = true);
    status.update(|s| s.stages.config = true);

    // Step 2: open the Store.
    let store = Store::open(&db_path).context("failed to open store")?;
    status.update(|s| s.stages.database = true);

    // Step 3: synchronise system time. External provider; non-fatal if it fails.
    if let Err(e) = sync_time() {
        warn!(error = %e, "time synchronisation failed, continuing with local clock");
    }
    status.update(|s| s.stages.time_sync = true);

    // Step 4: launch the decoder child process.
    let mut decoder_process = DecoderProcess::spawn(&cfg.decoder.executable, &cfg.decoder.command_args)
        .context("failed to launch decoder process")?;
    status.update(|s| s.stages.decoder = true);

    // Step 5: poll the decoder's TCP listener.
    probe_decoder(&cfg).await?;
    status.update(|s| s.stages.tcp_connection = true);

    let cancel = CancellationToken::new();
    let mut workers = JoinSet::new();

    workers.spawn(parser::run(store.clone(), status.clone(), cfg.clone(), cancel.clone()));
    workers.spawn(correlator::run(store.clone(), cfg.clone(), cancel.clone()));
    workers.spawn(sender::run(store.clone(), cfg.clone(), cancel.clone()));
    workers.spawn(pinger::run(status.clone(), cfg.clone(), cancel.clone()));

    info!("all workers started");

    wait_for_shutdown_signal_or_worker_exit(&mut workers, &cancel).await;

    info!("shutting down");
    cancel.cancel();

    let grace = Duration::from_secs(WORKER_SHUTDOWN_GRACE_SECS);
    if tokio::time::timeout(grace, drain(&mut workers)).await.is_err() {
        warn!("workers did not finish within the shutdown grace period, abandoning them");
    }

    decoder_process.shutdown().await;
    drop(store);

    Ok(())
}

async fn drain(workers: &mut JoinSet<()>) {
    while workers.join_next().await.is_some() {}
}

async fn wait_for_shutdown_signal_or_worker_exit(
    workers: &mut JoinSet<()>,
    cancel: &CancellationToken,
) {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
        res = workers.join_next() => {
            if let Some(res) = res {
                log_worker_exit(res);
            }
            cancel.cancel();
        }
    }
}

fn log_worker_exit(res: Result<(), tokio::task::JoinError>) {
    match res {
        Ok(()) => warn!("a worker exited unexpectedly"),
        Err(e) if e.is_panic() => error!(error = %e, "a worker panicked"),
        Err(e) => warn!(error = %e, "a worker task was cancelled"),
    }
}

/// TCP connect probe against the decoder's listener: up to `max_attempts`,
/// spaced by `reconnect_delay`, each with `connect_timeout` (§4.6 step 5).
async fn probe_decoder(cfg: &Config) -> Result<()> {
    let addr = format!("{}:{}", cfg.decoder.host, cfg.decoder.port);
    let connect_timeout = Duration::from_secs(cfg.decoder.timeout);
    let reconnect_delay = Duration::from_secs(cfg.decoder.reconnect_delay);

    for attempt in 1..=crate::config::MAX_CONNECT_ATTEMPTS {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => {
                info!(addr = %addr, attempt, "decoder TCP probe succeeded");
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(addr = %addr, attempt, error = %e, "decoder TCP probe failed");
            }
            Err(_) => {
                warn!(addr = %addr, attempt, "decoder TCP probe timed out");
            }
        }
        tokio::time::sleep(reconnect_delay).await;
    }

    bail!(
        "decoder TCP probe exhausted {} attempts against {addr}",
        crate::config::MAX_CONNECT_ATTEMPTS
    );
}

/// Synchronises system time via a pluggable provider. Out of scope per §1 —
/// this default provider is a no-op; a real deployment supplies an NTP
/// client here.
fn sync_time() -> Result<()> {
    Ok(())
}
