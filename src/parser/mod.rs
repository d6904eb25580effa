//! TCP line parser (§4.2).
//!
//! Maintains a persistent connection to the decoder, decodes each complete
//! line, and persists matching K1/K2 packets. Never drops a read while the
//! Store is busy — it blocks on `insert_packet` instead (§4.2's backpressure
//! note).

mod grammar;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, DECODER_READ_IDLE_SECS};
use crate::status::StatusHandle;
use crate::store::Store;
use crate::types::LogLevel;

/// Lines dropped (failed to match the grammar) between WARN logs (§4.2).
const DROP_LOG_RATE: u64 = 100;

enum ConnState {
    Disconnected,
    Connecting,
    Connected(TcpStream),
}

/// Runs the Parser worker until `cancel` fires.
pub async fn run(store: Store, status: StatusHandle, cfg: Config, cancel: CancellationToken) {
    let addr = format!("{}:{}", cfg.decoder.host, cfg.decoder.port);
    let reconnect_delay = Duration::from_secs(cfg.decoder.reconnect_delay);
    let dropped = AtomicU64::new(0);

    let mut state = ConnState::Disconnected;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        state = match state {
            ConnState::Disconnected => ConnState::Connecting,
            ConnState::Connecting => {
                status.set_tcp_connected(false);
                match TcpStream::connect(&addr).await {
                    Ok(stream) => {
                        info!(addr = %addr, "parser connected to decoder");
                        status.set_tcp_connected(true);
                        ConnState::Connected(stream)
                    }
                    Err(e) => {
                        warn!(error = %e, addr = %addr, "parser failed to connect, retrying");
                        if wait_or_cancel(reconnect_delay, &cancel).await {
                            return;
                        }
                        ConnState::Connecting
                    }
                }
            }
            ConnState::Connected(stream) => {
                match read_lines_until_error(stream, &store, &dropped, &cancel).await {
                    ReadOutcome::Cancelled => return,
                    ReadOutcome::Disconnected => {
                        status.set_tcp_connected(false);
                        if wait_or_cancel(reconnect_delay, &cancel).await {
                            return;
                        }
                        ConnState::Connecting
                    }
                }
            }
        };
    }
}

enum ReadOutcome {
    Disconnected,
    Cancelled,
}

async fn read_lines_until_error(
    mut stream: TcpStream,
    store: &Store,
    dropped: &AtomicU64,
    cancel: &CancellationToken,
) -> ReadOutcome {
    let mut buf = vec![0u8; 8192];
    let mut line_acc = String::new();
    let idle_timeout = Duration::from_secs(DECODER_READ_IDLE_SECS);

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,
            res = tokio::time::timeout(idle_timeout, stream.read(&mut buf)) => res,
        };

        let n = match read {
            Ok(Ok(0)) => {
                info!("decoder closed the connection");
                return ReadOutcome::Disconnected;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(error = %e, "decoder read error");
                return ReadOutcome::Disconnected;
            }
            Err(_) => {
                warn!(secs = DECODER_READ_IDLE_SECS, "decoder read idle timeout");
                return ReadOutcome::Disconnected;
            }
        };

        line_acc.push_str(&String::from_utf8_lossy(&buf[..n]));

        while let Some(pos) = line_acc.find('\n') {
            let line = line_acc[..pos].trim_end_matches('\r').to_string();
            line_acc.drain(..=pos);
            handle_line(&line, store, dropped);
        }
    }
}

fn handle_line(line: &str, store: &Store, dropped: &AtomicU64) {
    if line.is_empty() {
        return;
    }

    match grammar::parse_line(line) {
        Some(packet) => {
            // Blocks on purpose: the Parser never drops reads while the
            // Store is slow (§4.2's backpressure note).
            if let Err(e) = store.insert_packet(packet) {
                warn!(error = %e, "failed to persist parsed packet");
            }
        }
        None => {
            let count = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if count % DROP_LOG_RATE == 1 {
                warn!(dropped_total = count, line = %line, "dropped unparseable decoder line");
                store.append_log(
                    LogLevel::Warn,
                    "parser",
                    "dropped unparseable decoder line",
                    &format!("dropped_total={count}"),
                );
            }
            debug!(line = %line, "dropped unparseable decoder line");
        }
    }
}

/// Sleeps for `delay` or returns early (true) if cancelled first.
async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
