//! Default constants for optional configuration keys (§6), grouped by the
//! subsystem that consumes them.

pub fn default_timezone() -> String {
    "UTC".to_string()
}

// ============================================================================
// Decoder / Parser
// ============================================================================

pub fn default_decoder_host() -> String {
    "127.0.0.1".to_string()
}

pub const fn default_decoder_port() -> u16 {
    31003
}

/// TCP connect timeout (seconds), also used by the Supervisor's bringup probe.
pub const fn default_connect_timeout_secs() -> u64 {
    10
}

pub const fn default_reconnect_delay_secs() -> u64 {
    5
}

/// Decoder read idle timeout before forcing a reconnect (§5).
pub const DECODER_READ_IDLE_SECS: u64 = 60;

/// Bringup TCP probe attempt cap (§4.6 step 5).
pub const MAX_CONNECT_ATTEMPTS: u32 = 10;

// ============================================================================
// API / Sender / Pinger
// ============================================================================

pub const fn default_api_timeout_secs() -> u64 {
    30
}

pub const fn default_ping_interval_secs() -> u64 {
    30
}

/// Status endpoint timeout (§5), independent of `api.timeout`.
pub const STATUS_HTTP_TIMEOUT_SECS: u64 = 10;

/// Backoff cap for the Sender's retry schedule (§4.4 step 6).
pub const MAX_BACKOFF_SECS: u64 = 300;

/// Max bytes of a 4xx response body kept in `FlightTrack.error` (§4.4 step 5).
pub const MAX_ERROR_BODY_LEN: usize = 512;

// ============================================================================
// Database
// ============================================================================

pub fn default_database_file() -> String {
    "base.db".to_string()
}

// ============================================================================
// Cycles
// ============================================================================

pub const fn default_parser_interval_secs() -> u64 {
    1
}

pub const fn default_analyser_interval_secs() -> u64 {
    5
}

pub const fn default_sender_interval_secs() -> u64 {
    10
}

pub const fn default_batch_size() -> usize {
    100
}

pub const fn default_ntp_sync_interval_secs() -> u64 {
    3600
}

/// Correlation window W (§3, §4.3).
pub const fn default_correlation_window_secs() -> u64 {
    5
}

/// Staleness bound for unmatched packets (§4.3).
pub const fn default_stale_threshold_secs() -> u64 {
    60
}

// ============================================================================
// Shutdown grace periods (§4.6, §5)
// ============================================================================

pub const WORKER_SHUTDOWN_GRACE_SECS: u64 = 10;
pub const DECODER_KILL_GRACE_SECS: u64 = 5;
