//! Core data model: raw decoder packets, correlated flight tracks, audit log
//! entries, and the shared in-memory status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which decoder line grammar produced a [`RawPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    K1,
    K2,
}

/// Outbound-send state shared by [`RawPacket`] and [`FlightTrack`].
///
/// `Done` and `Failed` are terminal: once either is reached the record is
/// never scanned again by the Correlator or Sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentState {
    Pending,
    Done,
    Failed,
}

/// One decoded line from the decoder TCP stream.
///
/// Invariant: `type == K1` implies `callsign` is set and `height_m`/`fuel_pct`
/// are unset; `type == K2` implies the opposite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPacket {
    pub id: u64,
    pub event_time: DateTime<Utc>,
    pub packet_type: PacketType,
    pub callsign: Option<String>,
    pub height_m: Option<i64>,
    pub fuel_pct: Option<i64>,
    pub alarm: i64,
    pub faithfulness: i64,
    pub sent: SentState,
    pub bound_to_track: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RawPacket {
    /// Default `alarm`/`faithfulness` per §3: 0/50 for K1, 0/0 for K2.
    pub fn default_alarm_faithfulness(packet_type: PacketType) -> (i64, i64) {
        match packet_type {
            PacketType::K1 => (0, 50),
            PacketType::K2 => (0, 0),
        }
    }
}

/// A correlated K1/K2 pair: one flight track ready for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightTrack {
    pub id: u64,
    pub k1_packet_id: u64,
    pub k2_packet_id: u64,
    pub callsign: String,
    pub height_m: i64,
    pub fuel_pct: i64,
    pub timestamp: DateTime<Utc>,
    pub sent: SentState,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Bringup stage completion flags, written only by the Supervisor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stages {
    pub dependencies: bool,
    pub config: bool,
    pub database: bool,
    pub time_sync: bool,
    pub decoder: bool,
    pub tcp_connection: bool,
}

/// Shared, concurrently-readable snapshot of liveness and bringup health.
///
/// Published via `ArcSwap::store` so readers always see a fully-formed copy
/// (see `status::StatusHandle`); never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub stages: Stages,
    pub tcp_connected: bool,
    #[serde(skip, default = "Utc::now")]
    pub started_at: DateTime<Utc>,
    pub system_info: String,
}

impl StatusSnapshot {
    pub fn new(system_info: String) -> Self {
        Self {
            stages: Stages::default(),
            tcp_connected: false,
            started_at: Utc::now(),
            system_info,
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
