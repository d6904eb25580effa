//! Tree names and the field bundle passed into `create_track_and_bind`.

use chrono::{DateTime, Utc};

pub const TREE_PACKETS: &str = "packets";
pub const TREE_UNBOUND_K1: &str = "packets_unbound_k1";
pub const TREE_UNBOUND_K2: &str = "packets_unbound_k2";
pub const TREE_TRACKS: &str = "tracks";
pub const TREE_TRACKS_PENDING: &str = "tracks_pending";
pub const TREE_LOG: &str = "log";

/// Fields copied onto a new [`crate::types::FlightTrack`] at creation time
/// (§4.3 step 4: callsign from K1, height/fuel from K2, timestamp from K2).
#[derive(Debug, Clone)]
pub struct NewTrackFields {
    pub callsign: String,
    pub height_m: i64,
    pub fuel_pct: i64,
    pub timestamp: DateTime<Utc>,
}
