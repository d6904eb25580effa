//! Sled key encodings. All keys are big-endian so sled's lexicographic tree
//! order matches numeric/chronological order.

use chrono::{DateTime, Utc};

/// Primary-key encoding: big-endian `u64`.
pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Composite key for the `unbound_k1`/`unbound_k2` index trees: sorting by
/// this key yields ascending `event_time`, with `id` as a tiebreaker for
/// packets sharing a millisecond (§4.1's "ordered by event_time ascending").
pub fn unbound_index_key(event_time: DateTime<Utc>, id: u64) -> [u8; 16] {
    let millis = event_time.timestamp_millis().max(0) as u64;
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&millis.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}
