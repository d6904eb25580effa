//! Durable local storage (§4.1).
//!
//! Backed by a single embedded sled database directory holding named trees
//! for each entity plus the secondary-index trees that keep the Correlator's
//! and Sender's scan queries cheap (sled's own B-tree ordering on composite
//! keys stands in for the SQL indices §4.1 asks for). Multi-tree mutations
//! that must be atomic (insert + index update, track-create + two
//! packet-binds) go through sled's `transaction()` API so the invariants in
//! §3 and §8 hold even under concurrent readers.

mod keys;
mod schema;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, Transactional, TransactionError};
use thiserror::Error;
use tracing::{error, warn};

use crate::types::{FlightTrack, LogEntry, LogLevel, PacketType, RawPacket, SentState};

pub use schema::NewTrackFields;

/// Failure modes the caller must distinguish (§4.1, §7).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient I/O; the caller may retry once before surfacing it.
    #[error("store I/O error: {0}")]
    Io(#[from] sled::Error),

    /// The embedded database file is structurally damaged. Fatal.
    #[error("store corrupt: {0}")]
    Corrupt(String),

    /// `create_track_and_bind` found a packet already bound (§4.1, §4.3).
    #[error("packet already bound to a track")]
    AlreadyBound,

    /// A row failed to (de)serialize; treated as corruption.
    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl<E> From<TransactionError<E>> for StoreError
where
    E: Into<StoreError>,
{
    fn from(e: TransactionError<E>) -> Self {
        match e {
            TransactionError::Abort(inner) => inner.into(),
            TransactionError::Storage(e) => StoreError::Io(e),
        }
    }
}

struct Trees {
    packets: sled::Tree,
    unbound_k1: sled::Tree,
    unbound_k2: sled::Tree,
    tracks: sled::Tree,
    tracks_pending: sled::Tree,
    log: sled::Tree,
}

/// Cloneable handle onto the embedded store. Cheap to clone (an `Arc` of the
/// open database and its trees); every worker holds one.
#[derive(Clone)]
pub struct Store {
    db: Arc<sled::Db>,
    trees: Arc<Trees>,
}

impl Store {
    /// Opens (creating if absent) the database at `path`. Idempotent: a
    /// second open against the same path re-attaches to the same trees.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| {
            error!(error = %e, path = %path.display(), "failed to open store");
            StoreError::Io(e)
        })?;

        let trees = Trees {
            packets: db.open_tree(schema::TREE_PACKETS)?,
            unbound_k1: db.open_tree(schema::TREE_UNBOUND_K1)?,
            unbound_k2: db.open_tree(schema::TREE_UNBOUND_K2)?,
            tracks: db.open_tree(schema::TREE_TRACKS)?,
            tracks_pending: db.open_tree(schema::TREE_TRACKS_PENDING)?,
            log: db.open_tree(schema::TREE_LOG)?,
        };

        tracing::info!(path = %path.display(), "store opened");

        Ok(Self {
            db: Arc::new(db),
            trees: Arc::new(trees),
        })
    }

    fn unbound_tree(&self, packet_type: PacketType) -> &sled::Tree {
        match packet_type {
            PacketType::K1 => &self.trees.unbound_k1,
            PacketType::K2 => &self.trees.unbound_k2,
        }
    }

    /// Assigns an id, stamps `created_at`/`updated_at`, and persists the
    /// packet plus its unbound-index entry in one transaction (§4.1).
    pub fn insert_packet(&self, mut packet: RawPacket) -> Result<u64, StoreError> {
        validate_packet_invariant(&packet)?;

        let id = self.db.generate_id()?;
        let now = Utc::now();
        packet.id = id;
        packet.created_at = now;
        packet.updated_at = now;

        let encoded = serde_json::to_vec(&packet)?;
        let index_key = keys::unbound_index_key(packet.event_time, id);

        let packets = &self.trees.packets;
        let unbound = self.unbound_tree(packet.packet_type);

        (packets, unbound)
            .transaction(move |(packets, unbound)| {
                packets.insert(&keys::id_key(id), encoded.as_slice())?;
                if packet.sent == SentState::Pending && packet.bound_to_track.is_none() {
                    unbound.insert(index_key.as_slice(), &keys::id_key(id))?;
                }
                Ok::<_, ConflictableTransactionError<StoreError>>(())
            })
            .map_err(StoreError::from)?;

        Ok(id)
    }

    /// Up to `limit` unbound, still-pending packets of `packet_type`,
    /// ordered by `event_time` ascending (§4.1, §4.3 step 1).
    pub fn select_unbound_packets(
        &self,
        packet_type: PacketType,
        limit: usize,
    ) -> Result<Vec<RawPacket>, StoreError> {
        let unbound = self.unbound_tree(packet_type);
        let mut out = Vec::with_capacity(limit.min(64));

        for entry in unbound.iter().take(limit) {
            let (_k, id_bytes) = entry?;
            if let Some(raw) = self.trees.packets.get(&id_bytes)? {
                let packet: RawPacket = serde_json::from_slice(&raw)?;
                // Defends against a stale index entry left by a
                // best-effort cleanup that failed (see create_track_and_bind).
                if packet.bound_to_track.is_none() && packet.sent == SentState::Pending {
                    out.push(packet);
                }
            }
        }

        Ok(out)
    }

    /// Creates the track and binds both packets atomically; fails with
    /// [`StoreError::AlreadyBound`] if either packet is already bound
    /// (§4.1, §4.3's rare collision case).
    pub fn create_track_and_bind(
        &self,
        k1_id: u64,
        k2_id: u64,
        fields: NewTrackFields,
    ) -> Result<u64, StoreError> {
        let track_id = self.db.generate_id()?;
        let now = Utc::now();

        let track = FlightTrack {
            id: track_id,
            k1_packet_id: k1_id,
            k2_packet_id: k2_id,
            callsign: fields.callsign,
            height_m: fields.height_m,
            fuel_pct: fields.fuel_pct,
            timestamp: fields.timestamp,
            sent: SentState::Pending,
            sent_at: None,
            error: None,
            created_at: now,
        };
        let track_encoded = serde_json::to_vec(&track)?;

        let packets = &self.trees.packets;
        let tracks = &self.trees.tracks;
        let tracks_pending = &self.trees.tracks_pending;

        // Binding check + the packet/track mutation is the transaction §4.1
        // requires to be atomic. The two unbound-index entries are cleaned
        // up right after, best-effort: `select_unbound_packets` re-checks
        // `bound_to_track` on every row it returns, so a missed index
        // removal cannot resurface an already-bound packet.
        let (k1_event_time, k2_event_time) = (packets, tracks, tracks_pending)
            .transaction(move |(packets, tracks, tracks_pending)| {
                let k1_raw = packets
                    .get(&keys::id_key(k1_id))?
                    .ok_or_else(|| ConflictableTransactionError::Abort(StoreError::AlreadyBound))?;
                let k2_raw = packets
                    .get(&keys::id_key(k2_id))?
                    .ok_or_else(|| ConflictableTransactionError::Abort(StoreError::AlreadyBound))?;

                let mut k1: RawPacket = serde_json::from_slice(&k1_raw)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                let mut k2: RawPacket = serde_json::from_slice(&k2_raw)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;

                if k1.bound_to_track.is_some() || k2.bound_to_track.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::AlreadyBound));
                }

                k1.bound_to_track = Some(track_id);
                k1.updated_at = now;
                k2.bound_to_track = Some(track_id);
                k2.updated_at = now;

                packets.insert(
                    &keys::id_key(k1.id),
                    serde_json::to_vec(&k1)
                        .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?,
                )?;
                packets.insert(
                    &keys::id_key(k2.id),
                    serde_json::to_vec(&k2)
                        .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?,
                )?;

                tracks.insert(&keys::id_key(track_id), track_encoded.as_slice())?;
                tracks_pending.insert(&keys::id_key(track_id), &keys::id_key(track_id))?;

                Ok::<_, ConflictableTransactionError<StoreError>>((k1.event_time, k2.event_time))
            })
            .map_err(StoreError::from)?;

        let unbound_k1 = &self.trees.unbound_k1;
        let unbound_k2 = &self.trees.unbound_k2;
        if let Err(e) = (unbound_k1, unbound_k2).transaction(move |(unbound_k1, unbound_k2)| {
            unbound_k1.remove(keys::unbound_index_key(k1_event_time, k1_id).as_slice())?;
            unbound_k2.remove(keys::unbound_index_key(k2_event_time, k2_id).as_slice())?;
            Ok::<_, ConflictableTransactionError<StoreError>>(())
        }) {
            warn!(error = %e, k1_id, k2_id, "failed to clean up unbound index after binding");
        }

        Ok(track_id)
    }

    /// Marks an unbound packet as `failed` (the Correlator's staleness path,
    /// §4.3 step 5), removing it from its unbound index.
    pub fn fail_unbound_packet(&self, id: u64, packet_type: PacketType) -> Result<(), StoreError> {
        let packets = &self.trees.packets;
        let unbound = self.unbound_tree(packet_type);

        (packets, unbound)
            .transaction(move |(packets, unbound)| {
                let Some(raw) = packets.get(&keys::id_key(id))? else {
                    return Ok::<_, ConflictableTransactionError<StoreError>>(());
                };
                let mut packet: RawPacket = serde_json::from_slice(&raw)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;

                unbound.remove(keys::unbound_index_key(packet.event_time, packet.id).as_slice())?;
                packet.sent = SentState::Failed;
                packet.updated_at = Utc::now();

                packets.insert(
                    &keys::id_key(id),
                    serde_json::to_vec(&packet)
                        .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?,
                )?;
                Ok(())
            })
            .map_err(StoreError::from)?;

        Ok(())
    }

    /// Up to `limit` pending tracks, ordered by `id` ascending (§4.1 step 4).
    pub fn select_pending_tracks(&self, limit: usize) -> Result<Vec<FlightTrack>, StoreError> {
        let mut out = Vec::with_capacity(limit.min(128));

        for entry in self.trees.tracks_pending.iter().take(limit) {
            let (_k, id_bytes) = entry?;
            if let Some(raw) = self.trees.tracks.get(&id_bytes)? {
                out.push(serde_json::from_slice(&raw)?);
            }
        }

        Ok(out)
    }

    /// Batched state transition for tracks (§4.1 step 5): `done` or `failed`
    /// are both terminal, so each id is also dropped from `tracks_pending`.
    pub fn mark_tracks(
        &self,
        ids: &[u64],
        outcome: SentState,
        error: Option<String>,
        sent_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let tracks = &self.trees.tracks;
        let tracks_pending = &self.trees.tracks_pending;

        for &id in ids {
            let error = error.clone();
            (tracks, tracks_pending)
                .transaction(move |(tracks, tracks_pending)| {
                    let Some(raw) = tracks.get(&keys::id_key(id))? else {
                        return Ok::<_, ConflictableTransactionError<StoreError>>(());
                    };
                    let mut track: FlightTrack = serde_json::from_slice(&raw)
                        .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;

                    track.sent = outcome;
                    track.error = error.clone();
                    track.sent_at = sent_at;

                    tracks_pending.remove(&keys::id_key(id))?;
                    tracks.insert(
                        &keys::id_key(id),
                        serde_json::to_vec(&track)
                            .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?,
                    )?;
                    Ok(())
                })
                .map_err(StoreError::from)?;
        }

        Ok(())
    }

    /// Non-blocking, best-effort audit log append (§4.1, §7): failures are
    /// logged and swallowed, never escalated to the caller.
    pub fn append_log(&self, level: LogLevel, component: &str, message: &str, details: &str) {
        let id = match self.db.generate_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to allocate log entry id");
                return;
            }
        };

        let entry = LogEntry {
            id,
            level,
            component: component.to_string(),
            message: message.to_string(),
            details: details.to_string(),
            created_at: Utc::now(),
        };

        let encoded = match serde_json::to_vec(&entry) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to encode audit log entry");
                return;
            }
        };

        if let Err(e) = self.trees.log.insert(&keys::id_key(id), encoded) {
            warn!(error = %e, "failed to append audit log entry");
        }
    }
}

fn validate_packet_invariant(packet: &RawPacket) -> Result<(), StoreError> {
    match packet.packet_type {
        PacketType::K1 => {
            if packet.callsign.is_none() || packet.height_m.is_some() || packet.fuel_pct.is_some()
            {
                return Err(StoreError::Corrupt(
                    "K1 packet must set callsign and leave height_m/fuel_pct unset".to_string(),
                ));
            }
        }
        PacketType::K2 => {
            if packet.callsign.is_some() || packet.height_m.is_none() || packet.fuel_pct.is_none()
            {
                return Err(StoreError::Corrupt(
                    "K2 packet must set height_m/fuel_pct and leave callsign unset".to_string(),
                ));
            }
        }
    }
    Ok(())
}
