//! The pure two-pointer-greedy pairing algorithm (§4.3 steps 2-3), kept free
//! of I/O so it is unit-testable without a live Store.

use std::collections::HashSet;

use crate::types::RawPacket;

pub struct PairCycle {
    /// Accepted (K1, K2) pairs, in the K1 processing order.
    pub matched: Vec<(RawPacket, RawPacket)>,
    /// K1 packets with no K2 candidate in the window this cycle.
    pub leftover_k1: Vec<RawPacket>,
    /// K2 packets never chosen as a match this cycle.
    pub leftover_k2: Vec<RawPacket>,
}

/// Pairs `k1s` against `k2s` within `window_secs`, processing K1s in
/// ascending `event_time` order and, for each, picking the nearest
/// not-yet-consumed K2 within the window. Equidistant candidates are
/// resolved by earlier `event_time` then smaller `id` (§4.3 step 3).
///
/// Determinism: the result depends only on the input sets, not on the order
/// they arrived in across batch boundaries (§4.3's determinism note) — both
/// slices are sorted internally before pairing.
pub fn pair_cycle(mut k1s: Vec<RawPacket>, mut k2s: Vec<RawPacket>, window_secs: i64) -> PairCycle {
    k1s.sort_by(|a, b| a.event_time.cmp(&b.event_time).then(a.id.cmp(&b.id)));
    k2s.sort_by(|a, b| a.event_time.cmp(&b.event_time).then(a.id.cmp(&b.id)));

    let mut consumed: HashSet<u64> = HashSet::with_capacity(k2s.len());
    let mut matched = Vec::new();
    let mut leftover_k1 = Vec::new();

    for k1 in k1s {
        let mut best: Option<&RawPacket> = None;
        let mut best_abs_delta = i64::MAX;

        for k2 in &k2s {
            if consumed.contains(&k2.id) {
                continue;
            }
            let abs_delta = (k1.event_time - k2.event_time).num_milliseconds().abs();
            if abs_delta > window_secs * 1000 {
                continue;
            }

            let is_better = match best {
                None => true,
                Some(_) if abs_delta < best_abs_delta => true,
                Some(current) if abs_delta == best_abs_delta => {
                    k2.event_time < current.event_time
                        || (k2.event_time == current.event_time && k2.id < current.id)
                }
                Some(_) => false,
            };

            if is_better {
                best = Some(k2);
                best_abs_delta = abs_delta;
            }
        }

        match best {
            Some(k2) => {
                consumed.insert(k2.id);
                matched.push((k1, k2.clone()));
            }
            None => leftover_k1.push(k1),
        }
    }

    let leftover_k2 = k2s.into_iter().filter(|k2| !consumed.contains(&k2.id)).collect();

    PairCycle {
        matched,
        leftover_k1,
        leftover_k2,
    }
}
