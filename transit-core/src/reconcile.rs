//! Identity reconciliation between consecutive position snapshots.
//!
//! Pure logic: no I/O, no clock, no randomness unless the caller asks for
//! it. Each raw observation is matched greedily, in input order, against the
//! best-scoring previous vehicle that has not been claimed yet in this pass.
//! This is not a globally optimal assignment; live vehicle counts per area
//! are small enough that the greedy pass is good enough.

use chrono::{DateTime, Utc};

use crate::geo::haversine_m;
use crate::types::*;

/// Minimum score for a raw observation to inherit a previous identity.
pub const MATCH_THRESHOLD: f64 = 2.5;

/// Distance under which proximity contributes to the score, in metres.
pub const NEARBY_RADIUS_M: f64 = 150.0;

const LINE_WEIGHT: f64 = 1.0;
const MODE_WEIGHT: f64 = 0.5;
const DIRECTION_WEIGHT: f64 = 1.0;
const MAX_DISTANCE_BONUS: f64 = 1.5;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Proximity bonus: 1.5 at 0 m falling linearly to 0 at 150 m.
///
/// Distances at or beyond [`NEARBY_RADIUS_M`], and NaN, give nothing.
pub fn distance_bonus(distance_m: f64) -> f64 {
    if distance_m < NEARBY_RADIUS_M {
        MAX_DISTANCE_BONUS - distance_m / 100.0
    } else {
        0.0
    }
}

/// Similarity between two observations. Higher is more alike.
pub fn score(a: &RawObservation, b: &RawObservation) -> f64 {
    let mut s = 0.0;
    if a.line.name == b.line.name {
        s += LINE_WEIGHT;
    }
    if a.line.transport_mode == b.line.transport_mode {
        s += MODE_WEIGHT;
    }
    if a.direction == b.direction {
        s += DIRECTION_WEIGHT;
    }
    s + distance_bonus(haversine_m(a.latitude, a.longitude, b.latitude, b.longitude))
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// Assign identities to `raw`, minting random identifiers for new vehicles.
pub fn reconcile(
    previous: &[IdentifiedVehicle],
    raw: Vec<RawObservation>,
    now: DateTime<Utc>,
) -> TrackedSet {
    reconcile_with(previous, raw, now, VehicleId::random)
}

/// Assign identities to `raw`, calling `mint` once per unmatched observation.
///
/// The output has exactly one entry per raw observation, in input order, all
/// stamped with `now`. A previous identity is handed out at most once; ties
/// go to whichever previous entry comes first.
pub fn reconcile_with<F>(
    previous: &[IdentifiedVehicle],
    raw: Vec<RawObservation>,
    now: DateTime<Utc>,
    mut mint: F,
) -> TrackedSet
where
    F: FnMut() -> VehicleId,
{
    let mut claimed = vec![false; previous.len()];
    let mut result = Vec::with_capacity(raw.len());

    for observation in raw {
        let mut best: Option<(usize, f64)> = None;

        for (i, candidate) in previous.iter().enumerate() {
            if claimed[i] {
                continue;
            }
            let s = score(&observation, &candidate.vehicle);
            if s >= MATCH_THRESHOLD && best.map_or(true, |(_, top)| s > top) {
                best = Some((i, s));
            }
        }

        let id = match best {
            Some((i, _)) => {
                claimed[i] = true;
                previous[i].id.clone()
            }
            None => mint(),
        };

        result.push(IdentifiedVehicle::new(id, observation, now));
    }

    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
