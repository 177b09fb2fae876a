//! Change computation between consecutive tracked sets.

use std::collections::HashMap;

use crate::types::*;

/// Which fields decide that an identity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    /// Everything except `last_seen`. Vehicles that did not move stay quiet.
    #[default]
    Content,
    /// Every field including `last_seen`. Since reconciliation restamps all
    /// vehicles, every surviving identity is re-sent on every poll.
    Strict,
}

impl Comparison {
    pub fn same(self, a: &IdentifiedVehicle, b: &IdentifiedVehicle) -> bool {
        match self {
            Comparison::Content => a.vehicle == b.vehicle,
            Comparison::Strict => a.vehicle == b.vehicle && a.last_seen == b.last_seen,
        }
    }
}

/// Events that bring a view of `previous` up to `current`.
///
/// Updates come first in `current` order, then deletes in `previous` order.
/// Consumers should still treat the batch as a set.
pub fn diff(
    previous: &[IdentifiedVehicle],
    current: &[IdentifiedVehicle],
    comparison: Comparison,
) -> Vec<ChangeEvent> {
    let before: HashMap<&VehicleId, &IdentifiedVehicle> =
        previous.iter().map(|v| (&v.id, v)).collect();
    let after: HashMap<&VehicleId, &IdentifiedVehicle> =
        current.iter().map(|v| (&v.id, v)).collect();

    let mut events = Vec::new();

    for v in current {
        match before.get(&v.id) {
            Some(old) if comparison.same(old, v) => {}
            _ => events.push(ChangeEvent::Update(v.clone())),
        }
    }

    for v in previous {
        if !after.contains_key(&v.id) {
            events.push(ChangeEvent::delete(v.id.clone()));
        }
    }

    events
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
