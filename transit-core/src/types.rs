//! Shared types, error enum, and change events for transit-core.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced by transit-core.
#[derive(Debug, Error)]
pub enum TransitError {
    #[error("config error: {0}")]
    Config(String),
    #[error("unknown line group: {0}")]
    UnknownLineGroup(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TransitError>;

// ---------------------------------------------------------------------------
// Line metadata
// ---------------------------------------------------------------------------

/// Display metadata for a line, as reported by the positions API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInfo {
    /// Line designation, e.g. "6" or "X4".
    pub name: String,
    /// Transport mode, e.g. "tram" or "bus".
    #[serde(default)]
    pub transport_mode: String,
    #[serde(default)]
    pub background_color: String,
    #[serde(default)]
    pub foreground_color: String,
    #[serde(default)]
    pub border_color: String,
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// A vehicle position as reported upstream. Carries no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Vehicle display name, usually the line designation.
    pub name: String,
    /// Direction label, e.g. "Frölunda Torg".
    pub direction: String,
    pub latitude: f64,
    pub longitude: f64,
    pub line: LineInfo,
}

/// Opaque vehicle identifier. Never reused once retired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        VehicleId(id.into())
    }

    /// Mint a fresh random (v4 UUID) identifier.
    pub fn random() -> Self {
        VehicleId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An observation bound to a stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedVehicle {
    pub id: VehicleId,
    #[serde(rename = "lastSeenAt")]
    pub last_seen: DateTime<Utc>,
    #[serde(flatten)]
    pub vehicle: RawObservation,
}

impl IdentifiedVehicle {
    pub fn new(id: VehicleId, vehicle: RawObservation, last_seen: DateTime<Utc>) -> Self {
        IdentifiedVehicle {
            id,
            last_seen,
            vehicle,
        }
    }
}

/// All vehicles identified by the most recent successful poll.
pub type TrackedSet = Vec<IdentifiedVehicle>;

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

/// Payload of a delete event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removed {
    pub id: VehicleId,
}

/// One change between consecutive tracked sets.
///
/// Serializes as `{"update": {...}}` or `{"delete": {"id": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEvent {
    /// This identity now has this state (new arrival or changed vehicle).
    Update(IdentifiedVehicle),
    /// This identity is no longer observed.
    Delete(Removed),
}

impl ChangeEvent {
    pub fn delete(id: VehicleId) -> Self {
        ChangeEvent::Delete(Removed { id })
    }

    /// Identifier the event refers to.
    pub fn id(&self) -> &VehicleId {
        match self {
            ChangeEvent::Update(v) => &v.id,
            ChangeEvent::Delete(r) => &r.id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeEvent::Delete(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn sample() -> IdentifiedVehicle {
        IdentifiedVehicle::new(
            VehicleId::new("abc"),
            RawObservation {
                name: "6".into(),
                direction: "Länsmansgården".into(),
                latitude: 57.7,
                longitude: 11.96,
                line: LineInfo {
                    name: "6".into(),
                    transport_mode: "tram".into(),
                    background_color: "#f39200".into(),
                    foreground_color: "#ffffff".into(),
                    border_color: "#f39200".into(),
                },
            },
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_update_wire_format() {
        let json: Value = serde_json::to_value(ChangeEvent::Update(sample())).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);

        let update = &json["update"];
        assert_eq!(update["id"], "abc");
        assert_eq!(update["lastSeenAt"], "2024-05-01T12:00:00Z");
        assert_eq!(update["name"], "6");
        assert_eq!(update["direction"], "Länsmansgården");
        assert_eq!(update["latitude"], 57.7);
        assert_eq!(update["line"]["transportMode"], "tram");
        assert_eq!(update["line"]["backgroundColor"], "#f39200");
    }

    #[test]
    fn test_delete_wire_format() {
        let json = serde_json::to_string(&ChangeEvent::delete(VehicleId::new("abc"))).unwrap();
        assert_eq!(json, r#"{"delete":{"id":"abc"}}"#);
    }

    #[test]
    fn test_update_parses_back() {
        let event = ChangeEvent::Update(sample());
        let text = serde_json::to_string(&event).unwrap();
        let parsed: ChangeEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_line_info_missing_colors() {
        let line: LineInfo = serde_json::from_str(r#"{"name":"X4"}"#).unwrap();
        assert_eq!(line.name, "X4");
        assert!(line.transport_mode.is_empty());
    }

    #[test]
    fn test_random_ids_distinct() {
        assert_ne!(VehicleId::random(), VehicleId::random());
    }

    #[test]
    fn test_event_id() {
        let event = ChangeEvent::delete(VehicleId::new("x"));
        assert_eq!(event.id().as_str(), "x");
        assert!(event.is_delete());
        assert!(!ChangeEvent::Update(sample()).is_delete());
    }
}
