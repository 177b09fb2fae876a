//! transit-core: Pure reconciliation + diffing library for live vehicle tracking.
//!
//! No async, no network I/O. Turns a sequence of identity-less position
//! snapshots into stable identities and minimal change sets. Used by
//! `transit-server`, which owns polling and fan-out.

pub mod config;
pub mod diff;
pub mod geo;
pub mod lines;
pub mod reconcile;
pub mod types;

// Re-export commonly used types at crate root
pub use diff::{diff, Comparison};
pub use geo::{haversine_m, BoundingBox, Coordinates};
pub use lines::{LineCatalog, LineGroup};
pub use reconcile::{reconcile, reconcile_with};
pub use types::*;
