//! Great-circle distance and the tracked bounding box.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Mean Earth radius used by the reconciler, in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Göteborg city centre.
pub const GOTEBORG: Coordinates = Coordinates {
    lat: 57.706924,
    long: 11.966192,
};

/// Radius of the default tracked area around the centre.
pub const DEFAULT_RADIUS_KM: f64 = 30.0;

// ---------------------------------------------------------------------------
// Haversine
// ---------------------------------------------------------------------------

/// Great-circle distance in metres.
///
/// NaN inputs yield NaN, which compares false against every threshold.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

// ---------------------------------------------------------------------------
// Bounding box
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(alias = "Lat")]
    pub lat: f64,
    #[serde(alias = "Long")]
    pub long: f64,
}

/// Axis-aligned lat/long box given by its lower-left and upper-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lower_left: Coordinates,
    pub upper_right: Coordinates,
}

impl BoundingBox {
    /// Box of roughly `radius_km` in every direction from `center`.
    pub fn around(center: Coordinates, radius_km: f64) -> Self {
        let dlat = radius_km / 111.0;
        let dlon = radius_km / (111.320 * center.lat.to_radians().cos());
        BoundingBox {
            lower_left: Coordinates {
                lat: center.lat - dlat,
                long: center.long - dlon,
            },
            upper_right: Coordinates {
                lat: center.lat + dlat,
                long: center.long + dlon,
            },
        }
    }

    pub fn contains(&self, lat: f64, long: f64) -> bool {
        lat >= self.lower_left.lat
            && lat <= self.upper_right.lat
            && long >= self.lower_left.long
            && long <= self.upper_right.long
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox::around(GOTEBORG, DEFAULT_RADIUS_KM)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
