use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two-line element set as loaded from disk. Only the propagation oracle
/// looks inside the lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tle {
    pub id: String,
    pub name: String,
    pub line1: String,
    pub line2: String,
}

/// Position of a satellite as seen from the ground station at `time`.
/// Angles are in radians; latitude/longitude are of the sub-satellite point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LookAngle {
    pub time: DateTime<Utc>,
    pub azimuth: f64,
    pub elevation: f64,
    pub range_km: f64,
    pub range_rate_km_s: f64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl LookAngle {
    pub fn elevation_deg(&self) -> f64 {
        self.elevation * 180.0 / std::f64::consts::PI
    }
}

/// One continuous window above the minimum elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pass {
    pub start: LookAngle,
    pub end: LookAngle,
    pub max_elevation_deg: f64,
}

impl Pass {
    pub fn duration(&self) -> chrono::Duration {
        self.end.time - self.start.time
    }
}
