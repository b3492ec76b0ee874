use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::predict::{GroundStation, Tle};

/// Offset added to the Doppler-shifted telemetry frequency so the signal sits
/// away from the receiver's DC spike.
pub const DC_OFFSET_HZ: i64 = 10_000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    Apt,
    Lrpt,
    Telemetry,
}

impl SourceKind {
    /// Capture and post-decimation sample rates in Hz.
    pub fn sample_rates(self) -> (u32, u32) {
        match self {
            SourceKind::Apt => (60_000, 11_025),
            SourceKind::Lrpt => (288_000, 144_000),
            SourceKind::Telemetry => (240_000, 48_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteProfile {
    pub id: String,
    pub name: String,
    /// Nominal downlink frequency in Hz.
    pub frequency: i64,
    /// Signal bandwidth in Hz.
    pub bandwidth: i64,
    pub source: SourceKind,
}

/// Everything capture and decode need to know about one planned observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub id: String,
    pub satellite_id: String,
    pub satellite_frequency: i64,
    pub actual_frequency: i64,
    pub source: SourceKind,
    pub bandwidth: i64,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub start_latitude: f64,
    pub end_latitude: f64,
    pub ground_station: GroundStation,
    pub tle: Tle,
}

impl ObservationRequest {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// Outcome of a decode. `error` is set only when a stage failed outright;
/// zero `decoded_packets` with no error means nothing was receivable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationResult {
    pub raw_path: PathBuf,
    pub data_path: Option<PathBuf>,
    pub image_path: Option<PathBuf>,
    pub decoded_packets: u64,
    pub error: Option<String>,
}

impl ObservationResult {
    pub fn new(raw_path: PathBuf) -> Self {
        Self {
            raw_path,
            ..Default::default()
        }
    }
}
