mod error;
mod planner;
mod types;

pub use error::PlanError;
pub use planner::Planner;
pub use types::{
    ObservationRequest, ObservationResult, SatelliteProfile, SourceKind, DC_OFFSET_HZ,
};
