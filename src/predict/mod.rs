mod error;
mod ground_station;
mod pass_finder;
mod propagation;
mod tle_loader;
mod types;

pub use error::PredictError;
pub use ground_station::GroundStation;
pub use pass_finder::next_pass;
pub use propagation::{
    apply_downlink_doppler, OrbitModel, Propagator, Sgp4Model, Sgp4Track, SPEED_OF_LIGHT_KM_S,
};
pub use tle_loader::{ElementStore, TleLoader};
pub use types::{LookAngle, Pass, Tle};
