use chrono::{DateTime, Utc};
use sgp4::{Constants, Elements};

use crate::predict::error::PredictError;
use crate::predict::ground_station::{
    GroundStation, EARTH_E2, EARTH_RADIUS_KM, EARTH_ROTATION_RAD_S,
};
use crate::predict::types::{LookAngle, Tle};

pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Orbit propagation for one satellite. Must be deterministic for fixed inputs.
pub trait Propagator {
    fn position(
        &self,
        station: &GroundStation,
        time: DateTime<Utc>,
    ) -> Result<LookAngle, PredictError>;

    /// Cheap check whether the orbit can ever rise above the station horizon.
    fn will_be_seen(&self, station: &GroundStation) -> bool;

    /// Frequency received at the station for a transmitter at `frequency_hz`.
    fn downlink_frequency(
        &self,
        station: &GroundStation,
        frequency_hz: i64,
        time: DateTime<Utc>,
    ) -> Result<i64, PredictError> {
        let look = self.position(station, time)?;
        Ok(apply_downlink_doppler(frequency_hz as f64, look.range_rate_km_s).round() as i64)
    }
}

/// Builds a propagator from orbital elements.
pub trait OrbitModel {
    type Track: Propagator;

    fn track(&self, tle: &Tle) -> Result<Self::Track, PredictError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sgp4Model;

impl OrbitModel for Sgp4Model {
    type Track = Sgp4Track;

    fn track(&self, tle: &Tle) -> Result<Sgp4Track, PredictError> {
        Sgp4Track::from_tle(tle)
    }
}

pub struct Sgp4Track {
    elements: Elements,
    constants: Constants,
}

impl Sgp4Track {
    pub fn from_tle(tle: &Tle) -> Result<Self, PredictError> {
        let invalid = |message: String| PredictError::InvalidTle {
            name: tle.name.clone(),
            message,
        };
        let elements = Elements::from_tle(
            Some(tle.name.clone()),
            tle.line1.as_bytes(),
            tle.line2.as_bytes(),
        )
        .map_err(|e| invalid(e.to_string()))?;
        let constants = Constants::from_elements(&elements).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            elements,
            constants,
        })
    }
}

impl Propagator for Sgp4Track {
    fn position(
        &self,
        station: &GroundStation,
        time: DateTime<Utc>,
    ) -> Result<LookAngle, PredictError> {
        let minutes = self
            .elements
            .datetime_to_minutes_since_epoch(&time.naive_utc())
            .map_err(|e| PredictError::Propagation(e.to_string()))?;

        let prediction = self
            .constants
            .propagate(minutes)
            .map_err(|e| PredictError::Propagation(e.to_string()))?;

        let sidereal =
            sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&time.naive_utc()));

        let sat_ecef = teme_to_ecef_position(prediction.position, sidereal);
        let sat_vel_ecef =
            teme_to_ecef_velocity(prediction.position, prediction.velocity, sidereal);

        let sta_ecef = station.position_ecef_km();
        let sta_vel = station.velocity_ecef_km_s();

        let dr = [
            sat_ecef[0] - sta_ecef[0],
            sat_ecef[1] - sta_ecef[1],
            sat_ecef[2] - sta_ecef[2],
        ];
        let range_km = (dr[0] * dr[0] + dr[1] * dr[1] + dr[2] * dr[2]).sqrt();

        let (east, north, up) = ecef_to_enu(dr, station.lat_rad(), station.lon_rad());
        let azimuth = east.atan2(north).rem_euclid(std::f64::consts::TAU);
        let elevation = if range_km > 0.0 {
            (up / range_km).asin()
        } else {
            0.0
        };

        let rel_vel = [
            sat_vel_ecef[0] - sta_vel[0],
            sat_vel_ecef[1] - sta_vel[1],
            sat_vel_ecef[2] - sta_vel[2],
        ];
        let range_rate_km_s = if range_km > 0.0 {
            (rel_vel[0] * dr[0] + rel_vel[1] * dr[1] + rel_vel[2] * dr[2]) / range_km
        } else {
            0.0
        };

        let (latitude_deg, longitude_deg) = ecef_to_geodetic(sat_ecef);

        Ok(LookAngle {
            time,
            azimuth,
            elevation,
            range_km,
            range_rate_km_s,
            latitude_deg,
            longitude_deg,
        })
    }

    fn will_be_seen(&self, station: &GroundStation) -> bool {
        let mean_motion = self.elements.mean_motion;
        if mean_motion < 1e-8 {
            return false;
        }
        let mut inclination = self.elements.inclination;
        if inclination >= 90.0 {
            inclination = 180.0 - inclination;
        }
        let semi_major_axis = 331.25 * ((1440.0 / mean_motion).ln() * (2.0 / 3.0)).exp();
        let apogee = semi_major_axis * (1.0 + self.elements.eccentricity) - EARTH_RADIUS_KM;
        (EARTH_RADIUS_KM / (apogee + EARTH_RADIUS_KM)).acos() + inclination.to_radians()
            > station.lat_rad().abs()
    }
}

pub fn apply_downlink_doppler(freq_hz: f64, range_rate_km_s: f64) -> f64 {
    freq_hz * (1.0 - range_rate_km_s / SPEED_OF_LIGHT_KM_S)
}

pub fn teme_to_ecef_position(pos_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    [
        pos_teme[0] * cos_gmst + pos_teme[1] * sin_gmst,
        -pos_teme[0] * sin_gmst + pos_teme[1] * cos_gmst,
        pos_teme[2],
    ]
}

pub fn teme_to_ecef_velocity(pos_teme: [f64; 3], vel_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    let pos = teme_to_ecef_position(pos_teme, gmst);
    let rotated = [
        vel_teme[0] * cos_gmst + vel_teme[1] * sin_gmst,
        -vel_teme[0] * sin_gmst + vel_teme[1] * cos_gmst,
        vel_teme[2],
    ];
    [
        rotated[0] + EARTH_ROTATION_RAD_S * pos[1],
        rotated[1] - EARTH_ROTATION_RAD_S * pos[0],
        rotated[2],
    ]
}

pub fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let sin_lon = lon_rad.sin();
    let cos_lon = lon_rad.cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

/// Geodetic latitude/longitude in degrees of an ECEF point (km).
pub fn ecef_to_geodetic(ecef: [f64; 3]) -> (f64, f64) {
    let [x, y, z] = ecef;
    let p = x.hypot(y);
    let longitude = y.atan2(x);
    let mut latitude = z.atan2(p * (1.0 - EARTH_E2));
    for _ in 0..5 {
        let sin_lat = latitude.sin();
        let n = EARTH_RADIUS_KM / (1.0 - EARTH_E2 * sin_lat * sin_lat).sqrt();
        latitude = (z + EARTH_E2 * n * sin_lat).atan2(p);
    }
    (latitude.to_degrees(), longitude.to_degrees())
}
