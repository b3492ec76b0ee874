use chrono::{DateTime, Utc};

use crate::observation::error::PlanError;
use crate::observation::types::{ObservationRequest, SatelliteProfile, SourceKind, DC_OFFSET_HZ};
use crate::predict::{next_pass, ElementStore, GroundStation, OrbitModel, Propagator};

/// Turns satellite profiles into observation requests for the next usable pass.
pub struct Planner<S, M> {
    elements: S,
    model: M,
    station: GroundStation,
    min_elevation: f64,
    guaranteed_elevation: f64,
}

impl<S: ElementStore, M: OrbitModel> Planner<S, M> {
    pub fn new(
        elements: S,
        model: M,
        station: GroundStation,
        min_elevation: f64,
        guaranteed_elevation: f64,
    ) -> Self {
        Self {
            elements,
            model,
            station,
            min_elevation,
            guaranteed_elevation,
        }
    }

    pub fn station(&self) -> &GroundStation {
        &self.station
    }

    /// Plan the next pass of `profile` after `now`. With `immediate` the
    /// window is moved to start at `now`, keeping the predicted duration.
    pub fn plan(
        &self,
        now: DateTime<Utc>,
        profile: &SatelliteProfile,
        immediate: bool,
    ) -> Result<ObservationRequest, PlanError> {
        let tle = self.elements.find(&profile.id).ok_or_else(|| {
            log::error!("Unable to find TLE for {}", profile.name);
            PlanError::NoElements(profile.id.clone())
        })?;
        let track = self.model.track(&tle)?;

        let pass = next_pass(
            now,
            &track,
            &self.station,
            self.min_elevation,
            self.guaranteed_elevation,
        )?
        .ok_or_else(|| {
            log::info!("Can't find next pass for {}", profile.name);
            PlanError::NoPass(profile.id.clone())
        })?;

        let (start, end) = if immediate {
            (now, now + pass.duration())
        } else {
            (pass.start.time, pass.end.time)
        };

        let actual_frequency = match profile.source {
            SourceKind::Apt | SourceKind::Lrpt => profile.frequency,
            SourceKind::Telemetry => {
                // Doppler is largest at the start of the pass
                track.downlink_frequency(&self.station, profile.frequency, pass.start.time)?
                    + DC_OFFSET_HZ
            }
        };
        let (input_sample_rate, output_sample_rate) = profile.source.sample_rates();

        let request = ObservationRequest {
            id: start.timestamp_millis().to_string(),
            satellite_id: profile.id.clone(),
            satellite_frequency: profile.frequency,
            actual_frequency,
            source: profile.source,
            bandwidth: profile.bandwidth,
            input_sample_rate,
            output_sample_rate,
            start,
            end,
            start_latitude: pass.start.latitude_deg,
            end_latitude: pass.end.latitude_deg,
            ground_station: self.station,
            tle,
        };

        log::info!(
            "Planned {} ({}) {} - {}, max elevation {:.1}",
            profile.name,
            request.id,
            request.start,
            request.end,
            pass.max_elevation_deg
        );
        Ok(request)
    }
}
