use chrono::{DateTime, Duration, Utc};

use crate::predict::error::PredictError;
use crate::predict::ground_station::GroundStation;
use crate::predict::propagation::Propagator;
use crate::predict::types::{LookAngle, Pass};

const SCAN_STEP_SECONDS: i64 = 60;
const SCAN_STEPS: usize = 24 * 60;

/// Find the first pass after `from` that rises above `min_elevation` and peaks
/// at or above `guaranteed_elevation`. Thresholds are in degrees.
///
/// The scan samples once a minute for 24 hours. Boundaries are refined to the
/// first and last visible second. Passes that stay below the guaranteed
/// elevation are skipped, as is a pass still open at the end of the horizon.
pub fn next_pass<P: Propagator + ?Sized>(
    from: DateTime<Utc>,
    track: &P,
    station: &GroundStation,
    min_elevation: f64,
    guaranteed_elevation: f64,
) -> Result<Option<Pass>, PredictError> {
    if !track.will_be_seen(station) {
        log::debug!(
            "Orbit never rises above the horizon at {:.3}, {:.3}",
            station.latitude_deg,
            station.longitude_deg
        );
        return Ok(None);
    }

    let finder = Finder {
        track,
        station,
        min_elevation,
    };
    let step = Duration::seconds(SCAN_STEP_SECONDS);

    let mut cursor = from;
    let mut previous: Option<LookAngle> = None;
    let mut start: Option<LookAngle> = None;
    let mut peak = f64::NEG_INFINITY;

    for _ in 0..SCAN_STEPS {
        cursor += step;
        let sample = track.position(station, cursor)?;
        let elevation = sample.elevation_deg();

        if elevation >= min_elevation {
            peak = peak.max(elevation);
            if start.is_none() {
                start = Some(match previous {
                    Some(below) => finder.refine(below, sample)?,
                    // already inside a pass at the first sample
                    None => sample,
                });
            }
        } else if let (Some(pass_start), Some(inside)) = (start.take(), previous) {
            if peak >= guaranteed_elevation {
                let end = finder.refine(inside, sample)?;
                return Ok(Some(Pass {
                    start: pass_start,
                    end,
                    max_elevation_deg: peak,
                }));
            }
            log::debug!(
                "Skipping pass starting {} with peak elevation {:.1}",
                pass_start.time,
                peak
            );
            peak = f64::NEG_INFINITY;
        }

        previous = Some(sample);
    }

    Ok(None)
}

struct Finder<'a, P: ?Sized> {
    track: &'a P,
    station: &'a GroundStation,
    min_elevation: f64,
}

impl<P: Propagator + ?Sized> Finder<'_, P> {
    fn visible(&self, look: &LookAngle) -> bool {
        look.elevation_deg() >= self.min_elevation
    }

    /// Halve the bracket on whole seconds until it collapses. Exactly one of
    /// `lo`/`hi` is visible on entry and that stays true on every iteration.
    fn refine(&self, mut lo: LookAngle, mut hi: LookAngle) -> Result<LookAngle, PredictError> {
        let rising = self.visible(&hi);
        loop {
            let half = (hi.time - lo.time).num_seconds() / 2;
            if half == 0 {
                return Ok(if self.visible(&hi) { hi } else { lo });
            }
            let middle = self
                .track
                .position(self.station, lo.time + Duration::seconds(half))?;
            // keep the half whose ends disagree
            if self.visible(&middle) == rising {
                hi = middle;
            } else {
                lo = middle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::propagation::tests::iss;
    use crate::predict::propagation::Sgp4Track;

    /// Elevation is a sum of parabolic humps, each `(peak_time, peak_deg)`
    /// crossing 10 degrees 300 s either side of its peak.
    struct Humps {
        humps: Vec<(DateTime<Utc>, f64)>,
        visible: bool,
    }

    impl Humps {
        fn new(humps: Vec<(DateTime<Utc>, f64)>) -> Self {
            Self {
                humps,
                visible: true,
            }
        }

        fn elevation_deg(&self, time: DateTime<Utc>) -> f64 {
            self.humps
                .iter()
                .map(|(peak_time, peak)| {
                    let dt = (time - *peak_time).num_milliseconds() as f64 / 1000.0;
                    let k = (peak - 10.0) / (300.0 * 300.0);
                    peak - k * dt * dt
                })
                .fold(-30.0, f64::max)
        }
    }

    impl Propagator for Humps {
        fn position(
            &self,
            _station: &GroundStation,
            time: DateTime<Utc>,
        ) -> Result<LookAngle, PredictError> {
            Ok(LookAngle {
                time,
                azimuth: 0.0,
                elevation: self.elevation_deg(time).to_radians(),
                range_km: 1000.0,
                range_rate_km_s: 0.0,
                latitude_deg: 0.0,
                longitude_deg: 0.0,
            })
        }

        fn will_be_seen(&self, _station: &GroundStation) -> bool {
            self.visible
        }
    }

    struct Failing;

    impl Propagator for Failing {
        fn position(&self, _: &GroundStation, _: DateTime<Utc>) -> Result<LookAngle, PredictError> {
            Err(PredictError::Propagation("decayed".into()))
        }

        fn will_be_seen(&self, _: &GroundStation) -> bool {
            true
        }
    }

    fn station() -> GroundStation {
        GroundStation {
            latitude_deg: 56.189,
            longitude_deg: 38.174,
            altitude_m: 0.0,
        }
    }

    fn from() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(seconds: f64) -> DateTime<Utc> {
        from() + Duration::milliseconds((seconds * 1000.0) as i64)
    }

    fn within_a_second(actual: DateTime<Utc>, expected: DateTime<Utc>) -> bool {
        (actual - expected).num_milliseconds().abs() <= 1000
    }

    #[test]
    fn clean_pass_boundaries_match_crossings() {
        let peak_at = 3600.4;
        let track = Humps::new(vec![(at(peak_at), 55.0)]);

        let pass = next_pass(from(), &track, &station(), 10.0, 40.0)
            .unwrap()
            .unwrap();

        assert!(within_a_second(pass.start.time, at(peak_at - 300.0)));
        assert!(within_a_second(pass.end.time, at(peak_at + 300.0)));
        assert!(pass.start.elevation_deg() >= 10.0);
        assert!(pass.end.elevation_deg() >= 10.0);
        assert!(track.elevation_deg(pass.start.time - Duration::seconds(1)) < 10.0);
        assert!(track.elevation_deg(pass.end.time + Duration::seconds(1)) < 10.0);
        assert!(pass.max_elevation_deg <= 55.0 && pass.max_elevation_deg > 54.0);
    }

    #[test]
    fn low_pass_is_skipped() {
        let track = Humps::new(vec![(at(3000.0), 30.0), (at(20_000.7), 55.0)]);

        let pass = next_pass(from(), &track, &station(), 10.0, 40.0)
            .unwrap()
            .unwrap();

        assert!(within_a_second(pass.start.time, at(20_000.7 - 300.0)));
        assert!(pass.max_elevation_deg >= 40.0);
    }

    #[test]
    fn only_low_passes_give_nothing() {
        let track = Humps::new(vec![(at(3000.0), 39.0), (at(9000.0), 20.0)]);
        assert!(next_pass(from(), &track, &station(), 10.0, 40.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn prediction_is_repeatable() {
        let track = Humps::new(vec![(at(7321.9), 61.0)]);
        let first = next_pass(from(), &track, &station(), 10.0, 40.0).unwrap();
        let second = next_pass(from(), &track, &station(), 10.0, 40.0).unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn pass_in_progress_starts_at_first_sample() {
        let track = Humps::new(vec![(at(120.0), 55.0)]);
        let pass = next_pass(from(), &track, &station(), 10.0, 40.0)
            .unwrap()
            .unwrap();
        assert_eq!(pass.start.time, from() + Duration::minutes(1));
    }

    #[test]
    fn never_visible_orbit_has_no_pass() {
        let mut track = Humps::new(vec![(at(3600.0), 80.0)]);
        track.visible = false;
        assert!(next_pass(from(), &track, &station(), 10.0, 40.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn nothing_within_horizon() {
        let beyond = 25.0 * 3600.0;
        let track = Humps::new(vec![(at(beyond), 80.0)]);
        assert!(next_pass(from(), &track, &station(), 10.0, 40.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn propagation_failure_is_an_error() {
        assert!(matches!(
            next_pass(from(), &Failing, &station(), 10.0, 40.0),
            Err(PredictError::Propagation(_))
        ));
    }

    #[test]
    fn finds_iss_pass() {
        let track = Sgp4Track::from_tle(&iss()).unwrap();
        let epoch = DateTime::parse_from_rfc3339("2020-07-12T21:16:01Z")
            .unwrap()
            .with_timezone(&Utc);

        let pass = next_pass(epoch, &track, &station(), 5.0, 5.0)
            .unwrap()
            .unwrap();

        assert!(pass.start.time > epoch);
        assert!(pass.end.time > pass.start.time);
        assert!(pass.duration() < Duration::minutes(15));
        assert!(pass.start.elevation_deg() >= 5.0);
        assert!(pass.end.elevation_deg() >= 5.0);
        if pass.start.time != epoch + Duration::minutes(1) {
            let before = track
                .position(&station(), pass.start.time - Duration::seconds(1))
                .unwrap();
            assert!(before.elevation_deg() < 5.0);
        }
    }
}
