use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::decoder::DecoderSettings;
use crate::lock::{LockError, PriorityLock, RequesterKind};
use crate::observation::SatelliteProfile;
use crate::predict::GroundStation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid station coordinates '{0}'")]
    InvalidCoordinates(String),
    #[error("min_elevation {min} is above guaranteed_elevation {guaranteed}")]
    InvalidElevations { min: f64, guaranteed: f64 },
    #[error("satellite {0} is configured twice")]
    DuplicateSatellite(String),
    #[error(transparent)]
    Lock(#[from] LockError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub tle: TleConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub satellites: Vec<SatelliteProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub name: Option<String>,
    pub coordinates: String,
    #[serde(default)]
    pub altitude_m: f64,
}

impl StationConfig {
    /// Configured name, or the coordinates when unnamed.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.coordinates)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_min_elevation")]
    pub min_elevation: f64,
    #[serde(default = "default_guaranteed_elevation")]
    pub guaranteed_elevation: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_elevation: default_min_elevation(),
            guaranteed_elevation: default_guaranteed_elevation(),
        }
    }
}

fn default_min_elevation() -> f64 {
    10.0
}

fn default_guaranteed_elevation() -> f64 {
    40.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct TleConfig {
    pub folder: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_meteor_demod")]
    pub meteor_demod: PathBuf,
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            meteor_demod: default_meteor_demod(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("rx-o-mat")
}

fn default_meteor_demod() -> PathBuf {
    PathBuf::from("meteor_demod")
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    pub priorities: HashMap<RequesterKind, u32>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            priorities: HashMap::from([
                (RequesterKind::Observation, 10),
                (RequesterKind::DeviceProbe, 5),
                (RequesterKind::Monitor, 1),
            ]),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Checks everything that is not enforced by deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ground_station()?;
        let (min, guaranteed) = (
            self.scheduler.min_elevation,
            self.scheduler.guaranteed_elevation,
        );
        if min > guaranteed {
            return Err(ConfigError::InvalidElevations { min, guaranteed });
        }
        let mut ids = HashSet::new();
        for satellite in &self.satellites {
            if !ids.insert(satellite.id.as_str()) {
                return Err(ConfigError::DuplicateSatellite(satellite.id.clone()));
            }
        }
        self.priority_lock()?;
        Ok(())
    }

    pub fn ground_station(&self) -> Result<GroundStation, ConfigError> {
        GroundStation::from_coordinates(&self.station.coordinates, Some(self.station.altitude_m))
            .ok_or_else(|| ConfigError::InvalidCoordinates(self.station.coordinates.clone()))
    }

    /// A lock with every configured requester kind registered.
    pub fn priority_lock(&self) -> Result<PriorityLock, ConfigError> {
        let lock = PriorityLock::new();
        for (kind, priority) in &self.lock.priorities {
            lock.register(*kind, *priority)?;
        }
        Ok(lock)
    }

    pub fn satellite(&self, id: &str) -> Option<&SatelliteProfile> {
        self.satellites.iter().find(|s| s.id == id)
    }

    pub fn decoder_settings(&self) -> DecoderSettings {
        DecoderSettings {
            temp_dir: self.decoder.temp_dir.clone(),
            meteor_demod: self.decoder.meteor_demod.clone(),
            shutdown_timeout: self.decoder.shutdown_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Requester;
    use crate::observation::SourceKind;

    const FULL: &str = r#"
station:
  name: Pushchino
  coordinates: "56.189, 38.174"
  altitude_m: 150
scheduler:
  min_elevation: 8
  guaranteed_elevation: 30
tle:
  folder: ./tle
decoder:
  temp_dir: /var/tmp/rx
  meteor_demod: /usr/local/bin/meteor_demod
  shutdown_timeout: 2s 500ms
lock:
  priorities:
    observation: 10
    monitor: 1
satellites:
  - id: "57166"
    name: METEOR-M2 3
    frequency: 137900000
    bandwidth: 120000
    source: lrpt
"#;

    const MINIMAL: &str = r#"
station:
  coordinates: "56.189, 38.174"
tle:
  folder: ./tle
"#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_yaml(FULL).unwrap();
        config.validate().unwrap();

        let station = config.ground_station().unwrap();
        assert_eq!(station.altitude_m, 150.0);
        assert_eq!(config.station.display_name(), "Pushchino");
        assert_eq!(config.scheduler.min_elevation, 8.0);
        assert_eq!(config.decoder.shutdown_timeout, Duration::from_millis(2_500));

        let settings = config.decoder_settings();
        assert_eq!(settings.temp_dir, PathBuf::from("/var/tmp/rx"));

        let satellite = config.satellite("57166").unwrap();
        assert_eq!(satellite.source, SourceKind::Lrpt);
        assert_eq!(satellite.frequency, 137_900_000);
        assert!(config.satellite("40069").is_none());
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.scheduler.guaranteed_elevation, 40.0);
        assert_eq!(config.decoder.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.decoder.meteor_demod, PathBuf::from("meteor_demod"));
        assert_eq!(config.lock.priorities.len(), 3);
        assert!(config.satellites.is_empty());
        assert_eq!(config.station.display_name(), "56.189, 38.174");
    }

    #[test]
    fn configured_priorities_are_registered() {
        let lock = Config::from_yaml(FULL).unwrap().priority_lock().unwrap();
        let (monitor, _rx) = Requester::new(RequesterKind::Monitor);
        assert!(lock.try_acquire(&monitor).unwrap().is_granted());

        // not listed in FULL
        let (probe, _rx) = Requester::new(RequesterKind::DeviceProbe);
        assert_eq!(
            lock.try_acquire(&probe),
            Err(LockError::Unregistered(RequesterKind::DeviceProbe))
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let zero = FULL.replace("monitor: 1", "monitor: 0");
        assert!(matches!(
            Config::from_yaml(&zero).unwrap().validate(),
            Err(ConfigError::Lock(LockError::InvalidPriority(RequesterKind::Monitor)))
        ));

        let inverted = FULL.replace("min_elevation: 8", "min_elevation: 45");
        assert!(matches!(
            Config::from_yaml(&inverted).unwrap().validate(),
            Err(ConfigError::InvalidElevations { .. })
        ));

        let bad_station = MINIMAL.replace("56.189, 38.174", "somewhere");
        assert!(matches!(
            Config::from_yaml(&bad_station).unwrap().validate(),
            Err(ConfigError::InvalidCoordinates(_))
        ));

        let twice = format!(
            "{}  - {{ id: \"57166\", name: copy, frequency: 1, bandwidth: 1, source: apt }}\n",
            FULL
        );
        assert!(matches!(
            Config::from_yaml(&twice).unwrap().validate(),
            Err(ConfigError::DuplicateSatellite(_))
        ));
    }

    #[test]
    fn unknown_source_is_a_parse_error() {
        let unknown = FULL.replace("source: lrpt", "source: fax");
        assert!(matches!(
            Config::from_yaml(&unknown),
            Err(ConfigError::Yaml(_))
        ));
    }
}
