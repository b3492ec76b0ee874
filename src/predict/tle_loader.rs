use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use sgp4::Elements;

use crate::predict::error::PredictError;
use crate::predict::types::Tle;

/// Lookup of orbital elements by satellite id.
pub trait ElementStore {
    fn find(&self, satellite_id: &str) -> Option<Tle>;
}

impl ElementStore for HashMap<String, Tle> {
    fn find(&self, satellite_id: &str) -> Option<Tle> {
        self.get(satellite_id).cloned()
    }
}

pub struct TleLoader {
    tle_dir: PathBuf,
    satellites: HashMap<String, Tle>,
}

impl TleLoader {
    pub fn new(tle_dir: PathBuf) -> Self {
        Self {
            tle_dir,
            satellites: HashMap::new(),
        }
    }

    /// Load all TLE files from the directory
    pub fn load_all(&mut self) -> Result<(), PredictError> {
        if !self.tle_dir.exists() {
            return Err(PredictError::DirectoryNotFound(
                self.tle_dir.display().to_string(),
            ));
        }

        self.satellites.clear();

        let entries = fs::read_dir(&self.tle_dir)?;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_tle = path
                .extension()
                .is_some_and(|ext| ext == "tle" || ext == "txt");
            if !is_tle {
                continue;
            }
            match parse_tle_file(&path) {
                Ok(tles) => {
                    for tle in tles {
                        self.satellites.insert(tle.id.clone(), tle);
                    }
                }
                Err(e) => {
                    log::warn!("Failed to parse TLE file {}: {}", path.display(), e);
                }
            }
        }

        log::info!(
            "Loaded {} TLEs from {}",
            self.satellites.len(),
            self.tle_dir.display()
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }
}

impl ElementStore for TleLoader {
    fn find(&self, satellite_id: &str) -> Option<Tle> {
        self.satellites.get(satellite_id).cloned()
    }
}

/// Parse a single TLE file (may contain multiple satellites)
fn parse_tle_file(path: &Path) -> Result<Vec<Tle>, PredictError> {
    let content = fs::read_to_string(path)?;
    let filename = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    parse_multi_tle(&content)
        .into_iter()
        .map(|(name, line1, line2)| {
            let elements = Elements::from_tle(name.clone(), line1.as_bytes(), line2.as_bytes())
                .map_err(|e| PredictError::InvalidTle {
                    name: name.clone().unwrap_or_else(|| filename.clone()),
                    message: e.to_string(),
                })?;
            let id = elements.norad_id.to_string();
            Ok(Tle {
                name: name.unwrap_or_else(|| format!("NORAD {}", id)),
                id,
                line1,
                line2,
            })
        })
        .collect()
}

/// Parse multi-satellite TLE content
fn parse_multi_tle(content: &str) -> Vec<(Option<String>, String, String)> {
    let lines: Vec<&str> = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let mut result = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].starts_with("1 ") && i + 1 < lines.len() && lines[i + 1].starts_with("2 ") {
            // 2-line TLE (no name)
            result.push((None, lines[i].to_string(), lines[i + 1].to_string()));
            i += 2;
        } else if i + 2 < lines.len()
            && lines[i + 1].starts_with("1 ")
            && lines[i + 2].starts_with("2 ")
        {
            // 3-line TLE (with name)
            result.push((
                Some(lines[i].to_string()),
                lines[i + 1].to_string(),
                lines[i + 2].to_string(),
            ));
            i += 3;
        } else {
            i += 1;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::propagation::tests::iss;

    #[test]
    fn loads_named_and_anonymous_sets() {
        let dir = tempfile::tempdir().unwrap();
        let iss = iss();
        fs::write(
            dir.path().join("stations.txt"),
            format!("{}\n{}\n{}\n", iss.name, iss.line1, iss.line2),
        )
        .unwrap();
        fs::write(dir.path().join("ignored.json"), "{}").unwrap();

        let mut loader = TleLoader::new(dir.path().to_path_buf());
        loader.load_all().unwrap();

        assert_eq!(loader.len(), 1);
        let found = loader.find("25544").unwrap();
        assert_eq!(found.name, "ISS (ZARYA)");
        assert_eq!(found.line1, iss.line1);
        assert!(loader.find("40069").is_none());
    }

    #[test]
    fn two_line_sets_get_a_generated_name() {
        let parsed = parse_multi_tle(&format!("{}\n{}\n", iss().line1, iss().line2));
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].0.is_none());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let mut loader = TleLoader::new(PathBuf::from("/nonexistent/tle/folder"));
        assert!(matches!(
            loader.load_all(),
            Err(PredictError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn broken_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.tle"), "SAT\n1 nonsense\n2 nonsense\n").unwrap();
        let mut loader = TleLoader::new(dir.path().to_path_buf());
        loader.load_all().unwrap();
        assert!(loader.is_empty());
    }
}
