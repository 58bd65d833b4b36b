use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// One face recognition system: an embedding model paired with a detector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrsConfig {
    /// Name used in output filenames, e.g. `ArcFace+yunet`.
    pub name: String,
    pub model: String,
    pub detector: String,
}

impl FrsConfig {
    pub fn new(name: &str, model: &str, detector: &str) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            detector: detector.to_string(),
        }
    }
}

/// Built-in configurations evaluated when no FRS file is given.
pub fn default_frs() -> Vec<FrsConfig> {
    vec![
        FrsConfig::new("ArcFace+yunet", "ArcFace", "yunet"),
        FrsConfig::new("Facenet512+retinaface", "Facenet512", "retinaface"),
    ]
}

#[derive(Deserialize)]
struct FrsFile {
    frs: Vec<FrsConfig>,
}

/// Ordered set of FRS configurations available to a run.
#[derive(Debug, Clone)]
pub struct FrsRegistry {
    entries: Vec<FrsConfig>,
}

impl Default for FrsRegistry {
    fn default() -> Self {
        Self {
            entries: default_frs(),
        }
    }
}

impl FrsRegistry {
    pub fn new(entries: Vec<FrsConfig>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::NoFrs);
        }
        Ok(Self { entries })
    }

    /// Load from a TOML file of `[[frs]]` tables with `name`, `model` and
    /// `detector` keys.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidFrsFile {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let file: FrsFile = toml::from_str(&text).map_err(|e| invalid(e.to_string()))?;

        for (i, entry) in file.frs.iter().enumerate() {
            if file.frs[..i].iter().any(|e| e.name == entry.name) {
                return Err(invalid(format!("duplicate FRS name '{}'", entry.name)));
            }
        }
        Self::new(file.frs)
    }

    pub fn get(&self, name: &str) -> Result<&FrsConfig, ConfigError> {
        self.entries
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ConfigError::UnknownFrs(name.to_string()))
    }

    /// Narrow to the named configurations, preserving registry order.
    /// An empty selection keeps everything.
    pub fn select(&self, names: &[String]) -> Result<Vec<FrsConfig>, ConfigError> {
        if names.is_empty() {
            return Ok(self.entries.clone());
        }
        for name in names {
            self.get(name)?;
        }
        Ok(self
            .entries
            .iter()
            .filter(|f| names.contains(&f.name))
            .cloned()
            .collect())
    }

    pub fn all(&self) -> &[FrsConfig] {
        &self.entries
    }
}
