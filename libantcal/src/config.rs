use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_CHI2_ACCURACY, DEFAULT_CONSTRAINT_ACCURACY, DEFAULT_MAX_ITERATIONS};
use super::error::ConfigError;

/// Convergence controls of the constraint fitters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSettings {
    pub max_iterations: usize,
    pub constraint_accuracy: f64,
    pub chi2_accuracy: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            constraint_accuracy: DEFAULT_CONSTRAINT_ACCURACY,
            chi2_accuracy: DEFAULT_CHI2_ACCURACY,
        }
    }
}

/// Structure representing the application configuration. Contains the calibration data location,
/// the storage behavior and the fit settings.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub calibration_data_folder: PathBuf,
    pub enable_caching: bool,
    pub override_to_default: bool,
    #[serde(default)]
    pub fit: FitSettings,
}

impl Default for Config {
    /// Generate a new Config object. The calibration data folder is invalid
    fn default() -> Self {
        Self {
            calibration_data_folder: PathBuf::from("None"),
            enable_caching: false,
            override_to_default: false,
            fit: FitSettings::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check that the calibration data folder exists
    pub fn does_data_folder_exist(&self) -> bool {
        self.calibration_data_folder.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yml");
        std::fs::write(
            &path,
            "calibration_data_folder: /data/calibration\nenable_caching: true\noverride_to_default: false\n",
        )
        .unwrap();
        let config = Config::read_config_file(&path).unwrap();
        assert_eq!(config.calibration_data_folder, PathBuf::from("/data/calibration"));
        assert!(config.enable_caching);
        assert_eq!(config.fit, FitSettings::default());

        assert!(matches!(
            Config::read_config_file(&tmp.path().join("missing.yml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
