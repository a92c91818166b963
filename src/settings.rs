//! Persisted defaults
//!
//! Stored as JSON in the platform config directory, e.g.
//! ~/.config/iso-creator/settings.json. Command line flags override the
//! loaded values for a single run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::build::BuildOptions;
use crate::naming::DEFAULT_LABEL;

pub const APP_DIR: &str = "iso-creator";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Label used when none is given on the command line
    pub default_label: String,
    /// Where images go when no output directory is given
    pub output_directory: Option<PathBuf>,
    pub build: BuildOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_label: DEFAULT_LABEL.to_string(),
            output_directory: None,
            build: BuildOptions::default(),
        }
    }
}

impl Settings {
    const SETTINGS_FILE: &'static str = "settings.json";

    /// Get the config directory (~/.config/iso-creator/)
    fn get_config_dir() -> Result<PathBuf, String> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
        Ok(config_dir.join(APP_DIR))
    }

    pub fn settings_path() -> Result<PathBuf, String> {
        Ok(Self::get_config_dir()?.join(Self::SETTINGS_FILE))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(settings) => {
                log::debug!("Loaded settings from disk");
                settings
            }
            Err(e) => {
                log::debug!("Using default settings: {}", e);
                Self::default()
            }
        }
    }

    fn try_load() -> Result<Self, String> {
        Self::load_from(&Self::settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Err("Settings file not found".to_string());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse settings: {}", e))
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = Self::settings_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent()
            && !dir.exists()
        {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        log::debug!("Saved settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::InterchangeLevel;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/settings.json");

        let mut settings = Settings::default();
        settings.default_label = "ARCHIVE".to_string();
        settings.output_directory = Some(PathBuf::from("/tmp/images"));
        settings.build.interchange_level = InterchangeLevel::Three;
        settings.build.rock_ridge = false;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Settings::load_from(&temp.path().join("none.json"));
        assert!(result.unwrap_err().contains("not found"));
    }

    #[test]
    fn test_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let result = Settings::load_from(&path);
        assert!(result.unwrap_err().starts_with("Failed to parse"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{"build": {"joliet": false}}"#).unwrap();
        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.default_label, DEFAULT_LABEL);
        assert!(!loaded.build.joliet);
        assert!(loaded.build.skip_on_file_error);
    }
}
