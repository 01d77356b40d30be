use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory searched for an export archive when none is given on the CLI.
    pub data_dir: Option<PathBuf>,
    /// Plays shorter than this are ignored by reports.
    pub min_play_seconds: u64,
    /// Rows per "top" list in reports.
    pub top_n: usize,
    /// Minimum plays before a track is ranked by skip rate.
    pub min_plays_for_skip_rate: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            min_play_seconds: 20,
            top_n: 10,
            min_plays_for_skip_rate: 5,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/spinback/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.min_play_seconds, 20);
        assert_eq!(config.top_n, 10);
        assert_eq!(config.min_plays_for_skip_rate, 5);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str("top_n = 25\ndata_dir = \"/tmp/exports\"").unwrap();
        assert_eq!(config.top_n, 25);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/exports")));
        assert_eq!(config.min_play_seconds, 20);
    }

    #[test]
    fn test_bad_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "top_n = \"many\"").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.top_n, 10);

        let missing = AppConfig::load_from(&dir.path().join("nope.toml"));
        assert_eq!(missing.min_play_seconds, 20);
    }
}
