use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::inference::gemini::default_models;
use crate::sensors::beat::DEFAULT_THRESHOLD;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Overrides the default database location.
    pub database_path: Option<PathBuf>,
    pub api_key: Option<String>,
    /// Models tried in order until one answers.
    pub models: Vec<String>,
    /// IIO raw-value file of the ADC input wired to the pulse sensor.
    pub pulse_channel: Option<PathBuf>,
    pub adc_bits: u8,
    pub pulse_threshold: u16,
    /// IIO raw object-temperature file of the infrared thermometer.
    pub temperature_channel: Option<PathBuf>,
    /// Skip hardware probing and always simulate.
    pub simulate_sensors: bool,
    pub log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            api_key: None,
            models: default_models(),
            pulse_channel: Some(PathBuf::from(
                "/sys/bus/iio/devices/iio:device0/in_voltage0_raw",
            )),
            adc_bits: 10,
            pulse_threshold: DEFAULT_THRESHOLD,
            temperature_channel: Some(PathBuf::from(
                "/sys/bus/iio/devices/iio:device1/in_temp_object_raw",
            )),
            simulate_sensors: false,
            log_path: None,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
    fn exists(&self) -> bool;

    /// Load the config, first writing the defaults if there is no file yet
    /// so the operator has something to edit.
    fn load_or_create(&self) -> std::io::Result<Config> {
        if self.exists() {
            return Ok(self.load());
        }
        let cfg = Config::default();
        self.save(&cfg)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "triage-kiosk") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("triage_kiosk_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// A missing or unreadable file yields the defaults.
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            if let Ok(cfg) = serde_json::from_slice::<Config>(&bytes) {
                return cfg;
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_load_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk").join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert!(!store.exists());

        let cfg = store.load_or_create().unwrap();
        assert_eq!(cfg, Config::default());
        assert!(store.exists());
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn load_or_create_keeps_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"simulate_sensors": true}"#).unwrap();
        let store = FileConfigStore::with_path(&path);

        let cfg = store.load_or_create().unwrap();
        assert!(cfg.simulate_sensors);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"simulate_sensors": true}"#
        );
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            database_path: Some(dir.path().join("patients.db")),
            api_key: Some("test-key".into()),
            models: vec!["gemini-1.5-pro".into()],
            pulse_channel: None,
            adc_bits: 12,
            pulse_threshold: 50_000,
            temperature_channel: None,
            simulate_sensors: true,
            log_path: Some(dir.path().join("kiosk.log")),
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"simulate_sensors": true}"#).unwrap();

        let loaded = FileConfigStore::with_path(&path).load();
        assert!(loaded.simulate_sensors);
        assert_eq!(loaded.models, default_models());
        assert_eq!(loaded.pulse_threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }
}
