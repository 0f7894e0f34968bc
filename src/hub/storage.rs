//! Config file persistence with atomic writes

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::HubConfig;

/// Name of the config file inside a settings directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Path of the config file inside `root`
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Load a config file; missing fields take their defaults
pub fn load_config(path: &Path) -> Result<HubConfig> {
    let data =
        fs::read(path).with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    Ok(config)
}

/// Load a config file if it exists, otherwise return the defaults
pub fn load_config_or_default(path: &Path) -> Result<HubConfig> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(HubConfig::default())
    }
}

/// Write a config file atomically, creating its directory if needed
pub fn write_config(path: &Path, config: &HubConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }
    let data = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
    write_atomic(path, &data)
}

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(data).context("Failed to write data")?;
    file.sync_all().context("Failed to sync file")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = OpenOptions::new().read(true).open(parent) {
            dir.sync_all().ok();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = config_path(&temp.path().join("settings"));

        let config = HubConfig {
            host: "hub.example.org".into(),
            port: 9000,
            ..HubConfig::default()
        };
        write_config(&path, &config).unwrap();

        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = config_path(temp.path());
        fs::write(&path, br#"{"host": "hub25m"}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.host, "hub25m");
        assert_eq!(config.port, crate::hub::DEFAULT_HUB_PORT);
        assert!(!config.test_mode);
    }

    #[test]
    fn test_missing_config_falls_back() {
        let temp = TempDir::new().unwrap();
        let config = load_config_or_default(&temp.path().join("absent.json")).unwrap();
        assert_eq!(config, HubConfig::default());
    }
}
