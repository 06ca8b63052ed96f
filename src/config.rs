use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    /// CSV file imported once at startup.
    pub import_path: Option<PathBuf>,
    pub report_interval_seconds: u64,
    pub price_change_window_days: u32,
    /// States whose price change is logged on every digest.
    pub watch_states: Vec<String>,
    /// Used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("fuel.db"),
            import_path: None,
            report_interval_seconds: 3600,
            price_change_window_days: 7,
            watch_states: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<AppConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"database_path": "prices.db", "watch_states": ["Lagos"]}}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("prices.db"));
        assert_eq!(config.watch_states, vec!["Lagos".to_string()]);
        assert_eq!(config.price_change_window_days, 7);
        assert!(config.import_path.is_none());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Json { .. })));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.report_interval_seconds, 3600);
    }
}
