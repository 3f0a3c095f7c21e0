use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::LatitudeConfig;

/// Loads the Latitude configuration from disk.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the config path: explicit path > LATITUDE_CONFIG env >
    /// ~/.latitude/latitude.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("LATITUDE_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".latitude")
            .join("latitude.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> latitude_core::Result<LatitudeConfig> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<LatitudeConfig>(&raw).map_err(|e| {
                latitude_core::LatitudeError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            LatitudeConfig::default()
        };

        // Apply environment variable overrides
        let config = Self::apply_env_overrides(config);

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(latitude_core::LatitudeError::Config(e));
            }
        }

        Ok(config)
    }

    /// Apply env var overrides (LATITUDE_DB_PATH, LATITUDE_SERVER_LISTEN, etc.)
    fn apply_env_overrides(mut config: LatitudeConfig) -> LatitudeConfig {
        if let Ok(v) = std::env::var("LATITUDE_DB_PATH") {
            config.storage.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LATITUDE_SERVER_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("LATITUDE_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("LATITUDE_SWEEP_CRON") {
            config.sweep.cron = v;
        }
        // API key: env var fills in when the config file doesn't set one.
        if config.server.api_key.is_none() {
            if let Ok(v) = std::env::var("LATITUDE_API_KEY") {
                config.server.api_key = Some(v);
            }
        }
        config
    }
}
