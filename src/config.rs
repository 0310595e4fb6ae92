use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::cache::CacheLayout;
use crate::domain::TransportKind;
use crate::error::GaldynError;

pub const DEFAULT_CONFIG_FILE: &str = "galdyn-data.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TRANSPORT_RETRIES: u32 = 3;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub transport: Option<TransportKind>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub transport_retries: Option<u32>,
    #[serde(default)]
    pub quiet: Option<bool>,
}

/// Settings every component receives at construction; built once per process.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub cache: CacheLayout,
    /// Forces one transport for every download; `None` follows each
    /// source's own preference.
    pub transport: Option<TransportKind>,
    pub timeout: Duration,
    pub transport_retries: u32,
    pub quiet: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit `path` must be readable; the default file is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GaldynError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GaldynError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GaldynError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GaldynError> {
        let cache = match config.cache_dir {
            Some(dir) => CacheLayout::with_root(Utf8PathBuf::from(dir)),
            None => CacheLayout::new()?,
        };

        Ok(ResolvedConfig {
            cache,
            transport: config.transport,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            transport_retries: config
                .transport_retries
                .unwrap_or(DEFAULT_TRANSPORT_RETRIES),
            quiet: config.quiet.unwrap_or(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.transport, None);
        assert_eq!(resolved.timeout, Duration::from_secs(10));
        assert_eq!(resolved.transport_retries, 3);
        assert!(resolved.quiet);
    }

    #[test]
    fn cache_dir_override() {
        let config = Config {
            cache_dir: Some("/data/galdyn".to_string()),
            transport: Some(TransportKind::Curl),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.cache.root(), "/data/galdyn");
        assert_eq!(resolved.transport, Some(TransportKind::Curl));
    }
}
