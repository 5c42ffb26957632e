// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — loads configuration, builds the print pipeline and
// owns its lifecycle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bonwerk_core::AppConfig;
use bonwerk_core::error::Result;
use bonwerk_print::PrintService;
use tracing::info;

use super::data_dir;

/// Shared application services. Cheap to clone.
#[derive(Clone)]
pub struct AppServices {
    print: Arc<PrintService>,
    config: Arc<Mutex<AppConfig>>,
    config_path: PathBuf,
}

impl AppServices {
    /// Load the config from the default location and build the pipeline.
    pub fn init() -> Result<Self> {
        Self::with_config_path(data_dir::config_path())
    }

    pub fn with_config_path(config_path: PathBuf) -> Result<Self> {
        let config = load_config(&config_path)?;
        info!(
            path = %config_path.display(),
            auto_discovery = config.auto_discovery,
            ttl_secs = config.cache_refresh_interval_seconds,
            "app services initialised"
        );
        Ok(Self {
            print: Arc::new(PrintService::from_config(&config)),
            config: Arc::new(Mutex::new(config)),
            config_path,
        })
    }

    pub fn print(&self) -> &PrintService {
        &self.print
    }

    /// Start background printer refresh.
    pub fn start(&self) {
        self.print.registry().start();
    }

    pub async fn shutdown(&self) {
        self.print.registry().shutdown().await;
    }

    // -- Config Persistence --------------------------------------------------

    /// Get a clone of the current config.
    pub fn config(&self) -> AppConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate, store and persist the config. Takes effect on next start.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        persist_config(&self.config_path, config)?;
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config.clone();
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

// -- Config file persistence -------------------------------------------------

/// Read the config file; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    match std::fs::read_to_string(path) {
        Ok(raw) => AppConfig::from_json(&raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no config file, using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn persist_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonwerk_core::BonwerkError;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.cache_refresh_interval_seconds, 30);
        assert_eq!(config.print_defaults.encoding, "CP866");
    }

    #[test]
    fn persisted_config_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.connection.retry_count = 5;
        config.network.mdns = false;
        persist_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.connection.retry_count, 5);
        assert!(!loaded.network.mdns);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "cacheRefreshIntervalSeconds": 0 }"#).unwrap();
        assert!(matches!(load_config(&path), Err(BonwerkError::Config(_))));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(BonwerkError::Serialization(_))));
    }

    #[test]
    fn save_config_updates_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let services = AppServices::with_config_path(path.clone()).unwrap();

        let mut config = services.config();
        config.auto_discovery = false;
        services.save_config(&config).unwrap();

        assert!(!services.config().auto_discovery);
        assert!(!load_config(&path).unwrap().auto_discovery);
    }
}
