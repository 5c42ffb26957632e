// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BonwerkError, Result};
use crate::types::{Alignment, FontSize};

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Run the enumerating discovery sources. Configured printers are always merged.
    pub auto_discovery: bool,
    /// Upper bound for a single discovery source.
    pub discovery_timeout_ms: u64,
    pub usb: TransportSettings,
    pub serial: TransportSettings,
    pub spooler: TransportSettings,
    pub network: NetworkSettings,
    pub print_defaults: PrintDefaults,
    pub connection: ConnectionSettings,
    /// Printer cache lifetime, also the background refresh period.
    pub cache_refresh_interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_discovery: true,
            discovery_timeout_ms: 5_000,
            usb: TransportSettings::default(),
            serial: TransportSettings::default(),
            spooler: TransportSettings::default(),
            network: NetworkSettings::default(),
            print_defaults: PrintDefaults::default(),
            connection: ConnectionSettings::default(),
            cache_refresh_interval_seconds: 30,
        }
    }
}

impl AppConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.cache_refresh_interval_seconds == 0 {
            return Err(BonwerkError::Config(
                "cacheRefreshIntervalSeconds must be greater than zero".into(),
            ));
        }
        let timeouts = [
            ("discoveryTimeoutMs", self.discovery_timeout_ms),
            ("timeoutMs", self.connection.timeout_ms),
            ("printTimeoutMs", self.connection.print_timeout_ms),
        ];
        if let Some((field, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(BonwerkError::Config(format!("{field} must be greater than zero")));
        }
        let lists = [
            ("usb", &self.usb.printers),
            ("serial", &self.serial.printers),
            ("spooler", &self.spooler.printers),
            ("network", &self.network.printers),
        ];
        for (transport, printers) in lists {
            if let Some(entry) = printers.iter().find(|p| p.address.trim().is_empty()) {
                return Err(BonwerkError::Config(format!(
                    "{transport} printer '{}' has an empty address",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_refresh_interval_seconds)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

/// Enable flag plus statically configured printers for one transport family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportSettings {
    pub enabled: bool,
    pub printers: Vec<StaticPrinter>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            printers: Vec::new(),
        }
    }
}

/// Network transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkSettings {
    pub enabled: bool,
    /// Browse `_pdl-datastream._tcp` during discovery.
    pub mdns: bool,
    pub printers: Vec<StaticPrinter>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mdns: true,
            printers: Vec::new(),
        }
    }
}

/// A printer listed explicitly in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPrinter {
    pub name: String,
    pub address: String,
}

/// Receipt formatting defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrintDefaults {
    pub paper_cut: bool,
    pub encoding: String,
    pub alignment: Alignment,
    pub font_size: FontSize,
}

impl Default for PrintDefaults {
    fn default() -> Self {
        Self {
            paper_cut: true,
            encoding: "CP866".into(),
            alignment: Alignment::Left,
            font_size: FontSize::Normal,
        }
    }
}

/// Connection tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Bound on a single connect attempt.
    pub timeout_ms: u64,
    /// Total network attempts (not additional retries).
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    /// End-to-end budget for one print job, queueing included.
    pub print_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3_000,
            retry_count: 3,
            retry_delay_ms: 500,
            print_timeout_ms: 10_000,
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_millis(self.print_timeout_ms)
    }
}
