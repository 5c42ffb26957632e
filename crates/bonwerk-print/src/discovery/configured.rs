// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printers listed in the configuration.  Merged after every enumerating
// source, so a configured entry only appears when nothing else found it.

use std::sync::Arc;

use async_trait::async_trait;

use bonwerk_core::config::{AppConfig, StaticPrinter};
use bonwerk_core::error::Result;
use bonwerk_core::types::{ConnectionKind, PrinterDescriptor};

use super::{DiscoverySource, probe_all};
use crate::dispatcher::Dispatcher;

pub struct ConfiguredSource {
    entries: Vec<(ConnectionKind, StaticPrinter)>,
    dispatcher: Arc<Dispatcher>,
}

impl ConfiguredSource {
    pub fn new(entries: Vec<(ConnectionKind, StaticPrinter)>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            entries,
            dispatcher,
        }
    }

    /// Static lists of every enabled transport. USB, serial and spooler
    /// entries are USB-kind; network entries are LAN.
    pub fn from_config(config: &AppConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let lists = [
            (config.usb.enabled, ConnectionKind::Usb, &config.usb.printers),
            (config.serial.enabled, ConnectionKind::Usb, &config.serial.printers),
            (config.spooler.enabled, ConnectionKind::Usb, &config.spooler.printers),
            (config.network.enabled, ConnectionKind::Lan, &config.network.printers),
        ];
        let entries = lists
            .into_iter()
            .filter(|(enabled, _, _)| *enabled)
            .flat_map(|(_, kind, printers)| printers.iter().map(move |p| (kind, p.clone())))
            .collect();
        Self::new(entries, dispatcher)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DiscoverySource for ConfiguredSource {
    fn name(&self) -> &'static str {
        "configured"
    }

    async fn discover(&self) -> Result<Vec<PrinterDescriptor>> {
        let printers = self
            .entries
            .iter()
            .map(|(kind, entry)| {
                PrinterDescriptor::new(*kind, entry.address.trim(), entry.name.as_str(), "configured")
            })
            .collect();
        Ok(probe_all(&self.dispatcher, printers).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonwerk_core::types::PrinterStatus;
    use tokio::net::TcpListener;

    fn entry(name: &str, address: &str) -> StaticPrinter {
        StaticPrinter {
            name: name.into(),
            address: address.into(),
        }
    }

    #[tokio::test]
    async fn disabled_transports_are_skipped() {
        let mut config = AppConfig::default();
        config.usb.printers.push(entry("Kitchen", "04b8:0202"));
        config.network.printers.push(entry("Bar", "192.168.1.50:9100"));
        config.usb.enabled = false;

        let dispatcher = Arc::new(Dispatcher::from_config(&config));
        let source = ConfiguredSource::from_config(&config, dispatcher);
        assert_eq!(source.entries.len(), 1);
        assert_eq!(source.entries[0].0, ConnectionKind::Lan);
    }

    #[tokio::test]
    async fn network_entries_are_probed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().to_string();
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().to_string()
        };

        let mut config = AppConfig::default();
        config.connection.timeout_ms = 500;
        config.network.printers.push(entry("Bar", &open));
        config.network.printers.push(entry("Gone", &closed));

        let dispatcher = Arc::new(Dispatcher::from_config(&config));
        let printers = ConfiguredSource::from_config(&config, dispatcher)
            .discover()
            .await
            .unwrap();

        assert_eq!(printers.len(), 2);
        assert_eq!(printers[0].name, "Bar");
        assert_eq!(printers[0].status, PrinterStatus::Online);
        assert_eq!(printers[1].status, PrinterStatus::Offline);
        assert!(printers[1].last_error.is_some());
        assert!(printers.iter().all(|p| p.source == "configured"));
    }
}
