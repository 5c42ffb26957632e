// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer discovery across every attachment family.
//
// Each source runs in its own task, bounded by the discovery timeout.  A
// source that errors, times out or panics contributes nothing; the others
// are unaffected.  Reports are folded in source order and deduplicated by
// printer id, first seen wins.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use bonwerk_core::config::AppConfig;
use bonwerk_core::error::{BonwerkError, Result};
use bonwerk_core::types::{PrinterDescriptor, PrinterStatus};

use crate::dispatcher::Dispatcher;
use crate::transport::Reachability;

pub mod configured;
pub mod network;
pub mod serial;
pub mod spooler;
pub mod usb;

pub use configured::ConfiguredSource;
pub use network::NetworkSource;
pub use serial::SerialSource;
pub use spooler::SpoolerSource;
pub use usb::UsbSource;

/// One way of finding printers.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Short name, recorded on every descriptor this source produces.
    fn name(&self) -> &'static str;

    /// Enumerate printers, each with a freshly probed status.
    async fn discover(&self) -> Result<Vec<PrinterDescriptor>>;
}

/// Outcome of one source run.
#[derive(Debug)]
pub struct SourceReport {
    pub source: &'static str,
    pub result: Result<Vec<PrinterDescriptor>>,
}

/// Fold reports in order. Failed sources are logged and skipped; duplicate
/// ids after the first are dropped.
pub fn merge_reports(reports: impl IntoIterator<Item = SourceReport>) -> Vec<PrinterDescriptor> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for report in reports {
        let printers = match report.result {
            Ok(printers) => printers,
            Err(e) => {
                warn!(source = report.source, error = %e, "discovery source failed");
                continue;
            }
        };
        if printers.is_empty() {
            debug!(source = report.source, "discovery source found nothing");
            continue;
        }
        for printer in printers {
            if seen.insert(printer.id.clone()) {
                merged.push(printer);
            } else {
                debug!(source = report.source, id = %printer.id, "duplicate printer dropped");
            }
        }
    }
    merged
}

/// Apply a probe result to a descriptor.
pub fn apply_probe(printer: PrinterDescriptor, reachability: Reachability) -> PrinterDescriptor {
    match reachability {
        Reachability::Reachable => printer.with_status(PrinterStatus::Online),
        Reachability::Unreachable(reason) => printer.with_error(PrinterStatus::Offline, reason),
    }
}

/// Probe every descriptor concurrently through the dispatcher, keeping order.
pub async fn probe_all(
    dispatcher: &Arc<Dispatcher>,
    printers: Vec<PrinterDescriptor>,
) -> Vec<PrinterDescriptor> {
    let probes: Vec<_> = printers
        .iter()
        .map(|printer| {
            let dispatcher = Arc::clone(dispatcher);
            let kind = printer.connection_kind;
            let address = printer.address.clone();
            tokio::spawn(async move { dispatcher.probe(kind, &address).await })
        })
        .collect();

    let mut probed = Vec::with_capacity(printers.len());
    for (printer, probe) in printers.into_iter().zip(probes) {
        let reachability = probe
            .await
            .unwrap_or_else(|e| Reachability::Unreachable(format!("probe task failed: {e}")));
        probed.push(apply_probe(printer, reachability));
    }
    probed
}

/// Runs all configured sources and merges their results.
pub struct DiscoveryAggregator {
    sources: Vec<Arc<dyn DiscoverySource>>,
    timeout: Duration,
}

impl DiscoveryAggregator {
    pub fn new(sources: Vec<Arc<dyn DiscoverySource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    /// Sources in merge order: USB, serial, spooler, mDNS, then configured.
    pub fn from_config(config: &AppConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let mut sources: Vec<Arc<dyn DiscoverySource>> = Vec::new();
        let timeout = config.discovery_timeout();

        if config.auto_discovery {
            if config.usb.enabled {
                sources.push(Arc::new(UsbSource::new()));
            }
            if config.serial.enabled {
                sources.push(Arc::new(SerialSource::new(config.connection.connect_timeout())));
            }
            if config.spooler.enabled {
                sources.push(Arc::new(SpoolerSource::new()));
            }
            if config.network.enabled && config.network.mdns {
                sources.push(Arc::new(NetworkSource::new(
                    Arc::clone(&dispatcher),
                    timeout / 2,
                )));
            }
        }

        let configured = ConfiguredSource::from_config(config, dispatcher);
        if !configured.is_empty() {
            sources.push(Arc::new(configured));
        }

        info!(
            sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "discovery configured"
        );
        Self::new(sources, timeout)
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run every source concurrently; one report per source, in source order.
    pub async fn collect_reports(&self) -> Vec<SourceReport> {
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let name = source.name();
                let timeout = self.timeout;
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(timeout, source.discover()).await {
                        Ok(result) => result,
                        Err(_) => Err(BonwerkError::discovery(
                            name,
                            format!("timed out after {} ms", timeout.as_millis()),
                        )),
                    }
                });
                (name, handle)
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(BonwerkError::discovery(name, format!("task failed: {e}"))));
            reports.push(SourceReport { source: name, result });
        }
        reports
    }

    /// Discover and merge.
    pub async fn discover(&self) -> Vec<PrinterDescriptor> {
        let printers = merge_reports(self.collect_reports().await);
        info!(count = printers.len(), "discovery finished");
        printers
    }
}
