// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serial port enumeration.  USB-serial adapters and CDC-ACM printers show up
// as device nodes; each is probed by opening it for writing.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use bonwerk_core::error::{BonwerkError, Result};
use bonwerk_core::types::{ConnectionKind, PrinterDescriptor};

use super::{DiscoverySource, apply_probe};
use crate::transport::{SerialTransport, Transport};

/// Device-node prefixes that are candidate printer ports.
pub const PORT_PREFIXES: &[&str] = &["ttyUSB", "ttyACM", "cu.usbserial"];

pub fn is_candidate_port(file_name: &str) -> bool {
    PORT_PREFIXES.iter().any(|prefix| file_name.starts_with(prefix))
}

#[derive(Debug, Clone)]
pub struct SerialSource {
    dev_dir: Option<PathBuf>,
    transport: SerialTransport,
}

impl SerialSource {
    /// Scan `/dev` on Unix; elsewhere only configured ports are known.
    pub fn new(probe_timeout: Duration) -> Self {
        let dev_dir = if cfg!(unix) {
            Some(PathBuf::from("/dev"))
        } else {
            None
        };
        Self {
            dev_dir,
            transport: SerialTransport::new(probe_timeout),
        }
    }

    /// Scan another directory for port nodes.
    pub fn with_dir(dir: impl Into<PathBuf>, probe_timeout: Duration) -> Self {
        Self {
            dev_dir: Some(dir.into()),
            transport: SerialTransport::new(probe_timeout),
        }
    }

    async fn port_nodes(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = &self.dev_dir else {
            return Ok(Vec::new());
        };
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| BonwerkError::discovery("serial", format!("read {}: {e}", dir.display())))?;

        let mut ports = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BonwerkError::discovery("serial", e.to_string()))?
        {
            if entry.file_name().to_str().is_some_and(is_candidate_port) {
                ports.push(entry.path());
            }
        }
        ports.sort();
        Ok(ports)
    }
}

#[async_trait]
impl DiscoverySource for SerialSource {
    fn name(&self) -> &'static str {
        "serial"
    }

    async fn discover(&self) -> Result<Vec<PrinterDescriptor>> {
        let mut printers = Vec::new();
        for path in self.port_nodes().await? {
            let address = path.to_string_lossy().into_owned();
            let port = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| address.clone());
            let printer = PrinterDescriptor::new(
                ConnectionKind::Usb,
                address.as_str(),
                format!("Serial Printer {port}"),
                "serial",
            );
            let reachability = self.transport.probe(&address).await;
            debug!(%address, reachable = reachability.is_reachable(), "serial port probed");
            printers.push(apply_probe(printer, reachability));
        }
        Ok(printers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonwerk_core::types::PrinterStatus;

    #[test]
    fn only_usb_serial_nodes_are_candidates() {
        assert!(is_candidate_port("ttyUSB0"));
        assert!(is_candidate_port("ttyACM1"));
        assert!(is_candidate_port("cu.usbserial-1410"));
        assert!(!is_candidate_port("ttyS0"));
        assert!(!is_candidate_port("tty1"));
        assert!(!is_candidate_port("null"));
    }

    #[tokio::test]
    async fn finds_and_probes_port_nodes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ttyUSB0"), b"").unwrap();
        std::fs::write(dir.path().join("ttyS0"), b"").unwrap();
        std::fs::write(dir.path().join("cu.usbserial-1"), b"").unwrap();

        let source = SerialSource::with_dir(dir.path(), Duration::from_secs(1));
        let printers = source.discover().await.unwrap();

        let names: Vec<_> = printers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Serial Printer cu.usbserial-1", "Serial Printer ttyUSB0"]);
        assert!(printers.iter().all(|p| p.status == PrinterStatus::Online));
        assert!(printers.iter().all(|p| p.source == "serial"));
    }

    #[tokio::test]
    async fn missing_directory_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = SerialSource::with_dir(dir.path().join("absent"), Duration::from_secs(1));
        assert!(source.discover().await.is_err());
    }
}
