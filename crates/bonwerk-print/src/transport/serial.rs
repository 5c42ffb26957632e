// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serial-port transport.
//
// Receipt printers on a serial line are written to through the port's device
// node.  Line settings (baud, parity) are whatever the OS has configured for
// the port.  Writes are blocking and hold the device lock until they return,
// even when the caller has already given up.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::time::Instant;
use tracing::{info, instrument};

use bonwerk_core::error::{BonwerkError, Result, TransportErrorKind};

use super::{DeviceLocks, Reachability, Transport, bounded};

/// Bound on opening the port node.
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SerialTransport {
    write_timeout: Duration,
    devices: DeviceLocks,
}

impl SerialTransport {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            write_timeout,
            devices: DeviceLocks::new(),
        }
    }
}

fn write_port(path: &Path, address: &str, data: &[u8]) -> Result<()> {
    let mut port = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| BonwerkError::transport_io(&format!("open {address}"), &e))?;
    port.write_all(data)
        .map_err(|e| BonwerkError::transport_io(&format!("write to {address}"), &e))?;
    port.flush()
        .map_err(|e| BonwerkError::transport_io(&format!("flush {address}"), &e))
}

/// Path to open for a port name. `COM10` and up need the device namespace prefix.
pub fn device_path(address: &str) -> PathBuf {
    let address = address.trim();
    let is_com = address
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("com"));
    if is_com && address.len() > 3 {
        PathBuf::from(format!(r"\\.\{address}"))
    } else {
        PathBuf::from(address)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn name(&self) -> &'static str {
        "serial"
    }

    #[instrument(skip(self, data), fields(total = data.len()))]
    async fn send(&self, address: &str, data: &[u8], deadline: Instant) -> Result<()> {
        let path = device_path(address);
        let device = self.devices.acquire(address, deadline).await?;

        let owned_address = address.to_owned();
        let payload = data.to_vec();
        let write = tokio::task::spawn_blocking(move || {
            let _device = device;
            write_port(&path, &owned_address, &payload)
        });

        let budget = OPEN_TIMEOUT + self.write_timeout;
        bounded(&format!("write to {address}"), budget, deadline, async {
            write
                .await
                .map_err(|e| BonwerkError::transport(TransportErrorKind::Unknown, format!("serial task: {e}")))?
        })
        .await?;

        info!(port = address, total = data.len(), "serial payload delivered");
        Ok(())
    }

    async fn probe(&self, address: &str) -> Reachability {
        let path = device_path(address);
        let mut options = OpenOptions::new();
        let open = options.write(true).open(&path);
        match tokio::time::timeout(OPEN_TIMEOUT, open).await {
            Ok(Ok(_)) => Reachability::Reachable,
            Ok(Err(e)) => Reachability::Unreachable(format!("open {address}: {e}")),
            Err(_) => Reachability::Unreachable(format!("open {address} timed out")),
        }
    }
}
