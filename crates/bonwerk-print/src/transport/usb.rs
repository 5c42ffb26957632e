// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Direct USB transport for `vendor:product` addresses.
//
// Writes go through the escpos crate's native USB driver, which claims the
// printer interface and pushes bytes to its bulk OUT endpoint.  The driver is
// blocking, so every call runs on the blocking pool and holds the device lock
// until it returns.

use std::time::Duration;

use async_trait::async_trait;
use escpos::driver::{Driver, NativeUsbDriver};
use nusb::MaybeFuture;
use tokio::time::Instant;
use tracing::{info, instrument};

use bonwerk_core::error::{BonwerkError, Result, TransportErrorKind};
use bonwerk_core::types::parse_usb_ids;

use super::{DeviceLocks, Reachability, Transport, bounded};

#[derive(Debug, Clone)]
pub struct UsbTransport {
    write_timeout: Duration,
    devices: DeviceLocks,
}

impl UsbTransport {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            write_timeout,
            devices: DeviceLocks::new(),
        }
    }
}

fn ids(address: &str) -> Result<(u16, u16)> {
    parse_usb_ids(address).ok_or_else(|| {
        BonwerkError::transport(
            TransportErrorKind::Unknown,
            format!("'{address}' is not a vendor:product USB address"),
        )
    })
}

fn driver_failure(context: &str, detail: impl std::fmt::Display) -> BonwerkError {
    let detail = format!("{context}: {detail}");
    BonwerkError::transport(TransportErrorKind::from_message(&detail), detail)
}

/// Whether a device with these ids is currently enumerated.
pub fn is_attached(vendor_id: u16, product_id: u16) -> std::result::Result<bool, String> {
    let mut devices = nusb::list_devices().wait().map_err(|e| e.to_string())?;
    Ok(devices.any(|dev| dev.vendor_id() == vendor_id && dev.product_id() == product_id))
}

#[async_trait]
impl Transport for UsbTransport {
    fn name(&self) -> &'static str {
        "usb"
    }

    #[instrument(skip(self, data), fields(total = data.len()))]
    async fn send(&self, address: &str, data: &[u8], deadline: Instant) -> Result<()> {
        let (vendor_id, product_id) = ids(address)?;
        let payload = data.to_vec();
        let device = self.devices.acquire(address, deadline).await?;

        let write = tokio::task::spawn_blocking(move || -> Result<()> {
            let _device = device;
            let driver = NativeUsbDriver::open(vendor_id, product_id)
                .map_err(|e| driver_failure(&format!("open {vendor_id:04x}:{product_id:04x}"), e))?;
            driver.write(&payload).map_err(|e| driver_failure("USB write", e))?;
            driver.flush().map_err(|e| driver_failure("USB flush", e))
        });

        bounded(&format!("USB write to {address}"), self.write_timeout, deadline, async {
            write
                .await
                .map_err(|e| BonwerkError::transport(TransportErrorKind::Unknown, format!("USB task: {e}")))?
        })
        .await?;

        info!(address, total = data.len(), "USB payload delivered");
        Ok(())
    }

    async fn probe(&self, address: &str) -> Reachability {
        let Ok((vendor_id, product_id)) = ids(address) else {
            return Reachability::Unreachable(format!("invalid USB address {address}"));
        };
        let lookup = tokio::task::spawn_blocking(move || is_attached(vendor_id, product_id)).await;
        match lookup {
            Ok(Ok(true)) => Reachability::Reachable,
            Ok(Ok(false)) => Reachability::Unreachable(format!("{address} is not attached")),
            Ok(Err(e)) => Reachability::Unreachable(format!("USB enumeration failed: {e}")),
            Err(e) => Reachability::Unreachable(format!("USB enumeration task: {e}")),
        }
    }
}
