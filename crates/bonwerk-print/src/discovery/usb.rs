// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// USB bus enumeration.
//
// A device counts as a receipt printer when it exposes the USB printer class
// on the device or any interface, or comes from a vendor that ships
// vendor-class printer interfaces.  Being enumerated is the reachability
// check.

use async_trait::async_trait;
use nusb::MaybeFuture;
use tracing::{debug, info};

use bonwerk_core::error::{BonwerkError, Result};
use bonwerk_core::types::{ConnectionKind, PrinterDescriptor, PrinterStatus};

use super::DiscoverySource;

/// USB printer device class.
pub const PRINTER_CLASS: u8 = 0x07;

/// Epson, Star, Citizen, Winbond-based clones (Xprinter and friends).
pub const KNOWN_VENDORS: &[u16] = &[0x04b8, 0x0519, 0x1504, 0x0416];

pub fn is_printer(vendor_id: u16, device_class: u8, interface_classes: &[u8]) -> bool {
    device_class == PRINTER_CLASS
        || interface_classes.contains(&PRINTER_CLASS)
        || KNOWN_VENDORS.contains(&vendor_id)
}

/// Display name for a device.
pub fn display_name(product: Option<&str>, vendor_id: u16, product_id: u16) -> String {
    match product.map(str::trim).filter(|p| !p.is_empty()) {
        Some(product) => product.to_owned(),
        None => format!("USB Printer {vendor_id:04x}:{product_id:04x}"),
    }
}

#[derive(Debug, Default)]
pub struct UsbSource;

impl UsbSource {
    pub fn new() -> Self {
        Self
    }

    fn scan() -> Result<Vec<PrinterDescriptor>> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(|e| BonwerkError::discovery("usb", e.to_string()))?;

        let mut printers = Vec::new();
        for dev in devices {
            let vendor_id = dev.vendor_id();
            let product_id = dev.product_id();
            let interface_classes: Vec<u8> = dev.interfaces().map(|i| i.class()).collect();
            if !is_printer(vendor_id, dev.class(), &interface_classes) {
                continue;
            }

            let name = display_name(dev.product_string(), vendor_id, product_id);
            let address = format!("{vendor_id:04x}:{product_id:04x}");
            debug!(%address, %name, "USB printer enumerated");
            printers.push(
                PrinterDescriptor::new(ConnectionKind::Usb, address, name, "usb")
                    .with_status(PrinterStatus::Online),
            );
        }
        Ok(printers)
    }
}

#[async_trait]
impl DiscoverySource for UsbSource {
    fn name(&self) -> &'static str {
        "usb"
    }

    async fn discover(&self) -> Result<Vec<PrinterDescriptor>> {
        let printers = tokio::task::spawn_blocking(Self::scan)
            .await
            .map_err(|e| BonwerkError::discovery("usb", format!("enumeration task: {e}")))??;
        info!(count = printers.len(), "USB scan complete");
        Ok(printers)
    }
}
