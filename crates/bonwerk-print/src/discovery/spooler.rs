// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OS spooler queues as printers.  `lpstat` already reports queue state, so
// no separate probe is made.

use async_trait::async_trait;

use bonwerk_core::error::{BonwerkError, Result};
use bonwerk_core::types::{ConnectionKind, PrinterDescriptor, PrinterStatus};

use super::DiscoverySource;
use crate::transport::spooler::{SpoolerQueue, list_queues};

pub fn queue_descriptor(queue: SpoolerQueue) -> PrinterDescriptor {
    let printer = PrinterDescriptor::new(ConnectionKind::Usb, queue.name.as_str(), queue.name.as_str(), "spooler");
    match queue.status {
        PrinterStatus::Offline => printer.with_error(PrinterStatus::Offline, "queue disabled"),
        status => printer.with_status(status),
    }
}

#[derive(Debug, Default)]
pub struct SpoolerSource;

impl SpoolerSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiscoverySource for SpoolerSource {
    fn name(&self) -> &'static str {
        "spooler"
    }

    async fn discover(&self) -> Result<Vec<PrinterDescriptor>> {
        let queues = list_queues(None)
            .await
            .map_err(|e| BonwerkError::discovery("spooler", e.to_string()))?;
        Ok(queues.into_iter().map(queue_descriptor).collect())
    }
}
