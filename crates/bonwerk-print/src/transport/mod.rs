// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Byte channels to physical printers.
//
// One `Transport` per channel family.  A transport knows nothing about retry
// or queueing; it makes one attempt bounded by the caller's deadline and
// reports a typed failure.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

use bonwerk_core::error::{BonwerkError, Result, TransportErrorKind};
use bonwerk_core::types::PrinterStatus;

pub mod network;
pub mod serial;
pub mod spooler;
pub mod usb;

pub use network::NetworkTransport;
pub use serial::SerialTransport;
pub use spooler::SpoolerTransport;
pub use usb::UsbTransport;

/// Result of an accessibility check (open/connect without writing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable(String),
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }

    /// Status recorded on a descriptor for this probe result.
    pub fn status(&self) -> PrinterStatus {
        match self {
            Self::Reachable => PrinterStatus::Online,
            Self::Unreachable(_) => PrinterStatus::Offline,
        }
    }
}

/// A channel that can deliver bytes to a printer address.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Deliver `data` in one attempt, giving up at `deadline`.
    async fn send(&self, address: &str, data: &[u8], deadline: Instant) -> Result<()>;

    /// Check the address is accessible without printing anything.
    async fn probe(&self, address: &str) -> Reachability;
}

/// Time left until `deadline`, zero once it has passed.
pub fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Run `fut` for at most `limit`, further clipped by `deadline`.
pub async fn bounded<T, F>(what: &str, limit: Duration, deadline: Instant, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let budget = limit.min(remaining(deadline));
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(BonwerkError::transport(
            TransportErrorKind::Connectivity,
            format!("{what} timed out after {} ms", budget.as_millis()),
        )),
    }
}

/// Exclusive access to a device node, per address.
///
/// Blocking writes cannot be cancelled, so the guard is moved into the
/// blocking task and released only when the write has really finished.
/// A timed-out job therefore never overlaps the next write to the same
/// device.
#[derive(Debug, Clone, Default)]
pub struct DeviceLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the device at `address`, giving up at `deadline`.
    pub async fn acquire(&self, address: &str, deadline: Instant) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(address.to_owned()).or_default())
        };
        tokio::time::timeout_at(deadline, lock.lock_owned())
            .await
            .map_err(|_| {
                BonwerkError::transport(
                    TransportErrorKind::DeviceBusy,
                    format!("{address} is still finishing an earlier write"),
                )
            })
    }
}

/// Serial port naming: `COM3`, `\\.\COM12`, `/dev/ttyUSB0`, `/dev/cu.usbserial-1`.
pub fn is_serial_port(address: &str) -> bool {
    let address = address.trim();
    let upper = address.to_ascii_uppercase();
    let com = upper.strip_prefix(r"\\.\").unwrap_or(&upper);
    if let Some(number) = com.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }
    address.starts_with("/dev/tty") || address.starts_with("/dev/cu.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_names_are_recognised() {
        assert!(is_serial_port("COM3"));
        assert!(is_serial_port("com12"));
        assert!(is_serial_port(r"\\.\COM7"));
        assert!(is_serial_port("/dev/ttyUSB0"));
        assert!(is_serial_port("/dev/ttyACM1"));
        assert!(is_serial_port("/dev/cu.usbserial-1410"));
        assert!(!is_serial_port("COMPANY-PRINTER"));
        assert!(!is_serial_port("04b8:0202"));
        assert!(!is_serial_port("EPSON_TM_T20"));
    }

    #[test]
    fn unreachable_probe_marks_offline() {
        assert_eq!(Reachability::Reachable.status(), PrinterStatus::Online);
        assert_eq!(
            Reachability::Unreachable("gone".into()).status(),
            PrinterStatus::Offline
        );
    }

    #[tokio::test]
    async fn bounded_reports_timeout_as_connectivity() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let result: Result<()> = bounded("slow write", Duration::from_millis(20), deadline, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        match result {
            Err(BonwerkError::Transport { kind, detail }) => {
                assert_eq!(kind, TransportErrorKind::Connectivity);
                assert!(detail.contains("slow write"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn device_stays_locked_until_blocking_write_finishes() {
        let locks = DeviceLocks::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        let guard = locks.acquire("/dev/ttyUSB0", deadline).await.unwrap();

        // Dropping the handle does not stop the blocking closure.
        let write = tokio::task::spawn_blocking(move || {
            std::thread::sleep(Duration::from_millis(200));
            drop(guard);
        });
        drop(write);

        let soon = Instant::now() + Duration::from_millis(50);
        let err = locks.acquire("/dev/ttyUSB0", soon).await.unwrap_err();
        assert_eq!(err.code(), "DEVICE_BUSY");

        // Other devices are unaffected.
        assert!(locks.acquire("/dev/ttyUSB1", soon).await.is_ok());

        let later = Instant::now() + Duration::from_secs(2);
        assert!(locks.acquire("/dev/ttyUSB0", later).await.is_ok());
    }

    #[tokio::test]
    async fn bounded_respects_past_deadline() {
        let deadline = Instant::now();
        let result: Result<()> = bounded("connect", Duration::from_secs(10), deadline, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(result.is_err());
    }
}
