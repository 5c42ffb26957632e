// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cached printer inventory.
//
// Readers always get an immutable snapshot.  A refresh builds a new snapshot
// from discovery and swaps it in; only one refresh runs at a time and a
// caller that finds one in progress gets the current snapshot immediately.
// A background task refreshes on a fixed period until shut down.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use bonwerk_core::error::Result;
use bonwerk_core::types::{JobOutcome, PrinterDescriptor, PrinterStatus};

use crate::discovery::DiscoveryAggregator;
use crate::resolver::resolve;

/// Printers as of one refresh.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub printers: Vec<PrinterDescriptor>,
    /// `None` until the first refresh completes.
    pub refreshed_at: Option<Instant>,
}

impl Snapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.refreshed_at.is_some_and(|at| at.elapsed() < ttl)
    }
}

pub struct PrinterRegistry {
    discovery: DiscoveryAggregator,
    ttl: Duration,
    current: RwLock<Arc<Snapshot>>,
    /// Held for the duration of a refresh; taken with `try_lock` only.
    refresh_gate: tokio::sync::Mutex<()>,
    shutdown_signal: Arc<Notify>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PrinterRegistry {
    pub fn new(discovery: DiscoveryAggregator, ttl: Duration) -> Self {
        Self {
            discovery,
            ttl,
            current: RwLock::new(Arc::new(Snapshot::default())),
            refresh_gate: tokio::sync::Mutex::new(()),
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: Mutex::new(None),
        }
    }

    /// Current snapshot, without triggering discovery.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn install(&self, next: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        next
    }

    /// Cached printers, refreshed first when older than the TTL.
    pub async fn get_printers(&self) -> Arc<Snapshot> {
        let snapshot = self.snapshot();
        if snapshot.is_fresh(self.ttl) {
            return snapshot;
        }
        self.refresh().await
    }

    /// Run discovery and install the result. If a refresh is already
    /// running, return the current snapshot without waiting for it.
    pub async fn refresh(&self) -> Arc<Snapshot> {
        let Ok(_gate) = self.refresh_gate.try_lock() else {
            debug!("refresh already in progress, serving current snapshot");
            return self.snapshot();
        };

        let started = Instant::now();
        let printers = self.discovery.discover().await;
        let online = printers.iter().filter(|p| p.is_online()).count();

        let now = Instant::now();
        let previous = self.snapshot().refreshed_at;
        let snapshot = self.install(Snapshot {
            printers,
            refreshed_at: Some(previous.map_or(now, |prev| prev.max(now))),
        });
        info!(
            count = snapshot.printers.len(),
            online,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "printer registry refreshed"
        );
        snapshot
    }

    /// Resolve `identifier` against the cached printers.
    pub async fn get_printer(&self, identifier: Option<&str>) -> Result<PrinterDescriptor> {
        let snapshot = self.get_printers().await;
        resolve(&snapshot.printers, identifier).cloned()
    }

    /// Record the result of a print on the printer's descriptor.
    pub fn record_delivery(&self, printer_id: &str, outcome: &JobOutcome) {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if !slot.printers.iter().any(|p| p.id == printer_id) {
            return;
        }

        let mut next = Snapshot::clone(&slot);
        for printer in next.printers.iter_mut().filter(|p| p.id == printer_id) {
            *printer = match outcome {
                JobOutcome::Success => printer.clone().with_status(PrinterStatus::Online),
                JobOutcome::Failure(reason) => {
                    let status = printer.status;
                    printer.clone().with_error(status, reason.as_str())
                }
                JobOutcome::Timeout => {
                    let status = printer.status;
                    printer.clone().with_error(status, "print job timed out")
                }
            };
        }
        *slot = Arc::new(next);
    }

    /// Start the periodic refresh task. The first refresh runs immediately.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.task_handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            debug!("registry refresh task already running");
            return;
        }

        let registry = Arc::downgrade(self);
        let shutdown = Arc::clone(&self.shutdown_signal);
        let period = self.ttl;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = ticker.tick() => {}
                }
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = registry.refresh() => {}
                }
            }
            debug!("registry refresh task exited");
        }));
        info!(period_secs = period.as_secs(), "registry refresh task started");
    }

    /// Stop the periodic refresh task and wait for it to exit.
    pub async fn shutdown(&self) {
        let handle = self
            .task_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        self.shutdown_signal.notify_one();
        if let Err(e) = handle.await {
            warn!(error = %e, "registry refresh task ended abnormally");
        }
        info!("registry refresh task stopped");
    }
}
