// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request-level print operations.
//
// Ties the registry, encoder, queue and dispatcher together and turns every
// failure into a `PrintResponse` with `success: false`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use bonwerk_core::api::{PrintRequest, PrintResponse, PrintersResponse};
use bonwerk_core::config::{AppConfig, PrintDefaults};
use bonwerk_core::error::BonwerkError;
use bonwerk_core::types::{JobOutcome, PrinterDescriptor, PrinterStatus};

use crate::discovery::DiscoveryAggregator;
use crate::dispatcher::Dispatcher;
use crate::escpos::{build_receipt, build_test_page};
use crate::queue::{PrintQueue, QueueStats};
use crate::registry::PrinterRegistry;

/// Machine code for a job the transport rejected.
pub const PRINT_FAILED: &str = "PRINT_FAILED";

pub struct PrintService {
    registry: Arc<PrinterRegistry>,
    dispatcher: Arc<Dispatcher>,
    queue: PrintQueue,
    defaults: PrintDefaults,
    print_timeout: Duration,
}

impl PrintService {
    pub fn new(
        registry: Arc<PrinterRegistry>,
        dispatcher: Arc<Dispatcher>,
        defaults: PrintDefaults,
        print_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            queue: PrintQueue::new(),
            defaults,
            print_timeout,
        }
    }

    /// Wire the full pipeline from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let dispatcher = Arc::new(Dispatcher::from_config(config));
        let discovery = DiscoveryAggregator::from_config(config, Arc::clone(&dispatcher));
        let registry = Arc::new(PrinterRegistry::new(discovery, config.cache_ttl()));
        Self::new(
            registry,
            dispatcher,
            config.print_defaults.clone(),
            config.connection.print_timeout(),
        )
    }

    pub fn registry(&self) -> &Arc<PrinterRegistry> {
        &self.registry
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub async fn list_printers(&self) -> PrintersResponse {
        let snapshot = self.registry.get_printers().await;
        PrintersResponse::from_descriptors(&snapshot.printers)
    }

    pub async fn refresh_printers(&self) -> PrintersResponse {
        let snapshot = self.registry.refresh().await;
        PrintersResponse::from_descriptors(&snapshot.printers)
    }

    /// Print a text receipt.
    #[instrument(skip(self, request), fields(identifier = ?request.printer_identifier))]
    pub async fn print(&self, request: PrintRequest) -> PrintResponse {
        if request.content.trim().is_empty() {
            let err = BonwerkError::Validation("content must not be empty".into());
            return PrintResponse::failed(&err, None);
        }

        let printer = match self.target(request.printer_identifier.as_deref()).await {
            Ok(printer) => printer,
            Err(response) => return response,
        };
        let options = request.options.unwrap_or_default();
        let data = build_receipt(&request.content, &options, &self.defaults);
        self.deliver(printer, data, "Receipt printed").await
    }

    /// Print the fixed test page.
    #[instrument(skip(self))]
    pub async fn print_test(&self, identifier: Option<&str>) -> PrintResponse {
        let printer = match self.target(identifier).await {
            Ok(printer) => printer,
            Err(response) => return response,
        };
        let data = build_test_page(&printer.name);
        self.deliver(printer, data, "Test page printed").await
    }

    /// Resolve a printer that can take a job.
    async fn target(&self, identifier: Option<&str>) -> Result<PrinterDescriptor, PrintResponse> {
        let printer = self
            .registry
            .get_printer(identifier)
            .await
            .map_err(|e| {
                warn!(error = %e, "printer resolution failed");
                PrintResponse::failed(&e, None)
            })?;

        if printer.status == PrinterStatus::Offline {
            let err = BonwerkError::PrinterUnavailable(printer.name.clone());
            return Err(PrintResponse::failed(&err, Some(printer.name)));
        }
        Ok(printer)
    }

    async fn deliver(&self, printer: PrinterDescriptor, data: Vec<u8>, success_message: &str) -> PrintResponse {
        let dispatcher = Arc::clone(&self.dispatcher);
        let target = printer.clone();
        let total = data.len();

        let outcome = self
            .queue
            .execute(
                &printer.id,
                move |deadline| async move { dispatcher.send(&target, &data, deadline).await },
                self.print_timeout,
            )
            .await;
        self.registry.record_delivery(&printer.id, &outcome);

        match outcome {
            JobOutcome::Success => {
                info!(printer = %printer.name, total, "print delivered");
                PrintResponse::ok(format!("{success_message} on {}", printer.name), printer.name)
            }
            JobOutcome::Failure(reason) => PrintResponse::failure(reason, PRINT_FAILED, Some(printer.name)),
            JobOutcome::Timeout => {
                PrintResponse::failed(&BonwerkError::Timeout(self.print_timeout), Some(printer.name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use bonwerk_core::error::{Result, TransportErrorKind};
    use bonwerk_core::types::{Alignment, ConnectionKind, PrintOptions};

    use crate::discovery::testing::FixedSource;
    use crate::dispatcher::{RetryPolicy, Transports};
    use crate::escpos::cmd;
    use crate::transport::{Reachability, Transport};

    /// Keeps every payload it is handed.
    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, address: &str, data: &[u8], _deadline: Instant) -> Result<()> {
            if self.fail {
                return Err(BonwerkError::transport(TransportErrorKind::Connectivity, "connection refused"));
            }
            self.sent.lock().unwrap().push((address.to_owned(), data.to_vec()));
            Ok(())
        }

        async fn probe(&self, _address: &str) -> Reachability {
            Reachability::Reachable
        }
    }

    fn service_with(printers: Vec<PrinterDescriptor>, transport: Arc<Recording>) -> PrintService {
        let transports = Transports {
            usb: transport.clone(),
            serial: transport.clone(),
            spooler: transport.clone(),
            network: transport,
        };
        let retry = RetryPolicy {
            attempts: 1,
            delay: Duration::from_millis(10),
        };
        let dispatcher = Arc::new(Dispatcher::new(transports, retry));
        let discovery = DiscoveryAggregator::new(
            vec![Arc::new(FixedSource::new("fixed", printers))],
            Duration::from_secs(1),
        );
        let registry = Arc::new(PrinterRegistry::new(discovery, Duration::from_secs(30)));
        PrintService::new(registry, dispatcher, PrintDefaults::default(), Duration::from_secs(2))
    }

    fn bar() -> PrinterDescriptor {
        PrinterDescriptor::new(ConnectionKind::Lan, "192.168.1.50:9100", "Bar", "fixed")
            .with_status(PrinterStatus::Online)
    }

    #[tokio::test]
    async fn receipt_reaches_lan_printer_byte_exact() {
        let transport = Arc::new(Recording::default());
        let service = service_with(vec![bar()], transport.clone());

        let response = service
            .print(PrintRequest {
                printer_identifier: Some("192.168.1.50:9100".into()),
                content: "Hello\nWorld".into(),
                options: Some(PrintOptions {
                    alignment: Some(Alignment::Center),
                    cut_paper: Some(true),
                    encoding: Some("CP866".into()),
                    ..Default::default()
                }),
            })
            .await;

        assert!(response.success, "{response:?}");
        assert_eq!(response.printer_used.as_deref(), Some("Bar"));

        let mut expected = Vec::new();
        expected.extend_from_slice(cmd::INIT);
        expected.extend_from_slice(&[0x1B, 0x74, 0x11]);
        expected.extend_from_slice(cmd::ALIGN_CENTER);
        expected.extend_from_slice(cmd::FONT_NORMAL);
        expected.extend_from_slice(b"Hello\nWorld\n");
        expected.extend_from_slice(&[0x1B, 0x64, 0x03]);
        expected.extend_from_slice(cmd::CUT_PARTIAL);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "192.168.1.50:9100");
        assert_eq!(sent[0].1, expected);
        drop(sent);
        assert_eq!(service.queue_stats().success, 1);
    }

    #[tokio::test]
    async fn unknown_printer_is_reported() {
        let service = service_with(vec![bar()], Arc::new(Recording::default()));
        let response = service
            .print(PrintRequest {
                printer_identifier: Some("nonexistent".into()),
                content: "Hello".into(),
                options: None,
            })
            .await;
        assert!(!response.success);
        assert_eq!(response.message, "Printer not found: nonexistent");
        assert_eq!(response.error.as_deref(), Some("NOT_FOUND"));
    }

    #[tokio::test]
    async fn blank_content_is_rejected_before_resolution() {
        let transport = Arc::new(Recording::default());
        let service = service_with(vec![bar()], transport.clone());
        let response = service
            .print(PrintRequest {
                content: "  \n ".into(),
                ..Default::default()
            })
            .await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("VALIDATION_ERROR"));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_online_printer_is_reported() {
        let offline = bar().with_error(PrinterStatus::Offline, "refused");
        let service = service_with(vec![offline], Arc::new(Recording::default()));
        let response = service.print_test(None).await;
        assert!(!response.success);
        assert_eq!(response.message, "No online printers available");
    }

    #[tokio::test]
    async fn offline_printer_is_unavailable() {
        let offline = bar().with_error(PrinterStatus::Offline, "refused");
        let service = service_with(vec![offline], Arc::new(Recording::default()));
        let response = service.print_test(Some("Bar")).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("UNAVAILABLE"));
        assert_eq!(response.printer_used.as_deref(), Some("Bar"));
    }

    #[tokio::test]
    async fn transport_failure_is_recorded_on_registry() {
        let transport = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let printer = bar();
        let id = printer.id.clone();
        let service = service_with(vec![printer], transport);

        let response = service.print_test(Some("bar")).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some(PRINT_FAILED));
        assert!(response.message.contains("connection refused"));

        let snapshot = service.registry().snapshot();
        let recorded = snapshot.printers.iter().find(|p| p.id == id).unwrap();
        assert!(recorded.last_error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(service.queue_stats().failure, 1);
    }

    #[tokio::test]
    async fn test_page_names_the_printer() {
        let transport = Arc::new(Recording::default());
        let service = service_with(vec![bar()], transport.clone());
        let response = service.print_test(None).await;
        assert!(response.success);
        assert_eq!(response.message, "Test page printed on Bar");

        let sent = transport.sent.lock().unwrap();
        let text = String::from_utf8_lossy(&sent[0].1);
        assert!(text.contains("Printer: Bar"));
        assert!(text.contains("TEST PAGE"));
    }

    #[tokio::test]
    async fn listing_reports_count() {
        let service = service_with(vec![bar()], Arc::new(Recording::default()));
        let listed = service.list_printers().await;
        assert_eq!(listed.count, 1);
        assert_eq!(listed.printers[0].name, "Bar");
        assert_eq!(service.refresh_printers().await.count, 1);
    }
}
