// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport dispatch with retry for network printers.
//
// The channel is chosen from the descriptor's connection kind and address
// shape.  Network sends get a fixed number of attempts with a fixed delay
// between them; local channels (USB, serial, spooler) get exactly one.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use bonwerk_core::config::{AppConfig, ConnectionSettings};
use bonwerk_core::error::{BonwerkError, Result, TransportErrorKind};
use bonwerk_core::types::{ConnectionKind, PrinterDescriptor, parse_usb_ids};

use crate::transport::{
    NetworkTransport, Reachability, SerialTransport, SpoolerTransport, Transport, UsbTransport,
    is_serial_port, remaining,
};

/// Retry configuration for network sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            attempts: settings.retry_count.max(1),
            delay: settings.retry_delay(),
        }
    }
}

/// Which byte channel serves a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Usb,
    Serial,
    Spooler,
    Network,
}

/// Pick the channel for an address.
pub fn select_channel(kind: ConnectionKind, address: &str) -> Channel {
    match kind {
        ConnectionKind::Lan => Channel::Network,
        ConnectionKind::Usb if parse_usb_ids(address).is_some() => Channel::Usb,
        ConnectionKind::Usb if is_serial_port(address) => Channel::Serial,
        ConnectionKind::Usb => Channel::Spooler,
    }
}

/// One transport per channel.
#[derive(Clone)]
pub struct Transports {
    pub usb: Arc<dyn Transport>,
    pub serial: Arc<dyn Transport>,
    pub spooler: Arc<dyn Transport>,
    pub network: Arc<dyn Transport>,
}

impl Transports {
    pub fn from_config(config: &AppConfig) -> Self {
        let write_timeout = config.connection.print_timeout();
        Self {
            usb: Arc::new(UsbTransport::new(write_timeout)),
            serial: Arc::new(SerialTransport::new(write_timeout)),
            spooler: Arc::new(SpoolerTransport::new(write_timeout)),
            network: Arc::new(NetworkTransport::from_settings(&config.connection)),
        }
    }

    pub fn get(&self, channel: Channel) -> &Arc<dyn Transport> {
        match channel {
            Channel::Usb => &self.usb,
            Channel::Serial => &self.serial,
            Channel::Spooler => &self.spooler,
            Channel::Network => &self.network,
        }
    }
}

/// Routes payloads to the right transport.
pub struct Dispatcher {
    transports: Transports,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(transports: Transports, retry: RetryPolicy) -> Self {
        Self { transports, retry }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Transports::from_config(config),
            RetryPolicy::from_settings(&config.connection),
        )
    }

    /// Deliver `data` to `printer`, finishing by `deadline`.
    #[instrument(skip(self, printer, data), fields(printer_id = %printer.id, total = data.len()))]
    pub async fn send(&self, printer: &PrinterDescriptor, data: &[u8], deadline: Instant) -> Result<()> {
        let channel = select_channel(printer.connection_kind, &printer.address);
        let transport = self.transports.get(channel);
        debug!(?channel, transport = transport.name(), address = %printer.address, "dispatching");

        if channel != Channel::Network {
            return transport.send(&printer.address, data, deadline).await;
        }
        self.send_with_retry(transport.as_ref(), &printer.address, data, deadline).await
    }

    async fn send_with_retry(
        &self,
        transport: &dyn Transport,
        address: &str,
        data: &[u8],
        deadline: Instant,
    ) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match transport.send(address, data, deadline).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(address, attempt, "delivered after retry");
                    }
                    return Ok(());
                }
                Err(err) => err,
            };

            let out_of_time = remaining(deadline) <= self.retry.delay;
            if attempt >= self.retry.attempts || out_of_time {
                warn!(address, attempt, error = %err, "network send exhausted");
                return Err(exhausted(err, attempt));
            }

            debug!(address, attempt, error = %err, delay_ms = self.retry.delay.as_millis(), "retrying");
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    /// Accessibility check for an address, without printing.
    pub async fn probe(&self, kind: ConnectionKind, address: &str) -> Reachability {
        let channel = select_channel(kind, address);
        self.transports.get(channel).probe(address).await
    }
}

/// Wrap the last cause with the attempt count.
fn exhausted(last: BonwerkError, attempts: u32) -> BonwerkError {
    match last {
        BonwerkError::Transport { kind, detail } => {
            BonwerkError::transport(kind, format!("{detail} (after {attempts} attempts)"))
        }
        other => BonwerkError::transport(
            TransportErrorKind::Unknown,
            format!("{other} (after {attempts} attempts)"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::net::TcpListener;

    /// Refuses every send and counts the attempts.
    #[derive(Default)]
    struct Refusing {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Transport for Refusing {
        fn name(&self) -> &'static str {
            "refusing"
        }

        async fn send(&self, _address: &str, _data: &[u8], _deadline: Instant) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(BonwerkError::transport(
                TransportErrorKind::Connectivity,
                "connection refused",
            ))
        }

        async fn probe(&self, _address: &str) -> Reachability {
            Reachability::Unreachable("refused".into())
        }
    }

    /// Records the addresses it was asked to send to.
    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, address: &str, _data: &[u8], _deadline: Instant) -> Result<()> {
            self.sent.lock().unwrap().push(address.to_owned());
            Ok(())
        }

        async fn probe(&self, _address: &str) -> Reachability {
            Reachability::Reachable
        }
    }

    fn transports_with(
        local: Arc<dyn Transport>,
        network: Arc<dyn Transport>,
    ) -> Transports {
        Transports {
            usb: local.clone(),
            serial: local.clone(),
            spooler: local,
            network,
        }
    }

    #[test]
    fn channel_follows_address_shape() {
        assert_eq!(select_channel(ConnectionKind::Lan, "192.168.1.50:9100"), Channel::Network);
        assert_eq!(select_channel(ConnectionKind::Usb, "04b8:0202"), Channel::Usb);
        assert_eq!(select_channel(ConnectionKind::Usb, "COM3"), Channel::Serial);
        assert_eq!(select_channel(ConnectionKind::Usb, "/dev/ttyUSB0"), Channel::Serial);
        assert_eq!(select_channel(ConnectionKind::Usb, "EPSON_TM_T20"), Channel::Spooler);
    }

    #[tokio::test]
    async fn network_retries_exactly_retry_count_times() {
        let refusing = Arc::new(Refusing::default());
        let local = Arc::new(Recording::default());
        let retry = RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(50),
        };
        let dispatcher = Dispatcher::new(transports_with(local, refusing.clone()), retry);
        let printer = PrinterDescriptor::new(ConnectionKind::Lan, "192.168.1.50:9100", "Bar", "test");

        let started = std::time::Instant::now();
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = dispatcher.send(&printer, b"x", deadline).await.unwrap_err();

        assert_eq!(refusing.attempts.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(100));
        match err {
            BonwerkError::Transport { kind, detail } => {
                assert_eq!(kind, TransportErrorKind::Connectivity);
                assert!(detail.contains("connection refused"));
                assert!(detail.contains("after 3 attempts"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_stops_at_deadline() {
        let refusing = Arc::new(Refusing::default());
        let local = Arc::new(Recording::default());
        let retry = RetryPolicy {
            attempts: 10,
            delay: Duration::from_millis(200),
        };
        let dispatcher = Dispatcher::new(transports_with(local, refusing.clone()), retry);
        let printer = PrinterDescriptor::new(ConnectionKind::Lan, "10.0.0.9", "Bar", "test");

        let deadline = Instant::now() + Duration::from_millis(300);
        assert!(dispatcher.send(&printer, b"x", deadline).await.is_err());
        assert!(refusing.attempts.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test]
    async fn local_channels_make_one_attempt() {
        let refusing = Arc::new(Refusing::default());
        let network = Arc::new(Recording::default());
        let dispatcher = Dispatcher::new(
            transports_with(refusing.clone(), network.clone()),
            RetryPolicy::default(),
        );
        let printer = PrinterDescriptor::new(ConnectionKind::Usb, "EPSON_TM_T20", "Kitchen", "test");

        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(dispatcher.send(&printer, b"x", deadline).await.is_err());
        assert_eq!(refusing.attempts.load(Ordering::SeqCst), 1);
        assert!(network.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refused_real_port_fails_after_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut config = AppConfig::default();
        config.connection.retry_delay_ms = 20;
        let dispatcher = Dispatcher::from_config(&config);
        let printer = PrinterDescriptor::new(ConnectionKind::Lan, addr, "Gone", "test");

        let started = std::time::Instant::now();
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = dispatcher.send(&printer, b"x", deadline).await.unwrap_err();
        assert_eq!(err.code(), "CONNECTIVITY_ERROR");
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
