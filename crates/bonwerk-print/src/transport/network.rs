// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP transport (JetDirect-style, port 9100).
//
// Open a socket and write the ESC/POS stream.  Receipt printers interpret
// the bytes directly; there is no protocol negotiation and no job tracking.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use bonwerk_core::config::ConnectionSettings;
use bonwerk_core::error::{BonwerkError, Result};
use bonwerk_core::types::with_default_port;

use super::{Reachability, Transport, bounded};

/// Write chunk size, for progress logging.
const CHUNK_SIZE: usize = 8192;

/// Raw-socket transport for LAN printers.
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl NetworkTransport {
    pub fn new(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            write_timeout,
        }
    }

    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self::new(settings.connect_timeout(), settings.print_timeout())
    }

    async fn connect(&self, addr: &str, deadline: Instant) -> Result<TcpStream> {
        bounded(&format!("connect to {addr}"), self.connect_timeout, deadline, async {
            TcpStream::connect(addr)
                .await
                .map_err(|e| BonwerkError::transport_io(&format!("connect to {addr}"), &e))
        })
        .await
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    fn name(&self) -> &'static str {
        "network"
    }

    #[instrument(skip(self, data), fields(total = data.len()))]
    async fn send(&self, address: &str, data: &[u8], deadline: Instant) -> Result<()> {
        let addr = with_default_port(address);
        let mut stream = self.connect(&addr, deadline).await?;
        debug!(addr = %addr, "connected, sending");

        bounded(&format!("write to {addr}"), self.write_timeout, deadline, async {
            let mut sent = 0usize;
            for chunk in data.chunks(CHUNK_SIZE) {
                stream.write_all(chunk).await.map_err(|e| {
                    BonwerkError::transport_io(&format!("write to {addr} failed at byte {sent}"), &e)
                })?;
                sent += chunk.len();
                debug!(sent, total = data.len(), "raw TCP progress");
            }
            stream
                .flush()
                .await
                .map_err(|e| BonwerkError::transport_io(&format!("flush {addr}"), &e))?;
            stream
                .shutdown()
                .await
                .map_err(|e| BonwerkError::transport_io(&format!("shutdown {addr}"), &e))
        })
        .await?;

        info!(addr = %addr, total = data.len(), "raw TCP payload delivered");
        Ok(())
    }

    async fn probe(&self, address: &str) -> Reachability {
        let addr = with_default_port(address);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => Reachability::Reachable,
            Ok(Err(e)) => Reachability::Unreachable(format!("connect to {addr}: {e}")),
            Err(_) => Reachability::Unreachable(format!(
                "connect to {addr} timed out after {} ms",
                self.connect_timeout.as_millis()
            )),
        }
    }
}
