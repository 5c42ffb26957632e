// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mDNS browse for raw-socket printers on the local network.
//
// Printers that accept a plain byte stream on 9100 advertise
// `_pdl-datastream._tcp.local.`.  We browse for a bounded window, collect
// resolved services, then TCP-probe each one.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, warn};

use bonwerk_core::error::{BonwerkError, Result};
use bonwerk_core::types::{ConnectionKind, PrinterDescriptor};

use super::{DiscoverySource, probe_all};
use crate::dispatcher::Dispatcher;

/// mDNS service type for raw port-9100 printers.
pub const PDL_SERVICE: &str = "_pdl-datastream._tcp.local.";

/// A resolved advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub name: String,
    pub addr: SocketAddr,
}

/// Instance label from a full service name: `Bar._pdl-datastream._tcp.local.` → `Bar`.
pub fn instance_name(fullname: &str) -> &str {
    fullname
        .strip_suffix(PDL_SERVICE)
        .map(|s| s.trim_end_matches('.'))
        .filter(|s| !s.is_empty())
        .unwrap_or(fullname)
}

fn advertisement(info: &ServiceInfo) -> Option<Advertisement> {
    let addresses = info.get_addresses();
    let ip: IpAddr = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()?;
    Some(Advertisement {
        name: instance_name(info.get_fullname()).to_owned(),
        addr: SocketAddr::new(ip, info.get_port()),
    })
}

/// Browse for `window`, blocking the calling thread.
fn browse(window: Duration) -> Result<Vec<Advertisement>> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| BonwerkError::discovery("mdns", format!("failed to start mDNS daemon: {e}")))?;
    let receiver = daemon
        .browse(PDL_SERVICE)
        .map_err(|e| BonwerkError::discovery("mdns", format!("browse {PDL_SERVICE}: {e}")))?;

    // Keyed by full name so repeated announcements collapse.
    let mut found = BTreeMap::new();
    let end = Instant::now() + window;
    loop {
        let left = end.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        match receiver.recv_timeout(left) {
            Ok(ServiceEvent::ServiceResolved(info)) => match advertisement(&info) {
                Some(ad) => {
                    debug!(name = %ad.name, addr = %ad.addr, "raw printer resolved");
                    found.insert(info.get_fullname().to_owned(), ad);
                }
                None => warn!(fullname = %info.get_fullname(), "resolved service has no address"),
            },
            Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                found.remove(&fullname);
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    if let Err(e) = daemon.shutdown() {
        debug!(error = %e, "mDNS daemon shutdown");
    }
    Ok(found.into_values().collect())
}

pub struct NetworkSource {
    dispatcher: Arc<Dispatcher>,
    window: Duration,
}

impl NetworkSource {
    pub fn new(dispatcher: Arc<Dispatcher>, window: Duration) -> Self {
        Self { dispatcher, window }
    }
}

#[async_trait]
impl DiscoverySource for NetworkSource {
    fn name(&self) -> &'static str {
        "mdns"
    }

    async fn discover(&self) -> Result<Vec<PrinterDescriptor>> {
        let window = self.window;
        let ads = tokio::task::spawn_blocking(move || browse(window))
            .await
            .map_err(|e| BonwerkError::discovery("mdns", format!("browse task: {e}")))??;
        info!(count = ads.len(), "mDNS browse complete");

        let printers = ads
            .into_iter()
            .map(|ad| PrinterDescriptor::new(ConnectionKind::Lan, ad.addr.to_string(), ad.name, "mdns"))
            .collect();
        Ok(probe_all(&self.dispatcher, printers).await)
    }
}
