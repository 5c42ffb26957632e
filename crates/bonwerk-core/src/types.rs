// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Bonwerk receipt-printer proxy.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::PrintDefaults;

/// Default raw-socket port for network receipt printers.
pub const RAW_PORT: u16 = 9100;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a printer is attached.
///
/// `Usb` covers direct USB, serial ports and spooler-backed queues; `Lan`
/// covers raw network sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    Usb,
    Lan,
}

impl ConnectionKind {
    /// Lowercase tag used in derived printer ids.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Lan => "lan",
        }
    }

    /// Label used by the HTTP contract (`connectionType`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Usb => "USB",
            Self::Lan => "LAN",
        }
    }
}

/// Point-in-time reachability of a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Online,
    Offline,
    Error,
    Busy,
    #[default]
    Unknown,
}

impl PrinterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
            Self::Busy => "busy",
            Self::Unknown => "unknown",
        }
    }
}

/// One discovered or configured printer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterDescriptor {
    /// Derived from `(connection_kind, normalized address)`; see [`printer_id`].
    pub id: String,
    pub name: String,
    pub connection_kind: ConnectionKind,
    /// Device path, `vvvv:pppp`, COM-port name, spooler queue name or `ip:port`.
    pub address: String,
    pub status: PrinterStatus,
    /// Last successful probe or send.
    pub last_seen: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Discovery source that produced this descriptor.
    pub source: String,
}

impl PrinterDescriptor {
    pub fn new(
        connection_kind: ConnectionKind,
        address: impl Into<String>,
        name: impl Into<String>,
        source: &str,
    ) -> Self {
        let address = address.into();
        Self {
            id: printer_id(connection_kind, &address),
            name: name.into(),
            connection_kind,
            address,
            status: PrinterStatus::Unknown,
            last_seen: None,
            last_error: None,
            source: source.to_owned(),
        }
    }

    /// Set the probed status. Online and busy printers are stamped as seen now.
    pub fn with_status(mut self, status: PrinterStatus) -> Self {
        self.status = status;
        if matches!(status, PrinterStatus::Online | PrinterStatus::Busy) {
            self.last_seen = Some(Utc::now());
            self.last_error = None;
        }
        self
    }

    /// Attach a diagnostic and set the given status.
    pub fn with_error(mut self, status: PrinterStatus, error: impl Into<String>) -> Self {
        self.status = status;
        self.last_error = Some(error.into());
        self
    }

    pub fn is_online(&self) -> bool {
        self.status == PrinterStatus::Online
    }
}

/// Parse a `vendor:product` hex pair such as `04b8:0202`.
pub fn parse_usb_ids(address: &str) -> Option<(u16, u16)> {
    let (vendor, product) = address.trim().split_once(':')?;
    let valid = |s: &str| !s.is_empty() && s.len() <= 4 && s.chars().all(|c| c.is_ascii_hexdigit());
    if !valid(vendor) || !valid(product) {
        return None;
    }
    let vendor = u16::from_str_radix(vendor, 16).ok()?;
    let product = u16::from_str_radix(product, 16).ok()?;
    Some((vendor, product))
}

/// Normalise an address so that equivalent spellings derive the same id.
///
/// Lowercases and trims everything; USB `vid:pid` pairs are zero-padded to
/// four digits; LAN addresses without a port get [`RAW_PORT`].
pub fn normalize_address(kind: ConnectionKind, address: &str) -> String {
    let trimmed = address.trim().to_lowercase();
    match kind {
        ConnectionKind::Usb => match parse_usb_ids(&trimmed) {
            Some((vendor, product)) => format!("{vendor:04x}:{product:04x}"),
            None => trimmed,
        },
        ConnectionKind::Lan => with_default_port(&trimmed),
    }
}

/// Append [`RAW_PORT`] to a host that carries no port.
pub fn with_default_port(address: &str) -> String {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return addr.to_string();
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return SocketAddr::new(ip, RAW_PORT).to_string();
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => address.to_owned(),
        _ => format!("{address}:{RAW_PORT}"),
    }
}

/// Deterministic printer id: `<kind>-<first 6 bytes of sha256(kind|address)>`.
pub fn printer_id(kind: ConnectionKind, address: &str) -> String {
    let normalized = normalize_address(kind, address);
    let mut hasher = Sha256::new();
    hasher.update(kind.tag().as_bytes());
    hasher.update(b"|");
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    format!("{}-{}", kind.tag(), hex::encode(&digest[..6]))
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Character size family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    #[default]
    Normal,
    Small,
    Large,
}

/// Per-request formatting options. Absent fields fall back to [`PrintDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOptions {
    pub font_size: Option<FontSize>,
    pub alignment: Option<Alignment>,
    pub cut_paper: Option<bool>,
    pub bold: Option<bool>,
    pub encoding: Option<String>,
}

/// Options after merging a request over the configured defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptStyle {
    pub font_size: FontSize,
    pub alignment: Alignment,
    pub cut_paper: bool,
    pub bold: bool,
    pub encoding: String,
}

impl PrintOptions {
    /// Merge over `defaults`; values present on `self` win.
    pub fn merge(&self, defaults: &PrintDefaults) -> ReceiptStyle {
        ReceiptStyle {
            font_size: self.font_size.unwrap_or(defaults.font_size),
            alignment: self.alignment.unwrap_or(defaults.alignment),
            cut_paper: self.cut_paper.unwrap_or(defaults.paper_cut),
            bold: self.bold.unwrap_or(false),
            encoding: self
                .encoding
                .clone()
                .unwrap_or_else(|| defaults.encoding.clone()),
        }
    }
}

/// Terminal state of a print job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success,
    Failure(String),
    Timeout,
}

/// An in-flight print job. Lives only as long as the queue call that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub printer_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<JobOutcome>,
}

impl PrintJob {
    pub fn new(printer_id: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            printer_id: printer_id.into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            outcome: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, outcome: JobOutcome) {
        self.completed_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }
}
