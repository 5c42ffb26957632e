// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request and response shapes of the local HTTP API.
//
// The endpoint layer itself lives outside this workspace; these types pin the
// JSON contract it serves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BonwerkError;
use crate::types::{ConnectionKind, PrintOptions, PrinterDescriptor};

/// Printer as exposed by `GET /api/printers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterView {
    pub id: String,
    pub name: String,
    /// `"USB"` or `"LAN"`.
    pub connection_type: String,
    pub device_path: Option<String>,
    pub ip_address: Option<String>,
    pub port: Option<u16>,
    /// `"online"`, `"offline"`, `"error"`, `"busy"` or `"unknown"`.
    pub status: String,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<&PrinterDescriptor> for PrinterView {
    fn from(printer: &PrinterDescriptor) -> Self {
        let (device_path, ip_address, port) = match printer.connection_kind {
            ConnectionKind::Usb => (Some(printer.address.clone()), None, None),
            ConnectionKind::Lan => {
                let (host, port) = split_host_port(&printer.address);
                (None, Some(host), port)
            }
        };
        Self {
            id: printer.id.clone(),
            name: printer.name.clone(),
            connection_type: printer.connection_kind.label().to_owned(),
            device_path,
            ip_address,
            port,
            status: printer.status.as_str().to_owned(),
            last_seen: printer.last_seen,
        }
    }
}

/// Split `host:port` (or `[v6]:port`); a missing or invalid port yields `None`.
fn split_host_port(address: &str) -> (String, Option<u16>) {
    match address.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() && !host.is_empty() => {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            (host.to_owned(), port.parse().ok())
        }
        _ => (address.to_owned(), None),
    }
}

/// Body of `GET /api/printers` and `POST /api/printers/refresh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintersResponse {
    pub printers: Vec<PrinterView>,
    pub count: usize,
}

impl PrintersResponse {
    pub fn from_descriptors(printers: &[PrinterDescriptor]) -> Self {
        let printers: Vec<PrinterView> = printers.iter().map(PrinterView::from).collect();
        Self {
            count: printers.len(),
            printers,
        }
    }
}

/// Body of `POST /api/print`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    pub printer_identifier: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub options: Option<PrintOptions>,
}

/// Outcome of every print and test-print call.
///
/// Business failures are reported with `success: false` and still travel on
/// a success HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer_used: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PrintResponse {
    pub fn ok(message: impl Into<String>, printer_used: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            printer_used: Some(printer_used.into()),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed(err: &BonwerkError, printer_used: Option<String>) -> Self {
        Self::failure(err.to_string(), err.code(), printer_used)
    }

    pub fn failure(message: impl Into<String>, code: &str, printer_used: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            printer_used,
            timestamp: Utc::now(),
            error: Some(code.to_owned()),
        }
    }
}
