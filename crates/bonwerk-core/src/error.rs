// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Bonwerk.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sub-kind of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// The OS refused access to the device or socket.
    PermissionDenied,
    /// Could not reach the device (refused, reset, unreachable, timed out).
    Connectivity,
    /// The device exists but is held by someone else.
    DeviceBusy,
    Unknown,
}

impl TransportErrorKind {
    /// Classify an I/O error kind.
    pub fn from_io(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;
        match kind {
            ErrorKind::PermissionDenied => Self::PermissionDenied,
            ErrorKind::ResourceBusy | ErrorKind::WouldBlock => Self::DeviceBusy,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::NotFound
            | ErrorKind::AddrNotAvailable
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable => Self::Connectivity,
            _ => Self::Unknown,
        }
    }

    /// Classify a free-form driver or spooler message.
    pub fn from_message(detail: &str) -> Self {
        let lower = detail.to_lowercase();
        if lower.contains("permission") || lower.contains("access denied") || lower.contains("not authorized") {
            Self::PermissionDenied
        } else if lower.contains("busy") || lower.contains("in use") {
            Self::DeviceBusy
        } else if lower.contains("not found")
            || lower.contains("no such")
            || lower.contains("does not exist")
            || lower.contains("disconnected")
            || lower.contains("timed out")
            || lower.contains("refused")
        {
            Self::Connectivity
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::PermissionDenied => "permission denied",
            Self::Connectivity => "connectivity",
            Self::DeviceBusy => "device busy",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Top-level error type for all Bonwerk operations.
#[derive(Debug, Error)]
pub enum BonwerkError {
    // -- Request errors --
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Printer not found: {0}")]
    PrinterNotFound(String),

    #[error("No online printers available")]
    NoOnlinePrinter,

    #[error("Printer is offline: {0}")]
    PrinterUnavailable(String),

    // -- Execution errors --
    #[error("Print job timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("transport failure ({kind}): {detail}")]
    Transport {
        kind: TransportErrorKind,
        detail: String,
    },

    // -- Discovery --
    #[error("discovery source {source_name} failed: {detail}")]
    DiscoverySource { source_name: String, detail: String },

    // -- Configuration / persistence --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BonwerkError {
    /// Build a transport failure.
    pub fn transport(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            detail: detail.into(),
        }
    }

    /// Build a transport failure from an I/O error, prefixed with `context`.
    pub fn transport_io(context: &str, err: &std::io::Error) -> Self {
        Self::transport(TransportErrorKind::from_io(err.kind()), format!("{context}: {err}"))
    }

    /// Build a discovery-source failure.
    pub fn discovery(source_name: &str, detail: impl Into<String>) -> Self {
        Self::DiscoverySource {
            source_name: source_name.to_owned(),
            detail: detail.into(),
        }
    }

    /// Stable machine-readable code, used in the `error` field of API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PrinterNotFound(_) | Self::NoOnlinePrinter => "NOT_FOUND",
            Self::PrinterUnavailable(_) => "UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Transport { kind, .. } => match kind {
                TransportErrorKind::PermissionDenied => "PERMISSION_DENIED",
                TransportErrorKind::Connectivity => "CONNECTIVITY_ERROR",
                TransportErrorKind::DeviceBusy => "DEVICE_BUSY",
                TransportErrorKind::Unknown => "TRANSPORT_FAILURE",
            },
            Self::DiscoverySource { .. } => "DISCOVERY_FAILURE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) | Self::Serialization(_) => "INTERNAL_ERROR",
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BonwerkError>;
