// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bonwerk — Core types, configuration, API contract and error definitions
// shared across all crates.

pub mod api;
pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{BonwerkError, TransportErrorKind};
pub use types::*;
