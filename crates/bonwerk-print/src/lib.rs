// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bonwerk Print — receipt printer discovery, ESC/POS encoding, transports,
// and the per-printer job queue.  Builds on the domain types defined in
// `bonwerk-core`.

pub mod codepage;
pub mod discovery;
pub mod dispatcher;
pub mod escpos;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod transport;

pub use discovery::{DiscoveryAggregator, DiscoverySource};
pub use dispatcher::Dispatcher;
pub use queue::{PrintQueue, QueueStats};
pub use registry::PrinterRegistry;
pub use service::PrintService;
