// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OS print spooler transport (CUPS command-line tools).
//
// Jobs are submitted with `lp -o raw` so the spooler passes the ESC/POS
// stream through untouched.  Queue state comes from `lpstat -p`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bonwerk_core::types::PrinterStatus;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use bonwerk_core::error::{BonwerkError, Result, TransportErrorKind};

use super::{Reachability, Transport, bounded};

/// Bound on a single `lpstat` invocation.
pub const LPSTAT_TIMEOUT: Duration = Duration::from_secs(5);

/// One queue reported by the spooler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolerQueue {
    pub name: String,
    pub status: PrinterStatus,
}

/// Parse `lpstat -p` output.
///
/// ```text
/// printer TM_T20 is idle.  enabled since Mon 01 Jan 2026 10:00:00
/// printer Kitchen now printing Kitchen-42.  enabled since ...
/// printer Bar disabled since Mon 01 Jan 2026 09:00:00 -
///         reason unknown
/// ```
pub fn parse_lpstat(output: &str) -> Vec<SpoolerQueue> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("printer ")?;
            let (name, state) = rest.split_once(' ').unwrap_or((rest, ""));
            let status = if state.contains("disabled") {
                PrinterStatus::Offline
            } else if state.contains("now printing") {
                PrinterStatus::Busy
            } else if state.contains("idle") {
                PrinterStatus::Online
            } else {
                PrinterStatus::Unknown
            };
            Some(SpoolerQueue {
                name: name.to_owned(),
                status,
            })
        })
        .collect()
}

/// A CUPS tool invocation in the C locale, so its output stays parseable.
fn cups_command(program: &str) -> Command {
    let mut command = Command::new(program);
    command.env("LC_ALL", "C").kill_on_drop(true);
    command
}

/// Run `lpstat -p [queue]` and parse the result.
pub async fn list_queues(queue: Option<&str>) -> Result<Vec<SpoolerQueue>> {
    let mut command = cups_command("lpstat");
    command.arg("-p");
    if let Some(queue) = queue {
        command.arg(queue);
    }

    let output = tokio::time::timeout(LPSTAT_TIMEOUT, command.output())
        .await
        .map_err(|_| BonwerkError::transport(TransportErrorKind::Connectivity, "lpstat timed out"))?
        .map_err(|e| BonwerkError::transport_io("run lpstat", &e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let queues = parse_lpstat(&stdout);
    if !output.status.success() && queues.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = format!("lpstat: {}", stderr.trim());
        return Err(BonwerkError::transport(TransportErrorKind::from_message(&detail), detail));
    }
    Ok(queues)
}

#[derive(Debug, Clone)]
pub struct SpoolerTransport {
    submit_timeout: Duration,
}

impl SpoolerTransport {
    pub fn new(submit_timeout: Duration) -> Self {
        Self { submit_timeout }
    }
}

#[async_trait]
impl Transport for SpoolerTransport {
    fn name(&self) -> &'static str {
        "spooler"
    }

    #[instrument(skip(self, data), fields(total = data.len()))]
    async fn send(&self, address: &str, data: &[u8], deadline: Instant) -> Result<()> {
        let mut child = cups_command("lp")
            .args(["-d", address, "-o", "raw"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BonwerkError::transport_io("run lp", &e))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            BonwerkError::transport(TransportErrorKind::Unknown, "lp stdin unavailable")
        })?;

        let output = bounded(&format!("submit to {address}"), self.submit_timeout, deadline, async {
            stdin
                .write_all(data)
                .await
                .map_err(|e| BonwerkError::transport_io("write to lp", &e))?;
            drop(stdin);
            child
                .wait_with_output()
                .await
                .map_err(|e| BonwerkError::transport_io("wait for lp", &e))
        })
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = format!("lp -d {address}: {}", stderr.trim());
            return Err(BonwerkError::transport(TransportErrorKind::from_message(&detail), detail));
        }

        debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "lp accepted job");
        info!(queue = address, total = data.len(), "spooler job submitted");
        Ok(())
    }

    async fn probe(&self, address: &str) -> Reachability {
        match list_queues(Some(address)).await {
            Ok(queues) => match queues.iter().find(|q| q.name == address) {
                Some(q) if q.status == PrinterStatus::Offline => {
                    Reachability::Unreachable(format!("queue {address} is disabled"))
                }
                Some(_) => Reachability::Reachable,
                None => Reachability::Unreachable(format!("queue {address} not listed")),
            },
            Err(e) => Reachability::Unreachable(e.to_string()),
        }
    }
}
