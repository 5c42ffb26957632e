// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer job serialisation.
//
// A receipt printer interleaves bytes from concurrent writers, so jobs for
// one printer run strictly one at a time.  Jobs for different printers run
// independently.  Every job has a single deadline covering both the wait for
// the printer and the job itself.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use bonwerk_core::error::Result;
use bonwerk_core::types::{JobOutcome, PrintJob};

/// Process-wide job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub success: u64,
    pub failure: u64,
    pub timeout: u64,
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[derive(Default)]
pub struct PrintQueue {
    /// One permit per printer id, created on first use and never removed.
    permits: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    success: AtomicU64,
    failure: AtomicU64,
    timeout: AtomicU64,
}

impl PrintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn permit(&self, printer_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(permits.entry(printer_id.to_owned()).or_default())
    }

    /// Run `job_action` once the printer is free, all within `deadline`.
    ///
    /// The action receives the absolute instant it must finish by.  If the
    /// printer does not become free in time the action never runs.
    pub async fn execute<F, Fut>(&self, printer_id: &str, job_action: F, deadline: Duration) -> JobOutcome
    where
        F: FnOnce(Instant) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut job = PrintJob::new(printer_id);
        let started = Instant::now();
        let hard_deadline = started + deadline;

        let permit = self.permit(printer_id);
        let Ok(_guard) = tokio::time::timeout_at(hard_deadline, permit.lock_owned()).await else {
            warn!(job_id = %job.id, printer_id, deadline_ms = deadline.as_millis() as u64, "printer stayed busy, job not started");
            return self.finish(job, JobOutcome::Timeout);
        };

        job.mark_started();
        let waited = started.elapsed();
        debug!(job_id = %job.id, printer_id, waited_ms = waited.as_millis() as u64, "permit acquired");

        let mut task = AbortOnDrop(tokio::spawn(job_action(hard_deadline)));
        let outcome = match tokio::time::timeout_at(hard_deadline, &mut task.0).await {
            Ok(Ok(Ok(()))) => JobOutcome::Success,
            Ok(Ok(Err(e))) => JobOutcome::Failure(e.to_string()),
            Ok(Err(join)) if join.is_panic() => {
                JobOutcome::Failure(format!("job panicked: {}", panic_message(join.into_panic())))
            }
            Ok(Err(join)) => JobOutcome::Failure(join.to_string()),
            Err(_) => JobOutcome::Timeout,
        };
        drop(task);

        self.finish(job, outcome)
    }

    fn finish(&self, mut job: PrintJob, outcome: JobOutcome) -> JobOutcome {
        let counter = match &outcome {
            JobOutcome::Success => &self.success,
            JobOutcome::Failure(_) => &self.failure,
            JobOutcome::Timeout => &self.timeout,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        match &outcome {
            JobOutcome::Success => info!(job_id = %job.id, printer_id = %job.printer_id, "job completed"),
            JobOutcome::Failure(reason) => {
                warn!(job_id = %job.id, printer_id = %job.printer_id, %reason, "job failed")
            }
            JobOutcome::Timeout => warn!(job_id = %job.id, printer_id = %job.printer_id, "job timed out"),
        }
        job.complete(outcome.clone());
        outcome
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            success: self.success.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
            timeout: self.timeout.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use bonwerk_core::error::{BonwerkError, TransportErrorKind};
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn successful_action_is_counted() {
        let queue = PrintQueue::new();
        let outcome = queue
            .execute("lan-1", |_deadline| async { Ok(()) }, Duration::from_secs(1))
            .await;
        assert_eq!(outcome, JobOutcome::Success);
        assert_eq!(queue.stats(), QueueStats { success: 1, failure: 0, timeout: 0 });
    }

    #[tokio::test]
    async fn same_printer_jobs_never_overlap() {
        let queue = Arc::new(PrintQueue::new());
        let busy = Arc::new(AtomicBool::new(false));

        let jobs: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let busy = Arc::clone(&busy);
                tokio::spawn(async move {
                    queue
                        .execute(
                            "lan-bar",
                            move |_deadline| async move {
                                assert!(!busy.swap(true, Ordering::SeqCst), "overlapping jobs");
                                tokio::time::sleep(Duration::from_millis(20)).await;
                                busy.store(false, Ordering::SeqCst);
                                Ok(())
                            },
                            Duration::from_secs(5),
                        )
                        .await
                })
            })
            .collect();

        for job in jobs {
            assert_eq!(job.await.unwrap(), JobOutcome::Success);
        }
        assert_eq!(queue.stats().success, 4);
    }

    #[tokio::test]
    async fn different_printers_run_concurrently() {
        let queue = Arc::new(PrintQueue::new());
        // Both actions must be inside the barrier at once or neither finishes.
        let barrier = Arc::new(Barrier::new(2));

        let run = |printer: &'static str| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                queue
                    .execute(
                        printer,
                        move |_deadline| async move {
                            barrier.wait().await;
                            Ok(())
                        },
                        Duration::from_secs(2),
                    )
                    .await
            })
        };

        let a = run("lan-bar");
        let b = run("usb-kitchen");
        assert_eq!(a.await.unwrap(), JobOutcome::Success);
        assert_eq!(b.await.unwrap(), JobOutcome::Success);
    }

    #[tokio::test]
    async fn busy_printer_times_out_without_running() {
        let queue = Arc::new(PrintQueue::new());
        let deadline = Duration::from_millis(200);

        let first = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .execute(
                        "lan-bar",
                        |_deadline| async move {
                            tokio::time::sleep(Duration::from_millis(400)).await;
                            Ok(())
                        },
                        deadline,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let second = queue
            .execute(
                "lan-bar",
                move |_deadline| async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                Duration::from_millis(100),
            )
            .await;

        assert_eq!(second, JobOutcome::Timeout);
        assert!(!ran.load(Ordering::SeqCst));
        first.await.unwrap();
        assert_eq!(queue.stats().timeout, 2);
    }

    #[tokio::test]
    async fn waiting_for_the_printer_uses_up_the_deadline() {
        let queue = Arc::new(PrintQueue::new());

        let first = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .execute(
                        "lan-bar",
                        |_deadline| async {
                            tokio::time::sleep(Duration::from_millis(150)).await;
                            Ok(())
                        },
                        Duration::from_secs(1),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // About 140 ms of the 200 ms budget goes on waiting, leaving too little
        // for a 100 ms action that would fit in a fresh budget.
        let (budget_tx, budget_rx) = tokio::sync::oneshot::channel();
        let second = queue
            .execute(
                "lan-bar",
                move |deadline| async move {
                    let _ = budget_tx.send(deadline.saturating_duration_since(Instant::now()));
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(())
                },
                Duration::from_millis(200),
            )
            .await;

        assert_eq!(first.await.unwrap(), JobOutcome::Success);
        assert_eq!(second, JobOutcome::Timeout);
        assert!(budget_rx.await.unwrap() < Duration::from_millis(100));
        assert_eq!(queue.stats(), QueueStats { success: 1, failure: 0, timeout: 1 });
    }

    #[tokio::test]
    async fn slow_action_is_aborted_and_permit_released() {
        let queue = PrintQueue::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let outcome = queue
            .execute(
                "lan-bar",
                move |_deadline| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                Duration::from_millis(50),
            )
            .await;
        assert_eq!(outcome, JobOutcome::Timeout);

        let next = queue
            .execute("lan-bar", |_deadline| async { Ok(()) }, Duration::from_millis(100))
            .await;
        assert_eq!(next, JobOutcome::Success);
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn errors_and_panics_become_failures() {
        let queue = PrintQueue::new();
        let failed = queue
            .execute(
                "lan-bar",
                |_deadline| async {
                    Err(BonwerkError::transport(TransportErrorKind::Connectivity, "connection refused"))
                },
                Duration::from_secs(1),
            )
            .await;
        assert!(matches!(&failed, JobOutcome::Failure(reason) if reason.contains("connection refused")));

        let panicked = queue
            .execute(
                "lan-bar",
                |_deadline| async {
                    if true {
                        panic!("ribbon jam");
                    }
                    Ok(())
                },
                Duration::from_secs(1),
            )
            .await;
        assert!(matches!(&panicked, JobOutcome::Failure(reason) if reason.contains("ribbon jam")));

        let after = queue
            .execute("lan-bar", |_deadline| async { Ok(()) }, Duration::from_secs(1))
            .await;
        assert_eq!(after, JobOutcome::Success);
        assert_eq!(queue.stats(), QueueStats { success: 1, failure: 2, timeout: 0 });
    }
}
