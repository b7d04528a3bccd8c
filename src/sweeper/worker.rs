//! Sweep Worker - periodic driver
//!
//! One cycle runs every account through the [`AccountPipeline`] with at
//! most `max_parallel_accounts` in flight. A cycle always finishes before
//! the next tick is taken and missed ticks are skipped, so cycles never
//! overlap.
//!
//! Shutdown is cooperative: [`ShutdownSignal`] is checked between cycles and
//! between events, never inside a transfer, so a sweep that was submitted
//! is always confirmed and persisted before [`SweepWorker::run`] returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::error::{ErrorKind, SweepError};
use super::ledger::ProgressLedger;
use super::pipeline::{AccountPipeline, AccountReport};
use super::registry::AccountRegistry;
use crate::core_types::UserId;

/// Summary of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub accounts: usize,
    pub reports: Vec<AccountReport>,
    /// Accounts whose task panicked
    pub panicked: Vec<UserId>,
    /// A progress write failed and the rest of the cycle was abandoned
    pub halted: bool,
}

impl CycleReport {
    pub fn settled_count(&self) -> usize {
        self.reports.iter().map(|r| r.settled.len()).sum()
    }

    pub fn deferred_count(&self) -> usize {
        self.reports.iter().map(|r| r.deferred).sum()
    }
}

/// Stop request shared by the worker and every account task
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        loop {
            // Registered before the check so a concurrent request is not missed
            let notified = self.notify.notified();
            if self.is_shutdown_requested() {
                return;
            }
            notified.await;
        }
    }
}

pub struct SweepWorker {
    registry: Arc<AccountRegistry>,
    ledger: Arc<ProgressLedger>,
    pipeline: Arc<AccountPipeline>,
    poll_interval: Duration,
    max_parallel_accounts: usize,
    shutdown: Arc<ShutdownSignal>,
}

impl SweepWorker {
    pub fn new(
        registry: Arc<AccountRegistry>,
        ledger: Arc<ProgressLedger>,
        pipeline: Arc<AccountPipeline>,
        poll_interval_ms: u64,
        max_parallel_accounts: usize,
    ) -> Self {
        Self {
            registry,
            ledger,
            pipeline,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_parallel_accounts: max_parallel_accounts.max(1),
            shutdown: Arc::new(ShutdownSignal::new()),
        }
    }

    /// Handle for requesting a graceful stop of [`Self::run`]
    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        self.shutdown.clone()
    }

    /// Run cycles until shutdown is requested
    ///
    /// Returns only between cycles, or after the running cycle finished the
    /// events it had started.
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            max_parallel_accounts = self.max_parallel_accounts,
            "Sweep worker starting"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.wait() => {}
            }
            if self.shutdown.is_shutdown_requested() {
                break;
            }

            match self.scan_once().await {
                Ok(report) => {
                    if report.settled_count() > 0 || report.deferred_count() > 0 {
                        info!(
                            accounts = report.accounts,
                            settled = report.settled_count(),
                            deferred = report.deferred_count(),
                            halted = report.halted,
                            "Cycle complete"
                        );
                    } else {
                        debug!(accounts = report.accounts, "Cycle complete, nothing to do");
                    }
                }
                Err(e) => error!(error = %e, "Cycle skipped"),
            }
        }

        info!("Sweep worker stopped");
    }

    /// Run a single cycle
    ///
    /// Fails only when progress left by an earlier failed commit still
    /// cannot be written; no account is touched in that case.
    pub async fn scan_once(&self) -> Result<CycleReport, SweepError> {
        if self.ledger.recover().await? {
            warn!("Resuming after recovered progress write failure");
        }

        let accounts = self.registry.all().await;
        let mut report = CycleReport {
            accounts: accounts.len(),
            ..Default::default()
        };

        let permits = Arc::new(Semaphore::new(self.max_parallel_accounts));
        let halt = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        let mut task_users = HashMap::new();

        for account in accounts {
            let permits = permits.clone();
            let halt = halt.clone();
            let pipeline = self.pipeline.clone();
            let shutdown = self.shutdown.clone();
            let user_id = account.user_id;

            let handle = tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return None;
                };
                if halt.load(Ordering::SeqCst) || shutdown.is_shutdown_requested() {
                    return None;
                }
                let result = pipeline.process_account(&account, &shutdown).await;
                if matches!(&result, Err(e) if e.kind() == ErrorKind::Persistence) {
                    halt.store(true, Ordering::SeqCst);
                }
                Some(result)
            });
            task_users.insert(handle.id(), user_id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Some(Ok(account_report)))) => report.reports.push(account_report),
                Ok((id, Some(Err(e)))) => {
                    let user_id = task_users.get(&id).copied().unwrap_or_default();
                    error!(user_id = user_id, error = %e, "Account aborted");
                    if e.kind() == ErrorKind::Persistence {
                        report.halted = true;
                    }
                }
                Ok((id, None)) => {
                    let user_id = task_users.get(&id).copied().unwrap_or_default();
                    debug!(user_id = user_id, "Account not started, cycle halted or stopping");
                }
                Err(join_err) => {
                    let user_id = task_users.get(&join_err.id()).copied().unwrap_or_default();
                    error!(user_id = user_id, error = %join_err, "Account task panicked");
                    report.panicked.push(user_id);
                }
            }
        }

        report.reports.sort_by_key(|r| r.user_id);
        report.halted |= halt.load(Ordering::SeqCst);
        Ok(report)
    }
}
