//! Account Pipeline
//!
//! Everything one account goes through in a cycle:
//!
//! ```text
//! fetch → filter → for each eligible event, oldest first:
//!     ensure gas → settle → notify
//! ```
//!
//! Events run strictly one after another. A failed event does not stop
//! the account; it only keeps the mark below itself so it is retried next
//! cycle. Only a persistence failure ends the account (and the cycle) early.
//! A shutdown request stops the account between events; unstarted events
//! stay unsettled and are picked up again after restart.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::error::{ErrorKind, StoreError, SweepError};
use super::filter::may_advance_mark;
use super::gas::{GasProvisioner, GasStatus};
use super::indexer::HistoryFetcher;
use super::ledger::ProgressLedger;
use super::notifier::Notifier;
use super::settlement::{SettleOutcome, SettlementExecutor};
use super::types::{Account, CandidateEvent, EventStage, SettlementRecord};
use super::worker::ShutdownSignal;
use crate::core_types::UserId;

/// Outcome of one account in one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReport {
    pub user_id: UserId,
    pub fetched: usize,
    pub eligible: usize,
    pub settled: Vec<SettlementRecord>,
    /// Left for a later cycle: insufficient balance or a transient failure
    pub deferred: usize,
    pub notify_failures: usize,
}

pub struct AccountPipeline {
    fetcher: Arc<dyn HistoryFetcher>,
    ledger: Arc<ProgressLedger>,
    gas: GasProvisioner,
    executor: SettlementExecutor,
    notifier: Arc<dyn Notifier>,
}

impl AccountPipeline {
    pub fn new(
        fetcher: Arc<dyn HistoryFetcher>,
        ledger: Arc<ProgressLedger>,
        gas: GasProvisioner,
        executor: SettlementExecutor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fetcher,
            ledger,
            gas,
            executor,
            notifier,
        }
    }

    pub async fn process_account(
        &self,
        account: &Account,
        shutdown: &ShutdownSignal,
    ) -> Result<AccountReport, SweepError> {
        let mut report = AccountReport {
            user_id: account.user_id,
            ..Default::default()
        };

        let events = match self.fetcher.fetch(&account.address).await {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    user_id = account.user_id,
                    address = %account.address,
                    error = %e,
                    "History fetch failed, account skipped this cycle"
                );
                return Ok(report);
            }
        };
        report.fetched = events.len();
        debug!(user_id = account.user_id, count = events.len(), stage = %EventStage::Fetched, "Fetched");

        let eligible = self.ledger.eligible(account, events).await;
        report.eligible = eligible.len();
        if eligible.is_empty() {
            debug!(user_id = account.user_id, "No new deposits");
            return Ok(report);
        }
        info!(
            user_id = account.user_id,
            count = eligible.len(),
            stage = %EventStage::Filtered,
            "New deposits detected"
        );

        // Events of this batch that did not settle; the mark must stay below them
        let mut unsettled: Vec<CandidateEvent> = Vec::new();

        for (i, event) in eligible.iter().enumerate() {
            if self.ledger.is_poisoned() {
                return Err(StoreError::Poisoned.into());
            }
            if shutdown.is_shutdown_requested() {
                info!(
                    user_id = account.user_id,
                    remaining = eligible.len() - i,
                    "Stopping before next deposit, shutdown requested"
                );
                break;
            }

            match self.gas.ensure_gas(account).await {
                Ok(GasStatus::Sufficient { .. }) | Ok(GasStatus::ToppedUp { .. }) => {
                    debug!(tx_id = %event.tx_id, stage = %EventStage::GasChecked, "Gas ready");
                }
                Err(e) => {
                    defer(event, e, &mut report)?;
                    unsettled.push(event.clone());
                    continue;
                }
            }

            let others: Vec<CandidateEvent> = unsettled
                .iter()
                .chain(eligible[i + 1..].iter())
                .cloned()
                .collect();
            let advance_mark = may_advance_mark(event, &others);

            match self.executor.settle(account, event, advance_mark).await {
                Ok(SettleOutcome::Settled(record)) => {
                    info!(
                        tx_id = %record.tx_id,
                        user_id = record.user_id,
                        amount = %record.amount,
                        settlement_tx_hash = %record.settlement_tx_hash,
                        advance_mark = advance_mark,
                        "Deposit swept"
                    );
                    match self.notifier.notify(&record).await {
                        Ok(()) => {
                            debug!(tx_id = %record.tx_id, stage = %EventStage::Notified, "Notified");
                        }
                        Err(e) => {
                            report.notify_failures += 1;
                            warn!(tx_id = %record.tx_id, error = %e, "Notification failed, settlement stands");
                        }
                    }
                    report.settled.push(record);
                }
                Ok(SettleOutcome::InsufficientBalance { .. }) => {
                    report.deferred += 1;
                    unsettled.push(event.clone());
                }
                Err(e) if e.kind() == ErrorKind::InvariantViolation => {
                    error!(tx_id = %event.tx_id, error = %e, "Invariant violation, event skipped");
                }
                Err(e) => {
                    defer(event, e, &mut report)?;
                    unsettled.push(event.clone());
                }
            }
        }

        Ok(report)
    }
}

/// Log a failed event; persistence failures end the account
fn defer(
    event: &CandidateEvent,
    e: SweepError,
    report: &mut AccountReport,
) -> Result<(), SweepError> {
    if e.kind() == ErrorKind::Persistence {
        error!(tx_id = %event.tx_id, error = %e, "Progress write failed, stopping");
        return Err(e);
    }
    warn!(
        tx_id = %event.tx_id,
        code = e.code(),
        error = %e,
        "Deposit deferred to next cycle"
    );
    report.deferred += 1;
    Ok(())
}
