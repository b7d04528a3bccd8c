//! Settlement Executor
//!
//! Moves one deposit from the user's address to the treasury:
//!
//! ```text
//! journal intent → submit → journal hash → wait confirmed → commit
//! ```
//!
//! The journal is written before every chain call so a restart can tell
//! whether a sweep for this deposit may already be on chain. Progress is
//! committed only after confirmation; nothing before that changes it.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use super::chain::ChainClient;
use super::error::{ChainError, SweepError};
use super::ledger::ProgressLedger;
use super::types::{Account, CandidateEvent, EventStage, InFlight, SettlementRecord};
use crate::core_types::TxHash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled(SettlementRecord),
    /// Token balance below the deposit amount; nothing was sent
    InsufficientBalance { available: Decimal, required: Decimal },
}

/// How a journal entry left by an earlier attempt was resolved
enum Journaled {
    /// The earlier sweep is confirmed
    Confirmed(TxHash),
    /// Nothing of the earlier attempt can land any more
    Cleared,
}

pub struct SettlementExecutor {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<ProgressLedger>,
    treasury_address: String,
    gas_limit: u64,
    in_flight_stale_secs: i64,
}

impl SettlementExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        ledger: Arc<ProgressLedger>,
        treasury_address: String,
        gas_limit: u64,
        in_flight_stale_secs: i64,
    ) -> Self {
        Self {
            chain,
            ledger,
            treasury_address,
            gas_limit,
            in_flight_stale_secs,
        }
    }

    pub async fn settle(
        &self,
        account: &Account,
        event: &CandidateEvent,
        advance_mark: bool,
    ) -> Result<SettleOutcome, SweepError> {
        if self.ledger.is_settled(&event.tx_id).await {
            error!(
                tx_id = %event.tx_id,
                user_id = account.user_id,
                "Refusing to settle a deposit twice"
            );
            return Err(SweepError::AlreadySettled(event.tx_id.clone()));
        }

        if let Some(entry) = self.ledger.in_flight(&event.tx_id).await {
            match self.resolve_journal(event, &entry).await? {
                Journaled::Confirmed(tx_hash) => {
                    info!(
                        tx_id = %event.tx_id,
                        settlement_tx_hash = %tx_hash,
                        "Earlier sweep confirmed, committing without resubmitting"
                    );
                    return self.commit(account, event, advance_mark, tx_hash).await;
                }
                Journaled::Cleared => self.ledger.discard_journal(&event.tx_id).await?,
            }
        }

        let available = self.chain.token_balance(&account.address).await?;
        if available < event.amount {
            warn!(
                tx_id = %event.tx_id,
                user_id = account.user_id,
                available = %available,
                required = %event.amount,
                "Token balance below deposit amount, skipping"
            );
            return Ok(SettleOutcome::InsufficientBalance {
                available,
                required: event.amount,
            });
        }
        log_stage(event, EventStage::BalanceChecked);

        self.ledger
            .journal_intent(&event.tx_id, account.user_id)
            .await?;

        let tx_hash = match self
            .chain
            .submit_token_transfer(
                &account.credential,
                &self.treasury_address,
                event.amount,
                self.gas_limit,
            )
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                self.ledger.discard_journal(&event.tx_id).await?;
                return Err(e.into());
            }
        };
        self.ledger
            .journal_submission(&event.tx_id, account.user_id, &tx_hash)
            .await?;
        info!(
            tx_id = %event.tx_id,
            settlement_tx_hash = %tx_hash,
            stage = %EventStage::Submitted,
            "Sweep submitted"
        );

        match self.chain.wait_confirmed(&tx_hash).await {
            Ok(_) => {}
            Err(ChainError::Reverted(hash)) => {
                self.ledger.discard_journal(&event.tx_id).await?;
                return Err(ChainError::Reverted(hash).into());
            }
            // Timeout and RPC errors: the journal keeps the hash for the next cycle
            Err(e) => return Err(e.into()),
        }
        log_stage(event, EventStage::Confirmed);

        self.commit(account, event, advance_mark, tx_hash).await
    }

    async fn resolve_journal(
        &self,
        event: &CandidateEvent,
        entry: &InFlight,
    ) -> Result<Journaled, SweepError> {
        let Some(tx_hash) = entry.settlement_tx_hash.as_deref() else {
            // Submission never returned a hash, so nothing reached the node
            return Ok(Journaled::Cleared);
        };

        match self.chain.receipt(tx_hash).await? {
            Some(receipt) if receipt.success => {
                return Ok(Journaled::Confirmed(tx_hash.to_string()));
            }
            Some(_) => {
                warn!(tx_id = %event.tx_id, settlement_tx_hash = %tx_hash, "Earlier sweep reverted");
                return Ok(Journaled::Cleared);
            }
            None => {}
        }

        match self.chain.wait_confirmed(tx_hash).await {
            Ok(_) => Ok(Journaled::Confirmed(tx_hash.to_string())),
            Err(ChainError::Reverted(_)) => Ok(Journaled::Cleared),
            Err(ChainError::Timeout(hash)) => {
                let age = Utc::now().timestamp() - entry.submitted_at;
                if age > self.in_flight_stale_secs {
                    warn!(
                        tx_id = %event.tx_id,
                        settlement_tx_hash = %hash,
                        age_secs = age,
                        "Earlier sweep never landed, presumed dropped"
                    );
                    Ok(Journaled::Cleared)
                } else {
                    Err(ChainError::Timeout(hash).into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(
        &self,
        account: &Account,
        event: &CandidateEvent,
        advance_mark: bool,
        settlement_tx_hash: TxHash,
    ) -> Result<SettleOutcome, SweepError> {
        self.ledger
            .commit_settlement(account.user_id, event, advance_mark)
            .await?;
        log_stage(event, EventStage::Persisted);

        Ok(SettleOutcome::Settled(SettlementRecord {
            tx_id: event.tx_id.clone(),
            user_id: account.user_id,
            address: account.address.clone(),
            amount: event.amount,
            settlement_tx_hash,
        }))
    }
}

fn log_stage(event: &CandidateEvent, stage: EventStage) {
    tracing::debug!(tx_id = %event.tx_id, stage = %stage, "Deposit stage");
}
