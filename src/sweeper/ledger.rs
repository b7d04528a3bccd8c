//! Progress Ledger
//!
//! Single writer in front of a [`ProgressStore`]. All progress mutations
//! go through here, serialized by one async mutex, so the
//! commit-before-success rule holds even when accounts run concurrently.
//!
//! # Poisoning
//!
//! A confirmed sweep is applied to the in-memory state before it is
//! persisted. If persisting fails the memory still reflects what happened
//! on chain (so this process never sweeps the deposit again) and the ledger
//! is poisoned: every further mutation is refused until
//! [`ProgressLedger::recover`] manages to write the whole state. An
//! operator reset is applied the same way once its audit line is written.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{StoreError, SweepError};
use super::filter;
use super::store::{ProgressStore, ResetAudit};
use super::types::{Account, CandidateEvent, InFlight, ProgressState};
use crate::core_types::{Timestamp, UserId};

pub struct ProgressLedger {
    store: Arc<dyn ProgressStore>,
    state: Mutex<ProgressState>,
    poisoned: AtomicBool,
}

impl ProgressLedger {
    /// Load the current state from the store
    pub fn open(store: Arc<dyn ProgressStore>) -> Result<Self, StoreError> {
        let state = store.load()?;
        Ok(Self {
            store,
            state: Mutex::new(state),
            poisoned: AtomicBool::new(false),
        })
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> ProgressState {
        self.state.lock().await.clone()
    }

    pub async fn low_water_of(&self, user_id: UserId) -> Timestamp {
        self.state.lock().await.low_water_of(user_id)
    }

    pub async fn is_settled(&self, tx_id: &str) -> bool {
        self.state.lock().await.is_settled(tx_id)
    }

    pub async fn in_flight(&self, tx_id: &str) -> Option<InFlight> {
        self.state.lock().await.in_flight.get(tx_id).cloned()
    }

    /// Eligible events for one account, oldest first
    pub async fn eligible(
        &self,
        account: &Account,
        events: Vec<CandidateEvent>,
    ) -> Vec<CandidateEvent> {
        let state = self.state.lock().await;
        filter::select_eligible(account, events, &state)
    }

    /// Journal the intent to sweep, before anything is sent to the chain
    pub async fn journal_intent(&self, tx_id: &str, user_id: UserId) -> Result<(), SweepError> {
        self.mutate(|state| {
            state.in_flight.insert(
                tx_id.to_string(),
                InFlight {
                    user_id,
                    settlement_tx_hash: None,
                    submitted_at: Utc::now().timestamp(),
                },
            );
        })
        .await
    }

    /// Journal the hash of a submitted sweep
    ///
    /// The transfer is live once the node accepted it, so like a settlement
    /// the hash is kept in memory even if it cannot be persisted (and the
    /// ledger is poisoned). Losing it would let the next attempt resubmit.
    pub async fn journal_submission(
        &self,
        tx_id: &str,
        user_id: UserId,
        settlement_tx_hash: &str,
    ) -> Result<(), SweepError> {
        if self.is_poisoned() {
            return Err(StoreError::Poisoned.into());
        }

        let mut state = self.state.lock().await;
        let submitted_at = state
            .in_flight
            .get(tx_id)
            .map(|e| e.submitted_at)
            .unwrap_or_else(|| Utc::now().timestamp());
        state.in_flight.insert(
            tx_id.to_string(),
            InFlight {
                user_id,
                settlement_tx_hash: Some(settlement_tx_hash.to_string()),
                submitted_at,
            },
        );

        if let Err(e) = self.store.commit(&state) {
            self.poisoned.store(true, Ordering::SeqCst);
            error!(
                tx_id = %tx_id,
                settlement_tx_hash = %settlement_tx_hash,
                error = %e,
                "CRITICAL: submitted sweep could not be journaled, halting progress"
            );
            return Err(e.into());
        }
        Ok(())
    }

    /// Forget a journal entry whose sweep never landed
    pub async fn discard_journal(&self, tx_id: &str) -> Result<(), SweepError> {
        self.mutate(|state| {
            state.in_flight.remove(tx_id);
        })
        .await
    }

    /// Record a confirmed sweep and persist it before returning
    pub async fn commit_settlement(
        &self,
        user_id: UserId,
        event: &CandidateEvent,
        advance_mark: bool,
    ) -> Result<(), SweepError> {
        if self.is_poisoned() {
            return Err(StoreError::Poisoned.into());
        }

        let mut state = self.state.lock().await;
        if state.is_settled(&event.tx_id) {
            return Err(SweepError::AlreadySettled(event.tx_id.clone()));
        }

        // Memory first: the transfer is confirmed whatever the disk says
        state.apply_settlement(user_id, &event.tx_id, event.observed_at, advance_mark);

        if let Err(e) = self.store.commit(&state) {
            self.poisoned.store(true, Ordering::SeqCst);
            error!(
                tx_id = %event.tx_id,
                user_id = user_id,
                error = %e,
                "CRITICAL: confirmed sweep could not be persisted, halting progress"
            );
            return Err(e.into());
        }

        Ok(())
    }

    /// Re-persist the full in-memory state after an earlier failed commit
    ///
    /// Returns `Ok(true)` when the ledger was poisoned and is now healthy.
    pub async fn recover(&self) -> Result<bool, SweepError> {
        if !self.is_poisoned() {
            return Ok(false);
        }

        let state = self.state.lock().await;
        self.store.commit(&state)?;
        self.poisoned.store(false, Ordering::SeqCst);
        info!(
            settled = state.settled.len(),
            "Progress store writable again, ledger recovered"
        );
        Ok(true)
    }

    /// Operator recovery: zero every mark, clear the settled set and journal
    ///
    /// Re-exposes already swept deposits to the pipeline, so the request
    /// must name who did it and why; both are written to the audit log.
    pub async fn reset(&self, operator: &str, reason: &str) -> Result<ResetAudit, SweepError> {
        if operator.trim().is_empty() || reason.trim().is_empty() {
            return Err(SweepError::InvalidRequest(
                "reset requires operator and reason".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let audit = ResetAudit {
            id: Uuid::new_v4(),
            at: Utc::now(),
            operator: operator.trim().to_string(),
            reason: reason.trim().to_string(),
            settled_cleared: state.settled.len(),
            marks_cleared: state.low_water.len(),
        };

        // Audit before mutation: a reset that is not on record did not happen
        self.store.append_audit(&audit)?;

        // Memory first, like a settlement: the audit already says the reset
        // happened, and a partly written reset on disk must not be trusted
        *state = ProgressState::default();
        if let Err(e) = self.store.commit(&state) {
            self.poisoned.store(true, Ordering::SeqCst);
            error!(
                audit_id = %audit.id,
                error = %e,
                "CRITICAL: reset could not be persisted, halting progress"
            );
            return Err(e.into());
        }
        self.poisoned.store(false, Ordering::SeqCst);

        warn!(
            audit_id = %audit.id,
            operator = %audit.operator,
            reason = %audit.reason,
            settled_cleared = audit.settled_cleared,
            marks_cleared = audit.marks_cleared,
            "PROGRESS RESET: previously swept deposits may be re-processed"
        );

        Ok(audit)
    }

    /// Apply `f` to a copy, persist it, then swap it in
    async fn mutate<F>(&self, f: F) -> Result<(), SweepError>
    where
        F: FnOnce(&mut ProgressState),
    {
        if self.is_poisoned() {
            return Err(StoreError::Poisoned.into());
        }

        let mut state = self.state.lock().await;
        let mut next = state.clone();
        f(&mut next);
        self.store.commit(&next)?;
        *state = next;
        Ok(())
    }
}
