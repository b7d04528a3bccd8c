//! Sweeper data model
//!
//! Accounts are long-lived and owned by the registry. Candidate events are
//! ephemeral. [`ProgressState`] is the only durable progress and is mutated
//! solely through the ledger.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{Timestamp, TxHash, TxId, UserId};

/// Signing secret of a deposit address (hex private key)
///
/// Never printed: `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Only the chain client may look at the secret, to sign locally
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A registered user and their deposit address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(alias = "id")]
    pub user_id: UserId,
    pub address: String,
    #[serde(alias = "privateKey")]
    pub credential: Credential,
}

/// Incoming transfer reported by the indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
    pub tx_id: TxId,
    pub recipient: String,
    pub amount: Decimal,
    pub observed_at: Timestamp,
}

/// Audit trail of one successful sweep, handed to the notifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementRecord {
    pub tx_id: TxId,
    pub user_id: UserId,
    pub address: String,
    pub amount: Decimal,
    pub settlement_tx_hash: TxHash,
}

/// Sweep submitted (or about to be) whose outcome is not yet committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlight {
    pub user_id: UserId,
    /// Known once the node accepted the transfer
    pub settlement_tx_hash: Option<TxHash>,
    /// Unix seconds
    pub submitted_at: i64,
}

/// Durable progress
///
/// - `low_water`: per-account boundary, events at or below it are done
/// - `settled`: every deposit tx ever swept
/// - `in_flight`: sweep journal used to recover from a crash between
///   confirmation and commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub low_water: BTreeMap<UserId, Timestamp>,
    pub settled: BTreeSet<TxId>,
    pub in_flight: BTreeMap<TxId, InFlight>,
}

impl ProgressState {
    pub fn low_water_of(&self, user_id: UserId) -> Timestamp {
        self.low_water.get(&user_id).copied().unwrap_or(0)
    }

    pub fn is_settled(&self, tx_id: &str) -> bool {
        self.settled.contains(tx_id)
    }

    /// Record a confirmed sweep; the mark never moves backwards
    pub fn apply_settlement(
        &mut self,
        user_id: UserId,
        tx_id: &str,
        observed_at: Timestamp,
        advance_mark: bool,
    ) {
        self.settled.insert(tx_id.to_string());
        self.in_flight.remove(tx_id);
        if advance_mark {
            let mark = self.low_water.entry(user_id).or_insert(0);
            *mark = (*mark).max(observed_at);
        }
    }

    /// Journal entries for deposits that are already settled are leftovers
    /// of a crash between the settled and journal writes
    pub fn drop_stale_in_flight(&mut self) -> usize {
        let before = self.in_flight.len();
        let settled = &self.settled;
        self.in_flight.retain(|tx_id, _| !settled.contains(tx_id));
        before - self.in_flight.len()
    }
}

/// Per-event processing stage
///
/// ```text
/// FETCHED → FILTERED → GAS_CHECKED → BALANCE_CHECKED → SUBMITTED
///         → CONFIRMED → PERSISTED → NOTIFIED
/// ```
///
/// `Persisted` is the terminal success state; `Notified` is best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventStage {
    Fetched,
    Filtered,
    GasChecked,
    BalanceChecked,
    Submitted,
    Confirmed,
    Persisted,
    Notified,
}

impl EventStage {
    /// Settlement is durable and final from here on
    #[inline]
    pub fn is_settled(&self) -> bool {
        *self >= EventStage::Persisted
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStage::Fetched => "FETCHED",
            EventStage::Filtered => "FILTERED",
            EventStage::GasChecked => "GAS_CHECKED",
            EventStage::BalanceChecked => "BALANCE_CHECKED",
            EventStage::Submitted => "SUBMITTED",
            EventStage::Confirmed => "CONFIRMED",
            EventStage::Persisted => "PERSISTED",
            EventStage::Notified => "NOTIFIED",
        }
    }
}

impl fmt::Display for EventStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_is_redacted() {
        let account = Account {
            user_id: 1,
            address: "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".to_string(),
            credential: Credential::new("0xsecret"),
        };
        let printed = format!("{:?}", account);
        assert!(!printed.contains("0xsecret"));
        assert!(printed.contains("Credential(***)"));
    }

    #[test]
    fn test_account_reads_legacy_field_names() {
        let json = r#"{"id": 7, "address": "0xabc", "privateKey": "0x01"}"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account.user_id, 7);
        assert_eq!(account.credential, Credential::new("0x01"));
    }

    #[test]
    fn test_credential_serializes_transparently() {
        let json = serde_json::to_string(&Credential::new("0xabc")).unwrap();
        assert_eq!(json, "\"0xabc\"");
    }

    #[test]
    fn test_apply_settlement_is_monotonic() {
        let mut state = ProgressState::default();
        state.apply_settlement(1, "t2", 150, true);
        state.apply_settlement(1, "t1", 100, true);

        assert_eq!(state.low_water_of(1), 150);
        assert!(state.is_settled("t1"));
        assert!(state.is_settled("t2"));
    }

    #[test]
    fn test_apply_settlement_without_advancing() {
        let mut state = ProgressState::default();
        state.apply_settlement(1, "t1", 100, false);

        assert_eq!(state.low_water_of(1), 0);
        assert!(state.is_settled("t1"));
    }

    #[test]
    fn test_marks_are_per_account() {
        let mut state = ProgressState::default();
        state.apply_settlement(1, "t1", 500, true);

        assert_eq!(state.low_water_of(1), 500);
        assert_eq!(state.low_water_of(2), 0);
    }

    #[test]
    fn test_drop_stale_in_flight() {
        let mut state = ProgressState::default();
        state.settled.insert("t1".to_string());
        for tx in ["t1", "t2"] {
            state.in_flight.insert(
                tx.to_string(),
                InFlight {
                    user_id: 1,
                    settlement_tx_hash: None,
                    submitted_at: 0,
                },
            );
        }

        assert_eq!(state.drop_stale_in_flight(), 1);
        assert!(state.in_flight.contains_key("t2"));
    }

    #[test]
    fn test_stage_order() {
        assert!(EventStage::Persisted.is_settled());
        assert!(EventStage::Notified.is_settled());
        assert!(!EventStage::Confirmed.is_settled());
        assert_eq!(EventStage::BalanceChecked.to_string(), "BALANCE_CHECKED");
    }
}
