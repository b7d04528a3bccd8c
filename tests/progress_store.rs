//! Durable progress across process restarts
//!
//! Drives `ProgressLedger` over a real `FileProgressStore` in a temp dir and
//! reopens it the way a restarted service would.

use std::sync::Arc;

use rust_decimal::Decimal;

use deposit_sweeper::sweeper::store::{IN_FLIGHT_FILE, LOW_WATER_FILE, PROCESSED_FILE};
use deposit_sweeper::sweeper::{
    Account, AccountRegistry, CandidateEvent, Credential, FileProgressStore, ProgressLedger,
};

const ADDRESS: &str = "0x00000000000000000000000000000000000000a1";

fn open_ledger(dir: &std::path::Path) -> ProgressLedger {
    ProgressLedger::open(Arc::new(FileProgressStore::new(dir))).unwrap()
}

fn deposit(tx_id: &str, observed_at: u64) -> CandidateEvent {
    CandidateEvent {
        tx_id: tx_id.to_string(),
        recipient: ADDRESS.to_string(),
        amount: Decimal::new(25, 0),
        observed_at,
    }
}

fn account() -> Account {
    Account {
        user_id: 1,
        address: ADDRESS.to_string(),
        credential: Credential::new("0xkey1"),
    }
}

#[tokio::test]
async fn test_settlement_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let ledger = open_ledger(dir.path());
        ledger.commit_settlement(1, &deposit("t1", 100), true).await.unwrap();
    }

    assert!(dir.path().join(PROCESSED_FILE).exists());
    assert!(dir.path().join(LOW_WATER_FILE).exists());
    assert!(dir.path().join(IN_FLIGHT_FILE).exists());

    let ledger = open_ledger(dir.path());
    assert!(ledger.is_settled("t1").await);
    assert_eq!(ledger.low_water_of(1).await, 100);
    // Other accounts are unaffected by user 1's mark
    assert_eq!(ledger.low_water_of(2).await, 0);
}

#[tokio::test]
async fn test_settled_deposit_is_not_eligible_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger = open_ledger(dir.path());
        ledger.commit_settlement(1, &deposit("t1", 100), true).await.unwrap();
    }

    let ledger = open_ledger(dir.path());
    let eligible = ledger
        .eligible(&account(), vec![deposit("t2", 200), deposit("t1", 100)])
        .await;

    let ids: Vec<_> = eligible.iter().map(|e| e.tx_id.as_str()).collect();
    assert_eq!(ids, vec!["t2"]);
}

#[tokio::test]
async fn test_journal_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger = open_ledger(dir.path());
        ledger.journal_intent("t1", 1).await.unwrap();
        ledger.journal_submission("t1", 1, "0xsweep").await.unwrap();
    }

    let ledger = open_ledger(dir.path());
    let entry = ledger.in_flight("t1").await.unwrap();
    assert_eq!(entry.user_id, 1);
    assert_eq!(entry.settlement_tx_hash.as_deref(), Some("0xsweep"));

    // Settling clears the journal entry durably
    ledger.commit_settlement(1, &deposit("t1", 100), true).await.unwrap();
    let ledger = open_ledger(dir.path());
    assert!(ledger.in_flight("t1").await.is_none());
}

#[tokio::test]
async fn test_reset_is_durable_and_audited() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger = open_ledger(dir.path());
        ledger.commit_settlement(1, &deposit("t1", 100), true).await.unwrap();
        let audit = ledger.reset("ops", "indexer replay").await.unwrap();
        assert_eq!(audit.settled_cleared, 1);
        assert_eq!(audit.marks_cleared, 1);
    }

    let ledger = open_ledger(dir.path());
    assert!(!ledger.is_settled("t1").await);
    assert_eq!(ledger.low_water_of(1).await, 0);

    let log = FileProgressStore::new(dir.path()).audit_log().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].operator, "ops");
}

#[tokio::test]
async fn test_corrupt_record_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(PROCESSED_FILE), b"{not json").unwrap();

    let result = ProgressLedger::open(Arc::new(FileProgressStore::new(dir.path())));
    assert!(result.is_err());
}

#[tokio::test]
async fn test_registry_and_progress_share_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = AccountRegistry::open(dir.path()).unwrap();
        registry.insert(account()).await.unwrap();
        let ledger = open_ledger(dir.path());
        ledger.commit_settlement(1, &deposit("t1", 100), true).await.unwrap();
    }

    let registry = AccountRegistry::open(dir.path()).unwrap();
    assert_eq!(registry.get(1).await.unwrap().address, ADDRESS);
    assert!(open_ledger(dir.path()).is_settled("t1").await);
}
