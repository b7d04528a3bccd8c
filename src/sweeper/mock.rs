//! In-memory collaborators for tests
//!
//! Each mock records what was asked of it and can be told to fail.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Notify;

use super::chain::{ChainClient, Receipt, is_hex_address};
use super::error::{ChainError, StoreError, SweepError};
use super::indexer::HistoryFetcher;
use super::notifier::Notifier;
use super::store::{ProgressStore, ResetAudit};
use super::types::{Account, CandidateEvent, Credential, ProgressState, SettlementRecord};
use crate::core_types::{TxHash, UserId};

pub const TREASURY_KEY: &str = "0xtreasury";

// ============================================================================
// Progress store
// ============================================================================

pub struct MemoryProgressStore {
    persisted: Mutex<ProgressState>,
    /// `Some(n)`: the next n commits succeed, then every commit fails
    fail_after: Mutex<Option<usize>>,
    commit_count: AtomicUsize,
    audits: Mutex<Vec<ResetAudit>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self {
            persisted: Mutex::new(ProgressState::default()),
            fail_after: Mutex::new(None),
            commit_count: AtomicUsize::new(0),
            audits: Mutex::new(Vec::new()),
        }
    }

    pub fn persisted(&self) -> ProgressState {
        self.persisted.lock().unwrap().clone()
    }

    pub fn set_fail_commit(&self, fail: bool) {
        *self.fail_after.lock().unwrap() = if fail { Some(0) } else { None };
    }

    pub fn fail_after(&self, successes: usize) {
        *self.fail_after.lock().unwrap() = Some(successes);
    }

    pub fn commit_count(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }

    pub fn audits(&self) -> Vec<ResetAudit> {
        self.audits.lock().unwrap().clone()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self) -> Result<ProgressState, StoreError> {
        let mut state = self.persisted();
        state.drop_stale_in_flight();
        Ok(state)
    }

    fn commit(&self, state: &ProgressState) -> Result<(), StoreError> {
        let mut fail_after = self.fail_after.lock().unwrap();
        match fail_after.as_mut() {
            Some(0) => {
                return Err(StoreError::Io {
                    path: "memory".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            Some(n) => *n -= 1,
            None => {}
        }
        *self.persisted.lock().unwrap() = state.clone();
        self.commit_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn append_audit(&self, entry: &ResetAudit) -> Result<(), StoreError> {
        self.audits.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// Chain
// ============================================================================

#[derive(Debug, Clone)]
struct PendingTransfer {
    from: String,
    to: String,
    amount: Decimal,
}

#[derive(Default)]
struct ChainState {
    native: HashMap<String, Decimal>,
    token: HashMap<String, Decimal>,
    mined: HashMap<TxHash, bool>,
    pending: HashMap<TxHash, PendingTransfer>,
}

/// Ledger-style fake chain: transfers move balances, receipts are instant
/// unless pending or reverting is switched on
pub struct MockChain {
    state: Mutex<ChainState>,
    next_tx: AtomicUsize,
    next_key: AtomicUsize,
    native_transfers: AtomicUsize,
    token_transfers: AtomicUsize,
    fail_native_transfer: Mutex<bool>,
    fail_token_transfer: Mutex<bool>,
    fail_token_balance: Mutex<bool>,
    revert_token_transfers: Mutex<bool>,
    pending_token_transfers: Mutex<bool>,
    confirm_gate: Mutex<Option<Arc<Notify>>>,
    confirm_waiting: Notify,
}

fn key(address: &str) -> String {
    address.to_ascii_lowercase()
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
            next_tx: AtomicUsize::new(1),
            next_key: AtomicUsize::new(1),
            native_transfers: AtomicUsize::new(0),
            token_transfers: AtomicUsize::new(0),
            fail_native_transfer: Mutex::new(false),
            fail_token_transfer: Mutex::new(false),
            fail_token_balance: Mutex::new(false),
            revert_token_transfers: Mutex::new(false),
            pending_token_transfers: Mutex::new(false),
            confirm_gate: Mutex::new(None),
            confirm_waiting: Notify::new(),
        }
    }

    /// Deterministic address for any secret
    pub fn derive_address(secret: &str) -> String {
        let mut hasher = DefaultHasher::new();
        secret.hash(&mut hasher);
        format!("0x{:040x}", hasher.finish())
    }

    pub fn treasury_address(&self) -> String {
        Self::derive_address(TREASURY_KEY)
    }

    /// Account whose address matches its credential
    pub fn account(&self, user_id: UserId) -> Account {
        let secret = format!("0xuser{}", user_id);
        Account {
            user_id,
            address: Self::derive_address(&secret),
            credential: Credential::new(secret),
        }
    }

    pub fn fund_treasury(&self, native: Decimal) {
        let treasury = self.treasury_address();
        self.set_native_balance(&treasury, native);
    }

    pub fn set_native_balance(&self, address: &str, amount: Decimal) {
        self.state.lock().unwrap().native.insert(key(address), amount);
    }

    pub fn set_token_balance(&self, address: &str, amount: Decimal) {
        self.state.lock().unwrap().token.insert(key(address), amount);
    }

    /// Add to a token balance, as an incoming deposit would
    pub fn credit_tokens(&self, address: &str, amount: Decimal) {
        *self
            .state
            .lock()
            .unwrap()
            .token
            .entry(key(address))
            .or_insert(Decimal::ZERO) += amount;
    }

    pub fn token_balance_of(&self, address: &str) -> Decimal {
        self.state
            .lock()
            .unwrap()
            .token
            .get(&key(address))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn native_transfer_count(&self) -> usize {
        self.native_transfers.load(Ordering::SeqCst)
    }

    pub fn token_transfer_count(&self) -> usize {
        self.token_transfers.load(Ordering::SeqCst)
    }

    pub fn set_fail_native_transfer(&self, fail: bool) {
        *self.fail_native_transfer.lock().unwrap() = fail;
    }

    pub fn set_fail_token_transfer(&self, fail: bool) {
        *self.fail_token_transfer.lock().unwrap() = fail;
    }

    pub fn set_fail_token_balance(&self, fail: bool) {
        *self.fail_token_balance.lock().unwrap() = fail;
    }

    pub fn set_revert_token_transfers(&self, revert: bool) {
        *self.revert_token_transfers.lock().unwrap() = revert;
    }

    /// Token transfers are accepted but not mined until [`Self::confirm_pending`]
    pub fn set_pending_token_transfers(&self, pending: bool) {
        *self.pending_token_transfers.lock().unwrap() = pending;
    }

    /// Confirmation waits block until the returned gate is notified, one
    /// permit per wait
    pub fn hold_confirmations(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.confirm_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a confirmation wait is blocked on the gate
    pub async fn confirmation_requested(&self) {
        self.confirm_waiting.notified().await;
    }

    /// Mine every pending transfer
    pub fn confirm_pending(&self) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let pending: Vec<(TxHash, PendingTransfer)> = state.pending.drain().collect();
        for (hash, t) in pending {
            let from = state.token.entry(key(&t.from)).or_insert(Decimal::ZERO);
            if *from >= t.amount {
                *from -= t.amount;
                *state.token.entry(key(&t.to)).or_insert(Decimal::ZERO) += t.amount;
                state.mined.insert(hash, true);
            } else {
                state.mined.insert(hash, false);
            }
        }
    }

    /// Forget every pending transfer, as if the mempool dropped them
    pub fn drop_pending(&self) {
        self.state.lock().unwrap().pending.clear();
    }

    fn next_hash(&self, prefix: &str) -> TxHash {
        format!("0x{}{:060x}", prefix, self.next_tx.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn validate_address(&self, address: &str) -> bool {
        is_hex_address(address)
    }

    fn generate_keypair(&self) -> (String, Credential) {
        let secret = format!("0xgen{}", self.next_key.fetch_add(1, Ordering::SeqCst));
        (Self::derive_address(&secret), Credential::new(secret))
    }

    fn address_of(&self, credential: &Credential) -> Result<String, ChainError> {
        if credential.expose().is_empty() {
            return Err(ChainError::InvalidKey);
        }
        Ok(Self::derive_address(credential.expose()))
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .native
            .get(&key(address))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn token_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        if *self.fail_token_balance.lock().unwrap() {
            return Err(ChainError::Network("balanceOf timed out".to_string()));
        }
        Ok(self.token_balance_of(address))
    }

    async fn submit_native_transfer(
        &self,
        from: &Credential,
        to: &str,
        amount: Decimal,
    ) -> Result<TxHash, ChainError> {
        if *self.fail_native_transfer.lock().unwrap() {
            return Err(ChainError::Network("node unavailable".to_string()));
        }
        let from = self.address_of(from)?;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let balance = state.native.entry(key(&from)).or_insert(Decimal::ZERO);
        if *balance < amount {
            return Err(ChainError::Network("insufficient funds for transfer".to_string()));
        }
        *balance -= amount;
        *state.native.entry(key(to)).or_insert(Decimal::ZERO) += amount;

        let hash = self.next_hash("aa");
        state.mined.insert(hash.clone(), true);
        self.native_transfers.fetch_add(1, Ordering::SeqCst);
        Ok(hash)
    }

    async fn submit_token_transfer(
        &self,
        from: &Credential,
        to: &str,
        amount: Decimal,
        _gas_limit: u64,
    ) -> Result<TxHash, ChainError> {
        if *self.fail_token_transfer.lock().unwrap() {
            return Err(ChainError::Network("node unavailable".to_string()));
        }
        let from = self.address_of(from)?;
        let hash = self.next_hash("bb");
        self.token_transfers.fetch_add(1, Ordering::SeqCst);

        let pending = *self.pending_token_transfers.lock().unwrap();
        let revert = *self.revert_token_transfers.lock().unwrap();
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if pending {
            state.pending.insert(
                hash.clone(),
                PendingTransfer {
                    from,
                    to: to.to_string(),
                    amount,
                },
            );
            return Ok(hash);
        }

        let balance = state.token.entry(key(&from)).or_insert(Decimal::ZERO);
        if revert || *balance < amount {
            state.mined.insert(hash.clone(), false);
            return Ok(hash);
        }
        *balance -= amount;
        *state.token.entry(key(to)).or_insert(Decimal::ZERO) += amount;
        state.mined.insert(hash.clone(), true);
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
        let state = self.state.lock().unwrap();
        Ok(state.mined.get(tx_hash).map(|success| Receipt {
            tx_hash: tx_hash.to_string(),
            block_number: Some(1),
            success: *success,
        }))
    }

    async fn wait_confirmed(&self, tx_hash: &str) -> Result<Receipt, ChainError> {
        let gate = self.confirm_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.confirm_waiting.notify_one();
            gate.notified().await;
        }

        match self.receipt(tx_hash).await? {
            Some(receipt) if receipt.success => Ok(receipt),
            Some(_) => Err(ChainError::Reverted(tx_hash.to_string())),
            None => Err(ChainError::Timeout(tx_hash.to_string())),
        }
    }
}

// ============================================================================
// Indexer
// ============================================================================

pub struct MockIndexer {
    events: Mutex<HashMap<String, Vec<CandidateEvent>>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    fetch_count: AtomicUsize,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Report a transfer to `event.recipient`
    pub fn push(&self, event: CandidateEvent) {
        self.events
            .lock()
            .unwrap()
            .entry(key(&event.recipient))
            .or_default()
            .push(event);
    }

    pub fn set_fail(&self, address: &str, fail: bool) {
        let mut failing = self.failing.lock().unwrap();
        if fail {
            failing.insert(key(address));
        } else {
            failing.remove(&key(address));
        }
    }

    pub fn set_panic(&self, address: &str) {
        self.panicking.lock().unwrap().insert(key(address));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryFetcher for MockIndexer {
    async fn fetch(&self, address: &str) -> Result<Vec<CandidateEvent>, SweepError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.panicking.lock().unwrap().contains(&key(address)) {
            panic!("indexer blew up for {}", address);
        }
        if self.failing.lock().unwrap().contains(&key(address)) {
            return Err(SweepError::Indexer("connection reset".to_string()));
        }

        // Newest first, like the real feed
        let mut events = self
            .events
            .lock()
            .unwrap()
            .get(&key(address))
            .cloned()
            .unwrap_or_default();
        events.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        Ok(events)
    }
}

// ============================================================================
// Notifier
// ============================================================================

pub struct MockNotifier {
    sent: Mutex<Vec<SettlementRecord>>,
    fail: Mutex<bool>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn sent(&self) -> Vec<SettlementRecord> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, record: &SettlementRecord) -> Result<(), SweepError> {
        if *self.fail.lock().unwrap() {
            return Err(SweepError::Notify("webhook unreachable".to_string()));
        }
        self.sent.lock().unwrap().push(record.clone());
        Ok(())
    }
}
