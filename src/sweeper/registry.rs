//! Account Registry
//!
//! Per-user deposit accounts. Records are created once and never modified;
//! the whole set is persisted to `users.json` with the same atomic
//! replace used for progress records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::info;

use super::chain::ChainClient;
use super::error::{StoreError, SweepError};
use super::filter::same_address;
use super::store::{read_json_or_default, write_json_atomic};
use super::types::Account;
use crate::core_types::UserId;

pub const USERS_FILE: &str = "users.json";

pub struct AccountRegistry {
    /// `None` keeps the registry in memory only
    path: Option<PathBuf>,
    accounts: RwLock<BTreeMap<UserId, Account>>,
}

impl AccountRegistry {
    /// Load `users.json` from `dir` (missing file = no accounts)
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = dir.as_ref().join(USERS_FILE);
        let list: Vec<Account> = read_json_or_default(&path)?;
        let accounts: BTreeMap<UserId, Account> =
            list.into_iter().map(|a| (a.user_id, a)).collect();

        info!(count = accounts.len(), path = %path.display(), "Account registry loaded");

        Ok(Self {
            path: Some(path),
            accounts: RwLock::new(accounts),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            accounts: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn get(&self, user_id: UserId) -> Option<Account> {
        self.accounts.read().await.get(&user_id).cloned()
    }

    /// Snapshot of all accounts, ordered by user id
    pub async fn all(&self) -> Vec<Account> {
        self.accounts.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    /// Insert a new account
    ///
    /// Returns the stored account and whether it was created. An existing
    /// record for the same user wins; it is never overwritten.
    pub async fn insert(&self, account: Account) -> Result<(Account, bool), SweepError> {
        let mut accounts = self.accounts.write().await;

        if let Some(existing) = accounts.get(&account.user_id) {
            return Ok((existing.clone(), false));
        }
        if accounts
            .values()
            .any(|a| same_address(&a.address, &account.address))
        {
            return Err(SweepError::InvalidRequest(format!(
                "address {} already belongs to another account",
                account.address
            )));
        }

        let mut next = accounts.clone();
        next.insert(account.user_id, account.clone());
        if let Some(path) = &self.path {
            let list: Vec<&Account> = next.values().collect();
            write_json_atomic(path, &list)?;
        }
        *accounts = next;

        info!(
            user_id = account.user_id,
            address = %account.address,
            "Account registered"
        );
        Ok((account, true))
    }

    /// Idempotent registration: existing users get their address back,
    /// new users get a freshly generated key
    pub async fn register(
        &self,
        user_id: UserId,
        chain: &dyn ChainClient,
    ) -> Result<(Account, bool), SweepError> {
        if let Some(existing) = self.get(user_id).await {
            return Ok((existing, false));
        }

        let (address, credential) = chain.generate_keypair();
        self.insert(Account {
            user_id,
            address,
            credential,
        })
        .await
    }
}
