use std::sync::Arc;

use crate::sweeper::{AccountRegistry, ChainClient, Credential, ProgressLedger};

/// Treasury signing identity used by manual withdrawals
#[derive(Debug, Clone)]
pub struct TreasuryWallet {
    pub address: String,
    pub key: Credential,
}

/// Shared control surface state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AccountRegistry>,
    pub ledger: Arc<ProgressLedger>,
    pub chain: Arc<dyn ChainClient>,
    pub treasury: TreasuryWallet,
    /// Gas limit of manual token transfers
    pub token_gas_limit: u64,
    /// `None` disables the admin routes entirely
    admin_secret: Option<String>,
}

impl AppState {
    pub fn new(
        registry: Arc<AccountRegistry>,
        ledger: Arc<ProgressLedger>,
        chain: Arc<dyn ChainClient>,
        treasury: TreasuryWallet,
        token_gas_limit: u64,
        admin_secret: Option<String>,
    ) -> Self {
        Self {
            registry,
            ledger,
            chain,
            treasury,
            token_gas_limit,
            admin_secret,
        }
    }

    /// Constant-time comparison against the configured admin secret
    pub fn is_admin(&self, presented: Option<&str>) -> bool {
        let (Some(expected), Some(presented)) = (self.admin_secret.as_deref(), presented) else {
            return false;
        };
        if expected.len() != presented.len() {
            return false;
        }
        expected
            .bytes()
            .zip(presented.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
