//! Gas Provisioner
//!
//! A deposit address holds tokens but usually no native currency, so it
//! cannot pay for its own sweep. Below the threshold the treasury sends a
//! fixed top-up and waits for it to land.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::chain::{Asset, ChainClient, transfer_and_confirm};
use super::config::GasConfig;
use super::error::SweepError;
use super::types::{Account, Credential};
use crate::core_types::TxHash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasStatus {
    /// Already at or above the threshold
    Sufficient { balance: Decimal },
    /// Top-up sent and confirmed
    ToppedUp { previous: Decimal, tx_hash: TxHash },
}

pub struct GasProvisioner {
    chain: Arc<dyn ChainClient>,
    funding_key: Credential,
    min_native_balance: Decimal,
    top_up_amount: Decimal,
}

impl GasProvisioner {
    pub fn new(chain: Arc<dyn ChainClient>, funding_key: Credential, config: &GasConfig) -> Self {
        Self {
            chain,
            funding_key,
            min_native_balance: config.min_native_balance,
            top_up_amount: config.top_up_amount,
        }
    }

    /// Make sure `account` can pay for one sweep
    ///
    /// Idempotent: a confirmed top-up lifts the balance over the threshold,
    /// so calling again is a balance read.
    pub async fn ensure_gas(&self, account: &Account) -> Result<GasStatus, SweepError> {
        let balance = self.chain.native_balance(&account.address).await?;
        if balance >= self.min_native_balance {
            debug!(user_id = account.user_id, balance = %balance, "Gas sufficient");
            return Ok(GasStatus::Sufficient { balance });
        }

        let receipt = transfer_and_confirm(
            self.chain.as_ref(),
            Asset::Native,
            &self.funding_key,
            &account.address,
            self.top_up_amount,
            0,
        )
        .await
        .map_err(|e| SweepError::GasTopUp {
            address: account.address.clone(),
            reason: e.to_string(),
        })?;

        info!(
            user_id = account.user_id,
            address = %account.address,
            previous = %balance,
            amount = %self.top_up_amount,
            tx_hash = %receipt.tx_hash,
            "Gas topped up"
        );

        Ok(GasStatus::ToppedUp {
            previous: balance,
            tx_hash: receipt.tx_hash,
        })
    }
}
