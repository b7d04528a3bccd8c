use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use super::error::ChainError;
use super::types::Credential;
use crate::core_types::TxHash;

/// Inclusion result of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Everything the sweeper needs from the chain
///
/// Balances are in whole units (token decimals / 18 for native).
/// Submissions return as soon as the node accepted the transaction;
/// [`ChainClient::wait_confirmed`] blocks until it is included.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Validate an address format
    fn validate_address(&self, address: &str) -> bool;

    /// Generate a fresh deposit keypair: (address, credential)
    fn generate_keypair(&self) -> (String, Credential);

    /// Address controlled by a credential
    fn address_of(&self, credential: &Credential) -> Result<String, ChainError>;

    async fn native_balance(&self, address: &str) -> Result<Decimal, ChainError>;

    async fn token_balance(&self, address: &str) -> Result<Decimal, ChainError>;

    async fn submit_native_transfer(
        &self,
        from: &Credential,
        to: &str,
        amount: Decimal,
    ) -> Result<TxHash, ChainError>;

    async fn submit_token_transfer(
        &self,
        from: &Credential,
        to: &str,
        amount: Decimal,
        gas_limit: u64,
    ) -> Result<TxHash, ChainError>;

    /// Current receipt, `None` while unknown or pending
    async fn receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError>;

    /// Wait for one confirmation; reverted transactions are errors
    async fn wait_confirmed(&self, tx_hash: &str) -> Result<Receipt, ChainError>;
}

/// Shape check for a 0x-prefixed 20-byte hex address
pub fn is_hex_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Asset moved by a manual transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Native,
    Token,
}

/// Submit a transfer and wait for its confirmation
pub async fn transfer_and_confirm(
    chain: &dyn ChainClient,
    asset: Asset,
    from: &Credential,
    to: &str,
    amount: Decimal,
    gas_limit: u64,
) -> Result<Receipt, ChainError> {
    if amount <= Decimal::ZERO {
        return Err(ChainError::InvalidAmount(amount.to_string()));
    }
    if !chain.validate_address(to) {
        return Err(ChainError::InvalidAddress(to.to_string()));
    }

    let tx_hash = match asset {
        Asset::Native => chain.submit_native_transfer(from, to, amount).await?,
        Asset::Token => {
            chain
                .submit_token_transfer(from, to, amount, gas_limit)
                .await?
        }
    };
    let receipt = chain.wait_confirmed(&tx_hash).await?;

    info!(
        asset = ?asset,
        to = %to,
        amount = %amount,
        tx_hash = %receipt.tx_hash,
        block = ?receipt.block_number,
        "Transfer confirmed"
    );
    Ok(receipt)
}
