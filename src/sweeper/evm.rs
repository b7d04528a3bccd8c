//! EVM chain client
//!
//! [`ChainClient`] over JSON-RPC using alloy: a read-only provider for
//! balances and receipts, and a per-call signing provider built from the
//! sender's credential for submissions. Gas price, nonce and chain id are
//! filled by the provider; the gas limit of token sweeps is fixed.

use std::str::FromStr;
use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::chain::{ChainClient, Receipt};
use super::config::ChainConfig;
use super::error::ChainError;
use super::types::Credential;
use super::units::{NATIVE_DECIMALS, from_base_units, to_base_units};
use crate::core_types::TxHash;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

pub struct EvmChainClient {
    rpc_url: Url,
    provider: DynProvider,
    token: Address,
    token_decimals: u8,
    confirmation_timeout: Duration,
    receipt_poll_interval: Duration,
}

impl EvmChainClient {
    pub fn new(config: &ChainConfig) -> Result<Self, ChainError> {
        info!(
            rpc = %config.rpc_url,
            token = %config.token_address,
            decimals = config.token_decimals,
            "Initializing EVM chain client"
        );

        let rpc_url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| ChainError::Network(format!("Invalid RPC URL {}: {}", config.rpc_url, e)))?;
        let token = parse_address(&config.token_address)?;
        let provider = ProviderBuilder::new()
            .connect_http(rpc_url.clone())
            .erased();

        Ok(Self {
            rpc_url,
            provider,
            token,
            token_decimals: config.token_decimals,
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_secs),
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
        })
    }

    fn signing_provider(&self, from: &Credential) -> Result<DynProvider, ChainError> {
        let signer = parse_signer(from)?;
        Ok(ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone())
            .erased())
    }
}

fn parse_address(address: &str) -> Result<Address, ChainError> {
    if !address.starts_with("0x") || address.len() != 42 {
        return Err(ChainError::InvalidAddress(address.to_string()));
    }
    Address::from_str(address).map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

fn parse_signer(credential: &Credential) -> Result<PrivateKeySigner, ChainError> {
    credential
        .expose()
        .parse::<PrivateKeySigner>()
        .map_err(|_| ChainError::InvalidKey)
}

fn rpc_error(context: &str, e: impl std::fmt::Display) -> ChainError {
    ChainError::Network(format!("{}: {}", context, e))
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn validate_address(&self, address: &str) -> bool {
        parse_address(address).is_ok()
    }

    fn generate_keypair(&self) -> (String, Credential) {
        let signer = PrivateKeySigner::random();
        let address = signer.address().to_checksum(None);
        let secret = alloy::hex::encode_prefixed(signer.to_bytes());
        (address, Credential::new(secret))
    }

    fn address_of(&self, credential: &Credential) -> Result<String, ChainError> {
        Ok(parse_signer(credential)?.address().to_checksum(None))
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        let owner = parse_address(address)?;
        let raw = self
            .provider
            .get_balance(owner)
            .await
            .map_err(|e| rpc_error("eth_getBalance failed", e))?;
        from_base_units(raw, NATIVE_DECIMALS)
    }

    async fn token_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        let owner = parse_address(address)?;
        let token = IERC20::new(self.token, self.provider.clone());
        let raw = token
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| rpc_error("balanceOf failed", e))?;
        from_base_units(raw, self.token_decimals)
    }

    async fn submit_native_transfer(
        &self,
        from: &Credential,
        to: &str,
        amount: Decimal,
    ) -> Result<TxHash, ChainError> {
        let to = parse_address(to)?;
        let value = to_base_units(amount, NATIVE_DECIMALS)?;
        let provider = self.signing_provider(from)?;

        let tx = TransactionRequest::default().with_to(to).with_value(value);
        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| rpc_error("native transfer rejected", e))?;

        let tx_hash = format!("{:?}", pending.tx_hash());
        debug!(to = %to, amount = %amount, tx_hash = %tx_hash, "Native transfer submitted");
        Ok(tx_hash)
    }

    async fn submit_token_transfer(
        &self,
        from: &Credential,
        to: &str,
        amount: Decimal,
        gas_limit: u64,
    ) -> Result<TxHash, ChainError> {
        let to = parse_address(to)?;
        let value = to_base_units(amount, self.token_decimals)?;
        let provider = self.signing_provider(from)?;

        let token = IERC20::new(self.token, provider);
        let pending = token
            .transfer(to, value)
            .gas(gas_limit)
            .send()
            .await
            .map_err(|e| rpc_error("token transfer rejected", e))?;

        let tx_hash = format!("{:?}", pending.tx_hash());
        debug!(to = %to, amount = %amount, tx_hash = %tx_hash, "Token transfer submitted");
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
        let hash = B256::from_str(tx_hash)
            .map_err(|_| ChainError::Network(format!("Malformed tx hash {}", tx_hash)))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| rpc_error("eth_getTransactionReceipt failed", e))?;

        Ok(receipt.map(|r| Receipt {
            tx_hash: tx_hash.to_string(),
            block_number: r.block_number,
            success: r.status(),
        }))
    }

    async fn wait_confirmed(&self, tx_hash: &str) -> Result<Receipt, ChainError> {
        let deadline = Instant::now() + self.confirmation_timeout;

        loop {
            match self.receipt(tx_hash).await {
                Ok(Some(receipt)) if !receipt.success => {
                    return Err(ChainError::Reverted(tx_hash.to_string()));
                }
                Ok(Some(receipt)) if receipt.block_number.is_some() => return Ok(receipt),
                Ok(_) => {}
                // A flaky node must not abandon a transaction that may land
                Err(e) => warn!(tx_hash = %tx_hash, error = %e, "Receipt poll failed"),
            }

            if Instant::now() >= deadline {
                return Err(ChainError::Timeout(tx_hash.to_string()));
            }
            sleep(self.receipt_poll_interval).await;
        }
    }
}
