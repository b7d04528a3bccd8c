//! History Fetcher
//!
//! Recent incoming token transfers per address, from an Etherscan v2
//! compatible indexer (`module=account&action=tokentx`). One bounded page,
//! newest first. Rows that cannot be parsed are dropped with a warning; the
//! indexer is not trusted to be well-formed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::chain::is_hex_address;
use super::config::IndexerConfig;
use super::error::SweepError;
use super::types::CandidateEvent;
use super::units::parse_base_units;

#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// Most recent incoming transfers to `address`, newest first
    async fn fetch(&self, address: &str) -> Result<Vec<CandidateEvent>, SweepError>;
}

/// Etherscan `tokentx` envelope
///
/// `result` is the transfer list on success and an error text otherwise
/// ("No transactions found", rate-limit messages).
#[derive(Debug, Deserialize)]
pub struct TokenTxResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub result: TokenTxResult,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TokenTxResult {
    Transfers(Vec<TokenTransfer>),
    Message(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub hash: String,
    #[serde(default)]
    pub to: String,
    pub value: String,
    pub time_stamp: String,
    #[serde(default)]
    pub token_decimal: Option<String>,
}

pub struct EtherscanIndexer {
    client: reqwest::Client,
    base_url: String,
    chain_id: u64,
    token_address: String,
    token_decimals: u8,
    api_key: String,
    page_size: u32,
}

impl EtherscanIndexer {
    pub fn new(
        config: &IndexerConfig,
        token_address: &str,
        token_decimals: u8,
        api_key: String,
    ) -> Result<Self, SweepError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SweepError::Config(format!("indexer client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            chain_id: config.chain_id,
            token_address: token_address.to_string(),
            token_decimals,
            api_key,
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl HistoryFetcher for EtherscanIndexer {
    async fn fetch(&self, address: &str) -> Result<Vec<CandidateEvent>, SweepError> {
        if !is_hex_address(address) {
            return Err(SweepError::InvalidAddress(address.to_string()));
        }

        let chain_id = self.chain_id.to_string();
        let page_size = self.page_size.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("chainid", chain_id.as_str()),
                ("module", "account"),
                ("action", "tokentx"),
                ("contractaddress", self.token_address.as_str()),
                ("address", address),
                ("page", "1"),
                ("offset", page_size.as_str()),
                ("sort", "desc"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SweepError::Indexer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SweepError::Indexer(format!(
                "HTTP {} for {}",
                response.status(),
                address
            )));
        }

        let body: TokenTxResponse = response
            .json()
            .await
            .map_err(|e| SweepError::Indexer(format!("malformed response: {}", e)))?;

        Ok(parse_transfers(body, self.token_decimals))
    }
}

/// Convert an indexer envelope into candidate events
pub fn parse_transfers(body: TokenTxResponse, default_decimals: u8) -> Vec<CandidateEvent> {
    let transfers = match body.result {
        TokenTxResult::Transfers(list) if body.status == "1" => list,
        TokenTxResult::Transfers(_) => Vec::new(),
        TokenTxResult::Message(text) => {
            debug!(status = %body.status, message = %body.message, result = %text, "Indexer returned no transfers");
            return Vec::new();
        }
    };

    transfers
        .into_iter()
        .filter_map(|t| match to_event(&t, default_decimals) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(hash = %t.hash, error = %e, "Skipping malformed indexer row");
                None
            }
        })
        .collect()
}

fn to_event(t: &TokenTransfer, default_decimals: u8) -> Result<CandidateEvent, SweepError> {
    let decimals = match t.token_decimal.as_deref() {
        Some(d) if !d.trim().is_empty() => d
            .trim()
            .parse::<u8>()
            .map_err(|_| SweepError::Indexer(format!("bad tokenDecimal {}", d)))?,
        _ => default_decimals,
    };
    let amount = parse_base_units(&t.value, decimals)?;
    let observed_at = t
        .time_stamp
        .trim()
        .parse::<u64>()
        .map_err(|_| SweepError::Indexer(format!("bad timeStamp {}", t.time_stamp)))?;

    if t.hash.is_empty() {
        return Err(SweepError::Indexer("missing hash".to_string()));
    }

    Ok(CandidateEvent {
        tx_id: t.hash.clone(),
        recipient: t.to.clone(),
        amount,
        observed_at,
    })
}
