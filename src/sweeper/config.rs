use rust_decimal::Decimal;
use serde::Deserialize;

use super::chain::is_hex_address;
use super::error::SweepError;

/// Sweeper configuration (the `sweeper:` section of the app config)
#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub chain: ChainConfig,
    pub treasury: TreasuryConfig,
    pub gas: GasConfig,
    pub indexer: IndexerConfig,
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_parallel_accounts")]
    pub max_parallel_accounts: usize,
}

fn default_max_parallel_accounts() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub token_address: String,
    pub token_decimals: u8,
    /// Fixed gas limit of a token sweep
    pub sweep_gas_limit: u64,
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TreasuryConfig {
    /// Destination of every sweep
    pub address: String,
    /// Env var holding the key that funds gas top-ups and treasury withdrawals
    pub key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GasConfig {
    /// Native balance below which a deposit address is topped up
    pub min_native_balance: Decimal,
    pub top_up_amount: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    pub base_url: String,
    pub chain_id: u64,
    pub api_key_env: String,
    /// Most recent transfers fetched per address per cycle
    pub page_size: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    pub webhook_url: String,
    pub token_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementConfig {
    /// A journaled sweep with no receipt after this long is presumed dropped
    pub in_flight_stale_secs: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            in_flight_stale_secs: 600,
        }
    }
}

impl SweeperConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self, SweepError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SweepError::Config(format!("{}: {}", path, e)))?;
        serde_yaml::from_str(&content).map_err(|e| SweepError::Config(e.to_string()))
    }

    /// Reject settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.service.poll_interval_ms == 0 {
            return Err(SweepError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.service.max_parallel_accounts == 0 {
            return Err(SweepError::Config(
                "max_parallel_accounts must be > 0".into(),
            ));
        }
        if self.gas.top_up_amount <= Decimal::ZERO || self.gas.min_native_balance < Decimal::ZERO {
            return Err(SweepError::Config(
                "gas thresholds must be positive".into(),
            ));
        }
        if self.indexer.page_size == 0 {
            return Err(SweepError::Config("indexer.page_size must be > 0".into()));
        }
        if !is_hex_address(&self.chain.token_address) {
            return Err(SweepError::Config(format!(
                "chain.token_address is not a 0x address: {}",
                self.chain.token_address
            )));
        }
        // Every sweep lands here
        if !is_hex_address(&self.treasury.address) || is_zero_address(&self.treasury.address) {
            return Err(SweepError::Config(format!(
                "treasury.address must be a non-zero 0x address: {}",
                self.treasury.address
            )));
        }
        // A journaled sweep may only be presumed dropped once its own
        // confirmation wait has run out
        let timeout = i64::try_from(self.chain.confirmation_timeout_secs).unwrap_or(i64::MAX);
        if self.settlement.in_flight_stale_secs <= timeout {
            return Err(SweepError::Config(format!(
                "settlement.in_flight_stale_secs ({}) must exceed chain.confirmation_timeout_secs ({})",
                self.settlement.in_flight_stale_secs, self.chain.confirmation_timeout_secs
            )));
        }
        Ok(())
    }
}

fn is_zero_address(address: &str) -> bool {
    address[2..].chars().all(|c| c == '0')
}

/// Read a secret from the environment variable named in the config
pub fn secret_from_env(var: &str) -> Result<String, SweepError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(SweepError::Config(format!(
            "environment variable {} is not set",
            var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
service:
  poll_interval_ms: 30000
  max_parallel_accounts: 8
storage:
  data_dir: "./data"
chain:
  rpc_url: "https://bsc.publicnode.com"
  token_address: "0x55d398326f99059fF775485246999027B3197955"
  token_decimals: 18
  sweep_gas_limit: 100000
  confirmation_timeout_secs: 120
  receipt_poll_interval_ms: 1000
treasury:
  address: "0x00000000000000000000000000000000000000c0"
  key_env: "TREASURY_PRIVATE_KEY"
gas:
  min_native_balance: "0.0003"
  top_up_amount: "0.0004"
indexer:
  base_url: "https://api.etherscan.io/v2/api"
  chain_id: 56
  api_key_env: "BSCSCAN_API_KEY"
  page_size: 10
  timeout_secs: 15
notifier:
  webhook_url: "http://localhost/users/deposit"
  token_env: "DEPOSIT_WEBHOOK_TOKEN"
  timeout_secs: 10
"#;

    #[test]
    fn test_sweeper_config_deserialize() {
        let config: SweeperConfig = serde_yaml::from_str(SAMPLE).unwrap();

        assert_eq!(config.service.poll_interval_ms, 30000);
        assert_eq!(config.service.max_parallel_accounts, 8);
        assert_eq!(config.chain.token_decimals, 18);
        assert_eq!(config.gas.min_native_balance, Decimal::new(3, 4));
        assert_eq!(config.gas.top_up_amount, Decimal::new(4, 4));
        assert_eq!(config.indexer.chain_id, 56);
        // Defaulted section
        assert_eq!(config.settlement.in_flight_stale_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_parallelism() {
        let mut config: SweeperConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.service.max_parallel_accounts = 0;
        assert!(matches!(config.validate(), Err(SweepError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_treasury() {
        let mut config: SweeperConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.treasury.address = format!("0x{}", "0".repeat(40));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("treasury.address"));
    }

    #[test]
    fn test_validate_rejects_malformed_treasury() {
        let mut config: SweeperConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.treasury.address = "treasury".to_string();
        assert!(matches!(config.validate(), Err(SweepError::Config(_))));

        config.treasury.address = "0x00000000000000000000000000000000000000c".to_string();
        assert!(matches!(config.validate(), Err(SweepError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_malformed_token_address() {
        let mut config: SweeperConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.chain.token_address = "0xnot-a-token".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chain.token_address"));
    }

    #[test]
    fn test_validate_requires_stale_threshold_beyond_confirmation_timeout() {
        let mut config: SweeperConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.settlement.in_flight_stale_secs = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("in_flight_stale_secs"));

        config.settlement.in_flight_stale_secs = 120;
        assert!(config.validate().is_err());

        config.settlement.in_flight_stale_secs = 121;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_secret() {
        let err = secret_from_env("DEPOSIT_SWEEPER_TEST_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("DEPOSIT_SWEEPER_TEST_UNSET_VAR"));
    }
}
