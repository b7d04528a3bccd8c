use serde::{Deserialize, Serialize};
use std::fs;

use crate::sweeper::{SweepError, SweeperConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub http: HttpConfig,
    /// Env var holding the `X-Admin-Secret` value; admin routes are
    /// disabled when it is unset
    #[serde(default = "default_admin_secret_env")]
    pub admin_secret_env: String,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

fn default_admin_secret_env() -> String {
    "SWEEPER_ADMIN_SECRET".to_string()
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, SweepError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(config_path: &str) -> Result<Self, SweepError> {
        let content = fs::read_to_string(config_path).map_err(|e| {
            SweepError::Config(format!("Failed to read config file {}: {}", config_path, e))
        })?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .map_err(|e| SweepError::Config(format!("Failed to parse {}: {}", config_path, e)))?;
        config.sweeper.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_config_loads() {
        let config = AppConfig::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.yaml"))
            .unwrap();
        assert_eq!(config.sweeper.service.poll_interval_ms, 30_000);
        assert_eq!(config.sweeper.chain.sweep_gas_limit, 100_000);
        assert!(config.http.enabled);
        assert!(config.sweeper.settlement.in_flight_stale_secs > 120);
        assert_ne!(
            config.sweeper.treasury.address,
            "0x0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AppConfig::from_file("config/does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, SweepError::Config(_)));
    }
}
