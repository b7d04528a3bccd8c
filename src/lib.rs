//! Deposit Sweeper - custodial deposit sweeping service
//!
//! Every user owns a deposit address. A background worker watches those
//! addresses, moves each incoming token deposit into the treasury and
//! reports it to accounting exactly once.
//!
//! # Modules
//!
//! - [`core_types`] - Shared identifiers (UserId, TxId, Timestamp)
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup
//! - [`sweeper`] - Registry, indexer, chain, gas, settlement, ledger, worker
//! - [`http`] - Operator control surface

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod http;
pub mod logging;
pub mod sweeper;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use core_types::{Timestamp, TxHash, TxId, UserId};
pub use sweeper::{
    AccountPipeline, AccountRegistry, ChainClient, EtherscanIndexer, EvmChainClient,
    FileProgressStore, GasProvisioner, ProgressLedger, SettlementExecutor, SweepError,
    SweepWorker, SweeperConfig, WebhookNotifier,
};
