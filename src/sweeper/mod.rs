//! Deposit Sweeper
//!
//! Watches per-user deposit addresses, sweeps incoming token transfers to
//! the treasury and reports each one exactly once.
//!
//! ```text
//! SweepWorker (interval, bounded parallel accounts)
//!   └── AccountPipeline (one account, events oldest first)
//!         HistoryFetcher → filter → GasProvisioner
//!           → SettlementExecutor → ProgressLedger → Notifier
//! ```
//!
//! Progress (per-account low-water marks, settled tx ids and the sweep
//! journal) lives behind [`ProgressLedger`], the only writer.

pub mod chain;
pub mod config;
pub mod error;
pub mod evm;
pub mod filter;
pub mod gas;
pub mod indexer;
pub mod ledger;
pub mod notifier;
pub mod pipeline;
pub mod registry;
pub mod settlement;
pub mod store;
pub mod types;
pub mod units;
pub mod worker;

#[cfg(test)]
pub mod mock;


pub use chain::{Asset, ChainClient, Receipt, transfer_and_confirm};
pub use config::SweeperConfig;
pub use error::{ChainError, ErrorKind, StoreError, SweepError};
pub use evm::EvmChainClient;
pub use gas::{GasProvisioner, GasStatus};
pub use indexer::{EtherscanIndexer, HistoryFetcher};
pub use ledger::ProgressLedger;
pub use notifier::{Notifier, WebhookNotifier};
pub use pipeline::{AccountPipeline, AccountReport};
pub use registry::AccountRegistry;
pub use settlement::{SettleOutcome, SettlementExecutor};
pub use store::{FileProgressStore, ProgressStore, ResetAudit};
pub use types::{Account, CandidateEvent, Credential, EventStage, ProgressState, SettlementRecord};
pub use worker::{CycleReport, ShutdownSignal, SweepWorker};
