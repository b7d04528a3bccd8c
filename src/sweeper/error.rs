//! Sweeper error types
//!
//! Three layers, mirroring the collaborators:
//! - [`ChainError`]: anything the chain client reports
//! - [`StoreError`]: durable progress / registry I/O
//! - [`SweepError`]: what pipeline stages and the control surface return
//!
//! Every [`SweepError`] classifies itself with [`ErrorKind`], which decides
//! whether the orchestrator retries next cycle, rejects, or halts.

use std::path::PathBuf;

use thiserror::Error;

use crate::core_types::{TxHash, TxId, UserId};

#[derive(Debug, Error, Clone)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Network(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid signing key")]
    InvalidKey,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Transaction {0} reverted")]
    Reverted(TxHash),

    #[error("Timed out waiting for confirmation of {0}")]
    Timeout(TxHash),
}

impl ChainError {
    /// Rejected before anything was sent to the chain
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChainError::InvalidAddress(_) | ChainError::InvalidKey | ChainError::InvalidAmount(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Progress ledger is poisoned by an earlier failed commit")]
    Poisoned,
}

/// How the pipeline reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Logged, no state change, retried on the next cycle
    Transient,
    /// Rejected at the boundary, surfaced to the caller
    Validation,
    /// Must be impossible; the event is skipped loudly and never retried blindly
    InvariantViolation,
    /// Progress could not be written; the cycle stops
    Persistence,
    /// Startup configuration problem
    Config,
}

#[derive(Debug, Error)]
pub enum SweepError {
    // === Transient external ===
    #[error("Indexer request failed: {0}")]
    Indexer(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Gas top-up for {address} failed: {reason}")]
    GasTopUp { address: String, reason: String },

    #[error("Notification failed: {0}")]
    Notify(String),

    // === Validation ===
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Unknown account: {0}")]
    UnknownAccount(UserId),

    #[error("Insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: String, required: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Access denied")]
    Forbidden,

    // === Invariant violation ===
    #[error("Deposit {0} is already settled")]
    AlreadySettled(TxId),

    // === Persistence ===
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SweepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SweepError::Indexer(_) | SweepError::GasTopUp { .. } | SweepError::Notify(_) => {
                ErrorKind::Transient
            }
            SweepError::Chain(e) if e.is_validation() => ErrorKind::Validation,
            SweepError::Chain(_) => ErrorKind::Transient,
            SweepError::InvalidAddress(_)
            | SweepError::InvalidAmount
            | SweepError::UnknownAccount(_)
            | SweepError::InsufficientFunds { .. }
            | SweepError::InvalidRequest(_)
            | SweepError::Forbidden => ErrorKind::Validation,
            SweepError::AlreadySettled(_) => ErrorKind::InvariantViolation,
            SweepError::Persistence(_) => ErrorKind::Persistence,
            SweepError::Config(_) => ErrorKind::Config,
        }
    }

    /// Stable machine-readable reason for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SweepError::Indexer(_) => "INDEXER_UNAVAILABLE",
            SweepError::Chain(ChainError::InvalidAddress(_)) => "INVALID_ADDRESS",
            SweepError::Chain(ChainError::InvalidKey) => "INVALID_KEY",
            SweepError::Chain(ChainError::InvalidAmount(_)) => "INVALID_AMOUNT",
            SweepError::Chain(ChainError::Reverted(_)) => "TX_REVERTED",
            SweepError::Chain(ChainError::Timeout(_)) => "TX_TIMEOUT",
            SweepError::Chain(ChainError::Network(_)) => "CHAIN_UNAVAILABLE",
            SweepError::GasTopUp { .. } => "GAS_TOP_UP_FAILED",
            SweepError::Notify(_) => "NOTIFY_FAILED",
            SweepError::InvalidAddress(_) => "INVALID_ADDRESS",
            SweepError::InvalidAmount => "INVALID_AMOUNT",
            SweepError::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            SweepError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            SweepError::InvalidRequest(_) => "INVALID_REQUEST",
            SweepError::Forbidden => "FORBIDDEN",
            SweepError::AlreadySettled(_) => "ALREADY_SETTLED",
            SweepError::Persistence(_) => "PERSISTENCE_FAILURE",
            SweepError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => match self {
                SweepError::UnknownAccount(_) => 404,
                SweepError::Forbidden => 403,
                SweepError::InsufficientFunds { .. } => 422,
                _ => 400,
            },
            ErrorKind::InvariantViolation => 409,
            ErrorKind::Transient => 503,
            ErrorKind::Persistence | ErrorKind::Config => 500,
        }
    }
}
