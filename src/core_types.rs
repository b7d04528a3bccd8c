//! Core types used throughout the system
//!
//! Fundamental type aliases shared by the registry, the progress store and
//! the settlement pipeline.

/// User ID - globally unique, immutable after assignment.
///
/// # Usage:
/// - Primary key for registered accounts
/// - Key of the per-account low-water mark
pub type UserId = u64;

/// External transaction identifier as reported by the indexer (deposit tx hash)
pub type TxId = String;

/// Hash of a transaction this service submitted (sweep, top-up, withdrawal)
pub type TxHash = String;

/// Unix timestamp in seconds, as reported by the indexer
pub type Timestamp = u64;
