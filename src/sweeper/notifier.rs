//! Accounting webhook
//!
//! Tells the external ledger that a deposit was credited. Best-effort: a
//! failure is reported to the caller, which logs it; settlement stands.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::config::NotifierConfig;
use super::error::SweepError;
use super::types::SettlementRecord;
use crate::core_types::{TxId, UserId};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, record: &SettlementRecord) -> Result<(), SweepError>;
}

/// Webhook body. `tx_hash` is the deposit transaction, the accounting
/// system's idempotency key.
///
/// `amount` is a decimal string: 18-decimal token amounts do not fit an f64.
#[derive(Debug, Serialize, PartialEq)]
pub struct DepositNotice {
    pub user_id: UserId,
    pub amount: Decimal,
    pub tx_hash: TxId,
}

impl From<&SettlementRecord> for DepositNotice {
    fn from(record: &SettlementRecord) -> Self {
        Self {
            user_id: record.user_id,
            amount: record.amount,
            tx_hash: record.tx_id.clone(),
        }
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig, token: String) -> Result<Self, SweepError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SweepError::Config(format!("webhook client: {}", e)))?;

        Ok(Self {
            client,
            url: config.webhook_url.clone(),
            token,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, record: &SettlementRecord) -> Result<(), SweepError> {
        let notice = DepositNotice::from(record);
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.token)
            .json(&notice)
            .send()
            .await
            .map_err(|e| SweepError::Notify(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Delivered but not accepted; the accounting side has to reconcile
            warn!(
                tx_id = %record.tx_id,
                user_id = record.user_id,
                status = status.as_u16(),
                "Webhook answered with non-success status"
            );
            return Ok(());
        }

        info!(tx_id = %record.tx_id, user_id = record.user_id, "Deposit notified");
        Ok(())
    }
}
