//! Control surface handlers
//!
//! Thin wrappers over the registry, the chain client and the ledger. Input
//! is validated before anything is mutated or sent to the chain.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::state::AppState;
use super::types::{
    ApiJson, ApiResponse, ApiResult, BalanceData, CreateWalletRequest, HealthData, ResetData,
    ResetRequest, TransferData, TreasuryWithdrawRequest, UserWithdrawRequest, WalletData,
    error_codes, ok, reject,
};
use crate::sweeper::{Asset, Credential, SweepError, transfer_and_confirm};

/// `X-Admin-Secret`, lowercase as header names are stored
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// GET /api/v1/health
///
/// 503 while the progress ledger is poisoned: the sweeper is not making
/// progress until the store is writable again.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthData>>) {
    if state.ledger.is_poisoned() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: error_codes::SERVICE_UNAVAILABLE,
                msg: "progress store unavailable".to_string(),
                data: None,
            }),
        );
    }

    let progress = state.ledger.snapshot().await;
    let data = HealthData {
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        accounts: state.registry.len().await,
        settled: progress.settled.len(),
        in_flight: progress.in_flight.len(),
    };
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// POST /api/v1/wallet
///
/// Idempotent: an existing user gets their address back.
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateWalletRequest>,
) -> ApiResult<WalletData> {
    if req.user_id == 0 {
        return Err(reject(SweepError::InvalidRequest(
            "user_id is required".to_string(),
        )));
    }

    let (account, created) = state
        .registry
        .register(req.user_id, state.chain.as_ref())
        .await
        .map_err(reject)?;

    ok(WalletData {
        user_id: account.user_id,
        address: account.address,
        created,
    })
}

/// GET /api/v1/balance/{address}
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<BalanceData> {
    if !state.chain.validate_address(&address) {
        return Err(reject(SweepError::InvalidAddress(address)));
    }

    let token = state
        .chain
        .token_balance(&address)
        .await
        .map_err(|e| reject(e.into()))?;
    let native = state
        .chain
        .native_balance(&address)
        .await
        .map_err(|e| reject(e.into()))?;

    ok(BalanceData {
        address,
        token,
        native,
    })
}

/// POST /api/v1/treasury/withdraw
pub async fn treasury_withdraw(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<TreasuryWithdrawRequest>,
) -> ApiResult<TransferData> {
    let treasury = state.treasury.clone();
    withdraw(
        &state,
        Asset::Token,
        &treasury.address,
        &treasury.key,
        req.to,
        req.amount,
    )
    .await
}

/// POST /api/v1/treasury/withdraw-native
///
/// Also the manual way to send gas to an arbitrary address.
pub async fn treasury_withdraw_native(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<TreasuryWithdrawRequest>,
) -> ApiResult<TransferData> {
    let treasury = state.treasury.clone();
    withdraw(
        &state,
        Asset::Native,
        &treasury.address,
        &treasury.key,
        req.to,
        req.amount,
    )
    .await
}

/// POST /api/v1/user/withdraw
pub async fn user_withdraw(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<UserWithdrawRequest>,
) -> ApiResult<TransferData> {
    let account = state
        .registry
        .get(req.user_id)
        .await
        .ok_or_else(|| reject(SweepError::UnknownAccount(req.user_id)))?;
    withdraw(
        &state,
        Asset::Token,
        &account.address,
        &account.credential,
        req.to,
        req.amount,
    )
    .await
}

/// POST /api/v1/user/withdraw-native
pub async fn user_withdraw_native(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<UserWithdrawRequest>,
) -> ApiResult<TransferData> {
    let account = state
        .registry
        .get(req.user_id)
        .await
        .ok_or_else(|| reject(SweepError::UnknownAccount(req.user_id)))?;
    withdraw(
        &state,
        Asset::Native,
        &account.address,
        &account.credential,
        req.to,
        req.amount,
    )
    .await
}

/// POST /api/v1/admin/reset
///
/// Requires the `X-Admin-Secret` header plus an operator and a reason.
pub async fn admin_reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<ResetRequest>,
) -> ApiResult<ResetData> {
    let presented = headers
        .get(ADMIN_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !state.is_admin(presented) {
        warn!(operator = %req.operator, "Reset rejected: bad admin secret");
        return Err(reject(SweepError::Forbidden));
    }

    let audit = state
        .ledger
        .reset(&req.operator, &req.reason)
        .await
        .map_err(reject)?;
    ok(ResetData::from(audit))
}

/// Validate, check the source balance, transfer and wait for confirmation
async fn withdraw(
    state: &AppState,
    asset: Asset,
    from_address: &str,
    from_key: &Credential,
    to: String,
    amount: Decimal,
) -> ApiResult<TransferData> {
    if amount <= Decimal::ZERO {
        return Err(reject(SweepError::InvalidAmount));
    }
    if !state.chain.validate_address(&to) {
        return Err(reject(SweepError::InvalidAddress(to)));
    }

    let available = match asset {
        Asset::Token => state.chain.token_balance(from_address).await,
        Asset::Native => state.chain.native_balance(from_address).await,
    }
    .map_err(|e| reject(e.into()))?;
    if available < amount {
        return Err(reject(SweepError::InsufficientFunds {
            available: available.to_string(),
            required: amount.to_string(),
        }));
    }

    let receipt = transfer_and_confirm(
        state.chain.as_ref(),
        asset,
        from_key,
        &to,
        amount,
        state.token_gas_limit,
    )
    .await
    .map_err(|e| reject(e.into()))?;

    info!(
        asset = ?asset,
        from = %from_address,
        to = %to,
        amount = %amount,
        tx_hash = %receipt.tx_hash,
        "Manual withdrawal confirmed"
    );

    ok(TransferData {
        tx_hash: receipt.tx_hash,
        block_number: receipt.block_number,
        from: from_address.to_string(),
        to,
        amount,
    })
}
