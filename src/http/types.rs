//! Control surface request/response types
//!
//! Every response is `{code, msg, data}`; `code == 0` is success.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_types::{TxHash, UserId};
use crate::sweeper::{ResetAudit, SweepError};

// ============================================================================
// Unified API Response Format
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 0 for success, see [`error_codes`] otherwise
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

pub type ApiRejection = (StatusCode, Json<ApiResponse<()>>);
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiRejection>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// JSON body extractor whose rejection uses the `{code, msg}` envelope
/// instead of axum's plain-text body
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(reject(SweepError::InvalidRequest(rejection.body_text()))),
        }
    }
}

/// Map a sweeper error onto an HTTP status and API code
///
/// `msg` starts with the stable reason (`INVALID_ADDRESS: ...`) so clients
/// can match on it without parsing the free text.
pub fn reject(e: SweepError) -> ApiRejection {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = match &e {
        SweepError::InvalidRequest(_) => error_codes::INVALID_PARAMETER,
        SweepError::InsufficientFunds { .. } => error_codes::INSUFFICIENT_BALANCE,
        SweepError::InvalidAddress(_) => error_codes::INVALID_ADDRESS,
        SweepError::InvalidAmount => error_codes::INVALID_AMOUNT,
        SweepError::Forbidden => error_codes::AUTH_FAILED,
        SweepError::UnknownAccount(_) => error_codes::ACCOUNT_NOT_FOUND,
        SweepError::AlreadySettled(_) => error_codes::CONFLICT,
        SweepError::Chain(c) if c.is_validation() => error_codes::INVALID_PARAMETER,
        _ if status == StatusCode::SERVICE_UNAVAILABLE => error_codes::SERVICE_UNAVAILABLE,
        _ => error_codes::INTERNAL_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(code = e.code(), error = %e, "Request failed");
    } else {
        tracing::warn!(code = e.code(), error = %e, "Request rejected");
    }

    (
        status,
        Json(ApiResponse::<()>::error(code, format!("{}: {}", e.code(), e))),
    )
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    #[serde(alias = "id")]
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct TreasuryWithdrawRequest {
    pub to: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UserWithdrawRequest {
    pub user_id: UserId,
    pub to: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub operator: String,
    pub reason: String,
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct WalletData {
    pub user_id: UserId,
    pub address: String,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct BalanceData {
    pub address: String,
    pub token: Decimal,
    pub native: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TransferData {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ResetData {
    pub audit_id: Uuid,
    pub at: DateTime<Utc>,
    pub settled_cleared: usize,
    pub marks_cleared: usize,
}

impl From<ResetAudit> for ResetData {
    fn from(audit: ResetAudit) -> Self {
        Self {
            audit_id: audit.id,
            at: audit.at,
            settled_cleared: audit.settled_cleared,
            marks_cleared: audit.marks_cleared,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub timestamp_ms: i64,
    pub accounts: usize,
    pub settled: usize,
    pub in_flight: usize,
}

// ============================================================================
// Error Codes
// ============================================================================

pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const INVALID_ADDRESS: i32 = 1003;
    pub const INVALID_AMOUNT: i32 = 1004;

    // Auth errors (2xxx)
    pub const AUTH_FAILED: i32 = 2002;

    // Resource errors (4xxx)
    pub const ACCOUNT_NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4009;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}
