//! Base-unit conversion
//!
//! Chain amounts are integers scaled by `10^decimals`; everything above the
//! chain client works in [`Decimal`] whole units. All conversions go
//! through here and never truncate silently.

use std::str::FromStr;

use alloy::primitives::U256;
use alloy::primitives::utils::{format_units, parse_units};
use rust_decimal::Decimal;

use super::error::ChainError;

/// Native currency decimals on EVM chains
pub const NATIVE_DECIMALS: u8 = 18;

/// Whole units → base units. Fails on negatives or excess precision.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256, ChainError> {
    if amount.is_sign_negative() {
        return Err(ChainError::InvalidAmount(amount.to_string()));
    }
    let amount = amount.normalize();
    if amount.scale() > u32::from(decimals) {
        return Err(ChainError::InvalidAmount(format!(
            "{} has more than {} decimals",
            amount, decimals
        )));
    }
    let text = amount.to_string();
    let parsed = parse_units(&text, decimals)
        .map_err(|e| ChainError::InvalidAmount(format!("{}: {}", text, e)))?;
    Ok(parsed.get_absolute())
}

/// Base units → whole units
pub fn from_base_units(raw: U256, decimals: u8) -> Result<Decimal, ChainError> {
    let text = format_units(raw, decimals)
        .map_err(|e| ChainError::InvalidAmount(format!("{}: {}", raw, e)))?;
    Decimal::from_str(&text)
        .map(|d| d.normalize())
        .map_err(|e| ChainError::InvalidAmount(format!("{}: {}", text, e)))
}

/// Decimal string of base units (as indexers report them) → whole units
pub fn parse_base_units(raw: &str, decimals: u8) -> Result<Decimal, ChainError> {
    let value = U256::from_str_radix(raw.trim(), 10)
        .map_err(|e| ChainError::InvalidAmount(format!("{}: {}", raw, e)))?;
    from_base_units(value, decimals)
}
