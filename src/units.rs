//! Conversions between user-typed decimal amounts and integer base units.
//!
//! All base-unit arithmetic is done on [`U256`]; binary floating point never
//! touches an amount. Excess fractional precision is truncated, never rounded,
//! so a conversion can only ever spend less than what the user typed.

use alloy_primitives::U256;
use rust_decimal::Decimal;

use crate::error::{BridgeError, Result};

/// Largest exponent for which `10^decimals` fits in a `U256`.
pub const MAX_DECIMALS: u8 = 77;

/// Mantissa ceiling of [`Decimal`] (96 bits).
const DECIMAL_MAX_MANTISSA: u128 = (1u128 << 96) - 1;

const DECIMAL_MAX_SCALE: u32 = 28;

/// Returns `10^exp` as a `U256`.
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Converts a non-negative decimal numeral into base units.
///
/// Fractional digits beyond `decimals` are truncated.
///
/// ```rust
/// use alloy_primitives::U256;
/// use xchain_bridge::units::to_base_units;
///
/// let wei = to_base_units("1.5", 18).unwrap();
/// assert_eq!(wei, U256::from(1_500_000_000_000_000_000u128));
/// ```
pub fn to_base_units(input: &str, decimals: u8) -> Result<U256> {
    if decimals > MAX_DECIMALS {
        return Err(BridgeError::invalid_amount(
            input,
            format!("token precision of {decimals} decimals is not supported"),
        ));
    }

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::invalid_amount(input, "amount is empty"));
    }
    if trimmed.starts_with('-') {
        return Err(BridgeError::invalid_amount(input, "amount is negative"));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(BridgeError::invalid_amount(input, "amount has no digits"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(BridgeError::invalid_amount(
            input,
            "amount is not a decimal numeral",
        ));
    }

    let decimals = decimals as usize;
    let kept = &fraction[..fraction.len().min(decimals)];

    let mut digits = String::with_capacity(whole.len() + decimals);
    digits.push_str(whole);
    digits.push_str(kept);
    digits.extend(std::iter::repeat_n('0', decimals - kept.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10)
        .map_err(|_| BridgeError::invalid_amount(input, "amount does not fit in 256 bits"))
}

/// Parses an integer amount as returned by the aggregator.
///
/// Accepts plain decimal digits as well as `0x`-prefixed hex.
pub fn parse_base_units(input: &str) -> Result<U256> {
    let trimmed = input.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) if hex.is_empty() => Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|e| BridgeError::invalid_amount(input, e.to_string()))
}

/// Renders base units as a decimal string with trailing zeros removed.
///
/// Used for display only; never feed the result back into a transaction.
pub fn from_base_units(amount: U256, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Renders base units with exactly `display_decimals` fractional digits.
///
/// Extra precision is truncated.
pub fn format_display(amount: U256, decimals: u8, display_decimals: usize) -> String {
    let full = from_base_units(amount, decimals);
    let (whole, fraction) = full.split_once('.').unwrap_or((full.as_str(), ""));
    if display_decimals == 0 {
        return whole.to_string();
    }

    let mut shown: String = fraction.chars().take(display_decimals).collect();
    shown.extend(std::iter::repeat_n('0', display_decimals - shown.len()));
    format!("{whole}.{shown}")
}

/// Divides two base-unit quantities into a [`Decimal`] with up to `scale`
/// fractional digits, truncating.
///
/// A zero denominator yields zero. The scale is reduced until the quotient fits
/// the 96-bit mantissa of [`Decimal`].
pub fn ratio_to_decimal(numerator: U256, denominator: U256, scale: u32) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }

    let mut scale = scale.min(DECIMAL_MAX_SCALE);
    loop {
        let factor = U256::from(10u64).pow(U256::from(scale));
        if let Some(scaled) = numerator.checked_mul(factor) {
            let quotient = scaled / denominator;
            if quotient <= U256::from(DECIMAL_MAX_MANTISSA) {
                let mantissa: u128 = quotient.to();
                return Decimal::from_i128_with_scale(mantissa as i128, scale);
            }
        }
        if scale == 0 {
            return Decimal::MAX;
        }
        scale -= 1;
    }
}

/// Converts base units into a token-denominated [`Decimal`].
pub fn to_decimal(amount: U256, decimals: u8) -> Decimal {
    ratio_to_decimal(amount, pow10(decimals), decimals as u32)
}
