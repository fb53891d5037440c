//! Integer-exact conversion between human decimal strings and token base
//! units, plus the hex-quantity encoding used on the JSON-RPC wire.

use alloy_primitives::U256;

use crate::error::EthError;

fn ten_pow(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Parses a decimal string such as `"1.5"` into base units of a token with
/// `decimals` decimals (`1500000000000000000` for 18).
///
/// Parsing is fixed-point: no floating point is involved, and inputs with
/// more fractional digits than the token supports are rejected rather than
/// rounded.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, EthError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(EthError::InvalidAmount("amount is empty".into()));
    }
    if s.starts_with('-') {
        return Err(EthError::InvalidAmount(format!(
            "amount must not be negative: {s}"
        )));
    }

    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(EthError::InvalidAmount(format!("not a number: {s}")));
    }
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(EthError::InvalidAmount(format!("not a number: {s}")));
    }
    if frac_part.len() > decimals as usize {
        return Err(EthError::InvalidAmount(format!(
            "{s} has more than {decimals} decimal places"
        )));
    }

    let digits = format!(
        "{int_part}{frac_part:0<width$}",
        width = decimals as usize
    );
    U256::from_str_radix(&digits, 10)
        .map_err(|e| EthError::InvalidAmount(format!("{s} is out of range: {e}")))
}

/// Renders base units as a decimal string, trimming trailing zeros
/// (`1500000000000000000` with 18 decimals becomes `"1.5"`).
pub fn format_units(value: U256, decimals: u8) -> String {
    let base = ten_pow(decimals);
    let int_part = value / base;
    let frac_part = value % base;
    if frac_part.is_zero() {
        return int_part.to_string();
    }

    let frac = format!("{:0>width$}", frac_part.to_string(), width = decimals as usize);
    format!("{int_part}.{}", frac.trim_end_matches('0'))
}

/// Renders base units with exactly `places` fractional digits, rounding half
/// up (`1500000000000000000` with 18 decimals and 6 places is `"1.500000"`).
pub fn format_fixed(value: U256, decimals: u8, places: u8) -> String {
    let scaled = if places < decimals {
        let step = ten_pow(decimals - places);
        value.saturating_add(step / U256::from(2u64)) / step
    } else {
        value.saturating_mul(ten_pow(places - decimals))
    };

    if places == 0 {
        return scaled.to_string();
    }
    let base = ten_pow(places);
    let frac = format!(
        "{:0>width$}",
        (scaled % base).to_string(),
        width = places as usize
    );
    format!("{}.{frac}", scaled / base)
}

/// Number of fractional digits shown for a token with `decimals` decimals:
/// six for 18-decimal assets, two for 6-decimal stablecoins.
pub fn display_places(decimals: u8) -> u8 {
    if decimals <= 6 {
        2
    } else {
        6
    }
}

/// Formats base units for display using [`display_places`].
pub fn format_display(value: U256, decimals: u8) -> String {
    format_fixed(value, decimals, display_places(decimals))
}

/// Parses an integer given either as a `0x` hex quantity or a plain decimal
/// integer. Signs and fractional parts are rejected.
pub fn parse_quantity(input: &str) -> Result<U256, EthError> {
    let s = input.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex_digits) if !hex_digits.is_empty() => U256::from_str_radix(hex_digits, 16),
        Some(_) => {
            return Err(EthError::InvalidAmount(format!(
                "empty hex quantity: {s}"
            )))
        }
        None if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            U256::from_str_radix(s, 10)
        }
        None => {
            return Err(EthError::InvalidAmount(format!(
                "not a non-negative integer: {s}"
            )))
        }
    };
    parsed.map_err(|e| EthError::InvalidAmount(format!("{s}: {e}")))
}
