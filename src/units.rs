//! Presentation helpers for addresses and amounts
//!
//! Amounts stay raw `U256` everywhere else; conversion to Gwei/ETH strings
//! happens only here.

use alloy_primitives::utils::{self, ParseUnits};
use alloy_primitives::{Address, U256};
use std::str::FromStr;

use crate::error::DashboardError;

pub const GWEI_DECIMALS: u8 = 9;
pub const ETHER_DECIMALS: u8 = 18;

/// Display unit for funding amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayUnit {
    Gwei,
    Eth,
}

impl DisplayUnit {
    pub fn decimals(self) -> u8 {
        match self {
            Self::Gwei => GWEI_DECIMALS,
            Self::Eth => ETHER_DECIMALS,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gwei => "Gwei",
            Self::Eth => "ETH",
        }
    }

    pub fn format(self, value: U256) -> String {
        format_units(value, self.decimals())
    }
}

/// Parse a `0x`-prefixed, 40 hex digit address
///
/// Mixed case is accepted without checksum validation.
pub fn parse_address(input: &str) -> Result<Address, DashboardError> {
    let trimmed = input.trim();
    let is_hex_form = trimmed.len() == 42
        && trimmed.starts_with("0x")
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !is_hex_form {
        return Err(DashboardError::InvalidAddress(trimmed.to_string()));
    }
    Address::from_str(trimmed).map_err(|e| DashboardError::InvalidAddress(e.to_string()))
}

/// Lowercase `0x` hex form used on the wire and as a case-insensitive key
pub fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// `0x1234...abcd`
pub fn shorten_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Format a raw integer amount with the given number of decimals
///
/// Trailing zeros of the fraction are trimmed but at least one fractional
/// digit is kept (`1000000000` with 9 decimals renders as `1.0`).
pub fn format_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let formatted = match utils::format_units(value, decimals) {
        Ok(formatted) => formatted,
        Err(e) => {
            log::warn!("Cannot format {} with {} decimals: {}", value, decimals, e);
            return value.to_string();
        }
    };
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                format!("{}.0", whole)
            } else {
                format!("{}.{}", whole, fraction)
            }
        }
        None => format!("{}.0", formatted),
    }
}

/// Parse a decimal string into a raw integer with the given number of decimals
///
/// Only plain unsigned decimals are accepted, and never more fractional
/// digits than `decimals`; excess precision is an error, not truncated.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, DashboardError> {
    let trimmed = input.trim();
    let invalid = || DashboardError::InvalidAmount(trimmed.to_string());

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(DashboardError::InvalidAmount(format!(
            "{} has more than {} decimals",
            trimmed, decimals
        )));
    }

    // `.5` reads as `0.5` and `5.` as `5`
    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };
    match utils::parse_units(&normalized, decimals).map_err(|_| invalid())? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => Err(invalid()),
    }
}

/// Parse a decimal ether amount into wei
pub fn parse_ether(input: &str) -> Result<U256, DashboardError> {
    parse_units(input, ETHER_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::ZERO, ETHER_DECIMALS), "0.0");
        assert_eq!(
            format_units(U256::from(1_500_000_000_000_000_000u128), ETHER_DECIMALS),
            "1.5"
        );
        assert_eq!(format_units(U256::from(1u64), GWEI_DECIMALS), "0.000000001");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
    }

    #[test]
    fn test_format_keeps_full_precision() {
        // 2^200 wei does not fit any float without loss
        let big = U256::from(1u64) << 200usize;
        let formatted = format_units(big, ETHER_DECIMALS);
        assert_eq!(parse_ether(&formatted).unwrap(), big);
    }

    #[test]
    fn test_parse_ether() {
        assert_eq!(
            parse_ether("0.01").unwrap(),
            U256::from(10_000_000_000_000_000u128)
        );
        assert_eq!(parse_ether("2").unwrap(), U256::from(2_000_000_000_000_000_000u128));
        assert_eq!(parse_ether(".5").unwrap(), U256::from(500_000_000_000_000_000u128));
        assert_eq!(parse_ether("3.").unwrap(), U256::from(3_000_000_000_000_000_000u128));
        assert!(parse_ether("").is_err());
        assert!(parse_ether("-1").is_err());
        assert!(parse_ether("1e18").is_err());
        assert!(parse_ether("0.0000000000000000001").is_err());
        assert!(parse_ether("1.2.3").is_err());
        // 2^256 wei does not fit
        assert!(parse_units(&format!("{}0", U256::MAX), 0).is_err());
    }

    #[test]
    fn test_parse_address() {
        let lower = parse_address("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa0001").unwrap();
        let upper = parse_address(" 0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA0001 ").unwrap();
        assert_eq!(lower, upper);
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa000100").is_err());
        assert!(parse_address("0xgggggggggggggggggggggggggggggggggggggggg").is_err());
    }

    #[test]
    fn test_address_hex_and_shorten() {
        let addr = parse_address("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA0001").unwrap();
        assert_eq!(address_hex(&addr), "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa0001");
        let short = shorten_address(&addr);
        assert!(short.starts_with("0x"));
        assert!(short.ends_with("0001"));
        assert_eq!(short.len(), 13);
    }

    #[test]
    fn test_display_unit() {
        let one_gwei = U256::from(1_000_000_000u64);
        assert_eq!(DisplayUnit::Gwei.format(one_gwei), "1.0");
        assert_eq!(DisplayUnit::Eth.format(one_gwei), "0.000000001");
        assert_eq!(DisplayUnit::Gwei.symbol(), "Gwei");
    }
}
