// src/chain/units.rs

use std::str::FromStr;

use ethers_core::types::{Address, U256};
use ethers_core::utils::to_checksum;

use crate::error::{ChainError, Result};

/// Standard ETH denominations plus arbitrary ERC-20 decimal counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Wei,
    Gwei,
    Ether,
    Custom(u32),
}

impl Unit {
    pub fn parse(name: &str) -> Result<Unit> {
        match name {
            "wei" => Ok(Unit::Wei),
            "gwei" => Ok(Unit::Gwei),
            "ether" => Ok(Unit::Ether),
            other => Err(ChainError::validation(format!("Unknown unit: {other}"))),
        }
    }

    pub fn decimals(&self) -> u32 {
        match self {
            Unit::Wei => 0,
            Unit::Gwei => 9,
            Unit::Ether => 18,
            Unit::Custom(d) => *d,
        }
    }
}

pub fn is_valid_address(s: &str) -> bool {
    let hex_part = match s.strip_prefix("0x") {
        Some(h) => h,
        None => return false,
    };
    hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_valid_tx_hash(s: &str) -> bool {
    let hex_part = match s.strip_prefix("0x") {
        Some(h) => h,
        None => return false,
    };
    hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse and validate an address, with the standard error message.
pub fn parse_address(s: &str) -> Result<Address> {
    if !is_valid_address(s) {
        return Err(ChainError::validation(format!("Invalid address: {s}")));
    }
    Address::from_str(s).map_err(|_| ChainError::validation(format!("Invalid address: {s}")))
}

/// EIP-55 mixed-case checksum form of an address.
pub fn checksum(s: &str) -> Result<String> {
    let addr = parse_address(s)?;
    Ok(to_checksum(&addr, None))
}

pub fn checksum_addr(addr: &Address) -> String {
    to_checksum(addr, None)
}

/// Parse a decimal string into base units, exactly. `"0.5"` at 18
/// decimals is `500000000000000000`; more fractional digits than the
/// unit carries is an error rather than a silent truncation.
pub fn parse_units(value: &str, decimals: u32) -> Result<U256> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') {
        return Err(ChainError::validation(format!("Invalid amount: {value}")));
    }

    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, f),
        None => (value, ""),
    };
    if frac_part.len() as u32 > decimals {
        return Err(ChainError::validation(format!(
            "Amount {value} has more than {decimals} decimal places"
        )));
    }
    let int_part = if int_part.is_empty() { "0" } else { int_part };

    let scale = U256::from(10u64).pow(U256::from(decimals));
    let int = U256::from_dec_str(int_part)
        .map_err(|_| ChainError::validation(format!("Invalid amount: {value}")))?;
    let scaled_int = int
        .checked_mul(scale)
        .ok_or_else(|| ChainError::validation(format!("Amount out of range: {value}")))?;

    if frac_part.is_empty() {
        return Ok(scaled_int);
    }
    let frac_scale = U256::from(10u64).pow(U256::from(decimals - frac_part.len() as u32));
    let frac = U256::from_dec_str(frac_part)
        .map_err(|_| ChainError::validation(format!("Invalid amount: {value}")))?;
    scaled_int
        .checked_add(frac * frac_scale)
        .ok_or_else(|| ChainError::validation(format!("Amount out of range: {value}")))
}

/// Format base units as a decimal string, exactly. Trailing zeros in the
/// fraction are trimmed but one digit is always kept, so one ether is
/// `"1.0"` and zero-decimal units stay plain integers.
pub fn format_units(value: U256, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let int = value / scale;
    let frac = value % scale;

    let mut frac_str = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    while frac_str.len() > 1 && frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{int}.{frac_str}")
}

/// Convert between denominations with exact integer arithmetic.
pub fn convert(value: &str, from: Unit, to: Unit) -> Result<String> {
    let base = parse_units(value, from.decimals())?;
    Ok(format_units(base, to.decimals()))
}

pub fn wei_to_ether(wei: U256) -> String {
    format_units(wei, 18)
}

pub fn ether_to_wei(ether: &str) -> Result<U256> {
    parse_units(ether, 18)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";

    #[test]
    fn address_validation() {
        assert!(is_valid_address(ADDR));
        assert!(is_valid_address(&ADDR.to_uppercase().replace("0X", "0x")));
        assert!(!is_valid_address("0x1234"));
        assert!(!is_valid_address("833589fcd6edb6e08f4c7c32d4f71b54bda02913"));
        assert!(!is_valid_address("0x833589fcd6edb6e08f4c7c32d4f71b54bda0291g"));
    }

    #[test]
    fn checksum_is_idempotent_and_valid() {
        let once = checksum(ADDR).unwrap();
        let twice = checksum(&once).unwrap();
        assert_eq!(once, twice);
        assert!(is_valid_address(&once));
        assert_eq!(once, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
    }

    #[test]
    fn checksum_rejects_invalid() {
        assert!(checksum("0x123").is_err());
    }

    #[test]
    fn tx_hash_validation() {
        let good = format!("0x{}", "a".repeat(64));
        assert!(is_valid_tx_hash(&good));
        assert!(!is_valid_tx_hash("0x123"));
        assert!(!is_valid_tx_hash(&"a".repeat(66)));
    }

    #[test]
    fn wei_to_ether_vector() {
        assert_eq!(
            convert("1000000000000000000", Unit::Wei, Unit::Ether).unwrap(),
            "1.0"
        );
        assert_eq!(
            convert("0.5", Unit::Ether, Unit::Wei).unwrap(),
            "500000000000000000"
        );
        assert_eq!(convert("1", Unit::Gwei, Unit::Wei).unwrap(), "1000000000");
    }

    #[test]
    fn round_trip_is_exact() {
        for wei in ["0", "1", "999999999999999999", "123456789123456789123456789"] {
            let ether = convert(wei, Unit::Wei, Unit::Ether).unwrap();
            let back = convert(&ether, Unit::Ether, Unit::Wei).unwrap();
            assert_eq!(back, wei, "round trip failed for {wei}");
        }
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(convert("0.1234567891", Unit::Gwei, Unit::Wei).is_err());
        assert!(parse_units("-1", 18).is_err());
    }

    #[test]
    fn custom_decimals() {
        // USDC-style 6 decimals
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(parse_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
    }
}
