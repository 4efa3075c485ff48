//! Native-unit amounts. Balances are held in wei (10^-18 of the native unit).

use crate::error::CertError;

pub const WEI_PER_UNIT: u128 = 1_000_000_000_000_000_000;
const DECIMALS: usize = 18;

/// Renders wei as a decimal native-unit amount without trailing zeros.
pub fn format_units(wei: u128) -> String {
    let whole = wei / WEI_PER_UNIT;
    let frac = wei % WEI_PER_UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = DECIMALS);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Parses a decimal native-unit amount ("1.5", "0.01") into wei.
pub fn parse_units(amount: &str) -> Result<u128, CertError> {
    let invalid = || CertError::Config(format!("Invalid amount: {:?}", amount));
    let amount = amount.trim();
    let (whole, frac) = amount.split_once('.').unwrap_or((amount, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.len() > DECIMALS {
        return Err(invalid());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac_wei: u128 = if frac.is_empty() {
        0
    } else {
        format!("{:0<width$}", frac, width = DECIMALS).parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(WEI_PER_UNIT)
        .and_then(|w| w.checked_add(frac_wei))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(format_units(0), "0");
        assert_eq!(format_units(WEI_PER_UNIT), "1");
        assert_eq!(format_units(10_000_000_000_000_000), "0.01");
        assert_eq!(format_units(1_500_000_000_000_000_000), "1.5");
        assert_eq!(format_units(1), "0.000000000000000001");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_units("0.01").unwrap(), 10_000_000_000_000_000);
        assert_eq!(parse_units("2").unwrap(), 2 * WEI_PER_UNIT);
        assert_eq!(parse_units(".5").unwrap(), WEI_PER_UNIT / 2);
        assert!(parse_units("").is_err());
        assert!(parse_units("1.2.3").is_err());
        assert!(parse_units("-1").is_err());
        assert!(parse_units("0.0000000000000000001").is_err());
    }
}
