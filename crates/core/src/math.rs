//! Fixed-point helpers for solvency and liquidity math.
//!
//! Everything that decides whether a transaction is safe stays in `U256`
//! with checked or widened arithmetic. Conversions to `f64` exist for
//! display and for the liquidity analytics only.

use alloy::primitives::utils::format_units;
use alloy::primitives::{U256, U512};

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// 2^96, the scale of `sqrtPriceX96`
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// 2^128, the scale of fee-growth accumulators
pub const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);

/// `10^exp` as U256. Saturates past 10^77.
#[inline]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).saturating_pow(U256::from(exp))
}

fn widen(value: U256) -> U512 {
    let l = value.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

fn narrow(value: U512) -> Option<U256> {
    let l = value.as_limbs();
    if l[4..].iter().any(|limb| *limb != 0) {
        return None;
    }
    Some(U256::from_limbs([l[0], l[1], l[2], l[3]]))
}

/// `a * b / denominator` with a 512-bit intermediate, rounded toward zero.
///
/// `None` when the denominator is zero or the quotient exceeds 256 bits.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    narrow(widen(a) * widen(b) / widen(denominator))
}

/// Apply basis points reduction: `value * (10000 - bps) / 10000`.
///
/// Example: apply_basis_points(1000, 50) = 995
#[inline]
pub fn apply_basis_points(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(BPS_DENOMINATOR.saturating_sub(u64::from(basis_points)));
    // factor <= denominator, so the quotient always fits
    mul_div(value, factor, U256::from(BPS_DENOMINATOR)).unwrap_or(value)
}

/// `value * bps / 10000`, rounded toward zero.
#[inline]
pub fn bps_of(value: U256, basis_points: u16) -> U256 {
    mul_div(value, U256::from(basis_points), U256::from(BPS_DENOMINATOR)).unwrap_or(U256::MAX)
}

/// Lossy U256 → f64. Use for display and analytics only.
pub fn u256_to_f64(value: U256) -> f64 {
    const TWO_64: f64 = 18_446_744_073_709_551_616.0;
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * TWO_64 + *limb as f64)
}

/// Token amount in whole units as f64 (display only).
pub fn to_units_f64(value: U256, decimals: u8) -> f64 {
    u256_to_f64(value) / 10f64.powi(i32::from(decimals))
}

/// Human-readable token amount (`1500000` with 6 decimals → `"1.500000"`).
pub fn format_amount(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}

/// Whole-token decimal string to base units (`"1.5"` with 6 decimals →
/// `1500000`).
///
/// `None` for malformed input, more fractional digits than `decimals`, or
/// a result past `U256::MAX`.
pub fn to_base_units(amount: &str, decimals: u8) -> Option<U256> {
    if decimals > 77 {
        return None;
    }
    let (whole, frac) = amount.trim().split_once('.').unwrap_or((amount.trim(), ""));
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !digits(whole) || !digits(frac) || frac.len() > usize::from(decimals) {
        return None;
    }
    let parse = |part: &str| if part.is_empty() { Some(U256::ZERO) } else { U256::from_str_radix(part, 10).ok() };
    // frac.len() <= decimals, so the shift cannot underflow
    let frac_scale = pow10(decimals - frac.len() as u8);
    parse(whole)?
        .checked_mul(pow10(decimals))?
        .checked_add(parse(frac)?.checked_mul(frac_scale)?)
}

/// Base units to a whole-token decimal string without trailing zeros
/// (`1500000` with 6 decimals → `"1.5"`).
pub fn from_base_units(value: U256, decimals: u8) -> String {
    let formatted = format_amount(value, decimals);
    if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        formatted
    }
}

/// WAD value rendered with two decimals, rounded half up.
pub fn format_wad_2dp(value: U256) -> String {
    let cents_unit = WAD / U256::from(100u64);
    let cents = value.saturating_add(cents_unit / U256::from(2u64)) / cents_unit;
    let whole = cents / U256::from(100u64);
    let frac = cents % U256::from(100u64);
    format!("{}.{:02}", whole, frac.to::<u64>())
}

/// Basis points rendered as a percentage with two decimals (`8500` → `"85.00%"`).
pub fn format_bps_pct(bps: u64) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

/// Serialize a `U256` as a decimal string.
pub mod decimal {
    use alloy::primitives::U256;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }
}

/// Serialize a sequence of `U256` as decimal strings.
pub mod decimal_seq {
    use alloy::primitives::U256;
    use serde::ser::SerializeSeq;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.to_string())?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(Q96, U256::from(1u64) << 96);
        assert_eq!(Q128, U256::from(1u64) << 128);
        assert_eq!(WAD, pow10(18));
    }

    #[test]
    fn test_apply_basis_points() {
        let value = U256::from(1000u64);
        assert_eq!(apply_basis_points(value, 50), U256::from(995u64));
        assert_eq!(apply_basis_points(value, 1000), U256::from(900u64));
        assert_eq!(apply_basis_points(value, 0), value);

        // Near the top of the range the widened product must not wrap
        assert_eq!(apply_basis_points(U256::MAX, 0), U256::MAX);
        assert!(apply_basis_points(U256::MAX, 50) < U256::MAX);
    }

    #[test]
    fn test_bps_of() {
        assert_eq!(bps_of(U256::from(1000u64), 7500), U256::from(750u64));
        // Rounds toward zero
        assert_eq!(bps_of(U256::from(3u64), 5000), U256::from(1u64));
    }

    #[test]
    fn test_mul_div() {
        let big = U256::MAX / U256::from(2u64);
        assert_eq!(mul_div(big, U256::from(4u64), U256::from(4u64)), Some(big));
        assert_eq!(mul_div(U256::from(1u64), U256::from(1u64), U256::ZERO), None);
        assert_eq!(mul_div(U256::MAX, U256::from(2u64), U256::from(1u64)), None);
    }

    #[test]
    fn test_u256_to_f64() {
        assert_eq!(u256_to_f64(U256::from(1000u64)), 1000.0);
        let two_pow_200 = U256::from(1u64) << 200;
        assert!((u256_to_f64(two_pow_200) / 2f64.powi(200) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_amount(U256::from(1_500_000u64), 6), "1.500000");
        assert_eq!(format_wad_2dp(WAD * U256::from(17u64) / U256::from(10u64)), "1.70");
        assert_eq!(format_wad_2dp(WAD * U256::from(1999u64) / U256::from(1000u64)), "2.00");
        assert_eq!(format_bps_pct(8500), "85.00%");
        assert_eq!(format_bps_pct(5), "0.05%");
    }

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units("1.5", 6), Some(U256::from(1_500_000u64)));
        assert_eq!(to_base_units("2", 18), Some(WAD * U256::from(2u64)));
        assert_eq!(to_base_units(".25", 2), Some(U256::from(25u64)));
        assert_eq!(to_base_units("7.", 0), Some(U256::from(7u64)));
        assert_eq!(to_base_units(" 0.000001 ", 6), Some(U256::from(1u64)));

        // More precision than the token carries
        assert_eq!(to_base_units("0.0000001", 6), None);
        for bad in ["", ".", "-1", "1e6", "1,5", "1.2.3"] {
            assert_eq!(to_base_units(bad, 6), None, "{bad}");
        }
        assert_eq!(to_base_units(&U256::MAX.to_string(), 1), None);
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(from_base_units(WAD * U256::from(3u64), 18), "3");
        assert_eq!(from_base_units(U256::from(1u64), 6), "0.000001");
        assert_eq!(from_base_units(U256::ZERO, 6), "0");
        assert_eq!(from_base_units(U256::from(1200u64), 0), "1200");
    }
}
