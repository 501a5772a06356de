//! Fee, price and APY analytics for concentrated-liquidity positions.
//!
//! Fee deltas are exact (`U256`, 512-bit intermediate). Price, value and
//! APY are `f64` and meant for reporting only.

use crate::math::{mul_div, to_units_f64, u256_to_f64, Q128, Q96};
use crate::position::{LiquidityPosition, PoolState};
use alloy::primitives::{U160, U256};
use serde::Serialize;

/// Days assumed when the caller gives none.
pub const DEFAULT_APY_DAYS: f64 = 365.0;

/// Fees accrued since the position's last checkpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeAmount {
    /// Raw token units
    pub raw: U256,
    /// Whole tokens
    pub amount: f64,
}

/// `(current - last) * liquidity / 2^128`, scaled by `10^decimals`.
///
/// A checkpoint ahead of the accumulator yields zero rather than wrapping.
pub fn fees_earned(current_fee_growth: U256, last_fee_growth: U256, liquidity: u128, decimals: u8) -> FeeAmount {
    let delta = current_fee_growth.saturating_sub(last_fee_growth);
    // delta < 2^256 and liquidity < 2^128, so the quotient fits in 256 bits
    let raw = mul_div(delta, U256::from(liquidity), Q128).unwrap_or(U256::MAX);
    FeeAmount {
        raw,
        amount: to_units_f64(raw, decimals),
    }
}

/// `(sqrt_price_x96 / 2^96)^2`, token1 per token0.
pub fn price_from_sqrt(sqrt_price_x96: U160) -> f64 {
    let root = u256_to_f64(U256::from(sqrt_price_x96)) / u256_to_f64(Q96);
    root * root
}

/// Position value in token0 terms.
///
/// Infinite or NaN when `price` is zero; [`annualized_apy`] reports that as
/// not computable.
pub fn position_value(liquidity: u128, price: f64, decimals0: u8, decimals1: u8) -> f64 {
    let liquidity = liquidity as f64;
    let root = price.sqrt();
    let amount0 = liquidity / root / 10f64.powi(i32::from(decimals0));
    let amount1 = liquidity * root / 10f64.powi(i32::from(decimals1));
    amount0 + amount1 * price
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Apy {
    /// Percent per year
    Computed(f64),
    NotComputable(String),
}

impl Apy {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Computed(v) => Some(*v),
            Self::NotComputable(_) => None,
        }
    }
}

/// `((fees0 + fees1 * price) / days * 365 / value) * 100`.
pub fn annualized_apy(fees0: f64, fees1: f64, price: f64, days: Option<f64>, value: f64) -> Apy {
    let days = days.unwrap_or(DEFAULT_APY_DAYS);
    if !days.is_finite() || days <= 0.0 {
        return Apy::NotComputable(format!("days must be a positive number, got {days}"));
    }
    if !value.is_finite() || value <= 0.0 {
        return Apy::NotComputable("position value is zero".to_string());
    }

    let daily = (fees0 + fees1 * price) / days;
    let apy = daily * 365.0 / value * 100.0;
    if apy.is_finite() {
        Apy::Computed(apy)
    } else {
        Apy::NotComputable("fee figures are not finite".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesEarned {
    pub token0_amount: f64,
    pub token1_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApyReport {
    pub apy: Apy,
    pub fees_earned: FeesEarned,
    pub position_value: f64,
    pub price: f64,
}

/// Full report for one position against its pool's live state.
pub fn position_apy(
    position: &LiquidityPosition,
    pool: &PoolState,
    decimals0: u8,
    decimals1: u8,
    days: Option<f64>,
) -> ApyReport {
    let fees0 = fees_earned(
        pool.current_fee_growth0,
        position.fee_growth_inside0_last,
        position.liquidity,
        decimals0,
    );
    let fees1 = fees_earned(
        pool.current_fee_growth1,
        position.fee_growth_inside1_last,
        position.liquidity,
        decimals1,
    );
    let price = price_from_sqrt(pool.sqrt_price_x96);
    let value = position_value(position.liquidity, price, decimals0, decimals1);

    ApyReport {
        apy: annualized_apy(fees0.amount, fees1.amount, price, days, value),
        fees_earned: FeesEarned {
            token0_amount: fees0.amount,
            token1_amount: fees1.amount,
        },
        position_value: value,
        price,
    }
}
