//! Risk calculator: loan-to-value, health factor, safe withdrawal size.
//!
//! Pure functions over a [`ReserveSnapshot`] and [`ReserveConfig`]. Every
//! intermediate product is widened, so the only failure modes are a zero
//! divisor outside the zero-debt case or a result that does not fit.

use crate::math::{format_bps_pct, format_wad_2dp, mul_div, u256_to_f64, BPS_DENOMINATOR, WAD};
use alloy::primitives::U256;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    #[error("{0} overflowed")]
    Overflow(&'static str),

    #[error("{0} is zero")]
    ZeroDivisor(&'static str),

    #[error("invalid reserve config: ltv {ltv_bps} bps, liquidation threshold {liquidation_threshold_bps} bps")]
    InvalidConfig {
        ltv_bps: u64,
        liquidation_threshold_bps: u64,
    },
}

/// Point-in-time read of a user's position in one reserve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReserveSnapshot {
    #[serde(with = "crate::math::decimal")]
    pub collateral_balance: U256,
    #[serde(with = "crate::math::decimal")]
    pub stable_debt: U256,
    #[serde(with = "crate::math::decimal")]
    pub variable_debt: U256,
}

impl ReserveSnapshot {
    pub fn new(collateral_balance: U256, stable_debt: U256, variable_debt: U256) -> Self {
        Self {
            collateral_balance,
            stable_debt,
            variable_debt,
        }
    }

    /// Stable plus variable debt.
    pub fn total_debt(&self) -> U256 {
        self.stable_debt.saturating_add(self.variable_debt)
    }

    pub fn has_debt(&self) -> bool {
        !self.total_debt().is_zero()
    }
}

/// Per-asset risk parameters in basis points.
/// Invariant: `ltv_bps <= liquidation_threshold_bps <= 10000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReserveConfig {
    ltv_bps: u16,
    liquidation_threshold_bps: u16,
}

impl ReserveConfig {
    pub fn new(ltv_bps: u16, liquidation_threshold_bps: u16) -> Result<Self, RiskError> {
        if ltv_bps > liquidation_threshold_bps || u64::from(liquidation_threshold_bps) > BPS_DENOMINATOR {
            return Err(RiskError::InvalidConfig {
                ltv_bps: u64::from(ltv_bps),
                liquidation_threshold_bps: u64::from(liquidation_threshold_bps),
            });
        }
        Ok(Self {
            ltv_bps,
            liquidation_threshold_bps,
        })
    }

    /// Build from the raw `uint256` values a data provider returns.
    pub fn from_raw(ltv: U256, liquidation_threshold: U256) -> Result<Self, RiskError> {
        let bound = U256::from(BPS_DENOMINATOR);
        if ltv > bound || liquidation_threshold > bound {
            return Err(RiskError::InvalidConfig {
                ltv_bps: ltv.saturating_to(),
                liquidation_threshold_bps: liquidation_threshold.saturating_to(),
            });
        }
        Self::new(ltv.to::<u16>(), liquidation_threshold.to::<u16>())
    }

    pub fn ltv_bps(&self) -> u16 {
        self.ltv_bps
    }

    pub fn liquidation_threshold_bps(&self) -> u16 {
        self.liquidation_threshold_bps
    }
}

/// A ratio with basis-point precision, rounded toward zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Percent {
    bps: u64,
}

impl Percent {
    pub const ZERO: Self = Self { bps: 0 };

    pub fn from_bps(bps: u64) -> Self {
        Self { bps }
    }

    pub fn bps(&self) -> u64 {
        self.bps
    }

    /// Whole percent, rounded toward zero.
    pub fn whole(&self) -> u64 {
        self.bps / 100
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_bps_pct(self.bps))
    }
}

/// Risk-adjusted collateral over debt, 18-decimal fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthFactor {
    /// No debt outstanding
    Infinite,
    Finite(U256),
}

impl HealthFactor {
    /// True when the position cannot be liquidated (HF >= 1.0).
    pub fn is_healthy(&self) -> bool {
        match self {
            Self::Infinite => true,
            Self::Finite(wad) => *wad >= WAD,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Infinite => f64::INFINITY,
            Self::Finite(wad) => u256_to_f64(*wad) / 1e18,
        }
    }
}

impl fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => f.write_str("∞"),
            Self::Finite(wad) => f.write_str(&format_wad_2dp(*wad)),
        }
    }
}

impl Serialize for HealthFactor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// `debt / collateral`; zero when there is no debt.
pub fn loan_to_value(snapshot: &ReserveSnapshot) -> Result<Percent, RiskError> {
    let debt = snapshot.total_debt();
    if debt.is_zero() {
        return Ok(Percent::ZERO);
    }
    if snapshot.collateral_balance.is_zero() {
        return Err(RiskError::ZeroDivisor("collateral"));
    }
    let bps = mul_div(debt, U256::from(BPS_DENOMINATOR), snapshot.collateral_balance)
        .ok_or(RiskError::Overflow("loan to value"))?;
    Ok(Percent::from_bps(bps.saturating_to()))
}

/// `collateral * weight_bps / 10000 / debt` as WAD.
fn weighted_coverage(snapshot: &ReserveSnapshot, weight_bps: u16) -> Result<HealthFactor, RiskError> {
    let debt = snapshot.total_debt();
    if debt.is_zero() {
        return Ok(HealthFactor::Infinite);
    }
    let adjusted = mul_div(
        snapshot.collateral_balance,
        U256::from(weight_bps),
        U256::from(BPS_DENOMINATOR),
    )
    .ok_or(RiskError::Overflow("adjusted collateral"))?;
    let wad = mul_div(adjusted, WAD, debt).ok_or(RiskError::Overflow("health factor"))?;
    Ok(HealthFactor::Finite(wad))
}

/// Liquidation-threshold weighted collateral over debt.
pub fn health_factor(snapshot: &ReserveSnapshot, config: &ReserveConfig) -> Result<HealthFactor, RiskError> {
    weighted_coverage(snapshot, config.liquidation_threshold_bps)
}

/// LTV weighted collateral over debt: how far the position is from its
/// borrowing limit rather than from liquidation.
pub fn borrow_capacity_factor(
    snapshot: &ReserveSnapshot,
    config: &ReserveConfig,
) -> Result<HealthFactor, RiskError> {
    weighted_coverage(snapshot, config.ltv_bps)
}

/// Largest withdrawal that keeps the health factor at or above 1.0.
pub fn max_withdrawable(snapshot: &ReserveSnapshot, config: &ReserveConfig) -> Result<U256, RiskError> {
    let debt = snapshot.total_debt();
    if debt.is_zero() {
        return Ok(snapshot.collateral_balance);
    }
    if config.liquidation_threshold_bps == 0 {
        return Err(RiskError::ZeroDivisor("liquidation threshold"));
    }
    let min_required = mul_div(
        debt,
        U256::from(BPS_DENOMINATOR),
        U256::from(config.liquidation_threshold_bps),
    )
    .ok_or(RiskError::Overflow("minimum required collateral"))?;

    if snapshot.collateral_balance <= min_required {
        return Ok(U256::ZERO);
    }
    Ok(snapshot.collateral_balance - min_required)
}

/// Remaining borrowing headroom: `collateral * ltv - debt`, floored at zero.
pub fn available_to_borrow(snapshot: &ReserveSnapshot, config: &ReserveConfig) -> U256 {
    let max_borrow = mul_div(
        snapshot.collateral_balance,
        U256::from(config.ltv_bps),
        U256::from(BPS_DENOMINATOR),
    )
    .unwrap_or(U256::MAX);
    max_borrow.saturating_sub(snapshot.total_debt())
}
