//! Position data model.
//!
//! Everything here is read fresh from the chain at the start of an
//! operation and re-read after every mutating transaction; nothing is
//! cached across invocations.

use alloy::primitives::{Address, U160, U256};
use serde::Serialize;
use smallvec::SmallVec;

/// Accumulator for one lever-up sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopPosition {
    /// Amount borrowed in each loop, in order
    #[serde(serialize_with = "crate::math::decimal_seq::serialize")]
    pub borrowed_amounts: SmallVec<[U256; 5]>,
    /// Initial deposit plus every re-deposited borrow
    #[serde(with = "crate::math::decimal")]
    pub total_deposited: U256,
    #[serde(with = "crate::math::decimal")]
    pub total_borrowed: U256,
}

impl LoopPosition {
    pub fn new(initial_deposit: U256) -> Self {
        Self {
            total_deposited: initial_deposit,
            ..Default::default()
        }
    }

    /// Record one completed borrow-and-redeposit step.
    pub fn record_loop(&mut self, borrowed: U256) {
        self.borrowed_amounts.push(borrowed);
        self.total_borrowed = self.total_borrowed.saturating_add(borrowed);
        self.total_deposited = self.total_deposited.saturating_add(borrowed);
    }

    pub fn loops(&self) -> usize {
        self.borrowed_amounts.len()
    }
}

/// NFT-represented concentrated-liquidity position at its last touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityPosition {
    #[serde(with = "crate::math::decimal")]
    pub token_id: U256,
    pub token0: Address,
    pub token1: Address,
    pub liquidity: u128,
    #[serde(with = "crate::math::decimal")]
    pub fee_growth_inside0_last: U256,
    #[serde(with = "crate::math::decimal")]
    pub fee_growth_inside1_last: U256,
}

/// Live pool state used to derive price and fee deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub sqrt_price_x96: U160,
    pub current_fee_growth0: U256,
    pub current_fee_growth1: U256,
}

/// Allowance observed by the approval gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceState {
    pub owner: Address,
    pub spender: Address,
    pub asset: Address,
    #[serde(with = "crate::math::decimal")]
    pub current_allowance: U256,
}

impl AllowanceState {
    pub fn covers(&self, required: U256) -> bool {
        self.current_allowance >= required
    }
}
