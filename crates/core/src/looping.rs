//! Leveraged loop engine.
//!
//! Lever up: deposit, then repeatedly borrow at the reserve LTV and
//! re-deposit what was borrowed. Lever down: withdraw the safe maximum
//! minus a haircut, repay with it, re-read, repeat until the variable debt
//! is gone, then sweep the remaining collateral.
//!
//! Steps run strictly in sequence and every step awaits confirmation of the
//! previous transaction. A failure aborts the sequence; transactions already
//! confirmed stay confirmed.

use crate::approval::ensure_allowance;
use crate::config::LoopSettings;
use crate::error::{During, EngineError, Result};
use crate::lending::LendingMarket;
use crate::math::{apply_basis_points, bps_of};
use crate::position::LoopPosition;
use crate::risk;
use alloy::primitives::{Address, U256};
use midas_chain::contracts::VARIABLE_RATE_MODE;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of a completed unwind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwindReport {
    /// Withdraw-and-repay rounds performed
    pub iterations: u32,
    /// Collateral withdrawn after the debt reached zero
    #[serde(serialize_with = "serialize_optional_amount")]
    pub final_withdrawal: Option<U256>,
}

fn serialize_optional_amount<S: serde::Serializer>(
    value: &Option<U256>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(amount) => serializer.collect_str(amount),
        None => serializer.serialize_none(),
    }
}

impl fmt::Display for UnwindReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Successfully unwound position in {} loops", self.iterations)
    }
}

/// Amount to pull out in one unwind round.
///
/// The haircut is skipped only once the debt is already zero.
pub fn withdraw_amount(max_withdrawable: U256, remaining_debt: U256, haircut_bps: u16) -> U256 {
    if remaining_debt.is_zero() {
        max_withdrawable
    } else {
        apply_basis_points(max_withdrawable, haircut_bps)
    }
}

pub struct LoopEngine {
    market: Arc<LendingMarket>,
    settings: LoopSettings,
}

impl LoopEngine {
    pub fn new(market: Arc<LendingMarket>, settings: LoopSettings) -> Self {
        Self { market, settings }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Lever up `asset`.
    ///
    /// The initial deposit is not gated: the caller approves the pool for
    /// `initial_amount` beforehand. `num_loops == 0` means deposit only.
    #[instrument(skip(self), fields(asset = %asset, initial_amount = %initial_amount))]
    pub async fn loop_deposit(
        &self,
        asset: Address,
        initial_amount: U256,
        num_loops: u8,
        referral_code: u16,
    ) -> Result<LoopPosition> {
        const OP: &str = "loop_deposit";
        if num_loops > self.settings.max_loops {
            return Err(EngineError::validation(
                OP,
                format!("numLoops must be at most {}, got {num_loops}", self.settings.max_loops),
            ));
        }

        let tx_hash = self
            .market
            .supply(asset, initial_amount, referral_code)
            .await
            .during(OP)?;
        info!(step = 0, amount = %initial_amount, tx_hash = %tx_hash, "Initial deposit confirmed");

        let mut position = LoopPosition::new(initial_amount);
        let mut current = initial_amount;

        for step in 1..=num_loops {
            let config = self.market.reserve_config(asset, OP).await?;
            let borrow = bps_of(current, config.ltv_bps());
            if borrow.is_zero() {
                warn!(step, current = %current, ltv_bps = config.ltv_bps(), "Borrow amount rounds to zero, stopping");
                break;
            }

            let borrow_tx = self
                .market
                .draw(asset, borrow, VARIABLE_RATE_MODE, referral_code)
                .await
                .during(OP)?;
            ensure_allowance(self.market.ledger(), asset, self.market.pool(), borrow)
                .await
                .during(OP)?;
            let deposit_tx = self
                .market
                .supply(asset, borrow, referral_code)
                .await
                .during(OP)?;

            position.record_loop(borrow);
            info!(
                step,
                borrowed = %borrow,
                total_deposited = %position.total_deposited,
                total_borrowed = %position.total_borrowed,
                borrow_tx = %borrow_tx,
                deposit_tx = %deposit_tx,
                "Loop step confirmed"
            );
            current = borrow;
        }

        Ok(position)
    }

    /// Lever down `asset` until the variable debt is zero, then withdraw
    /// what is left.
    #[instrument(skip(self), fields(asset = %asset))]
    pub async fn loop_withdraw(&self, asset: Address) -> Result<UnwindReport> {
        const OP: &str = "loop_withdraw";

        let mut snapshot = self.market.snapshot(asset).await.during(OP)?;
        let mut remaining = snapshot.variable_debt;
        let mut iterations = 0u32;
        debug!(debt = %remaining, collateral = %snapshot.collateral_balance, "Starting unwind");

        while !remaining.is_zero() {
            if iterations >= self.settings.max_unwind_iterations {
                return Err(EngineError::solvency(
                    OP,
                    format!("debt of {remaining} still outstanding after {iterations} iterations"),
                ));
            }
            iterations += 1;

            let config = self.market.reserve_config(asset, OP).await?;
            let max = risk::max_withdrawable(&snapshot, &config).during(OP)?;
            if max.is_zero() {
                return Err(EngineError::solvency(
                    OP,
                    "health-factor limit reached, cannot withdraw any more funds",
                ));
            }

            let amount = withdraw_amount(max, remaining, self.settings.withdraw_haircut_bps);
            if amount.is_zero() {
                return Err(EngineError::solvency(
                    OP,
                    format!("withdrawable amount {max} rounds to zero after the haircut"),
                ));
            }

            self.market.redeem(asset, amount).await.during(OP)?;
            ensure_allowance(self.market.ledger(), asset, self.market.pool(), amount)
                .await
                .during(OP)?;
            let repay_tx = self
                .market
                .pay_back(asset, amount, VARIABLE_RATE_MODE)
                .await
                .during(OP)?;

            snapshot = self.market.snapshot(asset).await.during(OP)?;
            remaining = snapshot.variable_debt;
            info!(
                iteration = iterations,
                max_withdrawable = %max,
                withdrawn = %amount,
                remaining_debt = %remaining,
                repay_tx = %repay_tx,
                "Unwind step confirmed"
            );
        }

        let remaining_deposit = snapshot.collateral_balance;
        let final_withdrawal = if remaining_deposit.is_zero() {
            None
        } else {
            let tx_hash = self.market.redeem(asset, remaining_deposit).await.during(OP)?;
            info!(amount = %remaining_deposit, tx_hash = %tx_hash, "Final sweep confirmed");
            Some(remaining_deposit)
        };

        Ok(UnwindReport {
            iterations,
            final_withdrawal,
        })
    }
}

impl fmt::Debug for LoopEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopEngine")
            .field("market", &self.market)
            .field("settings", &self.settings)
            .finish()
    }
}
