//! Lending pool operations.
//!
//! Thin, gated wrappers over the pool plus the read side the loop engine and
//! the monitors share: fresh reserve snapshots and risk parameters.

use crate::approval::ensure_allowance;
use crate::error::{During, Result};
use crate::math::format_amount;
use crate::risk::{self, ReserveConfig, ReserveSnapshot};
use alloy::primitives::{Address, B256, U256};
use midas_chain::contracts::erc20::IERC20;
use midas_chain::contracts::lending::{ILendingPool, IProtocolDataProvider};
use midas_chain::{read, submit, LedgerClient, LedgerError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Formatted view of a plain lending position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LendingPositionReport {
    pub deposited: String,
    pub borrowed: String,
    /// LTV-weighted: distance from the borrowing limit
    pub health_factor: String,
    pub current_ltv: String,
    pub available_to_borrow: String,
}

/// Formatted view of a leveraged position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopPositionReport {
    pub total_collateral: String,
    pub total_borrowed: String,
    pub current_ltv: String,
    /// Liquidation-threshold weighted
    pub health_factor: String,
    pub liquidation_threshold: String,
}

pub struct LendingMarket {
    ledger: Arc<dyn LedgerClient>,
    pool: Address,
    data_provider: Address,
}

impl LendingMarket {
    pub fn new(ledger: Arc<dyn LedgerClient>, pool: Address, data_provider: Address) -> Self {
        Self {
            ledger,
            pool,
            data_provider,
        }
    }

    pub fn pool(&self) -> Address {
        self.pool
    }

    pub fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    // ---- reads ----

    /// Caller's collateral and debt in `asset`.
    pub async fn snapshot(&self, asset: Address) -> std::result::Result<ReserveSnapshot, LedgerError> {
        let data = read(
            self.ledger(),
            self.data_provider,
            &IProtocolDataProvider::getUserReserveDataCall {
                asset,
                user: self.ledger.caller(),
            },
        )
        .await?;
        Ok(ReserveSnapshot::new(
            data.currentATokenBalance,
            data.currentStableDebt,
            data.currentVariableDebt,
        ))
    }

    /// LTV and liquidation threshold of `asset`.
    pub async fn reserve_config(&self, asset: Address, operation: &'static str) -> Result<ReserveConfig> {
        let data = read(
            self.ledger(),
            self.data_provider,
            &IProtocolDataProvider::getReserveConfigurationDataCall { asset },
        )
        .await
        .during(operation)?;
        ReserveConfig::from_raw(data.ltv, data.liquidationThreshold).during(operation)
    }

    pub async fn decimals(&self, asset: Address) -> std::result::Result<u8, LedgerError> {
        Ok(read(self.ledger(), asset, &IERC20::decimalsCall {}).await?._0)
    }

    // ---- raw pool calls, no approval ----

    pub(crate) async fn supply(
        &self,
        asset: Address,
        amount: U256,
        referral_code: u16,
    ) -> std::result::Result<B256, LedgerError> {
        submit(
            self.ledger(),
            self.pool,
            &ILendingPool::depositCall {
                asset,
                amount,
                onBehalfOf: self.ledger.caller(),
                referralCode: referral_code,
            },
        )
        .await
    }

    pub(crate) async fn draw(
        &self,
        asset: Address,
        amount: U256,
        rate_mode: u64,
        referral_code: u16,
    ) -> std::result::Result<B256, LedgerError> {
        submit(
            self.ledger(),
            self.pool,
            &ILendingPool::borrowCall {
                asset,
                amount,
                interestRateMode: U256::from(rate_mode),
                referralCode: referral_code,
                onBehalfOf: self.ledger.caller(),
            },
        )
        .await
    }

    pub(crate) async fn redeem(&self, asset: Address, amount: U256) -> std::result::Result<B256, LedgerError> {
        submit(
            self.ledger(),
            self.pool,
            &ILendingPool::withdrawCall {
                asset,
                amount,
                to: self.ledger.caller(),
            },
        )
        .await
    }

    pub(crate) async fn pay_back(
        &self,
        asset: Address,
        amount: U256,
        rate_mode: u64,
    ) -> std::result::Result<B256, LedgerError> {
        submit(
            self.ledger(),
            self.pool,
            &ILendingPool::repayCall {
                asset,
                amount,
                rateMode: U256::from(rate_mode),
                onBehalfOf: self.ledger.caller(),
            },
        )
        .await
    }

    // ---- operations ----

    /// Approve the pool for `amount` when short, then deposit.
    #[instrument(skip(self), fields(asset = %asset, amount = %amount))]
    pub async fn deposit(&self, asset: Address, amount: U256, referral_code: u16) -> Result<B256> {
        const OP: &str = "deposit";
        ensure_allowance(self.ledger(), asset, self.pool, amount)
            .await
            .during(OP)?;
        let tx_hash = self.supply(asset, amount, referral_code).await.during(OP)?;
        info!(tx_hash = %tx_hash, "Deposited");
        Ok(tx_hash)
    }

    #[instrument(skip(self), fields(asset = %asset, amount = %amount))]
    pub async fn borrow(
        &self,
        asset: Address,
        amount: U256,
        rate_mode: u64,
        referral_code: u16,
    ) -> Result<B256> {
        let tx_hash = self
            .draw(asset, amount, rate_mode, referral_code)
            .await
            .during("borrow")?;
        info!(tx_hash = %tx_hash, "Borrowed");
        Ok(tx_hash)
    }

    /// Withdraw `amount`, or the whole collateral balance when omitted.
    #[instrument(skip(self), fields(asset = %asset))]
    pub async fn withdraw(&self, asset: Address, amount: Option<U256>) -> Result<B256> {
        const OP: &str = "withdraw";
        let amount = match amount {
            Some(amount) => amount,
            None => {
                let balance = self.snapshot(asset).await.during(OP)?.collateral_balance;
                debug!(balance = %balance, "Withdrawing full balance");
                balance
            }
        };
        let tx_hash = self.redeem(asset, amount).await.during(OP)?;
        info!(amount = %amount, tx_hash = %tx_hash, "Withdrawn");
        Ok(tx_hash)
    }

    /// Repay `amount`, or the current variable debt when omitted.
    #[instrument(skip(self), fields(asset = %asset))]
    pub async fn repay(&self, asset: Address, amount: Option<U256>, rate_mode: u64) -> Result<B256> {
        const OP: &str = "repay";
        let amount = match amount {
            Some(amount) => amount,
            None => self.snapshot(asset).await.during(OP)?.variable_debt,
        };
        ensure_allowance(self.ledger(), asset, self.pool, amount)
            .await
            .during(OP)?;
        let tx_hash = self.pay_back(asset, amount, rate_mode).await.during(OP)?;
        info!(amount = %amount, tx_hash = %tx_hash, "Repaid");
        Ok(tx_hash)
    }

    /// Largest withdrawal that keeps HF >= 1.0, from fresh reads.
    pub async fn calculate_max_withdrawable(&self, asset: Address) -> Result<U256> {
        const OP: &str = "calculate_max_withdrawable";
        let snapshot = self.snapshot(asset).await.during(OP)?;
        let config = self.reserve_config(asset, OP).await?;
        let max = risk::max_withdrawable(&snapshot, &config).during(OP)?;
        debug!(
            asset = %asset,
            collateral = %snapshot.collateral_balance,
            debt = %snapshot.total_debt(),
            liquidation_threshold_bps = config.liquidation_threshold_bps(),
            max_withdrawable = %max,
            "Max withdrawable computed"
        );
        Ok(max)
    }

    pub async fn monitor_lending_position(&self, asset: Address) -> Result<LendingPositionReport> {
        const OP: &str = "monitor_lending_position";
        let decimals = self.decimals(asset).await.during(OP)?;
        let snapshot = self.snapshot(asset).await.during(OP)?;
        let config = self.reserve_config(asset, OP).await?;

        Ok(LendingPositionReport {
            deposited: format_amount(snapshot.collateral_balance, decimals),
            borrowed: format_amount(snapshot.total_debt(), decimals),
            health_factor: risk::borrow_capacity_factor(&snapshot, &config)
                .during(OP)?
                .to_string(),
            current_ltv: risk::loan_to_value(&snapshot).during(OP)?.to_string(),
            available_to_borrow: format_amount(risk::available_to_borrow(&snapshot, &config), decimals),
        })
    }

    pub async fn monitor_loop_position(&self, asset: Address) -> Result<LoopPositionReport> {
        const OP: &str = "monitor_loop_position";
        let decimals = self.decimals(asset).await.during(OP)?;
        let snapshot = self.snapshot(asset).await.during(OP)?;
        let config = self.reserve_config(asset, OP).await?;

        Ok(LoopPositionReport {
            total_collateral: format_amount(snapshot.collateral_balance, decimals),
            total_borrowed: format_amount(snapshot.total_debt(), decimals),
            current_ltv: risk::loan_to_value(&snapshot).during(OP)?.to_string(),
            health_factor: risk::health_factor(&snapshot, &config).during(OP)?.to_string(),
            liquidation_threshold: crate::math::format_bps_pct(u64::from(
                config.liquidation_threshold_bps(),
            )),
        })
    }
}

impl std::fmt::Debug for LendingMarket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LendingMarket")
            .field("pool", &self.pool)
            .field("data_provider", &self.data_provider)
            .finish()
    }
}
