//! Trove borrowing: lock collateral in a vault, mint iUSD against it.

use crate::approval::ensure_allowance;
use crate::config::{IroncladContracts, TroveSettings};
use crate::error::{During, EngineError, Result};
use crate::hints::TroveHintFinder;
use crate::math::format_amount;
use alloy::primitives::{Address, B256, U256};
use midas_chain::contracts::erc20::IERC20;
use midas_chain::contracts::troves::{IBorrowerOperations, ICollateralVault, ITroveManager};
use midas_chain::{read, submit, LedgerClient};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Trove lifecycle as reported by the trove manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TroveStatus {
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
    Unknown,
}

impl From<U256> for TroveStatus {
    fn from(raw: U256) -> Self {
        match raw.saturating_to::<u64>() {
            0 => Self::NonExistent,
            1 => Self::Active,
            2 => Self::ClosedByOwner,
            3 => Self::ClosedByLiquidation,
            4 => Self::ClosedByRedemption,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TroveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NonExistent => "nonExistent",
            Self::Active => "active",
            Self::ClosedByOwner => "closedByOwner",
            Self::ClosedByLiquidation => "closedByLiquidation",
            Self::ClosedByRedemption => "closedByRedemption",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TroveReport {
    /// Vault shares locked, raw units
    pub current_collateral: String,
    /// iUSD debt including gas compensation, 18 decimals
    pub current_debt: String,
    pub trove_status: TroveStatus,
}

pub struct TroveBorrower {
    ledger: Arc<dyn LedgerClient>,
    contracts: IroncladContracts,
    settings: TroveSettings,
    hints: TroveHintFinder,
}

impl TroveBorrower {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        contracts: IroncladContracts,
        settings: TroveSettings,
        hints: TroveHintFinder,
    ) -> Self {
        Self {
            ledger,
            contracts,
            settings,
            hints,
        }
    }

    /// Collateral vault for `token`.
    pub fn vault_for(&self, token: Address, operation: &'static str) -> Result<Address> {
        self.contracts.vaults.get(&token).copied().ok_or_else(|| {
            EngineError::validation(operation, format!("no ic-vault configured for token {token}"))
        })
    }

    pub fn get_ic_vault(&self, token: Address) -> Result<Address> {
        self.vault_for(token, "get_ic_vault")
    }

    pub fn borrower_address(&self) -> Address {
        self.contracts.borrower_operations
    }

    pub fn lending_pool_address(&self) -> Address {
        self.contracts.lending_pool
    }

    /// Wrap `token_amount` into vault shares and open a trove minting
    /// `iusd_amount`.
    #[instrument(skip(self), fields(token = %token, token_amount = %token_amount, iusd_amount = %iusd_amount))]
    pub async fn borrow_iusd(
        &self,
        token: Address,
        token_amount: U256,
        iusd_amount: U256,
    ) -> Result<B256> {
        const OP: &str = "borrow_iusd";
        let vault = self.vault_for(token, OP)?;
        let ledger = self.ledger.as_ref();
        let borrower_operations = self.contracts.borrower_operations;

        ensure_allowance(ledger, token, vault, token_amount)
            .await
            .during(OP)?;
        let deposit_tx = submit(
            ledger,
            vault,
            &ICollateralVault::depositCall {
                assets: token_amount,
                receiver: ledger.caller(),
            },
        )
        .await
        .during(OP)?;
        debug!(vault = %vault, tx_hash = %deposit_tx, "Collateral wrapped");

        ensure_allowance(ledger, vault, borrower_operations, token_amount)
            .await
            .during(OP)?;

        let hints = self
            .hints
            .find_or_default(vault, token_amount, iusd_amount)
            .await;

        let tx_hash = submit(
            ledger,
            borrower_operations,
            &IBorrowerOperations::openTroveCall {
                _collateral: vault,
                _collAmount: token_amount,
                _maxFeePercentage: self.settings.max_fee_percentage,
                _iUSDAmount: iusd_amount,
                _upperHint: hints.upper,
                _lowerHint: hints.lower,
            },
        )
        .await
        .during(OP)?;

        info!(vault = %vault, upper_hint = %hints.upper, tx_hash = %tx_hash, "Trove opened");
        Ok(tx_hash)
    }

    /// Repay the trove debt net of gas compensation, close it and unwrap
    /// the returned collateral.
    #[instrument(skip(self), fields(token = %token))]
    pub async fn repay_iusd(&self, token: Address) -> Result<B256> {
        const OP: &str = "repay_iusd";
        let vault = self.vault_for(token, OP)?;
        let ledger = self.ledger.as_ref();
        let caller = ledger.caller();
        let borrower_operations = self.contracts.borrower_operations;

        let debt = read(
            ledger,
            self.contracts.trove_manager,
            &ITroveManager::getTroveDebtCall {
                _borrower: caller,
                _collateral: vault,
            },
        )
        .await
        .during(OP)?
        ._0;
        let actual = debt.saturating_sub(self.settings.gas_compensation);
        debug!(debt = %debt, repay = %actual, "Closing trove");

        ensure_allowance(ledger, self.contracts.iusd, borrower_operations, actual)
            .await
            .during(OP)?;
        let tx_hash = submit(
            ledger,
            borrower_operations,
            &IBorrowerOperations::closeTroveCall { _collateral: vault },
        )
        .await
        .during(OP)?;
        info!(vault = %vault, tx_hash = %tx_hash, "Trove closed");

        let shares = read(ledger, vault, &IERC20::balanceOfCall { account: caller })
            .await
            .during(OP)?
            ._0;
        if !shares.is_zero() {
            let unwrap_tx = submit(ledger, vault, &ICollateralVault::withdrawCall { shares })
                .await
                .during(OP)?;
            info!(shares = %shares, tx_hash = %unwrap_tx, "Collateral unwrapped");
        }

        Ok(tx_hash)
    }

    pub async fn monitor_trove(&self, token: Address) -> Result<TroveReport> {
        const OP: &str = "monitor_trove";
        let vault = self.vault_for(token, OP)?;
        let ledger = self.ledger.as_ref();
        let manager = self.contracts.trove_manager;
        let borrower = ledger.caller();

        let status = read(
            ledger,
            manager,
            &ITroveManager::getTroveStatusCall {
                _borrower: borrower,
                _collateral: vault,
            },
        )
        .await
        .during(OP)?
        ._0;
        let coll = read(
            ledger,
            manager,
            &ITroveManager::getTroveCollCall {
                _borrower: borrower,
                _collateral: vault,
            },
        )
        .await
        .during(OP)?
        ._0;
        let debt = read(
            ledger,
            manager,
            &ITroveManager::getTroveDebtCall {
                _borrower: borrower,
                _collateral: vault,
            },
        )
        .await
        .during(OP)?
        ._0;

        Ok(TroveReport {
            current_collateral: coll.to_string(),
            current_debt: format_amount(debt, 18),
            trove_status: TroveStatus::from(status),
        })
    }
}

impl fmt::Debug for TroveBorrower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TroveBorrower")
            .field("borrower_operations", &self.contracts.borrower_operations)
            .field("vaults", &self.contracts.vaults.len())
            .field("hints", &self.hints)
            .finish()
    }
}
