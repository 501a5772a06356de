//! Trove insertion hints.
//!
//! Troves sit in a list sorted by nominal collateral ratio. Opening one with
//! a good upper hint saves the contract a long walk; a bad or zero hint only
//! costs gas. The hint search is randomized, so the seed source is injected.

use alloy::primitives::{Address, U256};
use midas_chain::contracts::erc20::IERC20;
use midas_chain::contracts::troves::{IHintHelpers, ITroveManager};
use midas_chain::{read, LedgerClient, LedgerError};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Supplies the random seed for `getApproxHint`.
pub trait SeedSource: Send + Sync + std::fmt::Debug {
    fn next_seed(&self) -> U256;
}

/// Thread-local RNG, seeds in `[0, 1_000_000)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSeeds;

impl SeedSource for ThreadRngSeeds {
    fn next_seed(&self) -> U256 {
        U256::from(rand::thread_rng().gen_range(0..1_000_000u64))
    }
}

/// Always the same seed.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeed(pub u64);

impl SeedSource for FixedSeed {
    fn next_seed(&self) -> U256 {
        U256::from(self.0)
    }
}

/// Upper/lower insertion hints for `openTrove`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TroveHints {
    pub upper: Address,
    pub lower: Address,
}

/// `ceil(multiplier * sqrt(trove_count))`, at least 1.
pub fn num_trials(trove_count: u64, multiplier: u64) -> u64 {
    // ceil(m * sqrt(n)) == ceil(sqrt(m^2 * n))
    let radicand = u128::from(multiplier)
        .saturating_mul(u128::from(multiplier))
        .saturating_mul(u128::from(trove_count));
    let root = isqrt(radicand);
    let ceil = if root * root < radicand { root + 1 } else { root };
    u64::try_from(ceil).unwrap_or(u64::MAX).max(1)
}

fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    // Newton's method from above: n/2 + 1 >= sqrt(n), and y < x until
    // x = floor(sqrt(n)).
    let mut x = n / 2 + 1;
    let mut y = (x + n / x) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

pub struct TroveHintFinder {
    ledger: Arc<dyn LedgerClient>,
    trove_manager: Address,
    hint_helpers: Address,
    seeds: Arc<dyn SeedSource>,
    trials_multiplier: u64,
}

impl TroveHintFinder {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        trove_manager: Address,
        hint_helpers: Address,
        seeds: Arc<dyn SeedSource>,
        trials_multiplier: u64,
    ) -> Self {
        Self {
            ledger,
            trove_manager,
            hint_helpers,
            seeds,
            trials_multiplier,
        }
    }

    /// Sample the sorted list for a position near the new trove's NICR.
    #[instrument(skip(self), fields(collateral = %collateral))]
    pub async fn find(
        &self,
        collateral: Address,
        collateral_amount: U256,
        debt: U256,
    ) -> Result<TroveHints, LedgerError> {
        let ledger = self.ledger.as_ref();

        let decimals = read(ledger, collateral, &IERC20::decimalsCall {}).await?._0;
        let trove_count = read(
            ledger,
            self.trove_manager,
            &ITroveManager::getTroveOwnersCountCall {
                _collateral: collateral,
            },
        )
        .await?
        ._0;
        let trials = num_trials(trove_count.saturating_to(), self.trials_multiplier);

        let nicr = read(
            ledger,
            self.hint_helpers,
            &IHintHelpers::computeNominalCRCall {
                _coll: collateral_amount,
                _debt: debt,
                _collateralDecimals: decimals,
            },
        )
        .await?
        ._0;

        let seed = self.seeds.next_seed();
        let hint = read(
            ledger,
            self.hint_helpers,
            &IHintHelpers::getApproxHintCall {
                _collateral: collateral,
                _CR: nicr,
                _numTrials: U256::from(trials),
                _inputRandomSeed: seed,
            },
        )
        .await?;

        debug!(
            trove_count = %trove_count,
            trials,
            nicr = %nicr,
            hint = %hint.hintAddress,
            "Approximate hint found"
        );

        Ok(TroveHints {
            upper: hint.hintAddress,
            lower: Address::ZERO,
        })
    }

    /// [`find`](Self::find), falling back to a zero/zero pair on failure.
    pub async fn find_or_default(
        &self,
        collateral: Address,
        collateral_amount: U256,
        debt: U256,
    ) -> TroveHints {
        match self.find(collateral, collateral_amount, debt).await {
            Ok(hints) => hints,
            Err(e) => {
                warn!(collateral = %collateral, error = %e, "Hint lookup failed, opening without hints");
                TroveHints::default()
            }
        }
    }
}

impl std::fmt::Debug for TroveHintFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TroveHintFinder")
            .field("trove_manager", &self.trove_manager)
            .field("hint_helpers", &self.hint_helpers)
            .field("trials_multiplier", &self.trials_multiplier)
            .finish()
    }
}
