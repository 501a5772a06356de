//! Concentrated-liquidity positions on the Kim (Algebra) exchange.
//!
//! Positions are NFTs minted by the position manager. Writes go through the
//! approval gate for every token the manager or router pulls; reads feed the
//! fee and APY analytics in [`apy`].

pub mod apy;

use crate::approval::ensure_allowance;
use crate::config::{KimContracts, LiquiditySettings};
use crate::error::{During, EngineError, Result};
use crate::math::mul_div;
use crate::position::{LiquidityPosition, PoolState};
use alloy::primitives::{Address, Bytes, B256, U160, U256};
use apy::{position_apy, ApyReport};
use futures::stream::{self, StreamExt, TryStreamExt};
use midas_chain::contracts::algebra::{
    CollectParams, DecreaseLiquidityParams, ExactInputParams, ExactInputSingleParams, ExactOutputParams,
    ExactOutputSingleParams, IAlgebraFactory, IAlgebraPool, ILiquidityCalculator, IncreaseLiquidityParams,
    INonfungiblePositionManager, ISwapRouter, MintParams,
};
use midas_chain::contracts::erc20::IERC20;
use midas_chain::{read, submit, LedgerClient, LedgerError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One NFT held by an owner, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LpToken {
    #[serde(with = "crate::math::decimal")]
    pub token_id: U256,
    pub index: u64,
}

/// Unix time `secs` from now.
fn deadline_in(secs: u64) -> U256 {
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    U256::from(now.saturating_add(secs))
}

/// Router path for `token_in -> intermediates -> token_out`: the 20-byte
/// addresses back to back. Every hop must change token.
pub fn encode_path(token_in: Address, intermediates: &[Address], token_out: Address) -> Option<Bytes> {
    let hops: Vec<Address> = std::iter::once(token_in)
        .chain(intermediates.iter().copied())
        .chain(std::iter::once(token_out))
        .collect();
    if hops.windows(2).any(|pair| pair[0] == pair[1]) {
        return None;
    }
    let mut path = Vec::with_capacity(hops.len() * 20);
    for token in &hops {
        path.extend_from_slice(token.as_slice());
    }
    Some(path.into())
}

/// `liquidity * percentage / 100`, rounded down.
pub fn liquidity_share(liquidity: u128, percentage: u8) -> u128 {
    mul_div(U256::from(liquidity), U256::from(percentage), U256::from(100u64))
        .map_or(0, |share| share.saturating_to())
}

pub struct LiquidityManager {
    ledger: Arc<dyn LedgerClient>,
    contracts: KimContracts,
    settings: LiquiditySettings,
}

impl LiquidityManager {
    pub fn new(ledger: Arc<dyn LedgerClient>, contracts: KimContracts, settings: LiquiditySettings) -> Self {
        Self {
            ledger,
            contracts,
            settings,
        }
    }

    fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    pub fn swap_router_address(&self) -> Address {
        self.contracts.swap_router
    }

    async fn pool_for(&self, token0: Address, token1: Address, operation: &'static str) -> Result<Address> {
        let pool = read(
            self.ledger(),
            self.contracts.factory,
            &IAlgebraFactory::poolByPairCall {
                tokenA: token0,
                tokenB: token1,
            },
        )
        .await
        .during(operation)?
        .pool;
        if pool == Address::ZERO {
            return Err(EngineError::validation(
                operation,
                format!("no pool for pair {token0}/{token1}"),
            ));
        }
        Ok(pool)
    }

    // ---- reads ----

    pub async fn read_position(&self, token_id: U256) -> std::result::Result<LiquidityPosition, LedgerError> {
        let p = read(
            self.ledger(),
            self.contracts.position_manager,
            &INonfungiblePositionManager::positionsCall { tokenId: token_id },
        )
        .await?;
        Ok(LiquidityPosition {
            token_id,
            token0: p.token0,
            token1: p.token1,
            liquidity: p.liquidity,
            fee_growth_inside0_last: p.feeGrowthInside0LastX128,
            fee_growth_inside1_last: p.feeGrowthInside1LastX128,
        })
    }

    pub async fn read_pool_state(&self, pool: Address) -> std::result::Result<PoolState, LedgerError> {
        let ledger = self.ledger();
        let global_state = IAlgebraPool::globalStateCall {};
        let fee_growth0 = IAlgebraPool::totalFeeGrowth0TokenCall {};
        let fee_growth1 = IAlgebraPool::totalFeeGrowth1TokenCall {};
        let (state, growth0, growth1) = futures::try_join!(
            read(ledger, pool, &global_state),
            read(ledger, pool, &fee_growth0),
            read(ledger, pool, &fee_growth1),
        )?;
        Ok(PoolState {
            sqrt_price_x96: state.price,
            current_fee_growth0: growth0._0,
            current_fee_growth1: growth1._0,
        })
    }

    /// Position NFTs held by `owner`.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn lp_tokens(&self, owner: Address) -> Result<Vec<LpToken>> {
        const OP: &str = "lp_tokens";
        let ledger = self.ledger();
        let manager = self.contracts.position_manager;

        let count: u64 = read(ledger, manager, &INonfungiblePositionManager::balanceOfCall { owner })
            .await
            .during(OP)?
            ._0
            .saturating_to();

        let tokens: Vec<LpToken> = stream::iter(0..count)
            .map(|index| async move {
                let call = INonfungiblePositionManager::tokenOfOwnerByIndexCall {
                    owner,
                    index: U256::from(index),
                };
                read(ledger, manager, &call)
                    .await
                    .map(|r| LpToken { token_id: r._0, index })
            })
            .buffered(self.settings.read_concurrency)
            .try_collect()
            .await
            .during(OP)?;

        debug!(count = tokens.len(), "Enumerated LP tokens");
        Ok(tokens)
    }

    /// Fee-based APY of one position, `days` defaulting to a year.
    #[instrument(skip(self), fields(token_id = %token_id))]
    pub async fn calculate_position_apy(&self, token_id: U256, days: Option<f64>) -> Result<ApyReport> {
        const OP: &str = "calculate_position_apy";
        let ledger = self.ledger();

        let position = self.read_position(token_id).await.during(OP)?;
        let pool = self.pool_for(position.token0, position.token1, OP).await?;
        let state = self.read_pool_state(pool).await.during(OP)?;
        let decimals = IERC20::decimalsCall {};
        let (decimals0, decimals1) = futures::try_join!(
            read(ledger, position.token0, &decimals),
            read(ledger, position.token1, &decimals),
        )
        .during(OP)?;

        let report = position_apy(&position, &state, decimals0._0, decimals1._0, days);
        debug!(
            pool = %pool,
            price = report.price,
            position_value = report.position_value,
            apy = ?report.apy,
            "Position APY computed"
        );
        Ok(report)
    }

    // ---- position writes ----

    /// Mint a new position sized by the on-chain calculator.
    ///
    /// Tokens may be given in either order; they are matched to the pool's.
    #[instrument(skip(self), fields(token0 = %token0, token1 = %token1))]
    pub async fn mint_position(
        &self,
        token0: Address,
        token1: Address,
        amount0: U256,
        amount1: U256,
        risk_level: u8,
        deadline_secs: u64,
    ) -> Result<B256> {
        const OP: &str = "mint_position";
        let ledger = self.ledger();
        let manager = self.contracts.position_manager;

        let pool = self.pool_for(token0, token1, OP).await?;
        let pool_token0 = read(ledger, pool, &IAlgebraPool::token0Call {}).await.during(OP)?._0;
        let (token0, token1, amount0, amount1) = if pool_token0 == token0 {
            (token0, token1, amount0, amount1)
        } else {
            (token1, token0, amount1, amount0)
        };

        let optimal = read(
            ledger,
            self.contracts.liquidity_calculator,
            &ILiquidityCalculator::calculateOptimalAmountsCall {
                pool,
                amount0Desired: amount0,
                amount1Desired: amount1,
                riskLevel: risk_level,
            },
        )
        .await
        .during(OP)?;
        debug!(
            pool = %pool,
            amount0 = %optimal.amount0,
            amount1 = %optimal.amount1,
            tick_lower = %optimal.tickLower,
            tick_upper = %optimal.tickUpper,
            "Optimal amounts"
        );

        ensure_allowance(ledger, token0, manager, optimal.amount0).await.during(OP)?;
        ensure_allowance(ledger, token1, manager, optimal.amount1).await.during(OP)?;

        let params = MintParams {
            token0,
            token1,
            tickLower: optimal.tickLower,
            tickUpper: optimal.tickUpper,
            amount0Desired: optimal.amount0,
            amount1Desired: optimal.amount1,
            amount0Min: U256::ZERO,
            amount1Min: U256::ZERO,
            recipient: ledger.caller(),
            deadline: deadline_in(deadline_secs),
        };
        let tx_hash = submit(ledger, manager, &INonfungiblePositionManager::mintCall { params })
            .await
            .during(OP)?;
        info!(pool = %pool, tx_hash = %tx_hash, "Position minted");
        Ok(tx_hash)
    }

    #[instrument(skip(self), fields(token_id = %token_id))]
    pub async fn increase_liquidity(
        &self,
        token_id: U256,
        token0: Address,
        token1: Address,
        amount0: U256,
        amount1: U256,
    ) -> Result<B256> {
        const OP: &str = "increase_liquidity";
        let ledger = self.ledger();
        let manager = self.contracts.position_manager;

        let ((token0, amount0), (token1, amount1)) = if token0 < token1 {
            ((token0, amount0), (token1, amount1))
        } else {
            ((token1, amount1), (token0, amount0))
        };

        ensure_allowance(ledger, token0, manager, amount0).await.during(OP)?;
        ensure_allowance(ledger, token1, manager, amount1).await.during(OP)?;

        let params = IncreaseLiquidityParams {
            tokenId: token_id,
            amount0Desired: amount0,
            amount1Desired: amount1,
            amount0Min: U256::ZERO,
            amount1Min: U256::ZERO,
            deadline: deadline_in(self.settings.deadline_secs),
        };
        let tx_hash = submit(
            ledger,
            manager,
            &INonfungiblePositionManager::increaseLiquidityCall { params },
        )
        .await
        .during(OP)?;
        info!(tx_hash = %tx_hash, "Liquidity increased");
        Ok(tx_hash)
    }

    /// Remove `percentage` (0-100) of the position's liquidity.
    #[instrument(skip(self), fields(token_id = %token_id))]
    pub async fn decrease_liquidity(&self, token_id: U256, percentage: u8) -> Result<B256> {
        const OP: &str = "decrease_liquidity";
        if percentage > 100 {
            return Err(EngineError::validation(
                OP,
                format!("percentage must be between 0 and 100, got {percentage}"),
            ));
        }

        let position = self.read_position(token_id).await.during(OP)?;
        let liquidity = liquidity_share(position.liquidity, percentage);

        let params = DecreaseLiquidityParams {
            tokenId: token_id,
            liquidity,
            amount0Min: U256::ZERO,
            amount1Min: U256::ZERO,
            deadline: deadline_in(self.settings.deadline_secs),
        };
        let tx_hash = submit(
            self.ledger(),
            self.contracts.position_manager,
            &INonfungiblePositionManager::decreaseLiquidityCall { params },
        )
        .await
        .during(OP)?;
        info!(liquidity, percentage, tx_hash = %tx_hash, "Liquidity decreased");
        Ok(tx_hash)
    }

    /// Collect everything owed to the position.
    #[instrument(skip(self), fields(token_id = %token_id))]
    pub async fn collect(&self, token_id: U256) -> Result<B256> {
        let params = CollectParams {
            tokenId: token_id,
            recipient: self.ledger.caller(),
            amount0Max: u128::MAX,
            amount1Max: u128::MAX,
        };
        let tx_hash = submit(
            self.ledger(),
            self.contracts.position_manager,
            &INonfungiblePositionManager::collectCall { params },
        )
        .await
        .during("collect")?;
        info!(tx_hash = %tx_hash, "Fees collected");
        Ok(tx_hash)
    }

    #[instrument(skip(self), fields(token_id = %token_id))]
    pub async fn burn(&self, token_id: U256) -> Result<B256> {
        let tx_hash = submit(
            self.ledger(),
            self.contracts.position_manager,
            &INonfungiblePositionManager::burnCall { tokenId: token_id },
        )
        .await
        .during("burn")?;
        info!(tx_hash = %tx_hash, "Position burned");
        Ok(tx_hash)
    }

    // ---- swaps ----

    #[instrument(skip(self), fields(token_in = %token_in, token_out = %token_out, amount_in = %amount_in))]
    pub async fn swap_exact_input_single(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out_minimum: U256,
        limit_sqrt_price: U160,
        deadline_secs: u64,
    ) -> Result<B256> {
        const OP: &str = "swap_exact_input_single";
        let ledger = self.ledger();
        let router = self.contracts.swap_router;

        ensure_allowance(ledger, token_in, router, amount_in).await.during(OP)?;
        let params = ExactInputSingleParams {
            tokenIn: token_in,
            tokenOut: token_out,
            recipient: ledger.caller(),
            deadline: deadline_in(deadline_secs),
            amountIn: amount_in,
            amountOutMinimum: amount_out_minimum,
            limitSqrtPrice: limit_sqrt_price,
        };
        let tx_hash = submit(ledger, router, &ISwapRouter::exactInputSingleCall { params })
            .await
            .during(OP)?;
        info!(tx_hash = %tx_hash, "Swapped exact input");
        Ok(tx_hash)
    }

    #[instrument(skip(self), fields(token_in = %token_in, token_out = %token_out, amount_out = %amount_out))]
    pub async fn swap_exact_output_single(
        &self,
        token_in: Address,
        token_out: Address,
        amount_out: U256,
        amount_in_maximum: U256,
        limit_sqrt_price: U160,
        deadline_secs: u64,
    ) -> Result<B256> {
        const OP: &str = "swap_exact_output_single";
        let ledger = self.ledger();
        let router = self.contracts.swap_router;

        ensure_allowance(ledger, token_in, router, amount_in_maximum)
            .await
            .during(OP)?;
        let params = ExactOutputSingleParams {
            tokenIn: token_in,
            tokenOut: token_out,
            recipient: ledger.caller(),
            deadline: deadline_in(deadline_secs),
            amountOut: amount_out,
            amountInMaximum: amount_in_maximum,
            limitSqrtPrice: limit_sqrt_price,
        };
        let tx_hash = submit(ledger, router, &ISwapRouter::exactOutputSingleCall { params })
            .await
            .during(OP)?;
        info!(tx_hash = %tx_hash, "Swapped exact output");
        Ok(tx_hash)
    }

    #[instrument(
        skip(self, intermediates),
        fields(token_in = %token_in, token_out = %token_out, hops = intermediates.len() + 1, amount_in = %amount_in)
    )]
    pub async fn swap_exact_input_multi_hop(
        &self,
        token_in: Address,
        intermediates: &[Address],
        token_out: Address,
        amount_in: U256,
        amount_out_minimum: U256,
        deadline_secs: u64,
    ) -> Result<B256> {
        const OP: &str = "swap_exact_input_multi_hop";
        let path = encode_path(token_in, intermediates, token_out)
            .ok_or_else(|| EngineError::validation(OP, "path repeats a token in consecutive hops"))?;
        let ledger = self.ledger();
        let router = self.contracts.swap_router;

        ensure_allowance(ledger, token_in, router, amount_in).await.during(OP)?;
        let params = ExactInputParams {
            path,
            recipient: ledger.caller(),
            deadline: deadline_in(deadline_secs),
            amountIn: amount_in,
            amountOutMinimum: amount_out_minimum,
        };
        let tx_hash = submit(ledger, router, &ISwapRouter::exactInputCall { params })
            .await
            .during(OP)?;
        info!(tx_hash = %tx_hash, "Swapped exact input over multiple hops");
        Ok(tx_hash)
    }

    /// The router walks exact-output paths backwards, so the path is encoded
    /// from `token_out` to `token_in`.
    #[instrument(
        skip(self, intermediates),
        fields(token_in = %token_in, token_out = %token_out, hops = intermediates.len() + 1, amount_out = %amount_out)
    )]
    pub async fn swap_exact_output_multi_hop(
        &self,
        token_in: Address,
        intermediates: &[Address],
        token_out: Address,
        amount_out: U256,
        amount_in_maximum: U256,
        deadline_secs: u64,
    ) -> Result<B256> {
        const OP: &str = "swap_exact_output_multi_hop";
        let reversed: Vec<Address> = intermediates.iter().rev().copied().collect();
        let path = encode_path(token_out, &reversed, token_in)
            .ok_or_else(|| EngineError::validation(OP, "path repeats a token in consecutive hops"))?;
        let ledger = self.ledger();
        let router = self.contracts.swap_router;

        ensure_allowance(ledger, token_in, router, amount_in_maximum)
            .await
            .during(OP)?;
        let params = ExactOutputParams {
            path,
            recipient: ledger.caller(),
            deadline: deadline_in(deadline_secs),
            amountOut: amount_out,
            amountInMaximum: amount_in_maximum,
        };
        let tx_hash = submit(ledger, router, &ISwapRouter::exactOutputCall { params })
            .await
            .during(OP)?;
        info!(tx_hash = %tx_hash, "Swapped exact output over multiple hops");
        Ok(tx_hash)
    }
}

impl std::fmt::Debug for LiquidityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidityManager")
            .field("contracts", &self.contracts)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::apy::Apy;
    use super::*;
    use crate::math::{Q128, WAD};
    use crate::testing::{SimPool, SimPosition, SimulatedLedger, CALLER};
    use alloy::primitives::address;
    use alloy::sol_types::SolCall;

    const TOKEN_A: Address = address!("000000000000000000000000000000000000000a");
    const TOKEN_B: Address = address!("000000000000000000000000000000000000000b");
    const POOL: Address = address!("00000000000000000000000000000000000000ab");
    const TOKEN_C: Address = address!("000000000000000000000000000000000000000c");
    const OTHER: Address = address!("0000000000000000000000000000000000000077");

    fn setup() -> (Arc<SimulatedLedger>, LiquidityManager) {
        let ledger = Arc::new(SimulatedLedger::new());
        ledger.add_pool(SimPool {
            address: POOL,
            token0: TOKEN_A,
            token1: TOKEN_B,
            sqrt_price_x96: U160::from(1u64) << 96,
            fee_growth0: Q128 * U256::from(3u64),
            fee_growth1: Q128,
        });
        ledger.set_balance(TOKEN_A, CALLER, U256::from(1_000u64));
        ledger.set_balance(TOKEN_B, CALLER, U256::from(1_000u64));
        let config = ledger.config().clone();
        let manager = LiquidityManager::new(ledger.clone(), config.kim, config.liquidity);
        (ledger, manager)
    }

    fn position(owner: Address, liquidity: u128) -> SimPosition {
        SimPosition {
            owner,
            token0: TOKEN_A,
            token1: TOKEN_B,
            liquidity,
            fee_growth_inside0: U256::ZERO,
            fee_growth_inside1: U256::ZERO,
        }
    }

    #[test]
    fn test_liquidity_share() {
        assert_eq!(liquidity_share(1000, 50), 500);
        assert_eq!(liquidity_share(999, 50), 499);
        assert_eq!(liquidity_share(1000, 0), 0);
        assert_eq!(liquidity_share(u128::MAX, 100), u128::MAX);
    }

    #[tokio::test]
    async fn test_mint_reorders_to_pool_order() {
        let (ledger, manager) = setup();
        let pm = ledger.config().kim.position_manager;

        // Given in reverse order
        manager
            .mint_position(TOKEN_B, TOKEN_A, U256::from(200u64), U256::from(100u64), 1, 60)
            .await
            .unwrap();

        let minted = ledger.position(U256::from(1u64)).unwrap();
        assert_eq!(minted.owner, CALLER);
        assert_eq!(minted.token0, TOKEN_A);
        assert_eq!(minted.liquidity, 100);
        assert_eq!(ledger.balance(TOKEN_A, CALLER), U256::from(900u64));
        assert_eq!(ledger.balance(TOKEN_B, CALLER), U256::from(800u64));
        assert_eq!(ledger.allowance(TOKEN_A, CALLER, pm), U256::ZERO);
        assert_eq!(
            ledger.writes(),
            vec![
                IERC20::approveCall::SIGNATURE,
                IERC20::approveCall::SIGNATURE,
                INonfungiblePositionManager::mintCall::SIGNATURE,
            ]
        );
    }

    #[tokio::test]
    async fn test_mint_without_pool_is_rejected() {
        let (ledger, manager) = setup();
        let err = manager
            .mint_position(TOKEN_A, OTHER, U256::from(1u64), U256::from(1u64), 1, 60)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { operation: "mint_position", .. }));
        assert_eq!(ledger.write_count(), 0);
    }

    #[tokio::test]
    async fn test_increase_sorts_tokens() {
        let (ledger, manager) = setup();
        ledger.add_position(U256::from(7u64), position(CALLER, 100));

        manager
            .increase_liquidity(U256::from(7u64), TOKEN_B, TOKEN_A, U256::from(50u64), U256::from(30u64))
            .await
            .unwrap();

        assert_eq!(ledger.balance(TOKEN_A, CALLER), U256::from(970u64));
        assert_eq!(ledger.balance(TOKEN_B, CALLER), U256::from(950u64));
        assert_eq!(ledger.position(U256::from(7u64)).unwrap().liquidity, 130);
    }

    #[tokio::test]
    async fn test_decrease_collect_burn() {
        let (ledger, manager) = setup();
        let id = U256::from(3u64);
        ledger.add_position(id, position(CALLER, 1000));

        manager.decrease_liquidity(id, 50).await.unwrap();
        assert_eq!(ledger.position(id).unwrap().liquidity, 500);

        // Burning a position that still holds liquidity reverts
        let err = manager.burn(id).await.unwrap_err();
        assert_eq!(err.operation(), "burn");

        manager.decrease_liquidity(id, 100).await.unwrap();
        manager.collect(id).await.unwrap();
        manager.burn(id).await.unwrap();
        assert!(ledger.position(id).is_none());
    }

    #[tokio::test]
    async fn test_decrease_rejects_over_100_percent() {
        let (ledger, manager) = setup();
        ledger.add_position(U256::from(3u64), position(CALLER, 1000));

        let err = manager.decrease_liquidity(U256::from(3u64), 101).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert_eq!(ledger.write_count(), 0);
        assert!(ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_lp_tokens_in_order() {
        let (ledger, manager) = setup();
        ledger.add_position(U256::from(4u64), position(CALLER, 1));
        ledger.add_position(U256::from(5u64), position(OTHER, 1));
        ledger.add_position(U256::from(9u64), position(CALLER, 1));

        let tokens = manager.lp_tokens(CALLER).await.unwrap();
        assert_eq!(
            tokens,
            vec![
                LpToken { token_id: U256::from(4u64), index: 0 },
                LpToken { token_id: U256::from(9u64), index: 1 },
            ]
        );
        assert!(manager.lp_tokens(address!("0000000000000000000000000000000000000099")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_position_apy() {
        let (ledger, manager) = setup();
        ledger.add_position(U256::from(1u64), position(CALLER, WAD.to::<u128>()));

        let report = manager.calculate_position_apy(U256::from(1u64), None).await.unwrap();
        assert_eq!(report.fees_earned.token0_amount, 3.0);
        assert_eq!(report.fees_earned.token1_amount, 1.0);
        assert_eq!(report.position_value, 2.0);
        assert!((report.apy.value().unwrap() - 200.0).abs() < 1e-9);

        let report = manager
            .calculate_position_apy(U256::from(1u64), Some(0.0))
            .await
            .unwrap();
        assert!(matches!(report.apy, Apy::NotComputable(_)));
    }

    #[tokio::test]
    async fn test_swaps_gate_the_input_token() {
        let (ledger, manager) = setup();
        let router = manager.swap_router_address();

        manager
            .swap_exact_input_single(TOKEN_A, TOKEN_B, U256::from(100u64), U256::from(90u64), U160::ZERO, 60)
            .await
            .unwrap();
        assert_eq!(ledger.balance(TOKEN_A, CALLER), U256::from(900u64));
        assert_eq!(ledger.balance(TOKEN_B, CALLER), U256::from(1_100u64));

        // Allowance for the maximum covers the pull; leftover stays approved
        manager
            .swap_exact_output_single(TOKEN_B, TOKEN_A, U256::from(40u64), U256::from(50u64), U160::ZERO, 60)
            .await
            .unwrap();
        assert_eq!(ledger.balance(TOKEN_A, CALLER), U256::from(940u64));
        assert_eq!(ledger.allowance(TOKEN_B, CALLER, router), U256::from(10u64));
        assert_eq!(ledger.calls_to(IERC20::approveCall::SIGNATURE), 2);
    }

    #[test]
    fn test_encode_path() {
        let path = encode_path(TOKEN_A, &[TOKEN_C], TOKEN_B).unwrap();
        assert_eq!(path.len(), 60);
        assert_eq!(&path[..20], TOKEN_A.as_slice());
        assert_eq!(&path[20..40], TOKEN_C.as_slice());
        assert_eq!(&path[40..], TOKEN_B.as_slice());

        assert_eq!(encode_path(TOKEN_A, &[], TOKEN_B).unwrap().len(), 40);
        assert!(encode_path(TOKEN_A, &[TOKEN_A], TOKEN_B).is_none());
        assert!(encode_path(TOKEN_A, &[], TOKEN_A).is_none());
    }

    #[tokio::test]
    async fn test_multi_hop_swaps_gate_the_input_token() {
        let (ledger, manager) = setup();
        let router = manager.swap_router_address();

        manager
            .swap_exact_input_multi_hop(TOKEN_A, &[TOKEN_C], TOKEN_B, U256::from(100u64), U256::from(90u64), 60)
            .await
            .unwrap();
        assert_eq!(ledger.balance(TOKEN_A, CALLER), U256::from(900u64));
        assert_eq!(ledger.balance(TOKEN_B, CALLER), U256::from(1_100u64));
        assert_eq!(ledger.allowance(TOKEN_A, CALLER, router), U256::ZERO);

        manager
            .swap_exact_output_multi_hop(TOKEN_B, &[TOKEN_C], TOKEN_A, U256::from(40u64), U256::from(50u64), 60)
            .await
            .unwrap();
        assert_eq!(ledger.balance(TOKEN_A, CALLER), U256::from(940u64));
        assert_eq!(ledger.balance(TOKEN_B, CALLER), U256::from(1_060u64));
        assert_eq!(ledger.allowance(TOKEN_B, CALLER, router), U256::from(10u64));
        assert_eq!(
            ledger.writes(),
            vec![
                IERC20::approveCall::SIGNATURE,
                ISwapRouter::exactInputCall::SIGNATURE,
                IERC20::approveCall::SIGNATURE,
                ISwapRouter::exactOutputCall::SIGNATURE,
            ]
        );
    }

    #[tokio::test]
    async fn test_multi_hop_rejects_repeated_hop() {
        let (ledger, manager) = setup();
        let err = manager
            .swap_exact_input_multi_hop(TOKEN_A, &[TOKEN_B], TOKEN_B, U256::from(1u64), U256::ZERO, 60)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { operation: "swap_exact_input_multi_hop", .. }));
        assert!(ledger.calls().is_empty());
    }
}
