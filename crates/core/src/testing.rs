//! In-memory ledger for engine tests.
//!
//! Decodes calldata with the same `sol!` bindings the engine encodes with,
//! applies a simplified model of each protocol, and records every call.
//! Reverted transactions leave the state untouched.

use crate::config::AgentConfig;
use alloy::primitives::aliases::{I24, U40, U96};
use alloy::primitives::{address, Address, Bytes, B256, U160, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use midas_chain::contracts::algebra::{
    IAlgebraFactory, IAlgebraPool, ILiquidityCalculator, INonfungiblePositionManager, ISwapRouter,
};
use midas_chain::contracts::erc20::IERC20;
use midas_chain::contracts::lending::{ILendingPool, IProtocolDataProvider};
use midas_chain::contracts::troves::{
    IBorrowerOperations, ICollateralVault, IHintHelpers, ITroveManager,
};
use midas_chain::contracts::voting::{Gauge, IEpochClock, IGaugeVoter, IVotingEscrow};
use midas_chain::{LedgerClient, LedgerError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// Default caller (first anvil account).
pub const CALLER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub to: Address,
    pub function: &'static str,
    pub write: bool,
}

/// Caller's position in one lending reserve plus the reserve's risk parameters.
#[derive(Debug, Clone, Default)]
pub struct SimReserve {
    pub collateral: U256,
    pub stable_debt: U256,
    pub variable_debt: U256,
    pub ltv: u64,
    pub liquidation_threshold: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimTrove {
    pub status: u64,
    pub coll: U256,
    pub debt: U256,
}

#[derive(Debug, Clone)]
pub struct SimPool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub sqrt_price_x96: U160,
    pub fee_growth0: U256,
    pub fee_growth1: U256,
}

#[derive(Debug, Clone)]
pub struct SimPosition {
    pub owner: Address,
    pub token0: Address,
    pub token1: Address,
    pub liquidity: u128,
    pub fee_growth_inside0: U256,
    pub fee_growth_inside1: U256,
}

#[derive(Debug, Clone)]
pub struct SimGauge {
    pub address: Address,
    pub active: bool,
    pub created: U256,
    pub metadata_uri: String,
    pub votes: U256,
}

#[derive(Debug, Clone, Default)]
struct State {
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    decimals: HashMap<Address, u8>,
    reserves: HashMap<Address, SimReserve>,
    vaults: HashMap<Address, Address>,
    troves: HashMap<Address, SimTrove>,
    trove_owners: u64,
    hint: Address,
    hint_request: Option<(U256, U256)>,
    open_hints: Option<(Address, Address)>,
    pools: Vec<SimPool>,
    positions: BTreeMap<U256, SimPosition>,
    next_token_id: u64,
    gauges: Vec<SimGauge>,
    voting_active: bool,
    approved: bool,
    voting_power: U256,
    used_voting_power: U256,
    keep_used_power_on_reset: bool,
    last_votes: Vec<(Address, U256)>,
    failing: Option<&'static str>,
    tx_count: u64,
}

/// First and last token of a packed router path.
fn path_ends(path: &[u8]) -> Result<(Address, Address), String> {
    if path.len() < 40 || path.len() % 20 != 0 {
        return Err(format!("malformed path of {} bytes", path.len()));
    }
    Ok((
        Address::from_slice(&path[..20]),
        Address::from_slice(&path[path.len() - 20..]),
    ))
}

impl State {
    fn balance(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }

    fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        let entry = self.balances.entry((token, holder)).or_default();
        *entry += amount;
    }

    fn debit(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), String> {
        let balance = self.balance(token, holder);
        if balance < amount {
            return Err(format!("insufficient balance of {token}"));
        }
        self.balances.insert((token, holder), balance - amount);
        Ok(())
    }

    /// `transferFrom` as seen by `spender`.
    fn pull(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), String> {
        let allowance = self
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default();
        if allowance < amount {
            return Err(format!("insufficient allowance of {token} for {spender}"));
        }
        self.debit(token, owner, amount)?;
        self.allowances
            .insert((token, owner, spender), allowance - amount);
        Ok(())
    }

    fn reserve(&self, asset: Address) -> Result<SimReserve, String> {
        self.reserves
            .get(&asset)
            .cloned()
            .ok_or_else(|| format!("reserve {asset} not initialized"))
    }

    fn reserve_mut(&mut self, asset: Address) -> Result<&mut SimReserve, String> {
        self.reserves
            .get_mut(&asset)
            .ok_or_else(|| format!("reserve {asset} not initialized"))
    }

    fn pool(&self, address: Address) -> Result<&SimPool, String> {
        self.pools
            .iter()
            .find(|p| p.address == address)
            .ok_or_else(|| format!("unknown pool {address}"))
    }

    fn position(&self, token_id: U256) -> Result<&SimPosition, String> {
        self.positions
            .get(&token_id)
            .ok_or_else(|| "Invalid token ID".to_string())
    }

    fn gauge(&self, address: Address) -> Result<&SimGauge, String> {
        self.gauges
            .iter()
            .find(|g| g.address == address)
            .ok_or_else(|| format!("unknown gauge {address}"))
    }
}

/// Decode the call whose selector matches, evaluate the body and return
/// `(signature, encoded returns)` from the enclosing function.
macro_rules! answer {
    ($data:expr; $($call:ty => |$c:pat_param| $body:expr;)*) => {
        $(
            if $data.starts_with(&<$call as SolCall>::SELECTOR) {
                let $c = <$call as SolCall>::abi_decode($data, true).map_err(|e| e.to_string())?;
                let returns = $body;
                return Ok((
                    <$call as SolCall>::SIGNATURE,
                    <$call as SolCall>::abi_encode_returns(&returns),
                ));
            }
        )*
    };
}

/// Like [`answer!`] for transactions: the body mutates state and may revert.
macro_rules! apply {
    ($data:expr; $($call:ty => |$c:pat_param| $body:expr;)*) => {
        $(
            if $data.starts_with(&<$call as SolCall>::SELECTOR) {
                let $c = <$call as SolCall>::abi_decode($data, true).map_err(|e| e.to_string())?;
                let outcome: Result<(), String> = (|| $body)();
                return Ok((<$call as SolCall>::SIGNATURE, outcome));
            }
        )*
    };
}

#[derive(Debug)]
pub struct SimulatedLedger {
    caller: Address,
    config: AgentConfig,
    state: Mutex<State>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLedger {
    /// Ledger wired to the default contract addresses.
    pub fn new() -> Self {
        Self::with_config(AgentConfig::default())
    }

    pub fn with_config(config: AgentConfig) -> Self {
        let state = State {
            voting_active: true,
            approved: true,
            ..Default::default()
        };
        Self {
            caller: CALLER,
            config,
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    // ---- seeding ----

    pub fn set_balance(&self, token: Address, holder: Address, amount: U256) {
        self.state.lock().balances.insert((token, holder), amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.state
            .lock()
            .allowances
            .insert((token, owner, spender), amount);
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.state.lock().decimals.insert(token, decimals);
    }

    /// Initialize a lending reserve with LTV and liquidation threshold in bps.
    pub fn set_reserve(&self, asset: Address, ltv: u64, liquidation_threshold: u64) {
        let mut state = self.state.lock();
        let reserve = state.reserves.entry(asset).or_default();
        reserve.ltv = ltv;
        reserve.liquidation_threshold = liquidation_threshold;
    }

    /// Place collateral and debt directly, bypassing the pool checks.
    pub fn set_lending_position(&self, asset: Address, collateral: U256, variable_debt: U256) {
        let mut state = self.state.lock();
        let reserve = state.reserves.entry(asset).or_default();
        reserve.collateral = collateral;
        reserve.variable_debt = variable_debt;
    }

    pub fn add_vault(&self, vault: Address, underlying: Address) {
        self.state.lock().vaults.insert(vault, underlying);
    }

    pub fn set_trove(&self, collateral: Address, trove: SimTrove) {
        self.state.lock().troves.insert(collateral, trove);
    }

    pub fn set_trove_owners(&self, count: u64) {
        self.state.lock().trove_owners = count;
    }

    pub fn set_hint(&self, hint: Address) {
        self.state.lock().hint = hint;
    }

    pub fn add_pool(&self, pool: SimPool) {
        self.state.lock().pools.push(pool);
    }

    pub fn add_position(&self, token_id: U256, position: SimPosition) {
        self.state.lock().positions.insert(token_id, position);
    }

    pub fn add_gauge(&self, gauge: SimGauge) {
        self.state.lock().gauges.push(gauge);
    }

    pub fn set_voting(&self, active: bool, approved: bool, voting_power: U256) {
        let mut state = self.state.lock();
        state.voting_active = active;
        state.approved = approved;
        state.voting_power = voting_power;
    }

    pub fn set_used_voting_power(&self, used: U256) {
        self.state.lock().used_voting_power = used;
    }

    /// Make `reset` leave the used voting power in place.
    pub fn keep_used_power_on_reset(&self) {
        self.state.lock().keep_used_power_on_reset = true;
    }

    /// Revert every call or transaction with this signature.
    pub fn fail_on(&self, signature: &'static str) {
        self.state.lock().failing = Some(signature);
    }

    // ---- inspection ----

    pub fn balance(&self, token: Address, holder: Address) -> U256 {
        self.state.lock().balance(token, holder)
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state
            .lock()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn reserve(&self, asset: Address) -> SimReserve {
        self.state
            .lock()
            .reserves
            .get(&asset)
            .cloned()
            .unwrap_or_default()
    }

    pub fn trove(&self, collateral: Address) -> SimTrove {
        self.state
            .lock()
            .troves
            .get(&collateral)
            .cloned()
            .unwrap_or_default()
    }

    /// `(numTrials, seed)` of the last `getApproxHint` read.
    pub fn hint_request(&self) -> Option<(U256, U256)> {
        self.state.lock().hint_request
    }

    /// `(upper, lower)` hints of the last `openTrove`.
    pub fn open_hints(&self) -> Option<(Address, Address)> {
        self.state.lock().open_hints
    }

    pub fn position(&self, token_id: U256) -> Option<SimPosition> {
        self.state.lock().positions.get(&token_id).cloned()
    }

    pub fn last_votes(&self) -> Vec<(Address, U256)> {
        self.state.lock().last_votes.clone()
    }

    pub fn used_voting_power(&self) -> U256 {
        self.state.lock().used_voting_power
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Reads and writes with this signature.
    pub fn calls_to(&self, signature: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.function == signature)
            .count()
    }

    /// Signatures of every submitted transaction, in order.
    pub fn writes(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.write)
            .map(|c| c.function)
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.write).count()
    }

    fn record(&self, to: Address, function: &'static str, write: bool) {
        self.calls.lock().push(RecordedCall {
            to,
            function,
            write,
        });
    }

    fn answer(&self, state: &mut State, to: Address, data: &[u8]) -> Result<(&'static str, Vec<u8>), String> {
        let caller = self.caller;
        let position_manager = self.config.kim.position_manager;

        answer! { data;
            IERC20::balanceOfCall => |c| {
                if to == position_manager {
                    let owned = state.positions.values().filter(|p| p.owner == c.account).count();
                    (U256::from(owned),)
                } else {
                    (state.balance(to, c.account),)
                }
            };
            IERC20::allowanceCall => |c| {
                (state.allowances.get(&(to, c.owner, c.spender)).copied().unwrap_or_default(),)
            };
            IERC20::totalSupplyCall => |_c| {
                let supply = state
                    .balances
                    .iter()
                    .filter(|((token, _), _)| *token == to)
                    .fold(U256::ZERO, |acc, (_, amount)| acc + *amount);
                (supply,)
            };
            IERC20::decimalsCall => |_c| (state.decimals.get(&to).copied().unwrap_or(18),);
            IERC20::symbolCall => |_c| ("SIM".to_string(),);

            IProtocolDataProvider::getUserReserveDataCall => |c| {
                let r = state.reserve(c.asset)?;
                let user_owned = c.user == caller;
                let pick = |v: U256| if user_owned { v } else { U256::ZERO };
                (
                    pick(r.collateral),
                    pick(r.stable_debt),
                    pick(r.variable_debt),
                    pick(r.stable_debt),
                    pick(r.variable_debt),
                    U256::ZERO,
                    U256::ZERO,
                    U40::ZERO,
                    true,
                )
            };
            IProtocolDataProvider::getReserveConfigurationDataCall => |c| {
                let r = state.reserve(c.asset)?;
                let decimals = state.decimals.get(&c.asset).copied().unwrap_or(18);
                (
                    U256::from(decimals),
                    U256::from(r.ltv),
                    U256::from(r.liquidation_threshold),
                    U256::from(10_500u64),
                    U256::from(1_000u64),
                    true,
                    true,
                    false,
                    true,
                    false,
                )
            };

            ITroveManager::getTroveStatusCall => |c| {
                (U256::from(state.troves.get(&c._collateral).filter(|_| c._borrower == caller).map_or(0, |t| t.status)),)
            };
            ITroveManager::getTroveCollCall => |c| {
                (state.troves.get(&c._collateral).filter(|_| c._borrower == caller).map_or(U256::ZERO, |t| t.coll),)
            };
            ITroveManager::getTroveDebtCall => |c| {
                (state.troves.get(&c._collateral).filter(|_| c._borrower == caller).map_or(U256::ZERO, |t| t.debt),)
            };
            ITroveManager::getTroveOwnersCountCall => |_c| (U256::from(state.trove_owners),);
            IHintHelpers::computeNominalCRCall => |c| {
                if c._debt.is_zero() {
                    (U256::MAX,)
                } else {
                    (c._coll * U256::from(10u64).pow(U256::from(20u64)) / c._debt,)
                }
            };
            IHintHelpers::getApproxHintCall => |c| {
                state.hint_request = Some((c._numTrials, c._inputRandomSeed));
                (state.hint, U256::ZERO, c._inputRandomSeed)
            };

            IAlgebraFactory::poolByPairCall => |c| {
                let pool = state
                    .pools
                    .iter()
                    .find(|p| {
                        (p.token0 == c.tokenA && p.token1 == c.tokenB)
                            || (p.token0 == c.tokenB && p.token1 == c.tokenA)
                    })
                    .map_or(Address::ZERO, |p| p.address);
                (pool,)
            };
            IAlgebraPool::token0Call => |_c| (state.pool(to)?.token0,);
            IAlgebraPool::token1Call => |_c| (state.pool(to)?.token1,);
            IAlgebraPool::totalFeeGrowth0TokenCall => |_c| (state.pool(to)?.fee_growth0,);
            IAlgebraPool::totalFeeGrowth1TokenCall => |_c| (state.pool(to)?.fee_growth1,);
            IAlgebraPool::globalStateCall => |_c| {
                (state.pool(to)?.sqrt_price_x96, I24::ZERO, 100u16, 100u16, 0u16, 0u8, 0u8, true)
            };
            ILiquidityCalculator::calculateOptimalAmountsCall => |c| {
                let lower = I24::try_from(-600i32).map_err(|e| e.to_string())?;
                let upper = I24::try_from(600i32).map_err(|e| e.to_string())?;
                (c.amount0Desired, c.amount1Desired, lower, upper)
            };
            INonfungiblePositionManager::positionsCall => |c| {
                let p = state.position(c.tokenId)?;
                (
                    U96::ZERO,
                    Address::ZERO,
                    p.token0,
                    p.token1,
                    I24::ZERO,
                    I24::ZERO,
                    p.liquidity,
                    p.fee_growth_inside0,
                    p.fee_growth_inside1,
                    0u128,
                    0u128,
                )
            };
            INonfungiblePositionManager::tokenOfOwnerByIndexCall => |c| {
                let id = state
                    .positions
                    .iter()
                    .filter(|(_, p)| p.owner == c.owner)
                    .nth(c.index.saturating_to::<usize>())
                    .map(|(id, _)| *id)
                    .ok_or_else(|| "owner index out of bounds".to_string())?;
                (id,)
            };

            IGaugeVoter::getAllGaugesCall => |_c| (state.gauges.iter().map(|g| g.address).collect::<Vec<_>>(),);
            IGaugeVoter::getGaugeCall => |c| {
                let g = state.gauge(c.gauge)?;
                (Gauge {
                    active: g.active,
                    created: g.created,
                    metadataURI: g.metadata_uri.clone(),
                },)
            };
            IGaugeVoter::gaugeVotesCall => |c| (state.gauge(c.gauge)?.votes,);
            IGaugeVoter::usedVotingPowerCall => |_c| (state.used_voting_power,);
            IEpochClock::votingActiveCall => |_c| (state.voting_active,);
            IVotingEscrow::isApprovedOrOwnerCall => |c| (state.approved && c.spender == caller,);
            IVotingEscrow::votingPowerAtCall => |_c| (state.voting_power,);
        }

        Err("unknown selector".to_string())
    }

    #[allow(clippy::type_complexity)]
    fn apply(
        &self,
        state: &mut State,
        to: Address,
        data: &[u8],
    ) -> Result<(&'static str, Result<(), String>), String> {
        let caller = self.caller;
        let gas_compensation = self.config.troves.gas_compensation;
        let iusd = self.config.ironclad.iusd;

        apply! { data;
            IERC20::approveCall => |c| {
                state.allowances.insert((to, caller, c.spender), c.amount);
                Ok(())
            };
            IERC20::transferCall => |c| {
                state.debit(to, caller, c.amount)?;
                state.credit(to, c.to, c.amount);
                Ok(())
            };
            IERC20::transferFromCall => |c| {
                state.pull(to, c.from, caller, c.amount)?;
                state.credit(to, c.to, c.amount);
                Ok(())
            };

            ILendingPool::depositCall => |c| {
                state.reserve(c.asset)?;
                state.pull(c.asset, caller, to, c.amount)?;
                state.reserve_mut(c.asset)?.collateral += c.amount;
                Ok(())
            };
            ILendingPool::borrowCall => |c| {
                let r = state.reserve(c.asset)?;
                let debt = r.stable_debt + r.variable_debt + c.amount;
                if r.collateral * U256::from(r.ltv) < debt * U256::from(10_000u64) {
                    return Err("borrow exceeds LTV".to_string());
                }
                state.reserve_mut(c.asset)?.variable_debt += c.amount;
                state.credit(c.asset, caller, c.amount);
                Ok(())
            };
            ILendingPool::withdrawCall => |c| {
                let r = state.reserve(c.asset)?;
                let amount = if c.amount == U256::MAX { r.collateral } else { c.amount };
                if amount > r.collateral {
                    return Err("withdraw exceeds balance".to_string());
                }
                let remaining = r.collateral - amount;
                let debt = r.stable_debt + r.variable_debt;
                if remaining * U256::from(r.liquidation_threshold) < debt * U256::from(10_000u64) {
                    return Err("health factor below 1".to_string());
                }
                state.reserve_mut(c.asset)?.collateral = remaining;
                state.credit(c.asset, c.to, amount);
                Ok(())
            };
            ILendingPool::repayCall => |c| {
                let r = state.reserve(c.asset)?;
                let paid = c.amount.min(r.variable_debt);
                state.pull(c.asset, caller, to, paid)?;
                state.reserve_mut(c.asset)?.variable_debt -= paid;
                Ok(())
            };

            ICollateralVault::depositCall => |c| {
                let underlying = *state.vaults.get(&to).ok_or_else(|| "not a vault".to_string())?;
                state.pull(underlying, caller, to, c.assets)?;
                state.credit(to, c.receiver, c.assets);
                Ok(())
            };
            ICollateralVault::withdrawCall => |c| {
                let underlying = *state.vaults.get(&to).ok_or_else(|| "not a vault".to_string())?;
                state.debit(to, caller, c.shares)?;
                state.credit(underlying, caller, c.shares);
                Ok(())
            };

            IBorrowerOperations::openTroveCall => |c| {
                if state.troves.get(&c._collateral).is_some_and(|t| t.status == 1) {
                    return Err("trove is active".to_string());
                }
                state.pull(c._collateral, caller, to, c._collAmount)?;
                state.troves.insert(c._collateral, SimTrove {
                    status: 1,
                    coll: c._collAmount,
                    debt: c._iUSDAmount + gas_compensation,
                });
                state.credit(iusd, caller, c._iUSDAmount);
                state.open_hints = Some((c._upperHint, c._lowerHint));
                Ok(())
            };
            IBorrowerOperations::closeTroveCall => |c| {
                let trove = state
                    .troves
                    .get(&c._collateral)
                    .filter(|t| t.status == 1)
                    .cloned()
                    .ok_or_else(|| "trove is not active".to_string())?;
                state.pull(iusd, caller, to, trove.debt.saturating_sub(gas_compensation))?;
                state.credit(c._collateral, caller, trove.coll);
                state.troves.insert(c._collateral, SimTrove { status: 2, ..Default::default() });
                Ok(())
            };

            INonfungiblePositionManager::mintCall => |c| {
                let p = c.params;
                state.pull(p.token0, caller, to, p.amount0Desired)?;
                state.pull(p.token1, caller, to, p.amount1Desired)?;
                state.next_token_id += 1;
                state.positions.insert(U256::from(state.next_token_id), SimPosition {
                    owner: p.recipient,
                    token0: p.token0,
                    token1: p.token1,
                    liquidity: p.amount0Desired.min(p.amount1Desired).saturating_to(),
                    fee_growth_inside0: U256::ZERO,
                    fee_growth_inside1: U256::ZERO,
                });
                Ok(())
            };
            INonfungiblePositionManager::increaseLiquidityCall => |c| {
                let p = c.params;
                let position = state.position(p.tokenId)?.clone();
                state.pull(position.token0, caller, to, p.amount0Desired)?;
                state.pull(position.token1, caller, to, p.amount1Desired)?;
                let added: u128 = p.amount0Desired.min(p.amount1Desired).saturating_to();
                if let Some(pos) = state.positions.get_mut(&p.tokenId) {
                    pos.liquidity = pos.liquidity.saturating_add(added);
                }
                Ok(())
            };
            INonfungiblePositionManager::decreaseLiquidityCall => |c| {
                let p = c.params;
                let pos = state
                    .positions
                    .get_mut(&p.tokenId)
                    .ok_or_else(|| "Invalid token ID".to_string())?;
                pos.liquidity = pos
                    .liquidity
                    .checked_sub(p.liquidity)
                    .ok_or_else(|| "liquidity underflow".to_string())?;
                Ok(())
            };
            INonfungiblePositionManager::collectCall => |c| {
                state.position(c.params.tokenId)?;
                Ok(())
            };
            INonfungiblePositionManager::burnCall => |c| {
                if state.position(c.tokenId)?.liquidity != 0 {
                    return Err("Not cleared".to_string());
                }
                state.positions.remove(&c.tokenId);
                Ok(())
            };

            ISwapRouter::exactInputSingleCall => |c| {
                let p = c.params;
                state.pull(p.tokenIn, caller, to, p.amountIn)?;
                state.credit(p.tokenOut, p.recipient, p.amountIn.max(p.amountOutMinimum));
                Ok(())
            };
            ISwapRouter::exactOutputSingleCall => |c| {
                let p = c.params;
                if p.amountOut > p.amountInMaximum {
                    return Err("Too much requested".to_string());
                }
                state.pull(p.tokenIn, caller, to, p.amountOut)?;
                state.credit(p.tokenOut, p.recipient, p.amountOut);
                Ok(())
            };

            ISwapRouter::exactInputCall => |c| {
                let p = c.params;
                let (first, last) = path_ends(&p.path)?;
                state.pull(first, caller, to, p.amountIn)?;
                state.credit(last, p.recipient, p.amountIn.max(p.amountOutMinimum));
                Ok(())
            };
            ISwapRouter::exactOutputCall => |c| {
                let p = c.params;
                if p.amountOut > p.amountInMaximum {
                    return Err("Too much requested".to_string());
                }
                // Reversed: output token first
                let (token_out, token_in) = path_ends(&p.path)?;
                state.pull(token_in, caller, to, p.amountOut)?;
                state.credit(token_out, p.recipient, p.amountOut);
                Ok(())
            };

            IGaugeVoter::voteCall => |c| {
                if !state.voting_active {
                    return Err("voting inactive".to_string());
                }
                let mut votes = Vec::new();
                for v in &c.votes {
                    let gauge = state
                        .gauges
                        .iter_mut()
                        .find(|g| g.address == v.gauge)
                        .ok_or_else(|| format!("unknown gauge {}", v.gauge))?;
                    gauge.votes += v.weight;
                    votes.push((v.gauge, v.weight));
                }
                state.used_voting_power = state.voting_power;
                state.last_votes = votes;
                Ok(())
            };
            IGaugeVoter::resetCall => |_c| {
                if !state.keep_used_power_on_reset {
                    state.used_voting_power = U256::ZERO;
                }
                Ok(())
            };
        }

        Err("unknown selector".to_string())
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn caller(&self) -> Address {
        self.caller
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, LedgerError> {
        let mut state = self.state.lock();
        match self.answer(&mut state, to, &calldata) {
            Ok((function, _)) if state.failing == Some(function) => Err(LedgerError::Transport(
                format!("execution reverted: {function} disabled"),
            )),
            Ok((function, output)) => {
                self.record(to, function, false);
                Ok(Bytes::from(output))
            }
            Err(reason) => Err(LedgerError::Transport(format!(
                "execution reverted: {reason}"
            ))),
        }
    }

    async fn send_transaction(&self, to: Address, calldata: Bytes) -> Result<B256, LedgerError> {
        let mut state = self.state.lock();
        state.tx_count += 1;
        let tx_hash = B256::from(U256::from(state.tx_count));

        let before = state.clone();
        let (function, outcome) = match self.apply(&mut state, to, &calldata) {
            Ok((function, outcome)) => (function, outcome),
            Err(reason) => ("unknown", Err(reason)),
        };
        let reverted = outcome.is_err() || before.failing == Some(function);
        self.record(to, function, true);

        if reverted {
            let tx_count = state.tx_count;
            *state = before;
            state.tx_count = tx_count;
            return Err(LedgerError::Reverted { tx_hash });
        }
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midas_chain::{read, submit};

    const TOKEN: Address = address!("00000000000000000000000000000000000000aa");

    #[tokio::test]
    async fn test_reverted_transaction_leaves_state() {
        let ledger = SimulatedLedger::new();
        let pool = ledger.config().ironclad.lending_pool;
        ledger.set_reserve(TOKEN, 8000, 8500);
        ledger.set_balance(TOKEN, CALLER, U256::from(100u64));

        // No allowance: the pool cannot pull the tokens
        let result = submit(
            &ledger,
            pool,
            &ILendingPool::depositCall {
                asset: TOKEN,
                amount: U256::from(100u64),
                onBehalfOf: CALLER,
                referralCode: 0,
            },
        )
        .await;

        assert!(matches!(result, Err(LedgerError::Reverted { .. })));
        assert_eq!(ledger.balance(TOKEN, CALLER), U256::from(100u64));
        assert_eq!(ledger.reserve(TOKEN).collateral, U256::ZERO);
    }

    #[tokio::test]
    async fn test_reads_are_recorded() {
        let ledger = SimulatedLedger::new();
        ledger.set_balance(TOKEN, CALLER, U256::from(7u64));

        let balance = read(&ledger, TOKEN, &IERC20::balanceOfCall { account: CALLER })
            .await
            .unwrap()
            ._0;

        assert_eq!(balance, U256::from(7u64));
        assert_eq!(ledger.calls_to(IERC20::balanceOfCall::SIGNATURE), 1);
        assert_eq!(ledger.write_count(), 0);
    }
}
