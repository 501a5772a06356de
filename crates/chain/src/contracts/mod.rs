//! Contract bindings for the protocols the engine drives.
//!
//! Bindings are plain `sol!` interfaces; calls are encoded here and sent
//! through a [`LedgerClient`](crate::LedgerClient), never through an
//! Alloy contract instance, so the same code runs against the RPC ledger
//! and in-memory test ledgers.
//!
//! - [`erc20`]: token balances, allowances, approvals, transfers
//! - [`lending`]: lending pool and protocol data provider (Aave v2 layout)
//! - [`troves`]: trove manager, borrower operations, hint helpers, collateral vaults
//! - [`algebra`]: concentrated-liquidity factory, pool, position manager, router
//! - [`voting`]: gauge voter, epoch clock, voting escrow

pub mod algebra;
pub mod erc20;
pub mod lending;
pub mod troves;
pub mod voting;

/// Interest rate mode for variable-rate borrows and repays.
pub const VARIABLE_RATE_MODE: u64 = 2;
