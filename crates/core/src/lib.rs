//! Midas position-management core.
//!
//! This crate provides the engine behind every tool the agent exposes:
//! - Risk calculator: health factor, LTV and max-withdrawable math
//! - Approval gate: allowance-checked ERC-20 approvals before pulls
//! - Leveraged loop engine: recursive deposit/borrow and its unwind
//! - Trove borrowing with sorted-list insertion hints
//! - Concentrated-liquidity positions, swaps and fee/APY estimation
//! - Gauge voting with veNFTs
//! - A tool registry mapping names to JSON-schema'd async handlers
//!
//! All chain access goes through [`midas_chain::LedgerClient`]; off-chain
//! lookups (prices, gauge metadata) are best-effort.

mod approval;
pub mod config;
pub mod error;
pub mod hints;
pub mod lending;
pub mod liquidity;
pub mod looping;
pub mod math;
pub mod params;
pub mod position;
mod registry;
pub mod risk;
mod services;
pub mod tokens;
pub mod troves;
pub mod voting;

#[cfg(test)]
mod testing;

pub use approval::ensure_allowance;
pub use config::{
    AgentConfig, ApiSettings, IroncladContracts, KimContracts, TokenInfo, TokenTable, VotingContracts,
};
pub use error::{EngineError, Result};
pub use hints::{FixedSeed, SeedSource, ThreadRngSeeds, TroveHintFinder};
pub use lending::LendingMarket;
pub use liquidity::apy::{Apy, ApyReport};
pub use liquidity::LiquidityManager;
pub use looping::{LoopEngine, UnwindReport};
pub use position::{LiquidityPosition, LoopPosition, PoolState};
pub use registry::{ToolRegistry, ToolSpec};
pub use services::{ExternalSources, Services};
pub use tokens::{TokenBalance, TokenListing, TokenService};
pub use troves::TroveBorrower;
pub use voting::{GaugeVoting, VoterType};
