//! Configuration for the position-management engine.
//!
//! This module provides:
//! - Engine tuning (loop haircut, trove fees, deadlines, HTTP endpoints)
//! - Protocol contract addresses and known tokens with Mode mainnet defaults

mod agent;
mod protocol;

pub use agent::{
    AgentConfig, ApiSettings, LiquiditySettings, LoopSettings, TroveSettings, CONFIG_PATH_ENV,
};
pub use protocol::{
    IroncladContracts, KimContracts, TokenInfo, TokenTable, VoterContracts, VotingContracts,
};
