//! Engine configuration.
//!
//! One TOML file (path in `MIDAS_CONFIG`) with every section optional.
//! `${VAR}` patterns are expanded from the environment before parsing so
//! addresses and URLs can be injected per deployment.

use super::protocol::{IroncladContracts, KimContracts, TokenTable, VotingContracts};
use alloy::primitives::U256;
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "MIDAS_CONFIG";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub ironclad: IroncladContracts,

    #[serde(default)]
    pub kim: KimContracts,

    #[serde(default)]
    pub mode_voting: VotingContracts,

    /// Leveraged loop tuning
    #[serde(default)]
    pub loops: LoopSettings,

    #[serde(default)]
    pub troves: TroveSettings,

    #[serde(default)]
    pub liquidity: LiquiditySettings,

    /// Off-chain lookups
    #[serde(default)]
    pub api: ApiSettings,

    /// Tokens resolvable by symbol
    #[serde(default)]
    pub tokens: TokenTable,
}

/// Leveraged loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSettings {
    /// Safety margin taken off every unwind withdrawal
    #[serde(default = "default_withdraw_haircut_bps")]
    pub withdraw_haircut_bps: u16,

    #[serde(default = "default_max_loops")]
    pub max_loops: u8,

    #[serde(default = "default_default_loops")]
    pub default_loops: u8,

    /// Hard stop for the unwind loop
    #[serde(default = "default_max_unwind_iterations")]
    pub max_unwind_iterations: u32,
}

fn default_withdraw_haircut_bps() -> u16 {
    50
}
fn default_max_loops() -> u8 {
    5
}
fn default_default_loops() -> u8 {
    2
}
fn default_max_unwind_iterations() -> u32 {
    64
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            withdraw_haircut_bps: default_withdraw_haircut_bps(),
            max_loops: default_max_loops(),
            default_loops: default_default_loops(),
            max_unwind_iterations: default_max_unwind_iterations(),
        }
    }
}

/// Trove borrowing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveSettings {
    /// Debt reserved by the protocol and refunded on close (18 decimals)
    #[serde(default = "default_gas_compensation")]
    pub gas_compensation: U256,

    /// Max borrowing fee accepted by `openTrove` (18 decimals, 5e15 = 0.5%)
    #[serde(default = "default_max_fee_percentage")]
    pub max_fee_percentage: U256,

    /// Hint trials = ceil(multiplier * sqrt(trove count))
    #[serde(default = "default_hint_trials_multiplier")]
    pub hint_trials_multiplier: u64,
}

fn default_gas_compensation() -> U256 {
    U256::from(10u64) * crate::math::WAD
}
fn default_max_fee_percentage() -> U256 {
    U256::from(5_000_000_000_000_000u64)
}
fn default_hint_trials_multiplier() -> u64 {
    15
}

impl Default for TroveSettings {
    fn default() -> Self {
        Self {
            gas_compensation: default_gas_compensation(),
            max_fee_percentage: default_max_fee_percentage(),
            hint_trials_multiplier: default_hint_trials_multiplier(),
        }
    }
}

/// Liquidity position parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquiditySettings {
    /// Deadline offset for mint and decrease transactions
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Concurrent reads when enumerating LP NFTs or gauges
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

fn default_deadline_secs() -> u64 {
    60
}
fn default_read_concurrency() -> usize {
    8
}

impl Default for LiquiditySettings {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            read_concurrency: default_read_concurrency(),
        }
    }
}

/// HTTP endpoints for best-effort lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,

    #[serde(default = "default_pyth_url")]
    pub pyth_url: String,

    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_ipfs_gateway() -> String {
    midas_api::DEFAULT_IPFS_GATEWAY.to_string()
}
fn default_pyth_url() -> String {
    midas_api::DEFAULT_HERMES_URL.to_string()
}
fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            ipfs_gateway: default_ipfs_gateway(),
            pyth_url: default_pyth_url(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl ApiSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse a TOML document after `${VAR}` expansion.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(&expand_env(content)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `MIDAS_CONFIG` when set, otherwise use the built-in defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            u64::from(self.loops.withdraw_haircut_bps) < crate::math::BPS_DENOMINATOR,
            "loops.withdraw_haircut_bps must be below 10000"
        );
        ensure!(
            (1..=self.loops.max_loops).contains(&self.loops.default_loops),
            "loops.default_loops must be between 1 and loops.max_loops"
        );
        ensure!(
            self.loops.max_unwind_iterations > 0,
            "loops.max_unwind_iterations must be positive"
        );
        ensure!(
            self.troves.hint_trials_multiplier > 0,
            "troves.hint_trials_multiplier must be positive"
        );
        ensure!(
            self.liquidity.read_concurrency > 0,
            "liquidity.read_concurrency must be positive"
        );
        for (symbol, token) in self.tokens.iter() {
            ensure!(token.decimals <= 77, "tokens.{symbol}.decimals must be at most 77");
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(
            lending_pool = %self.ironclad.lending_pool,
            data_provider = %self.ironclad.protocol_data_provider,
            borrower_operations = %self.ironclad.borrower_operations,
            vaults = self.ironclad.vaults.len(),
            "Ironclad contracts"
        );
        tracing::info!(
            position_manager = %self.kim.position_manager,
            swap_router = %self.kim.swap_router,
            "Kim contracts"
        );
        tracing::info!(
            haircut_bps = self.loops.withdraw_haircut_bps,
            max_loops = self.loops.max_loops,
            default_loops = self.loops.default_loops,
            max_unwind_iterations = self.loops.max_unwind_iterations,
            "Loop settings"
        );
        tracing::info!(
            gas_compensation = %self.troves.gas_compensation,
            max_fee = %self.troves.max_fee_percentage,
            trials_multiplier = self.troves.hint_trials_multiplier,
            "Trove settings"
        );
        tracing::info!(count = self.tokens.len(), "Known tokens");
    }
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
///
/// Unset variables are left as written so the parse error points at them.
fn expand_env(s: &str) -> anyhow::Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")?;
    let expanded = re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}
