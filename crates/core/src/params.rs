//! Tool parameters as they arrive over JSON.
//!
//! Field names are camelCase. Amounts and token ids travel as decimal
//! strings so they survive JSON number precision; addresses stay strings
//! until the ledger resolves them.

use crate::error::{EngineError, Result};
use crate::math::to_base_units;
use crate::voting::VoterType;
use alloy::primitives::{U160, U256};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Upper bound on `numLoops` accepted from callers.
pub const MAX_LOOPS: u8 = 5;

const DEFAULT_RATE_MODE: u8 = 2;
const DEFAULT_DEADLINE_SECS: u64 = 60;

/// Deserializable, self-describing tool input.
pub trait ToolParams: DeserializeOwned + JsonSchema + Send + 'static {
    /// Reject out-of-range values before any chain access.
    fn validate(&self, _operation: &'static str) -> Result<()> {
        Ok(())
    }
}

/// Parse a base-10 integer string.
pub fn parse_amount(operation: &'static str, field: &str, value: &str) -> Result<U256> {
    U256::from_str_radix(value.trim(), 10)
        .map_err(|e| EngineError::validation(operation, format!("{field} '{value}' is not a valid amount: {e}")))
}

pub fn parse_optional_amount(operation: &'static str, field: &str, value: Option<&str>) -> Result<Option<U256>> {
    value.map(|v| parse_amount(operation, field, v)).transpose()
}

fn parse_sqrt_price(operation: &'static str, value: &str) -> Result<U160> {
    U160::from_str_radix(value.trim(), 10).map_err(|e| {
        EngineError::validation(operation, format!("limitSqrtPrice '{value}' is not a valid uint160: {e}"))
    })
}

fn default_rate_mode() -> u8 {
    DEFAULT_RATE_MODE
}

fn default_deadline() -> u64 {
    DEFAULT_DEADLINE_SECS
}

fn default_sqrt_price_limit() -> String {
    "0".to_string()
}

fn check_rate_mode(operation: &'static str, mode: u8) -> Result<()> {
    if !(1..=2).contains(&mode) {
        return Err(EngineError::validation(
            operation,
            format!("interestRateMode must be 1 (stable) or 2 (variable), got {mode}"),
        ));
    }
    Ok(())
}

// ---- shared shapes ----

/// No parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoParams {}

impl ToolParams for NoParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetParams {
    /// Address of the lending reserve's underlying asset
    pub asset_address: String,
}

impl ToolParams for AssetParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenParams {
    /// Token contract address
    pub token_address: String,
}

impl ToolParams for TokenParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenIdParams {
    /// Position NFT id
    pub token_id: String,
}

impl ToolParams for TokenIdParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "tokenId", &self.token_id).map(drop)
    }
}

// ---- lending and loops ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoopDepositParams {
    /// Address of the asset to deposit and borrow
    pub asset_address: String,
    /// Initial deposit in base units
    pub initial_amount: String,
    /// Borrow-and-redeposit rounds, 1 to 5 (default 2)
    #[serde(default)]
    pub num_loops: Option<u8>,
    #[serde(default)]
    pub referral_code: u16,
}

impl ToolParams for LoopDepositParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "initialAmount", &self.initial_amount)?;
        if let Some(loops) = self.num_loops {
            if !(1..=MAX_LOOPS).contains(&loops) {
                return Err(EngineError::validation(
                    operation,
                    format!("numLoops must be between 1 and {MAX_LOOPS}, got {loops}"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositParams {
    pub asset_address: String,
    /// Amount in base units
    pub amount: String,
    #[serde(default)]
    pub referral_code: u16,
}

impl ToolParams for DepositParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amount", &self.amount).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowParams {
    pub asset_address: String,
    /// Amount in base units
    pub amount: String,
    /// 1 for stable, 2 for variable
    #[serde(default = "default_rate_mode")]
    pub interest_rate_mode: u8,
    #[serde(default)]
    pub referral_code: u16,
}

impl ToolParams for BorrowParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amount", &self.amount)?;
        check_rate_mode(operation, self.interest_rate_mode)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawParams {
    pub asset_address: String,
    /// Amount in base units; the full balance when omitted
    #[serde(default)]
    pub amount: Option<String>,
}

impl ToolParams for WithdrawParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_optional_amount(operation, "amount", self.amount.as_deref()).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepayParams {
    pub asset_address: String,
    /// Amount in base units; the full variable debt when omitted
    #[serde(default)]
    pub amount: Option<String>,
    /// 1 for stable, 2 for variable
    #[serde(default = "default_rate_mode")]
    pub interest_rate_mode: u8,
}

impl ToolParams for RepayParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_optional_amount(operation, "amount", self.amount.as_deref())?;
        check_rate_mode(operation, self.interest_rate_mode)
    }
}

// ---- troves ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowIusdParams {
    /// Collateral token to wrap into its ic-vault
    pub token_address: String,
    /// Collateral in base units
    pub token_amount: String,
    /// iUSD to mint, 18 decimals
    #[serde(rename = "iUSDAmount")]
    pub iusd_amount: String,
}

impl ToolParams for BorrowIusdParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "tokenAmount", &self.token_amount)?;
        parse_amount(operation, "iUSDAmount", &self.iusd_amount).map(drop)
    }
}

// ---- liquidity ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwapExactInputParams {
    pub token_in_address: String,
    pub token_out_address: String,
    /// Exact input in base units
    pub amount_in: String,
    /// Minimum output in base units
    pub amount_out_minimum: String,
    /// Price limit as sqrt(price) * 2^96, 0 for none
    #[serde(default = "default_sqrt_price_limit")]
    pub limit_sqrt_price: String,
    /// Seconds from now until the swap expires
    #[serde(default = "default_deadline")]
    pub deadline: u64,
}

impl SwapExactInputParams {
    pub fn limit(&self, operation: &'static str) -> Result<U160> {
        parse_sqrt_price(operation, &self.limit_sqrt_price)
    }
}

impl ToolParams for SwapExactInputParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amountIn", &self.amount_in)?;
        parse_amount(operation, "amountOutMinimum", &self.amount_out_minimum)?;
        self.limit(operation).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwapExactOutputParams {
    pub token_in_address: String,
    pub token_out_address: String,
    /// Exact output in base units
    pub amount_out: String,
    /// Maximum input in base units
    pub amount_in_maximum: String,
    /// Price limit as sqrt(price) * 2^96, 0 for none
    #[serde(default = "default_sqrt_price_limit")]
    pub limit_sqrt_price: String,
    /// Seconds from now until the swap expires
    #[serde(default = "default_deadline")]
    pub deadline: u64,
}

impl SwapExactOutputParams {
    pub fn limit(&self, operation: &'static str) -> Result<U160> {
        parse_sqrt_price(operation, &self.limit_sqrt_price)
    }
}

impl ToolParams for SwapExactOutputParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amountOut", &self.amount_out)?;
        parse_amount(operation, "amountInMaximum", &self.amount_in_maximum)?;
        self.limit(operation).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiHopExactInputParams {
    pub token_in_address: String,
    /// Tokens routed through between input and output, in order
    #[serde(default)]
    pub intermediate_tokens: Vec<String>,
    pub token_out_address: String,
    /// Exact input in base units
    pub amount_in: String,
    /// Minimum output in base units
    pub amount_out_minimum: String,
    /// Seconds from now until the swap expires
    #[serde(default = "default_deadline")]
    pub deadline: u64,
}

impl ToolParams for MultiHopExactInputParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amountIn", &self.amount_in)?;
        parse_amount(operation, "amountOutMinimum", &self.amount_out_minimum).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiHopExactOutputParams {
    pub token_in_address: String,
    /// Tokens routed through between input and output, in order
    #[serde(default)]
    pub intermediate_tokens: Vec<String>,
    pub token_out_address: String,
    /// Exact output in base units
    pub amount_out: String,
    /// Maximum input in base units
    pub amount_in_maximum: String,
    /// Seconds from now until the swap expires
    #[serde(default = "default_deadline")]
    pub deadline: u64,
}

impl ToolParams for MultiHopExactOutputParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amountOut", &self.amount_out)?;
        parse_amount(operation, "amountInMaximum", &self.amount_in_maximum).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MintPositionParams {
    pub token0_address: String,
    pub token1_address: String,
    pub amount0_desired: String,
    pub amount1_desired: String,
    /// Range width chosen by the liquidity calculator
    pub risk_level: u8,
    /// Seconds from now until the mint expires
    #[serde(default = "default_deadline")]
    pub deadline: u64,
}

impl ToolParams for MintPositionParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amount0Desired", &self.amount0_desired)?;
        parse_amount(operation, "amount1Desired", &self.amount1_desired).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncreaseLiquidityParams {
    pub token_id: String,
    pub token0_address: String,
    pub token1_address: String,
    pub amount0_desired: String,
    pub amount1_desired: String,
}

impl ToolParams for IncreaseLiquidityParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "tokenId", &self.token_id)?;
        parse_amount(operation, "amount0Desired", &self.amount0_desired)?;
        parse_amount(operation, "amount1Desired", &self.amount1_desired).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecreaseLiquidityParams {
    pub token_id: String,
    /// Share of the position's liquidity to remove, 0 to 100
    pub percentage: u8,
}

impl ToolParams for DecreaseLiquidityParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "tokenId", &self.token_id)?;
        if self.percentage > 100 {
            return Err(EngineError::validation(
                operation,
                format!("percentage must be between 0 and 100, got {}", self.percentage),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LpTokensParams {
    /// Owner of the position NFTs
    pub user_address: String,
}

impl ToolParams for LpTokensParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PositionApyParams {
    pub token_id: String,
    /// Period the fees accrued over, 365 when omitted
    #[serde(default)]
    pub days_to_consider: Option<f64>,
}

impl ToolParams for PositionApyParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "tokenId", &self.token_id).map(drop)
    }
}

// ---- gauge voting ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoterParams {
    pub voter_type: VoterType,
}

impl ToolParams for VoterParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GaugeInfoParams {
    pub voter_type: VoterType,
    /// Name fragment or address of the gauge
    pub gauge_identifier: String,
    #[serde(default)]
    pub is_address: bool,
}

impl ToolParams for GaugeInfoParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GaugeVoteParams {
    /// Name fragment or address of the gauge
    pub gauge_identifier: String,
    #[serde(default)]
    pub is_address: bool,
    /// Percent of voting power for this gauge
    pub weight: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteParams {
    pub voter_type: VoterType,
    /// veNFT carrying the voting power
    pub token_id: String,
    /// Weights must add up to 100
    pub votes: Vec<GaugeVoteParams>,
}

impl ToolParams for VoteParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "tokenId", &self.token_id)?;
        if self.votes.is_empty() {
            return Err(EngineError::validation(operation, "at least one vote is required"));
        }
        for vote in &self.votes {
            parse_amount(operation, "weight", &vote.weight)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VotingPowerParams {
    pub voter_type: VoterType,
    pub token_id: String,
}

impl ToolParams for VotingPowerParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "tokenId", &self.token_id).map(drop)
    }
}

// ---- ERC-20 ----

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceParams {
    pub token_address: String,
    pub wallet: String,
    /// Asset name used to look up the USD price feed
    pub name: String,
    pub token_decimals: u8,
}

impl ToolParams for TokenBalanceParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceParams {
    pub token_address: String,
    pub owner: String,
    pub spender: String,
}

impl ToolParams for AllowanceParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveParams {
    pub token_address: String,
    pub spender: String,
    /// Amount in base units
    pub amount: String,
}

impl ToolParams for ApproveParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amount", &self.amount).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeApprovalParams {
    pub token_address: String,
    pub spender: String,
}

impl ToolParams for RevokeApprovalParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    pub token_address: String,
    pub to: String,
    /// Amount in base units
    pub amount: String,
}

impl ToolParams for TransferParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amount", &self.amount).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferFromParams {
    pub token_address: String,
    pub from: String,
    pub to: String,
    /// Amount in base units
    pub amount: String,
}

impl ToolParams for TransferFromParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amount", &self.amount).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenSymbolParams {
    /// Token symbol, e.g. USDC
    pub symbol: String,
}

impl ToolParams for TokenSymbolParams {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToBaseUnitParams {
    /// Amount in whole tokens, e.g. "1.5"
    pub amount: String,
    pub decimals: u8,
}

impl ToBaseUnitParams {
    pub fn base_units(&self, operation: &'static str) -> Result<U256> {
        to_base_units(&self.amount, self.decimals).ok_or_else(|| {
            EngineError::validation(
                operation,
                format!(
                    "amount '{}' is not a non-negative decimal with at most {} fractional digits",
                    self.amount, self.decimals
                ),
            )
        })
    }
}

impl ToolParams for ToBaseUnitParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        self.base_units(operation).map(drop)
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FromBaseUnitParams {
    /// Amount in base units
    pub amount: String,
    pub decimals: u8,
}

impl ToolParams for FromBaseUnitParams {
    fn validate(&self, operation: &'static str) -> Result<()> {
        parse_amount(operation, "amount", &self.amount)?;
        if self.decimals > 77 {
            return Err(EngineError::validation(operation, "decimals must be at most 77"));
        }
        Ok(())
    }
}
