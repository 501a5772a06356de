//! Tool registry: name → parameter schema + async handler.
//!
//! Built once at startup. Parameters arrive as JSON, are decoded into the
//! typed structs in [`crate::params`] and validated before the handler
//! runs; results go back out as JSON.

use crate::error::{EngineError, Result};
use crate::math::from_base_units;
use crate::params::*;
use crate::services::Services;
use crate::voting::BallotEntry;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

type Handler = Box<dyn Fn(Arc<Services>, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Public description of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the parameters object
    pub parameters: Value,
}

struct Tool {
    spec: ToolSpec,
    handler: Handler,
}

pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Tool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<P: ToolParams>(tool: &'static str, raw: Value) -> Result<P> {
    // Tools without parameters accept a missing body
    let raw = if raw.is_null() { Value::Object(Default::default()) } else { raw };
    let params: P = serde_json::from_value(raw)
        .map_err(|e| EngineError::validation(tool, format!("malformed parameters: {e}")))?;
    params.validate(tool)?;
    Ok(params)
}

fn ballot(operation: &'static str, votes: &[GaugeVoteParams]) -> Result<Vec<BallotEntry>> {
    votes
        .iter()
        .map(|v| -> Result<BallotEntry> {
            Ok(BallotEntry {
                gauge_identifier: v.gauge_identifier.clone(),
                is_address: v.is_address,
                weight: parse_amount(operation, "weight", &v.weight)?,
            })
        })
        .collect()
}

impl ToolRegistry {
    /// Registry with every built-in tool.
    pub fn new() -> Self {
        let mut registry = Self {
            tools: BTreeMap::new(),
        };
        registry.register_lending();
        registry.register_troves();
        registry.register_liquidity();
        registry.register_voting();
        registry.register_erc20();
        debug!(tools = registry.tools.len(), "Tool registry built");
        registry
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values().map(|t| &t.spec)
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|t| &t.spec)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Decode `params` for `name`, validate, and run the handler.
    pub async fn call(&self, services: Arc<Services>, name: &str, params: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| EngineError::validation("call", format!("unknown tool '{name}'")))?;
        info!(tool = name, "Calling tool");
        (tool.handler)(services, params).await
    }

    fn register<P, F, Fut, T>(&mut self, name: &'static str, description: &'static str, handler: F)
    where
        P: ToolParams,
        F: Fn(Arc<Services>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let erased: Handler = Box::new(move |services: Arc<Services>, raw: Value| {
            let params = match decode::<P>(name, raw) {
                Ok(params) => params,
                Err(e) => return future::ready(Err(e)).boxed(),
            };
            let pending = handler(services, params);
            async move {
                let output = pending.await?;
                serde_json::to_value(output)
                    .map_err(|e| EngineError::validation(name, format!("result is not representable as JSON: {e}")))
            }
            .boxed()
        });

        let spec = ToolSpec {
            name,
            description,
            parameters: schemars::schema_for!(P).to_value(),
        };
        self.tools.insert(name, Tool { spec, handler: erased });
    }

    fn register_lending(&mut self) {
        self.register(
            "loop_deposit_ironclad",
            "Perform a looped deposit (recursive borrowing) on Ironclad. Send the initial amount of the asset in base units.",
            |s, p: LoopDepositParams| async move {
                const OP: &str = "loop_deposit";
                let asset = s.resolve(OP, &p.asset_address)?;
                let amount = parse_amount(OP, "initialAmount", &p.initial_amount)?;
                let loops = p.num_loops.unwrap_or(s.config.loops.default_loops);
                s.loops.loop_deposit(asset, amount, loops, p.referral_code).await
            },
        );
        self.register(
            "loop_withdraw_ironclad",
            "Withdraw a looped position on Ironclad",
            |s, p: AssetParams| async move {
                let asset = s.resolve("loop_withdraw", &p.asset_address)?;
                let report = s.loops.loop_withdraw(asset).await?;
                Ok::<_, EngineError>(serde_json::json!({ "message": report.to_string(), "report": report }))
            },
        );
        self.register(
            "monitor_loop_position_ironclad",
            "Monitor health of a looped position on Ironclad",
            |s, p: AssetParams| async move {
                let asset = s.resolve("monitor_loop_position", &p.asset_address)?;
                s.lending.monitor_loop_position(asset).await
            },
        );
        self.register(
            "calculate_max_withdrawable_ironclad",
            "Calculate maximum withdrawable amount while maintaining health factor",
            |s, p: AssetParams| async move {
                let asset = s.resolve("calculate_max_withdrawable", &p.asset_address)?;
                Ok::<_, EngineError>(s.lending.calculate_max_withdrawable(asset).await?.to_string())
            },
        );
        self.register(
            "get_lending_pool_address_ironclad",
            "Get the Lending Pool contract address. Use this address to approve tokens for looped deposit.",
            |s, _p: NoParams| async move { Ok::<_, EngineError>(s.troves.lending_pool_address()) },
        );
        self.register(
            "deposit_ironclad",
            "Deposit an asset into the Ironclad lending pool.",
            |s, p: DepositParams| async move {
                const OP: &str = "deposit";
                let asset = s.resolve(OP, &p.asset_address)?;
                let amount = parse_amount(OP, "amount", &p.amount)?;
                s.lending.deposit(asset, amount, p.referral_code).await
            },
        );
        self.register(
            "borrow_ironclad",
            "Borrow an asset from the Ironclad lending pool.",
            |s, p: BorrowParams| async move {
                const OP: &str = "borrow";
                let asset = s.resolve(OP, &p.asset_address)?;
                let amount = parse_amount(OP, "amount", &p.amount)?;
                s.lending
                    .borrow(asset, amount, u64::from(p.interest_rate_mode), p.referral_code)
                    .await
            },
        );
        self.register(
            "withdraw_ironclad",
            "Withdraw an asset from the Ironclad lending pool. If no amount is specified, withdraws the full balance.",
            |s, p: WithdrawParams| async move {
                const OP: &str = "withdraw";
                let asset = s.resolve(OP, &p.asset_address)?;
                let amount = parse_optional_amount(OP, "amount", p.amount.as_deref())?;
                s.lending.withdraw(asset, amount).await
            },
        );
        self.register(
            "repay_ironclad",
            "Repay borrowed assets to the Ironclad lending pool. If no amount is specified, repays the full variable debt.",
            |s, p: RepayParams| async move {
                const OP: &str = "repay";
                let asset = s.resolve(OP, &p.asset_address)?;
                let amount = parse_optional_amount(OP, "amount", p.amount.as_deref())?;
                s.lending
                    .repay(asset, amount, u64::from(p.interest_rate_mode))
                    .await
            },
        );
        self.register(
            "monitor_lending_position_ironclad",
            "Monitor a lending position in Ironclad",
            |s, p: AssetParams| async move {
                let asset = s.resolve("monitor_lending_position", &p.asset_address)?;
                s.lending.monitor_lending_position(asset).await
            },
        );
    }

    fn register_troves(&mut self) {
        self.register(
            "borrow_iusd_ironclad",
            "Deposit collateral and borrow iUSD against it",
            |s, p: BorrowIusdParams| async move {
                const OP: &str = "borrow_iusd";
                let token = s.resolve(OP, &p.token_address)?;
                let token_amount = parse_amount(OP, "tokenAmount", &p.token_amount)?;
                let iusd_amount = parse_amount(OP, "iUSDAmount", &p.iusd_amount)?;
                s.troves.borrow_iusd(token, token_amount, iusd_amount).await
            },
        );
        self.register(
            "repay_iusd_ironclad",
            "Repay all iUSD and close the Trove position",
            |s, p: TokenParams| async move {
                let token = s.resolve("repay_iusd", &p.token_address)?;
                s.troves.repay_iusd(token).await
            },
        );
        self.register(
            "monitor_position_ironclad",
            "Monitor health of a Trove position",
            |s, p: TokenParams| async move {
                let token = s.resolve("monitor_trove", &p.token_address)?;
                s.troves.monitor_trove(token).await
            },
        );
        self.register(
            "get_ic_vault_ironclad",
            "Get the corresponding ic-vault address for a token. Use this before approving tokens for deposit.",
            |s, p: TokenParams| async move {
                let token = s.resolve("get_ic_vault", &p.token_address)?;
                s.troves.get_ic_vault(token)
            },
        );
        self.register(
            "get_borrower_address_ironclad",
            "Get the Borrower contract address. Use this before approving ic-tokens to deposit into the Borrow contract to get iUSD.",
            |s, _p: NoParams| async move { Ok::<_, EngineError>(s.troves.borrower_address()) },
        );
    }

    fn register_liquidity(&mut self) {
        self.register(
            "kim_get_swap_router_address",
            "Get the address of the swap router",
            |s, _p: NoParams| async move { Ok::<_, EngineError>(s.liquidity.swap_router_address()) },
        );
        self.register(
            "kim_swap_exact_input_single_hop",
            "Swap an exact amount of input tokens for an output token in a single hop. Amounts in base units. Returns a transaction hash once the swap is complete.",
            |s, p: SwapExactInputParams| async move {
                const OP: &str = "swap_exact_input_single";
                let token_in = s.resolve(OP, &p.token_in_address)?;
                let token_out = s.resolve(OP, &p.token_out_address)?;
                let amount_in = parse_amount(OP, "amountIn", &p.amount_in)?;
                let amount_out_minimum = parse_amount(OP, "amountOutMinimum", &p.amount_out_minimum)?;
                let limit = p.limit(OP)?;
                s.liquidity
                    .swap_exact_input_single(token_in, token_out, amount_in, amount_out_minimum, limit, p.deadline)
                    .await
            },
        );
        self.register(
            "kim_swap_exact_output_single_hop",
            "Swap for an exact amount of output tokens in a single hop. Amounts in base units. Returns a transaction hash once the swap is complete.",
            |s, p: SwapExactOutputParams| async move {
                const OP: &str = "swap_exact_output_single";
                let token_in = s.resolve(OP, &p.token_in_address)?;
                let token_out = s.resolve(OP, &p.token_out_address)?;
                let amount_out = parse_amount(OP, "amountOut", &p.amount_out)?;
                let amount_in_maximum = parse_amount(OP, "amountInMaximum", &p.amount_in_maximum)?;
                let limit = p.limit(OP)?;
                s.liquidity
                    .swap_exact_output_single(token_in, token_out, amount_out, amount_in_maximum, limit, p.deadline)
                    .await
            },
        );
        self.register(
            "kim_swap_exact_input_multi_hop",
            "Swap an exact amount of input tokens through one or more intermediate tokens. Amounts in base units. Returns a transaction hash once the swap is complete.",
            |s, p: MultiHopExactInputParams| async move {
                const OP: &str = "swap_exact_input_multi_hop";
                let token_in = s.resolve(OP, &p.token_in_address)?;
                let token_out = s.resolve(OP, &p.token_out_address)?;
                let intermediates = p
                    .intermediate_tokens
                    .iter()
                    .map(|token| s.resolve(OP, token))
                    .collect::<Result<Vec<_>>>()?;
                let amount_in = parse_amount(OP, "amountIn", &p.amount_in)?;
                let amount_out_minimum = parse_amount(OP, "amountOutMinimum", &p.amount_out_minimum)?;
                s.liquidity
                    .swap_exact_input_multi_hop(
                        token_in,
                        &intermediates,
                        token_out,
                        amount_in,
                        amount_out_minimum,
                        p.deadline,
                    )
                    .await
            },
        );
        self.register(
            "kim_swap_exact_output_multi_hop",
            "Swap for an exact amount of output tokens through one or more intermediate tokens. Amounts in base units. Returns a transaction hash once the swap is complete.",
            |s, p: MultiHopExactOutputParams| async move {
                const OP: &str = "swap_exact_output_multi_hop";
                let token_in = s.resolve(OP, &p.token_in_address)?;
                let token_out = s.resolve(OP, &p.token_out_address)?;
                let intermediates = p
                    .intermediate_tokens
                    .iter()
                    .map(|token| s.resolve(OP, token))
                    .collect::<Result<Vec<_>>>()?;
                let amount_out = parse_amount(OP, "amountOut", &p.amount_out)?;
                let amount_in_maximum = parse_amount(OP, "amountInMaximum", &p.amount_in_maximum)?;
                s.liquidity
                    .swap_exact_output_multi_hop(
                        token_in,
                        &intermediates,
                        token_out,
                        amount_out,
                        amount_in_maximum,
                        p.deadline,
                    )
                    .await
            },
        );
        self.register(
            "kim_mint_position",
            "Mint a new liquidity position in a pool. Returns a transaction hash once the mint is complete.",
            |s, p: MintPositionParams| async move {
                const OP: &str = "mint_position";
                let token0 = s.resolve(OP, &p.token0_address)?;
                let token1 = s.resolve(OP, &p.token1_address)?;
                let amount0 = parse_amount(OP, "amount0Desired", &p.amount0_desired)?;
                let amount1 = parse_amount(OP, "amount1Desired", &p.amount1_desired)?;
                s.liquidity
                    .mint_position(token0, token1, amount0, amount1, p.risk_level, p.deadline)
                    .await
            },
        );
        self.register(
            "kim_increase_liquidity",
            "Increase liquidity in an existing position. Returns a transaction hash once the increase is complete.",
            |s, p: IncreaseLiquidityParams| async move {
                const OP: &str = "increase_liquidity";
                let token_id = parse_amount(OP, "tokenId", &p.token_id)?;
                let token0 = s.resolve(OP, &p.token0_address)?;
                let token1 = s.resolve(OP, &p.token1_address)?;
                let amount0 = parse_amount(OP, "amount0Desired", &p.amount0_desired)?;
                let amount1 = parse_amount(OP, "amount1Desired", &p.amount1_desired)?;
                s.liquidity
                    .increase_liquidity(token_id, token0, token1, amount0, amount1)
                    .await
            },
        );
        self.register(
            "kim_decrease_liquidity",
            "Decrease liquidity in an existing position by a percentage (0-100). Returns a transaction hash once the decrease is complete.",
            |s, p: DecreaseLiquidityParams| async move {
                let token_id = parse_amount("decrease_liquidity", "tokenId", &p.token_id)?;
                s.liquidity.decrease_liquidity(token_id, p.percentage).await
            },
        );
        self.register(
            "kim_collect",
            "Collect all available tokens from a liquidity position, fees or liquidity already removed.",
            |s, p: TokenIdParams| async move {
                let token_id = parse_amount("collect", "tokenId", &p.token_id)?;
                s.liquidity.collect(token_id).await
            },
        );
        self.register(
            "kim_burn",
            "Burn a liquidity position NFT after all tokens have been collected.",
            |s, p: TokenIdParams| async move {
                let token_id = parse_amount("burn", "tokenId", &p.token_id)?;
                s.liquidity.burn(token_id).await
            },
        );
        self.register(
            "kim_get_LP_tokens",
            "Get all LP token positions (NFTs) owned by a user",
            |s, p: LpTokensParams| async move {
                let owner = s.resolve("lp_tokens", &p.user_address)?;
                s.liquidity.lp_tokens(owner).await
            },
        );
        self.register(
            "kim_calculate_position_apy",
            "Calculate the APY for a liquidity position based on fees earned",
            |s, p: PositionApyParams| async move {
                let token_id = parse_amount("calculate_position_apy", "tokenId", &p.token_id)?;
                s.liquidity
                    .calculate_position_apy(token_id, p.days_to_consider)
                    .await
            },
        );
    }

    fn register_voting(&mut self) {
        self.register(
            "get_all_gauges_mode",
            "Get a list of all voting gauges on Mode. Use veMODE for MODE token gauges or veBPT for Balancer Pool Token gauges.",
            |s, p: VoterParams| async move { s.voting.all_gauges(p.voter_type).await },
        );
        self.register(
            "get_gauge_info_mode",
            "Get detailed information about a specific gauge by its name or address.",
            |s, p: GaugeInfoParams| async move {
                s.voting
                    .gauge_info(p.voter_type, &p.gauge_identifier, p.is_address)
                    .await
            },
        );
        self.register(
            "vote_on_gauges_mode",
            "Vote on multiple gauges with a veNFT. Gauges can be given by name or address; weights must sum to 100.",
            |s, p: VoteParams| async move {
                const OP: &str = "vote";
                let token_id = parse_amount(OP, "tokenId", &p.token_id)?;
                let entries = ballot(OP, &p.votes)?;
                s.voting.vote(p.voter_type, token_id, &entries).await
            },
        );
        self.register(
            "change_votes_mode",
            "Change existing votes for a veNFT: resets them, then votes again. Gauges can be given by name or address.",
            |s, p: VoteParams| async move {
                const OP: &str = "change_votes";
                let token_id = parse_amount(OP, "tokenId", &p.token_id)?;
                let entries = ballot(OP, &p.votes)?;
                s.voting.change_votes(p.voter_type, token_id, &entries).await
            },
        );
        self.register(
            "get_voting_power_mode",
            "Get the current voting power for a veNFT",
            |s, p: VotingPowerParams| async move {
                let token_id = parse_amount("voting_power", "tokenId", &p.token_id)?;
                s.voting.voting_power(p.voter_type, token_id).await
            },
        );
    }

    fn register_erc20(&mut self) {
        self.register(
            "get_token_info_by_symbol",
            "Get the ERC20 token info by its symbol, including the contract address, decimals, and name",
            |s, p: TokenSymbolParams| async move { s.tokens.token_info_by_symbol(&p.symbol) },
        );
        self.register(
            "convert_to_base_unit",
            "Convert an amount of an ERC20 token to its base unit",
            |_s, p: ToBaseUnitParams| async move {
                Ok::<_, EngineError>(p.base_units("convert_to_base_unit")?.to_string())
            },
        );
        self.register(
            "convert_from_base_unit",
            "Convert an amount of an ERC20 token from its base unit to its decimal unit",
            |_s, p: FromBaseUnitParams| async move {
                let amount = parse_amount("convert_from_base_unit", "amount", &p.amount)?;
                Ok::<_, EngineError>(from_base_units(amount, p.decimals))
            },
        );
        self.register(
            "get_token_balance",
            "Get the balance of an ERC20 token in base units and its USD value.",
            |s, p: TokenBalanceParams| async move {
                const OP: &str = "token_balance";
                let token = s.resolve(OP, &p.token_address)?;
                let wallet = s.resolve(OP, &p.wallet)?;
                s.tokens
                    .token_balance(token, wallet, &p.name, p.token_decimals)
                    .await
            },
        );
        self.register(
            "get_token_allowance",
            "Get the allowance of an ERC20 token",
            |s, p: AllowanceParams| async move {
                const OP: &str = "allowance";
                let token = s.resolve(OP, &p.token_address)?;
                let owner = s.resolve(OP, &p.owner)?;
                let spender = s.resolve(OP, &p.spender)?;
                Ok::<_, EngineError>(s.tokens.allowance(token, owner, spender).await?.to_string())
            },
        );
        self.register(
            "get_token_total_supply",
            "Get the total supply of an ERC20 token",
            |s, p: TokenParams| async move {
                let token = s.resolve("total_supply", &p.token_address)?;
                Ok::<_, EngineError>(s.tokens.total_supply(token).await?.to_string())
            },
        );
        self.register(
            "approve",
            "Approve an amount of an ERC20 token to an address",
            |s, p: ApproveParams| async move {
                const OP: &str = "approve";
                let token = s.resolve(OP, &p.token_address)?;
                let spender = s.resolve(OP, &p.spender)?;
                let amount = parse_amount(OP, "amount", &p.amount)?;
                s.tokens.approve(token, spender, amount).await
            },
        );
        self.register(
            "revoke_approval",
            "Revoke approval for an ERC20 token to an address",
            |s, p: RevokeApprovalParams| async move {
                const OP: &str = "revoke_approval";
                let token = s.resolve(OP, &p.token_address)?;
                let spender = s.resolve(OP, &p.spender)?;
                s.tokens.revoke_approval(token, spender).await
            },
        );
        self.register(
            "transfer",
            "Transfer an amount of an ERC20 token to an address",
            |s, p: TransferParams| async move {
                const OP: &str = "transfer";
                let token = s.resolve(OP, &p.token_address)?;
                let to = s.resolve(OP, &p.to)?;
                let amount = parse_amount(OP, "amount", &p.amount)?;
                s.tokens.transfer(token, to, amount).await
            },
        );
        self.register(
            "transfer_from",
            "Transfer an amount of an ERC20 token from an address to another address",
            |s, p: TransferFromParams| async move {
                const OP: &str = "transfer_from";
                let token = s.resolve(OP, &p.token_address)?;
                let from = s.resolve(OP, &p.from)?;
                let to = s.resolve(OP, &p.to)?;
                let amount = parse_amount(OP, "amount", &p.amount)?;
                s.tokens.transfer_from(token, from, to, amount).await
            },
        );
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
