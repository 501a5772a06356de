//! ERC-20 utilities: balances with a best-effort USD valuation, allowances,
//! plain transfers and symbol lookup against the configured token table.

use crate::config::TokenTable;
use crate::error::{During, EngineError, Result};
use crate::math::{format_amount, to_units_f64};
use alloy::primitives::{Address, B256, U256};
use midas_api::PriceSource;
use midas_chain::contracts::erc20::IERC20;
use midas_chain::{read, submit, LedgerClient};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Raw base units
    pub balance: String,
    /// Whole tokens
    pub formatted: String,
    #[serde(rename = "valueUSD")]
    pub value_usd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A configured token as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListing {
    pub symbol: String,
    pub contract_address: Address,
    pub decimals: u8,
    pub name: String,
}

pub struct TokenService {
    ledger: Arc<dyn LedgerClient>,
    prices: Arc<dyn PriceSource>,
    tokens: TokenTable,
}

impl TokenService {
    pub fn new(ledger: Arc<dyn LedgerClient>, prices: Arc<dyn PriceSource>, tokens: TokenTable) -> Self {
        Self { ledger, prices, tokens }
    }

    /// Address, decimals and name of a known token. No chain access.
    pub fn token_info_by_symbol(&self, symbol: &str) -> Result<TokenListing> {
        let (listed, info) = self.tokens.by_symbol(symbol).ok_or_else(|| {
            EngineError::validation("token_info_by_symbol", format!("Token with symbol {symbol} not found"))
        })?;
        Ok(TokenListing {
            symbol: listed.to_string(),
            contract_address: info.address,
            decimals: info.decimals,
            name: info.name.clone(),
        })
    }

    fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    /// Balance of `wallet`, valued in USD through the price feed named `name`.
    ///
    /// A missing feed or price leaves `value_usd` empty with a note; only the
    /// balance read itself can fail the call.
    #[instrument(skip(self), fields(token = %token, wallet = %wallet))]
    pub async fn token_balance(&self, token: Address, wallet: Address, name: &str, decimals: u8) -> Result<TokenBalance> {
        let raw = read(self.ledger(), token, &IERC20::balanceOfCall { account: wallet })
            .await
            .during("token_balance")?
            ._0;

        let (value_usd, note) = match self.prices.usd_price(name).await {
            Ok(price) => {
                let value = to_units_f64(raw, decimals) * price.price;
                debug!(feed = %price.feed_id, price = price.price, "Priced balance");
                (Some(format!("{value:.2}")), None)
            }
            Err(e) => {
                warn!(asset = name, error = %e, "USD price unavailable");
                (None, Some(format!("USD value unavailable: {e}")))
            }
        };

        Ok(TokenBalance {
            balance: raw.to_string(),
            formatted: format_amount(raw, decimals),
            value_usd,
            note,
        })
    }

    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        Ok(read(self.ledger(), token, &IERC20::allowanceCall { owner, spender })
            .await
            .during("allowance")?
            ._0)
    }

    pub async fn total_supply(&self, token: Address) -> Result<U256> {
        Ok(read(self.ledger(), token, &IERC20::totalSupplyCall {})
            .await
            .during("total_supply")?
            ._0)
    }

    #[instrument(skip(self), fields(token = %token, spender = %spender, amount = %amount))]
    pub async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<B256> {
        let tx_hash = submit(self.ledger(), token, &IERC20::approveCall { spender, amount })
            .await
            .during("approve")?;
        info!(tx_hash = %tx_hash, "Approved");
        Ok(tx_hash)
    }

    /// Set the allowance back to zero.
    #[instrument(skip(self), fields(token = %token, spender = %spender))]
    pub async fn revoke_approval(&self, token: Address, spender: Address) -> Result<B256> {
        let tx_hash = submit(
            self.ledger(),
            token,
            &IERC20::approveCall {
                spender,
                amount: U256::ZERO,
            },
        )
        .await
        .during("revoke_approval")?;
        info!(tx_hash = %tx_hash, "Approval revoked");
        Ok(tx_hash)
    }

    #[instrument(skip(self), fields(token = %token, to = %to, amount = %amount))]
    pub async fn transfer(&self, token: Address, to: Address, amount: U256) -> Result<B256> {
        let tx_hash = submit(self.ledger(), token, &IERC20::transferCall { to, amount })
            .await
            .during("transfer")?;
        info!(tx_hash = %tx_hash, "Transferred");
        Ok(tx_hash)
    }

    #[instrument(skip(self), fields(token = %token, from = %from, to = %to, amount = %amount))]
    pub async fn transfer_from(&self, token: Address, from: Address, to: Address, amount: U256) -> Result<B256> {
        let tx_hash = submit(self.ledger(), token, &IERC20::transferFromCall { from, to, amount })
            .await
            .during("transfer_from")?;
        info!(tx_hash = %tx_hash, "Transferred from");
        Ok(tx_hash)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("prices", &self.prices)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SimulatedLedger, CALLER};
    use alloy::primitives::address;
    use async_trait::async_trait;
    use midas_api::{ApiError, UsdPrice};

    const USDC: Address = address!("d988097fb8612cc24eeC14542bC03424c656005f");
    const BOB: Address = address!("0000000000000000000000000000000000000b0b");

    #[derive(Debug)]
    struct FixedPrice(Option<f64>);

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn usd_price(&self, asset_name: &str) -> midas_api::Result<UsdPrice> {
            match self.0 {
                Some(price) => Ok(UsdPrice {
                    feed_id: format!("feed-{asset_name}"),
                    price,
                    publish_time: 1_717_000_000,
                }),
                None => Err(ApiError::NotFound("Price feed not found".to_string())),
            }
        }
    }

    fn service(price: Option<f64>) -> (Arc<SimulatedLedger>, TokenService) {
        let ledger = Arc::new(SimulatedLedger::new());
        ledger.set_balance(USDC, CALLER, U256::from(1_500_000u64));
        let tokens = ledger.config().tokens.clone();
        let service = TokenService::new(ledger.clone(), Arc::new(FixedPrice(price)), tokens);
        (ledger, service)
    }

    #[tokio::test]
    async fn test_balance_with_price() {
        let (_ledger, tokens) = service(Some(2.0));
        let balance = tokens.token_balance(USDC, CALLER, "usdc", 6).await.unwrap();

        assert_eq!(balance.balance, "1500000");
        assert_eq!(balance.formatted, "1.500000");
        assert_eq!(balance.value_usd.as_deref(), Some("3.00"));
        assert!(balance.note.is_none());
    }

    #[tokio::test]
    async fn test_balance_without_price_is_partial() {
        let (_ledger, tokens) = service(None);
        let balance = tokens.token_balance(USDC, CALLER, "usdc", 6).await.unwrap();

        assert_eq!(balance.balance, "1500000");
        assert!(balance.value_usd.is_none());
        assert!(balance.note.unwrap().contains("unavailable"));

        let json = serde_json::to_value(
            &tokens.token_balance(USDC, CALLER, "usdc", 6).await.unwrap(),
        )
        .unwrap();
        assert!(json["valueUSD"].is_null());
    }

    #[tokio::test]
    async fn test_approve_and_revoke() {
        let (ledger, tokens) = service(None);
        tokens.approve(USDC, BOB, U256::from(500u64)).await.unwrap();
        assert_eq!(tokens.allowance(USDC, CALLER, BOB).await.unwrap(), U256::from(500u64));

        tokens.revoke_approval(USDC, BOB).await.unwrap();
        assert_eq!(ledger.allowance(USDC, CALLER, BOB), U256::ZERO);
    }

    #[tokio::test]
    async fn test_transfers() {
        let (ledger, tokens) = service(None);
        tokens.transfer(USDC, BOB, U256::from(100u64)).await.unwrap();
        assert_eq!(ledger.balance(USDC, BOB), U256::from(100u64));
        assert_eq!(tokens.total_supply(USDC).await.unwrap(), U256::from(1_500_000u64));

        // Without an allowance from BOB the pull reverts
        let err = tokens
            .transfer_from(USDC, BOB, CALLER, U256::from(50u64))
            .await
            .unwrap_err();
        assert_eq!(err.operation(), "transfer_from");

        ledger.set_allowance(USDC, BOB, CALLER, U256::from(50u64));
        tokens.transfer_from(USDC, BOB, CALLER, U256::from(50u64)).await.unwrap();
        assert_eq!(ledger.balance(USDC, BOB), U256::from(50u64));
    }

    #[test]
    fn test_token_info_by_symbol() {
        let (ledger, tokens) = service(None);

        let usdc = tokens.token_info_by_symbol("usdc").unwrap();
        assert_eq!(usdc.symbol, "USDC");
        assert_eq!(usdc.contract_address, USDC);
        assert_eq!(usdc.decimals, 6);

        let json = serde_json::to_value(tokens.token_info_by_symbol("MODE").unwrap()).unwrap();
        assert_eq!(json["name"], "Mode");
        assert_eq!(json["decimals"], 18);
        assert!(json["contractAddress"].is_string());

        let err = tokens.token_info_by_symbol("PEPE").unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert!(err.to_string().contains("PEPE"));
        assert!(ledger.calls().is_empty());
    }
}
