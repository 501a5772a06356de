//! Everything a tool handler can reach, wired once at startup.

use crate::config::AgentConfig;
use crate::error::{EngineError, Result};
use crate::hints::{SeedSource, TroveHintFinder};
use crate::lending::LendingMarket;
use crate::liquidity::LiquidityManager;
use crate::looping::LoopEngine;
use crate::tokens::TokenService;
use crate::troves::TroveBorrower;
use crate::voting::GaugeVoting;
use alloy::primitives::Address;
use midas_api::{MetadataSource, PriceSource};
use midas_chain::LedgerClient;
use std::sync::Arc;

/// Off-chain capabilities injected into the engine.
#[derive(Debug, Clone)]
pub struct ExternalSources {
    pub metadata: Arc<dyn MetadataSource>,
    pub prices: Arc<dyn PriceSource>,
    pub seeds: Arc<dyn SeedSource>,
}

pub struct Services {
    pub ledger: Arc<dyn LedgerClient>,
    pub config: AgentConfig,
    pub lending: Arc<LendingMarket>,
    pub loops: LoopEngine,
    pub troves: TroveBorrower,
    pub liquidity: LiquidityManager,
    pub voting: GaugeVoting,
    pub tokens: TokenService,
}

impl Services {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: AgentConfig, external: ExternalSources) -> Self {
        let ironclad = &config.ironclad;
        let lending = Arc::new(LendingMarket::new(
            ledger.clone(),
            ironclad.lending_pool,
            ironclad.protocol_data_provider,
        ));
        let hints = TroveHintFinder::new(
            ledger.clone(),
            ironclad.trove_manager,
            ironclad.hint_helpers,
            external.seeds,
            config.troves.hint_trials_multiplier,
        );

        Self {
            loops: LoopEngine::new(lending.clone(), config.loops.clone()),
            troves: TroveBorrower::new(ledger.clone(), ironclad.clone(), config.troves.clone(), hints),
            liquidity: LiquidityManager::new(ledger.clone(), config.kim.clone(), config.liquidity.clone()),
            voting: GaugeVoting::new(
                ledger.clone(),
                config.mode_voting.clone(),
                external.metadata,
                config.liquidity.read_concurrency,
            ),
            tokens: TokenService::new(ledger.clone(), external.prices, config.tokens.clone()),
            lending,
            ledger,
            config,
        }
    }

    /// Resolve a caller-supplied address, reporting failures as bad input.
    pub fn resolve(&self, operation: &'static str, identifier: &str) -> Result<Address> {
        self.ledger
            .resolve_address(identifier)
            .map_err(|e| EngineError::validation(operation, e.to_string()))
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("caller", &self.ledger.caller())
            .field("loops", &self.loops)
            .field("troves", &self.troves)
            .field("liquidity", &self.liquidity)
            .field("voting", &self.voting)
            .finish()
    }
}
