//! Contract addresses for the protocols the engine drives.
//!
//! Defaults are the Mode mainnet deployments. Any address can be overridden
//! from the TOML file.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ironclad lending market and trove system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IroncladContracts {
    #[serde(default = "default_lending_pool")]
    pub lending_pool: Address,

    #[serde(default = "default_protocol_data_provider")]
    pub protocol_data_provider: Address,

    #[serde(default = "default_borrower_operations")]
    pub borrower_operations: Address,

    #[serde(default = "default_trove_manager")]
    pub trove_manager: Address,

    #[serde(default = "default_hint_helpers")]
    pub hint_helpers: Address,

    /// iUSD stablecoin minted by troves
    #[serde(default = "default_iusd")]
    pub iusd: Address,

    /// Underlying token → collateral vault accepted by the trove system
    #[serde(default)]
    pub vaults: BTreeMap<Address, Address>,
}

fn default_lending_pool() -> Address {
    address!("B702cE183b4E1Faa574834715E5D4a6378D0eEd3")
}
fn default_protocol_data_provider() -> Address {
    address!("29563f73De731Ae555093deb795ba4D1E584e42E")
}
fn default_borrower_operations() -> Address {
    address!("9571873B4Df31D317d4ED4FE4689915A2F3fF7d4")
}
fn default_trove_manager() -> Address {
    address!("829746b34F624fdB03171AA4cF4D2675B0F2A2e6")
}
fn default_hint_helpers() -> Address {
    address!("BdAA7033f0A109A9777ee42a82799642a877Fc4b")
}
fn default_iusd() -> Address {
    address!("A70266C8F8Cf33647dcFEE763961aFf418D9E1E4")
}

impl Default for IroncladContracts {
    fn default() -> Self {
        Self {
            lending_pool: default_lending_pool(),
            protocol_data_provider: default_protocol_data_provider(),
            borrower_operations: default_borrower_operations(),
            trove_manager: default_trove_manager(),
            hint_helpers: default_hint_helpers(),
            iusd: default_iusd(),
            vaults: BTreeMap::new(),
        }
    }
}

/// Kim (Algebra) concentrated-liquidity exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KimContracts {
    #[serde(default = "default_swap_router")]
    pub swap_router: Address,

    #[serde(default = "default_position_manager")]
    pub position_manager: Address,

    #[serde(default = "default_factory")]
    pub factory: Address,

    /// Helper that sizes deposits and picks a tick range per risk level
    #[serde(default = "default_liquidity_calculator")]
    pub liquidity_calculator: Address,
}

fn default_swap_router() -> Address {
    address!("Ac48FcF1049668B285f3dC72483DF5Ae2162f7e8")
}
fn default_position_manager() -> Address {
    address!("2e8614625226D26180aDf6530C3b1677d3D7cf10")
}
fn default_factory() -> Address {
    address!("B5F00c2C5f8821155D8ed27E31932CFD9DB3C5D5")
}
fn default_liquidity_calculator() -> Address {
    address!("6f8E2B58373aB12Be5f7c28658633dD27D689f0D")
}

impl Default for KimContracts {
    fn default() -> Self {
        Self {
            swap_router: default_swap_router(),
            position_manager: default_position_manager(),
            factory: default_factory(),
            liquidity_calculator: default_liquidity_calculator(),
        }
    }
}

/// One gauge-voting deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterContracts {
    pub voter: Address,
    /// Exposes `votingActive()`
    pub clock: Address,
    /// Vote-escrow NFT that carries the voting power
    pub escrow: Address,
}

/// Mode gauge voting, one deployment per escrow token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingContracts {
    #[serde(default = "default_ve_mode")]
    pub ve_mode: VoterContracts,

    #[serde(default = "default_ve_bpt")]
    pub ve_bpt: VoterContracts,
}

fn default_ve_mode() -> VoterContracts {
    VoterContracts {
        voter: address!("71439Ae82068E19ea90e4F506c74936aE170Cf58"),
        clock: address!("66CC481755f8a9d415e75d29C17B0E3eF2Af70bD"),
        escrow: address!("ff8AB822b8A853b01F9a9E9465321d6Fe77c9D2F"),
    }
}

fn default_ve_bpt() -> VoterContracts {
    VoterContracts {
        voter: address!("2aA8A5C1Af4EA11A1f1F10f3b73cfB30419F77Fb"),
        clock: address!("6d1D6277fBB117d77782a85120796BCb08cAae8a"),
        escrow: address!("9c2eFe2a1FBfb601125Bb07a3D5bC6EC91F91e01"),
    }
}

impl Default for VotingContracts {
    fn default() -> Self {
        Self {
            ve_mode: default_ve_mode(),
            ve_bpt: default_ve_bpt(),
        }
    }
}

/// One ERC-20 the agent knows by symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub decimals: u8,
    pub name: String,
}

/// Known tokens keyed by symbol. A `[tokens]` table in the file replaces
/// the built-in list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenTable(BTreeMap<String, TokenInfo>);

impl TokenTable {
    pub fn new(tokens: impl IntoIterator<Item = (String, TokenInfo)>) -> Self {
        Self(tokens.into_iter().collect())
    }

    /// Case-insensitive symbol lookup, returning the symbol as listed.
    pub fn by_symbol(&self, symbol: &str) -> Option<(&str, &TokenInfo)> {
        let symbol = symbol.trim();
        self.0
            .iter()
            .find(|(listed, _)| listed.eq_ignore_ascii_case(symbol))
            .map(|(listed, info)| (listed.as_str(), info))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TokenInfo)> {
        self.0.iter().map(|(symbol, info)| (symbol.as_str(), info))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for TokenTable {
    fn default() -> Self {
        let token = |address: Address, decimals: u8, name: &str| TokenInfo {
            address,
            decimals,
            name: name.to_string(),
        };
        Self::new([
            ("MODE".to_string(), token(address!("DfC7C877a950e49D2610114102175A06C2e3167a"), 18, "Mode")),
            ("USDC".to_string(), token(address!("d988097fb8612cc24eeC14542bC03424c656005f"), 6, "USDC")),
            ("USDT".to_string(), token(address!("f0F161fDA2712DB8b566946122a5af183995e2eD"), 6, "Tether USD")),
            ("WETH".to_string(), token(address!("4200000000000000000000000000000000000006"), 18, "Wrapped Ether")),
        ])
    }
}
