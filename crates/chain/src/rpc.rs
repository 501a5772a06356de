//! JSON-RPC ledger client backed by a local private key.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! Nonces are tracked locally with an atomic counter and resynced from the
//! chain whenever a submission fails. Gas limits come from `eth_estimateGas`
//! plus a configurable buffer; legacy gas pricing.

use crate::ledger::{LedgerClient, LedgerError};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default headroom added on top of the estimated gas (20%).
const DEFAULT_GAS_BUFFER_BPS: u64 = 2_000;

/// Locally tracked account nonce.
/// Saves an RPC round-trip per transaction; reset from chain on failure.
#[derive(Debug)]
struct NonceManager {
    current: AtomicU64,
}

impl NonceManager {
    fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Take the next nonce.
    #[inline]
    fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    /// Force the counter to the chain value.
    fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Builder for [`RpcLedger`].
pub struct RpcLedgerBuilder {
    rpc_url: String,
    chain_id: u64,
    gas_buffer_bps: u64,
}

impl RpcLedgerBuilder {
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            gas_buffer_bps: DEFAULT_GAS_BUFFER_BPS,
        }
    }

    /// Extra gas on top of the estimate, in basis points.
    pub fn gas_buffer_bps(mut self, bps: u64) -> Self {
        self.gas_buffer_bps = bps;
        self
    }

    /// Connect, derive the signer address and fetch the starting nonce.
    pub async fn build(self, private_key: &str) -> anyhow::Result<RpcLedger> {
        let key_str = private_key.trim().trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse()?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);
        let url: Url = self.rpc_url.parse()?;

        let provider = ProviderBuilder::new().on_http(url.clone());
        let remote_chain_id = provider.get_chain_id().await?;
        if remote_chain_id != self.chain_id {
            anyhow::bail!(
                "RPC reports chain id {} but {} was configured",
                remote_chain_id,
                self.chain_id
            );
        }
        let initial_nonce = provider.get_transaction_count(address).await?;

        info!(
            address = %address,
            chain_id = self.chain_id,
            initial_nonce = initial_nonce,
            gas_buffer_bps = self.gas_buffer_bps,
            "Ledger client initialized"
        );

        Ok(RpcLedger {
            url,
            wallet,
            address,
            chain_id: self.chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            gas_buffer_bps: self.gas_buffer_bps,
        })
    }
}

/// Ledger client that signs with a local key and talks HTTP JSON-RPC.
pub struct RpcLedger {
    url: Url,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
    gas_buffer_bps: u64,
}

impl RpcLedger {
    pub async fn connect(private_key: &str, rpc_url: &str, chain_id: u64) -> anyhow::Result<Self> {
        RpcLedgerBuilder::new(rpc_url, chain_id)
            .build(private_key)
            .await
    }

    /// Resync the local nonce after a failed or reverted submission.
    async fn sync_nonce(&self) {
        let provider = ProviderBuilder::new().on_http(self.url.clone());
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }

    fn with_buffer(&self, estimate: u64) -> u64 {
        estimate.saturating_add(estimate.saturating_mul(self.gas_buffer_bps) / 10_000)
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    fn caller(&self) -> Address {
        self.address
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, LedgerError> {
        let provider = ProviderBuilder::new().on_http(self.url.clone());
        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata);
        provider
            .call(tx)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    async fn send_transaction(&self, to: Address, calldata: Bytes) -> Result<B256, LedgerError> {
        let total_start = Instant::now();
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.url.clone());

        let request = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata);

        let estimate = match provider.estimate_gas(request.clone()).await {
            Ok(gas) => gas,
            Err(e) => return Err(LedgerError::Transport(format!("gas estimation failed: {e}"))),
        };
        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let nonce = self.nonce_manager.next();
        let gas_limit = self.with_buffer(estimate);
        let tx = request
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        info!(
            to = %to,
            nonce = nonce,
            gas_limit = gas_limit,
            gas_price_gwei = gas_price / 1_000_000_000,
            "Sending transaction"
        );

        let pending = match provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.sync_nonce().await;
                return Err(LedgerError::Transport(e.to_string()));
            }
        };
        let tx_hash = *pending.tx_hash();
        debug!(tx_hash = %tx_hash, "Transaction submitted, waiting for confirmation");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                total_ms = total_start.elapsed().as_millis(),
                "Transaction confirmed"
            );
            Ok(tx_hash)
        } else {
            warn!(
                tx_hash = %tx_hash,
                total_ms = total_start.elapsed().as_millis(),
                "Transaction reverted, syncing nonce"
            );
            self.sync_nonce().await;
            Err(LedgerError::Reverted { tx_hash })
        }
    }
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}
