//! Ledger client facade.
//!
//! Everything above this crate talks to the chain through [`LedgerClient`]:
//! raw `eth_call` reads, confirmed transactions, and address resolution.
//! The typed [`read`] / [`submit`] helpers encode and decode with the
//! `sol!` bindings in [`crate::contracts`].

use alloy::primitives::{Address, Bytes, B256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Failures surfaced by a ledger client. Never retried at this layer.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// RPC transport failure or node-side rejection (including `eth_call` reverts).
    #[error("transport error: {0}")]
    Transport(String),

    /// Transaction was mined but its receipt reports failure.
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    /// Return data did not match the expected ABI.
    #[error("failed to decode {function} result: {message}")]
    Decode {
        function: &'static str,
        message: String,
    },

    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}

/// Read/write access to an EVM ledger on behalf of a single caller.
#[async_trait]
pub trait LedgerClient: Send + Sync + std::fmt::Debug {
    /// Address transactions are sent from.
    fn caller(&self) -> Address;

    /// Resolve a user-supplied identifier to an address.
    ///
    /// Only hex addresses are understood; name services are not consulted.
    fn resolve_address(&self, identifier: &str) -> Result<Address, LedgerError> {
        identifier
            .trim()
            .parse::<Address>()
            .map_err(|_| LedgerError::InvalidAddress(identifier.to_string()))
    }

    /// Execute a read-only call and return the raw return data.
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, LedgerError>;

    /// Sign and submit a transaction, returning once it is confirmed.
    async fn send_transaction(&self, to: Address, calldata: Bytes) -> Result<B256, LedgerError>;
}

/// Typed read: encode `call`, run it against `to`, decode the returns.
pub async fn read<C, L>(ledger: &L, to: Address, call: &C) -> Result<C::Return, LedgerError>
where
    C: SolCall + Sync,
    L: LedgerClient + ?Sized,
{
    let output = ledger.call(to, Bytes::from(call.abi_encode())).await?;
    C::abi_decode_returns(&output, true).map_err(|e| LedgerError::Decode {
        function: C::SIGNATURE,
        message: e.to_string(),
    })
}

/// Typed write: encode `call` and submit it to `to`.
pub async fn submit<C, L>(ledger: &L, to: Address, call: &C) -> Result<B256, LedgerError>
where
    C: SolCall + Sync,
    L: LedgerClient + ?Sized,
{
    debug!(to = %to, function = C::SIGNATURE, "Submitting transaction");
    let tx_hash = ledger
        .send_transaction(to, Bytes::from(call.abi_encode()))
        .await?;
    debug!(to = %to, function = C::SIGNATURE, tx_hash = %tx_hash, "Transaction confirmed");
    Ok(tx_hash)
}
