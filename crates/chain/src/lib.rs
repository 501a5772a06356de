//! Midas chain interaction layer.
//!
//! This crate provides:
//! - The [`LedgerClient`] facade every engine component talks through
//! - [`RpcLedger`]: HTTP JSON-RPC implementation with a local signer and cached nonces
//! - `sol!` bindings for the lending, trove, liquidity and voting contracts
//!
//! Defaults target Mode mainnet (chain id 34443) but nothing here is chain specific.

pub mod contracts;
mod ledger;
mod rpc;

pub use ledger::{read, submit, LedgerClient, LedgerError};
pub use rpc::{RpcLedger, RpcLedgerBuilder};
