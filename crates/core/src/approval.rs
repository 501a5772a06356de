//! Approval gate.
//!
//! Every token pull by a protocol contract goes through [`ensure_allowance`]
//! first. Approvals are for the exact amount needed, never unlimited.

use crate::position::AllowanceState;
use alloy::primitives::{Address, B256, U256};
use midas_chain::contracts::erc20::IERC20;
use midas_chain::{read, submit, LedgerClient, LedgerError};
use tracing::{debug, info, instrument};

/// Result of one gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    /// Allowance as read before any approval was sent
    pub state: AllowanceState,
    /// Set when the allowance was short and an approval was confirmed
    pub approval_tx: Option<B256>,
}

/// Make sure `spender` may pull at least `required` of `asset` from the caller.
///
/// Reads the current allowance and, only when it is short, submits
/// `approve(spender, required)` and waits for confirmation.
#[instrument(skip(ledger), fields(asset = %asset, spender = %spender, required = %required))]
pub async fn ensure_allowance(
    ledger: &dyn LedgerClient,
    asset: Address,
    spender: Address,
    required: U256,
) -> Result<ApprovalOutcome, LedgerError> {
    let owner = ledger.caller();
    let current = read(
        ledger,
        asset,
        &IERC20::allowanceCall {
            owner,
            spender,
        },
    )
    .await?
    ._0;

    let state = AllowanceState {
        owner,
        spender,
        asset,
        current_allowance: current,
    };

    if state.covers(required) {
        debug!(current = %current, "Allowance sufficient");
        return Ok(ApprovalOutcome {
            state,
            approval_tx: None,
        });
    }

    let tx_hash = submit(
        ledger,
        asset,
        &IERC20::approveCall {
            spender,
            amount: required,
        },
    )
    .await?;
    info!(current = %current, tx_hash = %tx_hash, "Approved exact amount");

    Ok(ApprovalOutcome {
        state,
        approval_tx: Some(tx_hash),
    })
}
