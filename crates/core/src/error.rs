//! Engine error taxonomy.
//!
//! Every variant names the operation that raised it so an operator can tell
//! a bad parameter from a solvency stop from an on-chain revert.

use crate::risk::RiskError;
use midas_chain::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input, rejected before any transaction.
    #[error("{operation}: invalid parameters: {message}")]
    Validation {
        operation: &'static str,
        message: String,
    },

    /// The position cannot be moved further without breaking the health factor.
    #[error("{operation}: {message}")]
    Solvency {
        operation: &'static str,
        message: String,
    },

    /// On-chain state rules the operation out (voting closed, caller not
    /// approved, votes not cleared).
    #[error("{operation}: {message}")]
    Precondition {
        operation: &'static str,
        message: String,
    },

    /// Read or transaction failure. Never retried.
    #[error("{operation}: {source}")]
    Ledger {
        operation: &'static str,
        #[source]
        source: LedgerError,
    },

    #[error("{operation}: risk calculation failed: {source}")]
    Risk {
        operation: &'static str,
        #[source]
        source: RiskError,
    },
}

impl EngineError {
    pub fn validation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            operation,
            message: message.into(),
        }
    }

    pub fn solvency(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Solvency {
            operation,
            message: message.into(),
        }
    }

    pub fn precondition(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Precondition {
            operation,
            message: message.into(),
        }
    }

    /// Operation that raised the error.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Validation { operation, .. }
            | Self::Solvency { operation, .. }
            | Self::Precondition { operation, .. }
            | Self::Ledger { operation, .. }
            | Self::Risk { operation, .. } => operation,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Attach the operation name to a lower-level failure.
pub(crate) trait During<T> {
    fn during(self, operation: &'static str) -> Result<T>;
}

impl<T> During<T> for std::result::Result<T, LedgerError> {
    fn during(self, operation: &'static str) -> Result<T> {
        self.map_err(|source| EngineError::Ledger { operation, source })
    }
}

impl<T> During<T> for std::result::Result<T, RiskError> {
    fn during(self, operation: &'static str) -> Result<T> {
        self.map_err(|source| EngineError::Risk { operation, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_operation() {
        let err = EngineError::validation("loop_deposit", "numLoops must be between 1 and 5");
        assert_eq!(
            err.to_string(),
            "loop_deposit: invalid parameters: numLoops must be between 1 and 5"
        );
        assert_eq!(err.operation(), "loop_deposit");

        let err: Result<()> = Err(LedgerError::Transport("connection refused".into())).during("repay");
        let err = err.unwrap_err();
        assert_eq!(err.operation(), "repay");
        assert!(err.to_string().contains("connection refused"));
    }
}
