//! Error types for the Transaction Builder
//!
//! Construction errors always fail fast and are never auto-corrected.
//! Each variant carries enough context to explain which protocol limit
//! was crossed and by how much.

use thiserror::Error;

/// Error type for all transaction construction operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionBuilderError {
    /// `build()` was called without any instruction
    #[error("Transaction has no instructions")]
    EmptyTransaction,

    /// The builder already holds the configured maximum of instructions
    #[error("Instruction limit exceeded (max: {max})")]
    InstructionLimitExceeded {
        /// Configured maximum number of instructions
        max: usize,
    },

    /// Estimated serialized size is above the packet limit
    #[error("Transaction size {estimated} bytes exceeds limit of {limit} bytes")]
    TransactionSizeExceeded {
        /// Estimated serialized size in bytes
        estimated: usize,
        /// Protocol limit in bytes
        limit: usize,
    },

    /// Requested or estimated compute units are above the protocol ceiling
    #[error("Compute budget {requested} CU exceeds limit of {limit} CU")]
    ComputeBudgetExceeded {
        /// Requested (or estimated) compute units
        requested: u64,
        /// Protocol ceiling
        limit: u64,
    },

    /// More distinct accounts than a transaction can reference
    #[error("Transaction references {count} accounts, limit is {limit}")]
    TooManyAccounts {
        /// Distinct accounts referenced
        count: usize,
        /// Protocol limit
        limit: usize,
    },

    /// A named account was referenced but never registered
    #[error("Account resolution failed for '{name}': {reason}")]
    AccountResolution {
        /// Registered account name
        name: String,
        /// Detailed reason for the failure
        reason: String,
    },

    /// Blockhash could not be parsed or resolved
    #[error("Blockhash error: {0}")]
    Blockhash(String),

    /// Failed to attach signatures to a compiled transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Invalid instruction order or structure
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    /// Configuration or validation error
    ///
    /// This includes:
    /// - Missing fee payer at build time
    /// - Invalid builder configuration values
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal invariant violation or unexpected state
    ///
    /// These errors should be rare and typically indicate bugs
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    ///
    /// Construction errors describe the transaction itself, so only
    /// blockhash resolution can succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Blockhash(_) => true,

            Self::EmptyTransaction => false,
            Self::InstructionLimitExceeded { .. } => false,
            Self::TransactionSizeExceeded { .. } => false,
            Self::ComputeBudgetExceeded { .. } => false,
            Self::TooManyAccounts { .. } => false,
            Self::AccountResolution { .. } => false,
            Self::Signing(_) => false,
            Self::InvalidInstructionOrder(_) => false,
            Self::Configuration(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyTransaction
            | Self::InstructionLimitExceeded { .. }
            | Self::TransactionSizeExceeded { .. }
            | Self::ComputeBudgetExceeded { .. }
            | Self::TooManyAccounts { .. } => "construction",
            Self::AccountResolution { .. } => "account",
            Self::Blockhash(_) => "blockhash",
            Self::Signing(_) => "signing",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Configuration(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    /// Create an account resolution error for a named account
    pub fn unresolved(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AccountResolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid instruction order error
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::TransactionSizeExceeded {
            estimated: 1300,
            limit: 1232,
        };
        assert_eq!(
            err.to_string(),
            "Transaction size 1300 bytes exceeds limit of 1232 bytes"
        );

        let err = TransactionBuilderError::unresolved("vault", "not registered");
        assert_eq!(
            err.to_string(),
            "Account resolution failed for 'vault': not registered"
        );
    }

    #[test]
    fn test_error_retryability() {
        assert!(TransactionBuilderError::Blockhash("test".to_string()).is_retryable());

        assert!(!TransactionBuilderError::EmptyTransaction.is_retryable());
        assert!(!TransactionBuilderError::InstructionLimitExceeded { max: 100 }.is_retryable());
        assert!(!TransactionBuilderError::Internal("test".to_string()).is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            TransactionBuilderError::EmptyTransaction.category(),
            "construction"
        );
        assert_eq!(
            TransactionBuilderError::ComputeBudgetExceeded {
                requested: 2_000_000,
                limit: 1_400_000
            }
            .category(),
            "construction"
        );
        assert_eq!(
            TransactionBuilderError::Configuration("test".to_string()).category(),
            "config"
        );
    }
}
