//! Post-hoc checks for transactions built anywhere
//!
//! Re-applies the builder's construction limits to an existing
//! [`Transaction`] and adds structural warnings the builder does not enforce.

use crate::tx_builder::builder::{TransactionBuilder, PLACEHOLDER_BLOCKHASH};
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::estimate::{
    estimate_compute, size_breakdown, SizeBreakdown, MAX_ACCOUNTS_PER_TRANSACTION,
    MAX_COMPUTE_UNITS, MAX_TRANSACTION_SIZE,
};
use crate::tx_builder::instructions::sanity_check_ix_order;
use crate::tx_builder::transaction::Transaction;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;

/// Non-blocking findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionWarning {
    /// A signer was declared more than once
    DuplicateSigner(Pubkey),
    /// An instruction carries no data
    EmptyInstructionData { index: usize },
    /// The transaction uses the placeholder blockhash and cannot be broadcast
    PlaceholderBlockhash,
}

/// Outcome of [`TransactionValidator::validate`]
#[derive(Debug, Clone)]
pub struct TransactionValidationReport {
    pub errors: Vec<TransactionBuilderError>,
    pub warnings: Vec<TransactionWarning>,
    pub size: SizeBreakdown,
    pub compute_units: u64,
    pub account_count: usize,
}

impl TransactionValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Stateless validator
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionValidator;

impl TransactionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check a built transaction; every failing rule is reported, not just the first
    pub fn validate(&self, tx: &Transaction) -> TransactionValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if tx.instructions().is_empty() {
            errors.push(TransactionBuilderError::EmptyTransaction);
        } else if let Err(e) = sanity_check_ix_order(tx.instructions()) {
            errors.push(e);
        }

        if tx.fee_payer().is_none() {
            errors.push(TransactionBuilderError::Configuration(
                "transaction has no fee payer".to_string(),
            ));
        }

        if tx.recent_blockhash().is_empty() {
            errors.push(TransactionBuilderError::Blockhash(
                "transaction has no recent blockhash".to_string(),
            ));
        } else if tx.recent_blockhash() == PLACEHOLDER_BLOCKHASH {
            warnings.push(TransactionWarning::PlaceholderBlockhash);
        }

        let size = size_breakdown(tx);
        if size.total() > MAX_TRANSACTION_SIZE {
            errors.push(TransactionBuilderError::TransactionSizeExceeded {
                estimated: size.total(),
                limit: MAX_TRANSACTION_SIZE,
            });
        }

        let compute_units = estimate_compute(tx);
        if compute_units > MAX_COMPUTE_UNITS {
            errors.push(TransactionBuilderError::ComputeBudgetExceeded {
                requested: compute_units,
                limit: MAX_COMPUTE_UNITS,
            });
        }

        let account_count = tx.unique_account_count();
        if account_count > MAX_ACCOUNTS_PER_TRANSACTION {
            errors.push(TransactionBuilderError::TooManyAccounts {
                count: account_count,
                limit: MAX_ACCOUNTS_PER_TRANSACTION,
            });
        }

        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for signer in tx.declared_signers() {
            if !seen.insert(*signer) && reported.insert(*signer) {
                warnings.push(TransactionWarning::DuplicateSigner(*signer));
            }
        }

        for (index, ix) in tx.instructions().iter().enumerate() {
            if ix.data.is_empty() {
                warnings.push(TransactionWarning::EmptyInstructionData { index });
            }
        }

        TransactionValidationReport {
            errors,
            warnings,
            size,
            compute_units,
            account_count,
        }
    }

    /// Check the builder's current state before `build()`
    pub fn validate_builder(
        &self,
        builder: &TransactionBuilder,
    ) -> Result<TransactionValidationReport, TransactionBuilderError> {
        Ok(self.validate(&builder.preview()?))
    }
}
