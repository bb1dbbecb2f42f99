//! Transaction build output
//!
//! `TxBuildOutput` carries the immutable transaction together with the
//! numbers the builder computed while checking it, and any warnings about
//! degraded paths taken on the way.

use crate::tx_builder::estimate::SizeBreakdown;
use crate::tx_builder::transaction::Transaction;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::fmt;

/// Where the transaction's blockhash came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockhashSource {
    /// Set on the builder by the caller
    Explicit,
    /// Fetched from the network collaborator
    Network,
    /// Fixed placeholder used because no blockhash could be fetched
    Placeholder,
}

/// Non-fatal conditions noticed during `build()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BuildWarning {
    /// The placeholder blockhash was used; the transaction can be simulated
    /// with blockhash replacement but not broadcast
    PlaceholderBlockhash { reason: String },

    /// The explicit compute limit is below the heuristic estimate
    ComputeLimitBelowEstimate { requested: u64, estimated: u64 },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::PlaceholderBlockhash { reason } => {
                write!(f, "placeholder blockhash used: {}", reason)
            }
            BuildWarning::ComputeLimitBelowEstimate {
                requested,
                estimated,
            } => write!(
                f,
                "compute limit {} is below estimated usage {}",
                requested, estimated
            ),
        }
    }
}

/// Result of a successful `build()`
#[derive(Debug, Clone)]
pub struct TxBuildOutput {
    /// The built transaction
    pub tx: Transaction,

    /// Size estimate the limit check was made against
    pub size: SizeBreakdown,

    /// Compute units the limit check was made against
    pub compute_units: u64,

    pub blockhash_source: BlockhashSource,

    pub warnings: Vec<BuildWarning>,
}

impl TxBuildOutput {
    pub fn new(
        tx: Transaction,
        size: SizeBreakdown,
        compute_units: u64,
        blockhash_source: BlockhashSource,
        warnings: Vec<BuildWarning>,
    ) -> Self {
        Self {
            tx,
            size,
            compute_units,
            blockhash_source,
            warnings,
        }
    }

    /// Get reference to the transaction
    pub fn tx_ref(&self) -> &Transaction {
        &self.tx
    }

    /// Consume self and extract the transaction
    pub fn into_tx(self) -> Transaction {
        self.tx
    }

    /// Addresses that must sign, fee payer first
    pub fn required_signers(&self) -> Vec<Pubkey> {
        self.tx.required_signers()
    }

    /// True when the transaction is only fit for simulation
    pub fn is_degraded(&self) -> bool {
        self.blockhash_source == BlockhashSource::Placeholder
    }
}
