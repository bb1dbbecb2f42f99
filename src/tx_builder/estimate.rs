//! Protocol constants and pure size/compute estimation
//!
//! Every function here takes a finished [`Transaction`] and nothing else, so
//! the builder, validator and optimizer all agree on the numbers.

use crate::tx_builder::instructions::{compute_budget_directives, is_compute_budget_instruction};
use crate::tx_builder::transaction::Transaction;
use serde::Serialize;

/// Maximum serialized transaction size (one packet)
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Maximum compute units a transaction may request
pub const MAX_COMPUTE_UNITS: u64 = 1_400_000;

/// Base fee per signature
pub const BASE_TRANSACTION_FEE_LAMPORTS: u64 = 5_000;

/// Maximum number of distinct accounts per transaction
pub const MAX_ACCOUNTS_PER_TRANSACTION: usize = 64;

/// Fixed header/blockhash/length-prefix overhead
pub const BASE_OVERHEAD_BYTES: usize = 100;
pub const ACCOUNT_KEY_BYTES: usize = 32;
pub const INSTRUCTION_OVERHEAD_BYTES: usize = 4;
pub const SIGNATURE_BYTES: usize = 64;

// Heuristic compute costs used when no explicit limit is requested
pub const BASE_COMPUTE_UNITS: u64 = 5_000;
pub const COMPUTE_PER_INSTRUCTION: u64 = 10_000;
pub const COMPUTE_PER_ACCOUNT: u64 = 2_000;
pub const COMPUTE_PER_SIGNER: u64 = 1_000;
pub const COMPUTE_PER_BUDGET_INSTRUCTION: u64 = 150;

/// Per-component size breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeBreakdown {
    pub overhead: usize,
    pub accounts: usize,
    pub instructions: usize,
    pub signatures: usize,
}

impl SizeBreakdown {
    pub fn total(&self) -> usize {
        self.overhead + self.accounts + self.instructions + self.signatures
    }

    /// Bytes left before the packet limit (negative when over)
    pub fn headroom(&self) -> i64 {
        MAX_TRANSACTION_SIZE as i64 - self.total() as i64
    }
}

/// Size estimate split into its components
pub fn size_breakdown(tx: &Transaction) -> SizeBreakdown {
    let refs = tx.account_refs();
    let signer_count = refs.iter().filter(|r| r.is_signer).count();
    let instructions = tx
        .instructions()
        .iter()
        .map(|ix| INSTRUCTION_OVERHEAD_BYTES + ix.data.len())
        .sum();

    SizeBreakdown {
        overhead: BASE_OVERHEAD_BYTES,
        accounts: refs.len() * ACCOUNT_KEY_BYTES,
        instructions,
        signatures: signer_count * SIGNATURE_BYTES,
    }
}

/// Estimated serialized size in bytes
///
/// `100 + unique_accounts * 32 + Σ(4 + data_len) + signers * 64`
pub fn estimate_size(tx: &Transaction) -> usize {
    size_breakdown(tx).total()
}

/// Heuristic compute cost ignoring any explicit limit
pub fn heuristic_compute(tx: &Transaction) -> u64 {
    let signers = tx.required_signers().len() as u64;
    let per_instruction: u64 = tx
        .instructions()
        .iter()
        .map(|ix| {
            if is_compute_budget_instruction(ix) {
                COMPUTE_PER_BUDGET_INSTRUCTION
            } else {
                COMPUTE_PER_INSTRUCTION + ix.accounts.len() as u64 * COMPUTE_PER_ACCOUNT
            }
        })
        .sum();

    BASE_COMPUTE_UNITS + per_instruction + signers * COMPUTE_PER_SIGNER
}

/// Compute units the transaction will be charged against
///
/// An explicit `SetComputeUnitLimit` wins; otherwise the heuristic applies.
pub fn estimate_compute(tx: &Transaction) -> u64 {
    compute_budget_directives(tx.instructions())
        .unit_limit
        .map(u64::from)
        .unwrap_or_else(|| heuristic_compute(tx))
}

/// Base fee for the transaction's signatures
pub fn base_fee(tx: &Transaction) -> u64 {
    tx.required_signers().len() as u64 * BASE_TRANSACTION_FEE_LAMPORTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        compute_budget::ComputeBudgetInstruction,
        hash::Hash,
        instruction::{AccountMeta, Instruction},
        pubkey::Pubkey,
    };

    fn single_ix_tx(data_len: usize) -> Transaction {
        Transaction::new(
            Some(Pubkey::new_unique()),
            Hash::default().to_string(),
            vec![Instruction::new_with_bytes(
                Pubkey::new_unique(),
                &vec![0u8; data_len],
                vec![],
            )],
        )
    }

    #[test]
    fn test_estimate_size_formula() {
        // 100 + 2 accounts * 32 + (4 + 10) + 1 signer * 64
        let tx = single_ix_tx(10);
        assert_eq!(estimate_size(&tx), 100 + 64 + 14 + 64);
    }

    #[test]
    fn test_estimate_size_at_limit() {
        assert_eq!(estimate_size(&single_ix_tx(1000)), MAX_TRANSACTION_SIZE);
        assert_eq!(estimate_size(&single_ix_tx(1068)), 1300);
    }

    #[test]
    fn test_breakdown_headroom() {
        let breakdown = size_breakdown(&single_ix_tx(1068));
        assert_eq!(breakdown.headroom(), -68);
        assert_eq!(breakdown.signatures, SIGNATURE_BYTES);
    }

    #[test]
    fn test_estimate_compute_prefers_explicit_limit() {
        let payer = Pubkey::new_unique();
        let tx = Transaction::new(
            Some(payer),
            Hash::default().to_string(),
            vec![
                ComputeBudgetInstruction::set_compute_unit_limit(300_000),
                Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![]),
            ],
        );
        assert_eq!(estimate_compute(&tx), 300_000);
    }

    #[test]
    fn test_heuristic_compute() {
        let payer = Pubkey::new_unique();
        let tx = Transaction::new(
            Some(payer),
            Hash::default().to_string(),
            vec![Instruction::new_with_bytes(
                Pubkey::new_unique(),
                &[1],
                vec![
                    AccountMeta::new(Pubkey::new_unique(), false),
                    AccountMeta::new_readonly(Pubkey::new_unique(), false),
                ],
            )],
        );
        // base + one instruction + two accounts + one signer
        assert_eq!(estimate_compute(&tx), 5_000 + 10_000 + 4_000 + 1_000);
        assert_eq!(base_fee(&tx), 5_000);
    }
}
