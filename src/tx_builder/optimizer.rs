//! Transaction optimization proposals
//!
//! Account deduplication and instruction reordering are reported as
//! proposals only. Compute budget insertion is the one optimization that is
//! applied: when the heuristic estimate exceeds the threshold and the
//! transaction carries no explicit limit, a `SetComputeUnitLimit` is
//! prepended (if the result still fits in a packet).

use crate::tx_builder::estimate::{
    estimate_size, heuristic_compute, MAX_COMPUTE_UNITS, MAX_TRANSACTION_SIZE,
};
use crate::tx_builder::instructions::{
    compute_budget_directives, is_compute_budget_instruction, sanity_check_ix_order,
};
use crate::tx_builder::transaction::Transaction;
use serde::{Deserialize, Serialize};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use std::collections::HashMap;
use tracing::debug;

/// Optimization strategies the optimizer knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OptimizationKind {
    DeduplicateAccounts,
    ReorderInstructions,
    InsertComputeBudget,
}

/// One proposed (and possibly applied) optimization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationProposal {
    pub kind: OptimizationKind,
    pub description: String,
    pub applied: bool,
}

/// Optimizer thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Estimated units above which a compute limit is inserted
    #[serde(default = "default_compute_budget_threshold")]
    pub compute_budget_threshold: u64,

    /// Headroom added on top of the estimate for the inserted limit
    #[serde(default = "default_compute_margin")]
    pub compute_margin: f64,
}

fn default_compute_budget_threshold() -> u64 {
    200_000
}

fn default_compute_margin() -> f64 {
    0.1
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            compute_budget_threshold: default_compute_budget_threshold(),
            compute_margin: default_compute_margin(),
        }
    }
}

/// Result of [`TransactionOptimizer::optimize`]
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// The input transaction, or a new one if an optimization was applied
    pub transaction: Transaction,
    pub proposals: Vec<OptimizationProposal>,
    pub original_size: usize,
    pub optimized_size: usize,
}

impl OptimizationOutcome {
    pub fn applied(&self) -> impl Iterator<Item = &OptimizationProposal> {
        self.proposals.iter().filter(|p| p.applied)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionOptimizer {
    config: OptimizerConfig,
}

impl TransactionOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn optimize(&self, tx: &Transaction) -> OptimizationOutcome {
        let original_size = estimate_size(tx);
        let mut proposals = Vec::new();

        if let Some(proposal) = self.propose_deduplication(tx) {
            proposals.push(proposal);
        }
        if let Some(proposal) = self.propose_reordering(tx) {
            proposals.push(proposal);
        }

        let (transaction, proposal) = self.insert_compute_budget(tx);
        if let Some(proposal) = proposal {
            proposals.push(proposal);
        }

        let optimized_size = estimate_size(&transaction);
        debug!(
            proposals = proposals.len(),
            original_size, optimized_size, "Transaction optimization finished"
        );

        OptimizationOutcome {
            transaction,
            proposals,
            original_size,
            optimized_size,
        }
    }

    /// Addresses referenced by more than one instruction
    fn propose_deduplication(&self, tx: &Transaction) -> Option<OptimizationProposal> {
        let mut references: HashMap<_, usize> = HashMap::new();
        for ix in tx.instructions() {
            for meta in &ix.accounts {
                *references.entry(meta.pubkey).or_default() += 1;
            }
        }
        let duplicates: usize = references.values().filter(|&&n| n > 1).map(|n| n - 1).sum();
        if duplicates == 0 {
            return None;
        }

        Some(OptimizationProposal {
            kind: OptimizationKind::DeduplicateAccounts,
            description: format!(
                "{} repeated account references across instructions could be merged",
                duplicates
            ),
            applied: false,
        })
    }

    fn propose_reordering(&self, tx: &Transaction) -> Option<OptimizationProposal> {
        if tx.instructions().is_empty() {
            return None;
        }
        let reason = sanity_check_ix_order(tx.instructions()).err()?;
        Some(OptimizationProposal {
            kind: OptimizationKind::ReorderInstructions,
            description: format!("move compute budget instructions first ({})", reason),
            applied: false,
        })
    }

    fn insert_compute_budget(&self, tx: &Transaction) -> (Transaction, Option<OptimizationProposal>) {
        if compute_budget_directives(tx.instructions()).unit_limit.is_some() {
            return (tx.clone(), None);
        }
        let estimated = heuristic_compute(tx);
        if estimated <= self.config.compute_budget_threshold {
            return (tx.clone(), None);
        }

        let limit = ((estimated as f64) * (1.0 + self.config.compute_margin)).ceil() as u64;
        let limit = limit.min(MAX_COMPUTE_UNITS) as u32;

        let leading_budget = tx
            .instructions()
            .iter()
            .take_while(|ix| is_compute_budget_instruction(ix))
            .count();
        let mut instructions = tx.instructions().to_vec();
        instructions.insert(
            leading_budget,
            ComputeBudgetInstruction::set_compute_unit_limit(limit),
        );

        let candidate = Transaction::new(tx.fee_payer().copied(), tx.recent_blockhash(), instructions)
            .with_signers(tx.declared_signers().to_vec());

        let size = estimate_size(&candidate);
        if size > MAX_TRANSACTION_SIZE {
            let proposal = OptimizationProposal {
                kind: OptimizationKind::InsertComputeBudget,
                description: format!(
                    "set compute unit limit to {} (not applied: would grow transaction to {} bytes)",
                    limit, size
                ),
                applied: false,
            };
            return (tx.clone(), Some(proposal));
        }

        let proposal = OptimizationProposal {
            kind: OptimizationKind::InsertComputeBudget,
            description: format!(
                "set compute unit limit to {} for estimated usage of {}",
                limit, estimated
            ),
            applied: true,
        };
        (candidate, Some(proposal))
    }
}
