//! Transaction Builder
//!
//! Construction side of the pipeline:
//! - **errors**: construction error taxonomy
//! - **transaction**: the immutable `Transaction` and account union rules
//! - **estimate**: protocol constants and pure size/compute estimation
//! - **instructions**: compute budget synthesis and ordering checks
//! - **builder**: `TransactionBuilder` with limit enforcement
//! - **output**: build output with degraded-path warnings
//! - **validator**: post-hoc checks for transactions built elsewhere
//! - **optimizer**: optimization proposals and compute budget insertion
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use txforge::tx_builder::{TransactionBuilder, TransactionBuilderError};
//! use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
//!
//! # async fn example(payer: Pubkey, ix: Instruction) -> Result<(), TransactionBuilderError> {
//! let mut builder = TransactionBuilder::default();
//! builder.set_fee_payer(payer).set_compute_budget(200_000, Some(1_000));
//! builder.add_instruction(ix)?;
//!
//! let output = builder.build().await?;
//! assert!(output.size.total() <= 1232);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub use errors::TransactionBuilderError;

pub mod builder;
pub mod estimate;
pub mod instructions;
pub mod optimizer;
pub mod output;
pub mod transaction;
pub mod validator;

pub use builder::{BuilderConfig, TransactionBuilder, PLACEHOLDER_BLOCKHASH};
pub use estimate::{
    base_fee, estimate_compute, estimate_size, heuristic_compute, size_breakdown, SizeBreakdown,
    ACCOUNT_KEY_BYTES, BASE_OVERHEAD_BYTES, BASE_TRANSACTION_FEE_LAMPORTS,
    INSTRUCTION_OVERHEAD_BYTES, MAX_ACCOUNTS_PER_TRANSACTION, MAX_COMPUTE_UNITS,
    MAX_TRANSACTION_SIZE, SIGNATURE_BYTES,
};
pub use instructions::{
    compute_budget_directives, plan_instructions, sanity_check_ix_order, ComputeBudgetDirectives,
    InstructionPlan,
};
pub use optimizer::{
    OptimizationKind, OptimizationOutcome, OptimizationProposal, OptimizerConfig,
    TransactionOptimizer,
};
pub use output::{BlockhashSource, BuildWarning, TxBuildOutput};
pub use transaction::{AccountRef, Transaction};
pub use validator::{TransactionValidationReport, TransactionValidator, TransactionWarning};
