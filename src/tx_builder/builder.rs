//! Core TransactionBuilder implementation
//!
//! The builder accumulates instructions, signers and named accounts, then
//! `build()` turns them into an immutable [`Transaction`] after checking
//! every protocol limit. Nothing is auto-corrected: a transaction that is
//! too large or asks for too much compute is rejected.

use crate::metrics::{metrics, Timer};
use crate::rpc::{Commitment, NetworkClient};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::estimate::{
    heuristic_compute, size_breakdown, estimate_compute, MAX_ACCOUNTS_PER_TRANSACTION,
    MAX_COMPUTE_UNITS, MAX_TRANSACTION_SIZE,
};
use crate::tx_builder::instructions::plan_instructions;
use crate::tx_builder::output::{BlockhashSource, BuildWarning, TxBuildOutput};
use crate::tx_builder::transaction::Transaction;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Blockhash used when none can be fetched (base58 of 32 zero bytes)
pub const PLACEHOLDER_BLOCKHASH: &str = "11111111111111111111111111111111";

/// Builder limits and network settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Maximum number of instructions `add_instruction` accepts
    #[serde(default = "default_max_instructions")]
    pub max_instructions: usize,

    /// Commitment used when fetching the latest blockhash
    #[serde(default)]
    pub commitment: Commitment,
}

fn default_max_instructions() -> usize {
    100
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_instructions: default_max_instructions(),
            commitment: Commitment::default(),
        }
    }
}

/// Accumulates transaction parts and enforces protocol limits on `build()`
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    config: BuilderConfig,
    network: Option<Arc<dyn NetworkClient>>,
    default_fee_payer: Option<Pubkey>,

    instructions: Vec<Instruction>,
    signers: Vec<Pubkey>,
    accounts: HashMap<String, Pubkey>,
    fee_payer: Option<Pubkey>,
    recent_blockhash: Option<String>,
    compute_unit_limit: Option<u32>,
    compute_unit_price: Option<u64>,

    logger: StructuredLogger,
}

impl TransactionBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            network: None,
            default_fee_payer: None,
            instructions: Vec::new(),
            signers: Vec::new(),
            accounts: HashMap::new(),
            fee_payer: None,
            recent_blockhash: None,
            compute_unit_limit: None,
            compute_unit_price: None,
            logger: StructuredLogger::new(format!("builder-{}", uuid::Uuid::new_v4())),
        }
    }

    /// Network collaborator used to fetch a blockhash when none is set
    pub fn with_network(mut self, network: Arc<dyn NetworkClient>) -> Self {
        self.network = Some(network);
        self
    }

    /// Fee payer used when `set_fee_payer` was never called (the wallet provider's key)
    pub fn with_default_fee_payer(mut self, fee_payer: Pubkey) -> Self {
        self.default_fee_payer = Some(fee_payer);
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Append an instruction
    ///
    /// Fails with `InstructionLimitExceeded` when the builder already holds
    /// `max_instructions` instructions.
    pub fn add_instruction(
        &mut self,
        instruction: Instruction,
    ) -> Result<&mut Self, TransactionBuilderError> {
        if self.instructions.len() >= self.config.max_instructions {
            return Err(TransactionBuilderError::InstructionLimitExceeded {
                max: self.config.max_instructions,
            });
        }
        self.instructions.push(instruction);
        Ok(self)
    }

    /// Declare an additional signer
    pub fn add_signer(&mut self, signer: Pubkey) -> &mut Self {
        self.signers.push(signer);
        self
    }

    /// Register a named account for later lookup
    pub fn register_account(&mut self, name: impl Into<String>, address: Pubkey) -> &mut Self {
        self.accounts.insert(name.into(), address);
        self
    }

    /// Look up a registered account
    pub fn account(&self, name: &str) -> Result<Pubkey, TransactionBuilderError> {
        self.accounts
            .get(name)
            .copied()
            .ok_or_else(|| TransactionBuilderError::unresolved(name, "account is not registered"))
    }

    /// Account meta for a registered account
    pub fn account_meta(
        &self,
        name: &str,
        is_signer: bool,
        is_writable: bool,
    ) -> Result<AccountMeta, TransactionBuilderError> {
        let address = self.account(name)?;
        Ok(if is_writable {
            AccountMeta::new(address, is_signer)
        } else {
            AccountMeta::new_readonly(address, is_signer)
        })
    }

    /// Derive a program address and register it under `name`
    pub fn resolve_pda(
        &mut self,
        name: impl Into<String>,
        seeds: &[&[u8]],
        program_id: &Pubkey,
    ) -> Result<(Pubkey, u8), TransactionBuilderError> {
        let name = name.into();
        let (address, bump) = Pubkey::try_find_program_address(seeds, program_id)
            .ok_or_else(|| {
                TransactionBuilderError::unresolved(
                    name.as_str(),
                    format!("no valid program address for {} seeds under {}", seeds.len(), program_id),
                )
            })?;
        debug!(name = %name, address = %address, bump, "Resolved program address");
        self.accounts.insert(name, address);
        Ok((address, bump))
    }

    pub fn set_fee_payer(&mut self, fee_payer: Pubkey) -> &mut Self {
        self.fee_payer = Some(fee_payer);
        self
    }

    pub fn set_recent_blockhash(&mut self, blockhash: impl Into<String>) -> &mut Self {
        self.recent_blockhash = Some(blockhash.into());
        self
    }

    /// Request a compute unit limit and optional price (micro-lamports per CU)
    ///
    /// The matching compute budget instructions are prepended at build time.
    pub fn set_compute_budget(&mut self, unit_limit: u32, unit_price: Option<u64>) -> &mut Self {
        self.compute_unit_limit = Some(unit_limit);
        self.compute_unit_price = unit_price;
        self
    }

    /// Current builder state as a transaction, without any limit checks
    ///
    /// Uses the explicit blockhash or the placeholder; never touches the
    /// network. Fee payer falls back to the default provider key and may be
    /// absent.
    pub fn preview(&self) -> Result<Transaction, TransactionBuilderError> {
        let plan = plan_instructions(
            self.compute_unit_limit,
            self.compute_unit_price,
            self.instructions.clone(),
        )?;
        let blockhash = self
            .recent_blockhash
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_BLOCKHASH.to_string());

        Ok(
            Transaction::new(self.fee_payer.or(self.default_fee_payer), blockhash, plan.instructions)
                .with_signers(self.signers.clone()),
        )
    }

    /// Assemble and check the transaction
    ///
    /// Order: structure, fee payer, blockhash, compute budget synthesis,
    /// account count and size limit, compute limit.
    pub async fn build(&self) -> Result<TxBuildOutput, TransactionBuilderError> {
        let timer = Timer::new();
        metrics().builds_total.inc();

        match self.build_inner().await {
            Ok(output) => {
                timer.observe_duration(&metrics().build_latency);
                self.logger.log_build_completed(
                    output.tx.instructions().len(),
                    output.size.total(),
                    output.compute_units,
                    (timer.elapsed_secs() * 1_000_000.0) as u64,
                );
                Ok(output)
            }
            Err(e) => {
                metrics().build_failures.inc();
                self.logger.log_build_failed(e.category(), &e.to_string());
                Err(e)
            }
        }
    }

    async fn build_inner(&self) -> Result<TxBuildOutput, TransactionBuilderError> {
        let mut warnings = Vec::new();

        // (a) structure
        if self.instructions.is_empty() {
            return Err(TransactionBuilderError::EmptyTransaction);
        }

        // (b) fee payer
        let fee_payer = self
            .fee_payer
            .or(self.default_fee_payer)
            .ok_or_else(|| {
                TransactionBuilderError::Configuration(
                    "no fee payer set and no default provider key".to_string(),
                )
            })?;

        // (c) blockhash
        let (blockhash, blockhash_source) = self.resolve_blockhash(&mut warnings).await;

        // (d) compute budget synthesis
        let plan = plan_instructions(
            self.compute_unit_limit,
            self.compute_unit_price,
            self.instructions.clone(),
        )?;

        let tx = Transaction::new(Some(fee_payer), blockhash, plan.instructions)
            .with_signers(self.signers.clone());

        // (e) account count, then size
        let account_count = tx.unique_account_count();
        if account_count > MAX_ACCOUNTS_PER_TRANSACTION {
            return Err(TransactionBuilderError::TooManyAccounts {
                count: account_count,
                limit: MAX_ACCOUNTS_PER_TRANSACTION,
            });
        }

        let size = size_breakdown(&tx);
        if size.total() > MAX_TRANSACTION_SIZE {
            return Err(TransactionBuilderError::TransactionSizeExceeded {
                estimated: size.total(),
                limit: MAX_TRANSACTION_SIZE,
            });
        }

        // (f) compute
        let compute_units = estimate_compute(&tx);
        if compute_units > MAX_COMPUTE_UNITS {
            return Err(TransactionBuilderError::ComputeBudgetExceeded {
                requested: compute_units,
                limit: MAX_COMPUTE_UNITS,
            });
        }
        if let Some(limit) = self.compute_unit_limit {
            let estimated = heuristic_compute(&tx);
            if u64::from(limit) < estimated {
                warnings.push(BuildWarning::ComputeLimitBelowEstimate {
                    requested: u64::from(limit),
                    estimated,
                });
            }
        }

        Ok(TxBuildOutput::new(
            tx,
            size,
            compute_units,
            blockhash_source,
            warnings,
        ))
    }

    async fn resolve_blockhash(&self, warnings: &mut Vec<BuildWarning>) -> (String, BlockhashSource) {
        if let Some(blockhash) = &self.recent_blockhash {
            return (blockhash.clone(), BlockhashSource::Explicit);
        }

        let reason = match &self.network {
            Some(network) => match network.get_latest_blockhash(self.config.commitment).await {
                Ok(blockhash) => return (blockhash, BlockhashSource::Network),
                Err(e) => format!("blockhash fetch from {} failed: {}", network.endpoint(), e),
            },
            None => "no network client configured".to_string(),
        };

        warn!(reason = %reason, "Falling back to placeholder blockhash");
        self.logger.log_degraded("blockhash", &reason);
        metrics().blockhash_fallbacks.inc();
        warnings.push(BuildWarning::PlaceholderBlockhash { reason });

        (PLACEHOLDER_BLOCKHASH.to_string(), BlockhashSource::Placeholder)
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new(BuilderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::NetworkError;
    use crate::test_utils::MockNetworkClient;
    use solana_sdk::hash::Hash;

    fn program_ix(data_len: usize) -> Instruction {
        Instruction::new_with_bytes(Pubkey::new_unique(), &vec![0u8; data_len], vec![])
    }

    fn builder_with_payer() -> TransactionBuilder {
        let mut builder = TransactionBuilder::default();
        builder
            .set_fee_payer(Pubkey::new_unique())
            .set_recent_blockhash(Hash::new_unique().to_string());
        builder
    }

    #[tokio::test]
    async fn test_build_empty_fails() {
        let builder = builder_with_payer();
        let err = builder.build().await.unwrap_err();
        assert_eq!(err, TransactionBuilderError::EmptyTransaction);
    }

    #[tokio::test]
    async fn test_build_exactly_at_size_limit() {
        let mut builder = builder_with_payer();
        builder.add_instruction(program_ix(1000)).unwrap();

        let output = builder.build().await.expect("1232 bytes fits");
        assert_eq!(output.size.total(), MAX_TRANSACTION_SIZE);
        assert_eq!(output.blockhash_source, BlockhashSource::Explicit);
        assert!(output.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_build_over_size_limit() {
        let mut builder = builder_with_payer();
        builder.add_instruction(program_ix(1068)).unwrap();

        let err = builder.build().await.unwrap_err();
        assert_eq!(
            err,
            TransactionBuilderError::TransactionSizeExceeded {
                estimated: 1300,
                limit: MAX_TRANSACTION_SIZE,
            }
        );
    }

    #[tokio::test]
    async fn test_too_many_accounts_rejected_before_size() {
        let mut builder = builder_with_payer();
        let metas = (0..70).map(|_| AccountMeta::new_readonly(Pubkey::new_unique(), false)).collect();
        builder
            .add_instruction(Instruction::new_with_bytes(Pubkey::new_unique(), &[1], metas))
            .unwrap();

        // payer + program + 70 metas
        let err = builder.build().await.unwrap_err();
        assert_eq!(
            err,
            TransactionBuilderError::TooManyAccounts {
                count: 72,
                limit: MAX_ACCOUNTS_PER_TRANSACTION,
            }
        );
        assert_eq!(err.category(), "construction");
    }

    #[tokio::test]
    async fn test_instruction_limit() {
        let mut builder = TransactionBuilder::new(BuilderConfig {
            max_instructions: 2,
            ..BuilderConfig::default()
        });
        builder.add_instruction(program_ix(1)).unwrap();
        builder.add_instruction(program_ix(1)).unwrap();

        let err = builder.add_instruction(program_ix(1)).unwrap_err();
        assert_eq!(err, TransactionBuilderError::InstructionLimitExceeded { max: 2 });
        assert_eq!(builder.instruction_count(), 2);
    }

    #[tokio::test]
    async fn test_compute_budget_exceeded() {
        let mut builder = builder_with_payer();
        builder.add_instruction(program_ix(1)).unwrap();
        builder.set_compute_budget(1_500_000, None);

        let err = builder.build().await.unwrap_err();
        assert_eq!(
            err,
            TransactionBuilderError::ComputeBudgetExceeded {
                requested: 1_500_000,
                limit: MAX_COMPUTE_UNITS,
            }
        );
    }

    #[tokio::test]
    async fn test_compute_budget_prepended() {
        let mut builder = builder_with_payer();
        builder.add_instruction(program_ix(4)).unwrap();
        builder.set_compute_budget(200_000, Some(5_000));

        let output = builder.build().await.expect("build");
        let ixs = output.tx.instructions();
        assert_eq!(ixs.len(), 3);
        assert_eq!(ixs[0].program_id, solana_sdk::compute_budget::id());
        assert_eq!(ixs[1].program_id, solana_sdk::compute_budget::id());
        assert_eq!(output.compute_units, 200_000);
    }

    #[tokio::test]
    async fn test_missing_fee_payer() {
        let mut builder = TransactionBuilder::default();
        builder.add_instruction(program_ix(1)).unwrap();
        let err = builder.build().await.unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_default_fee_payer_used() {
        let provider_key = Pubkey::new_unique();
        let mut builder = TransactionBuilder::default().with_default_fee_payer(provider_key);
        builder
            .set_recent_blockhash(Hash::new_unique().to_string())
            .add_instruction(program_ix(1))
            .unwrap();

        let output = builder.build().await.expect("build");
        assert_eq!(output.tx.fee_payer(), Some(&provider_key));
    }

    #[tokio::test]
    async fn test_blockhash_fetched_from_network() {
        let blockhash = Hash::new_unique().to_string();
        let mock = Arc::new(MockNetworkClient::new().with_blockhash(blockhash.clone()));

        let mut builder = TransactionBuilder::default()
            .with_network(mock.clone())
            .with_default_fee_payer(Pubkey::new_unique());
        builder.add_instruction(program_ix(1)).unwrap();

        let output = builder.build().await.expect("build");
        assert_eq!(output.tx.recent_blockhash(), blockhash);
        assert_eq!(output.blockhash_source, BlockhashSource::Network);
        assert_eq!(mock.blockhash_calls(), 1);
    }

    #[tokio::test]
    async fn test_blockhash_fallback_is_flagged() {
        let mock = Arc::new(MockNetworkClient::new());
        mock.set_blockhash_error(Some(NetworkError::Transport {
            endpoint: "mock".to_string(),
            message: "connection refused".to_string(),
        }));

        let mut builder = TransactionBuilder::default()
            .with_network(mock)
            .with_default_fee_payer(Pubkey::new_unique());
        builder.add_instruction(program_ix(1)).unwrap();

        let output = builder.build().await.expect("fallback still builds");
        assert_eq!(output.tx.recent_blockhash(), PLACEHOLDER_BLOCKHASH);
        assert!(output.is_degraded());
        assert!(matches!(
            output.warnings.as_slice(),
            [BuildWarning::PlaceholderBlockhash { reason }] if reason.contains("connection refused")
        ));
    }

    #[test]
    fn test_register_and_resolve_accounts() {
        let mut builder = TransactionBuilder::default();
        let vault = Pubkey::new_unique();
        builder.register_account("vault", vault);

        assert_eq!(builder.account("vault"), Ok(vault));
        let meta = builder.account_meta("vault", false, true).unwrap();
        assert!(meta.is_writable);

        let err = builder.account("missing").unwrap_err();
        assert_eq!(err.category(), "account");

        let program = Pubkey::new_unique();
        let (pda, _bump) = builder
            .resolve_pda("config", &[b"config"], &program)
            .expect("derivable");
        assert_eq!(builder.account("config"), Ok(pda));
        assert!(!pda.is_on_curve());
    }

    #[tokio::test]
    async fn test_low_compute_limit_warns() {
        let mut builder = builder_with_payer();
        builder.add_instruction(program_ix(1)).unwrap();
        builder.set_compute_budget(1_000, None);

        let output = builder.build().await.expect("build");
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, BuildWarning::ComputeLimitBelowEstimate { requested: 1_000, .. })));
    }
}
