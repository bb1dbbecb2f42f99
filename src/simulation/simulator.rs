//! Dry-run orchestration with a result cache
//!
//! Results are cached under the transaction fingerprint plus the config
//! fields that change what the runtime returns. Collaborator failures are
//! folded into a failed [`SimulationResult`]; nothing is thrown past this
//! boundary.

use crate::cache::{CacheConfig, CacheLayer};
use crate::metrics::{metrics, Timer};
use crate::observability::CorrelationId;
use crate::rpc::{NetworkClient, SimulateOptions};
use crate::simulation::types::{
    PreflightConfig, SimulationConfig, SimulationError, SimulationResult, TransactionProfile,
};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{Transaction, TransactionBuilderError};
use crate::validation::AccountValidator;
use solana_sdk::{signature::Signature, signer::Signer, transaction::Transaction as SolanaTransaction};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub type SimulationCache = CacheLayer<String, Arc<SimulationResult>>;

type Compiled = Result<SolanaTransaction, TransactionBuilderError>;

#[derive(Debug)]
pub struct Simulator {
    network: Arc<dyn NetworkClient>,
    validator: Arc<AccountValidator>,
    cache: Arc<SimulationCache>,
    logger: StructuredLogger,
}

impl Simulator {
    pub fn new(
        network: Arc<dyn NetworkClient>,
        validator: Arc<AccountValidator>,
        cache: Arc<SimulationCache>,
    ) -> Self {
        Self {
            network,
            validator,
            cache,
            logger: StructuredLogger::new(CorrelationId::new().to_string()),
        }
    }

    /// Simulator and validator with private caches
    pub fn with_cache_configs(
        network: Arc<dyn NetworkClient>,
        validation_cache: &CacheConfig,
        simulation_cache: &CacheConfig,
    ) -> Self {
        let validator = Arc::new(AccountValidator::with_cache_config(network.clone(), validation_cache));
        let cache = Arc::new(CacheLayer::new("simulation", simulation_cache));
        Self::new(network, validator, cache)
    }

    pub fn cache(&self) -> &Arc<SimulationCache> {
        &self.cache
    }

    pub fn validator(&self) -> &Arc<AccountValidator> {
        &self.validator
    }

    /// Cache key for a transaction under a config
    pub fn cache_key(tx: &Transaction, config: &SimulationConfig) -> String {
        let mut key = format!(
            "{}:{}:{}:{}",
            tx.fingerprint(),
            config.commitment,
            config.include_accounts,
            config.sig_verify
        );
        if config.include_accounts && !config.accounts.is_empty() {
            let accounts: Vec<String> = config.accounts.iter().map(|a| a.to_string()).collect();
            key.push(':');
            key.push_str(&accounts.join(","));
        }
        key
    }

    /// Cache key including the signatures when the config verifies them
    ///
    /// Equal to [`Simulator::cache_key`] unless `sig_verify` is set, so an
    /// unsigned dry-run never answers for a signed one.
    pub fn signed_cache_key(tx: &Transaction, signatures: &[Signature], config: &SimulationConfig) -> String {
        let mut key = Self::cache_key(tx, config);
        if config.sig_verify {
            let signatures: Vec<String> = signatures.iter().map(|s| s.to_string()).collect();
            key.push_str(":sigs=");
            key.push_str(&signatures.join(","));
        }
        key
    }

    /// Dry-run a transaction
    ///
    /// Signing happens before the returned future is created, so the future
    /// does not borrow `signers`. A repeated call with the same transaction
    /// and config returns the cached result without a network call.
    pub fn simulate<'a>(
        &'a self,
        tx: &'a Transaction,
        signers: &[&dyn Signer],
        config: &'a SimulationConfig,
    ) -> impl Future<Output = Arc<SimulationResult>> + Send + 'a {
        let compiled = tx.to_solana_transaction(signers);
        self.run(tx, compiled, config)
    }

    /// Validate accounts first; skip the dry-run if validation fails
    pub fn simulate_with_preflight<'a>(
        &'a self,
        tx: &'a Transaction,
        signers: &[&dyn Signer],
        config: &'a SimulationConfig,
        preflight: &'a PreflightConfig,
    ) -> impl Future<Output = Arc<SimulationResult>> + Send + 'a {
        let compiled = tx.to_solana_transaction(signers);
        async move {
            let addresses = preflight
                .addresses
                .clone()
                .unwrap_or_else(|| tx.account_refs().iter().map(|r| r.address).collect());

            let validation = self
                .validator
                .validate(
                    &addresses,
                    &preflight.validation,
                    &preflight.dependencies,
                    &preflight.expected_owners,
                )
                .await;

            if !validation.success {
                metrics().preflight_failures.inc();
                let message = validation
                    .errors()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                let invalid_accounts = validation.invalid_accounts();
                warn!(
                    invalid = invalid_accounts.len(),
                    error = %message,
                    "Preflight validation failed, skipping simulation"
                );
                return Arc::new(
                    SimulationResult::failure(
                        tx.fingerprint(),
                        SimulationError::Preflight {
                            message,
                            invalid_accounts,
                        },
                    )
                    .with_profile(TransactionProfile::from_transaction(tx)),
                );
            }

            self.run(tx, compiled, config).await
        }
    }

    #[instrument(skip_all, fields(commitment = %config.commitment))]
    async fn run(&self, tx: &Transaction, compiled: Compiled, config: &SimulationConfig) -> Arc<SimulationResult> {
        metrics().simulations_total.inc();
        let fingerprint = tx.fingerprint();
        let profile = TransactionProfile::from_transaction(tx);
        let key = match &compiled {
            Ok(compiled) => Self::signed_cache_key(tx, &compiled.signatures, config),
            Err(_) => Self::cache_key(tx, config),
        };

        if let Some(hit) = self.cache.get(&key) {
            metrics().simulation_cache_hits.inc();
            self.logger.log_simulation_cache(&fingerprint, true);
            return hit;
        }
        metrics().simulation_cache_misses.inc();
        self.logger.log_simulation_cache(&fingerprint, false);

        let compiled = match compiled {
            Ok(compiled) => compiled,
            Err(e) => {
                let result = SimulationResult::failure(
                    fingerprint,
                    SimulationError::Transaction(format!("transaction could not be compiled: {}", e)),
                )
                .with_profile(profile);
                self.log_outcome(&result);
                return Arc::new(result);
            }
        };

        let requested = if !config.include_accounts {
            None
        } else if config.accounts.is_empty() {
            Some(tx.writable_accounts())
        } else {
            Some(config.accounts.clone())
        };
        let options = SimulateOptions {
            commitment: config.commitment,
            sig_verify: config.sig_verify,
            replace_recent_blockhash: config.replace_recent_blockhash,
            accounts: requested.clone(),
        };

        let timer = Timer::new();
        let outcome = self.network.simulate_transaction(&compiled, &options).await;
        timer.observe_duration(&metrics().simulation_latency);

        match outcome {
            Ok(raw) => {
                let accounts: BTreeMap<_, _> = requested
                    .unwrap_or_default()
                    .into_iter()
                    .enumerate()
                    .map(|(i, address)| (address, raw.accounts.get(i).cloned().flatten()))
                    .collect();
                let result = Arc::new(
                    SimulationResult::new(
                        fingerprint,
                        raw.logs,
                        raw.err,
                        raw.units_consumed,
                        accounts,
                        raw.return_data,
                    )
                    .with_profile(profile),
                );
                self.log_outcome(&result);
                let metadata = BTreeMap::from([
                    ("fingerprint".to_string(), result.fingerprint.clone()),
                    ("commitment".to_string(), config.commitment.to_string()),
                ]);
                self.cache.put_with_metadata(key, result.clone(), metadata);
                result
            }
            Err(e) => {
                debug!(endpoint = self.network.endpoint(), error = %e, "Simulation call failed");
                let result = SimulationResult::failure(
                    fingerprint,
                    SimulationError::Rpc {
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    },
                )
                .with_profile(profile);
                self.log_outcome(&result);
                Arc::new(result)
            }
        }
    }

    fn log_outcome(&self, result: &SimulationResult) {
        let error = result.error.as_ref().map(|e| e.to_string());
        self.logger.log_simulation_outcome(
            &result.fingerprint,
            result.success,
            result.compute_units_consumed,
            error.as_deref(),
        );
    }
}
