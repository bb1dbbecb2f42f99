//! Batched, cached account validation
//!
//! Addresses are checked against the status cache first; misses are fetched
//! from the network collaborator in chunks of `max_parallel_requests`, each
//! chunk awaited before the next starts. A failed fetch only affects its own
//! address. Statuses are returned in input order whatever the completion
//! order was.

use crate::cache::{CacheConfig, CacheLayer};
use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::rpc::{Commitment, NetworkClient, NetworkError};
use crate::simulation::AccountSnapshot;
use crate::structured_logging::StructuredLogger;
use crate::validation::types::{
    AccountDependency, AccountValidationStatus, DependencyType, FetchStrategy, ValidationConfig,
    ValidationErrorKind, ValidationResult, ValidationWarning,
};
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// System, token and compute budget program addresses
pub fn is_well_known_program(address: &Pubkey) -> bool {
    *address == solana_sdk::system_program::id()
        || *address == spl_token::id()
        || *address == TOKEN_2022_PROGRAM_ID
        || *address == spl_associated_token_account::id()
        || *address == solana_sdk::compute_budget::id()
}

/// Everything a cached status depends on besides the account itself
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountStatusKey {
    address: Pubkey,
    expected_owner: Option<Pubkey>,
    validate_existence: bool,
    min_balance_lamports: u64,
    max_data_bytes: usize,
    commitment: Commitment,
}

impl AccountStatusKey {
    fn new(address: Pubkey, expected_owner: Option<Pubkey>, config: &ValidationConfig) -> Self {
        Self {
            address,
            expected_owner: expected_owner.filter(|_| config.validate_ownership),
            validate_existence: config.validate_existence,
            min_balance_lamports: config.min_balance_lamports,
            max_data_bytes: config.max_data_bytes,
            commitment: config.commitment,
        }
    }
}

pub type AccountStatusCache = CacheLayer<AccountStatusKey, AccountValidationStatus>;

type FetchResult = Result<Option<AccountSnapshot>, NetworkError>;

#[derive(Debug)]
pub struct AccountValidator {
    network: Arc<dyn NetworkClient>,
    cache: Arc<AccountStatusCache>,
    logger: StructuredLogger,
}

impl AccountValidator {
    pub fn new(network: Arc<dyn NetworkClient>, cache: Arc<AccountStatusCache>) -> Self {
        Self {
            network,
            cache,
            logger: StructuredLogger::new(CorrelationId::new().to_string()),
        }
    }

    /// Validator with a private status cache
    pub fn with_cache_config(network: Arc<dyn NetworkClient>, cache: &CacheConfig) -> Self {
        Self::new(network, Arc::new(CacheLayer::new("account_status", cache)))
    }

    pub fn cache(&self) -> &Arc<AccountStatusCache> {
        &self.cache
    }

    /// Validate a set of addresses
    ///
    /// Duplicate addresses are validated once. The result reports every
    /// address; an invalid account never hides the status of a valid one.
    #[instrument(skip_all, fields(accounts = addresses.len(), batch = config.batch_mode))]
    pub async fn validate(
        &self,
        addresses: &[Pubkey],
        config: &ValidationConfig,
        dependencies: &[AccountDependency],
        expected_owners: &HashMap<Pubkey, Pubkey>,
    ) -> ValidationResult {
        let started = Instant::now();
        metrics().validations_total.inc();

        let mut seen = HashSet::new();
        let ordered: Vec<Pubkey> = addresses.iter().copied().filter(|a| seen.insert(*a)).collect();

        let mut resolved: HashMap<Pubkey, AccountValidationStatus> = HashMap::new();
        let mut pending = Vec::new();
        let mut cache_hits = 0;

        for address in &ordered {
            if config.skip_system_account_validation && is_well_known_program(address) {
                resolved.insert(*address, skipped_status(*address));
                continue;
            }
            let key = AccountStatusKey::new(*address, expected_owners.get(address).copied(), config);
            if config.use_cache {
                if let Some(status) = self.cache.get(&key) {
                    debug!(address = %address, "Account status cache hit");
                    cache_hits += 1;
                    resolved.insert(*address, status);
                    continue;
                }
            }
            pending.push(key);
        }

        let fetched = if config.batch_mode {
            self.fetch_batched(&pending, config).await
        } else {
            self.fetch_sequential(&pending, config.commitment).await
        };

        for (key, result) in pending.into_iter().zip(fetched) {
            let status = classify(key.address, result, key.expected_owner, config);
            if config.use_cache && !status.is_network_failure() {
                self.cache.put(key, status.clone());
            }
            resolved.insert(status.address, status);
        }

        let statuses: Vec<AccountValidationStatus> = ordered
            .iter()
            .filter_map(|address| resolved.remove(address))
            .collect();

        let dependency_warnings = check_dependencies(&statuses, dependencies);

        let error_count: usize = statuses.iter().map(|s| s.errors.len()).sum();
        let result = ValidationResult {
            success: error_count == 0,
            statuses,
            dependency_warnings,
            cache_hits,
            elapsed: started.elapsed(),
        };

        metrics().validation_errors.inc_by(error_count as u64);
        metrics().validation_cache_hits.inc_by(cache_hits as u64);
        self.logger.log_validation_summary(
            result.statuses.len(),
            error_count,
            result.warning_count(),
            cache_hits,
            result.elapsed.as_millis() as u64,
        );

        result
    }

    /// Validate every account a transaction references
    pub async fn validate_transaction(
        &self,
        tx: &crate::tx_builder::Transaction,
        config: &ValidationConfig,
    ) -> ValidationResult {
        let addresses: Vec<Pubkey> = tx.account_refs().iter().map(|r| r.address).collect();
        self.validate(&addresses, config, &[], &HashMap::new()).await
    }

    async fn fetch_sequential(&self, keys: &[AccountStatusKey], commitment: Commitment) -> Vec<FetchResult> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.network.get_account_info(&key.address, commitment).await);
        }
        results
    }

    async fn fetch_batched(&self, keys: &[AccountStatusKey], config: &ValidationConfig) -> Vec<FetchResult> {
        let addresses: Vec<Pubkey> = keys.iter().map(|k| k.address).collect();
        let mut results = Vec::with_capacity(addresses.len());

        for chunk in addresses.chunks(config.max_parallel_requests.max(1)) {
            let chunk_results = match config.fetch_strategy {
                FetchStrategy::PerAccount => self.fetch_each(chunk, config.commitment).await,
                FetchStrategy::MultipleAccounts => {
                    match self.network.get_multiple_accounts(chunk, config.commitment).await {
                        Ok(accounts) if accounts.len() == chunk.len() => {
                            accounts.into_iter().map(Ok).collect()
                        }
                        Ok(accounts) => {
                            warn!(
                                requested = chunk.len(),
                                returned = accounts.len(),
                                "getMultipleAccounts returned wrong length, retrying per account"
                            );
                            self.fetch_each(chunk, config.commitment).await
                        }
                        Err(e) => {
                            warn!(error = %e, chunk = chunk.len(), "Batch account fetch failed, retrying per account");
                            self.fetch_each(chunk, config.commitment).await
                        }
                    }
                }
            };
            results.extend(chunk_results);
        }

        results
    }

    async fn fetch_each(&self, chunk: &[Pubkey], commitment: Commitment) -> Vec<FetchResult> {
        join_all(
            chunk
                .iter()
                .map(|address| self.network.get_account_info(address, commitment)),
        )
        .await
    }
}

fn skipped_status(address: Pubkey) -> AccountValidationStatus {
    let mut status = AccountValidationStatus::empty(address);
    status.exists = true;
    status.executable = true;
    status.warnings.push(ValidationWarning::SystemAccountSkipped);
    status
}

fn classify(
    address: Pubkey,
    fetched: FetchResult,
    expected_owner: Option<Pubkey>,
    config: &ValidationConfig,
) -> AccountValidationStatus {
    let mut status = AccountValidationStatus::empty(address);

    let account = match fetched {
        Ok(Some(account)) => account,
        Ok(None) => {
            if config.validate_existence {
                status.push_error(ValidationErrorKind::AccountNotFound);
            }
            return status;
        }
        Err(e) => {
            warn!(address = %address, error = %e, "Account fetch failed");
            status.push_error(ValidationErrorKind::Network {
                message: e.to_string(),
                timeout: matches!(e, NetworkError::Timeout { .. }),
            });
            return status;
        }
    };

    status.exists = true;
    status.owner = Some(account.owner);
    status.lamports = account.lamports;
    status.data_length = account.data_len;
    status.executable = account.executable;

    if let Some(expected) = expected_owner {
        if config.validate_ownership && expected != account.owner {
            status.push_error(ValidationErrorKind::OwnershipMismatch {
                expected,
                actual: account.owner,
            });
        }
    }

    if account.lamports < config.min_balance_lamports {
        status.warnings.push(ValidationWarning::LowBalance {
            lamports: account.lamports,
            minimum: config.min_balance_lamports,
        });
    }
    if account.data_len > config.max_data_bytes {
        status.warnings.push(ValidationWarning::OversizedData {
            data_len: account.data_len,
            maximum: config.max_data_bytes,
        });
    }

    status
}

/// Informative dependency pass; never produces errors
fn check_dependencies(
    statuses: &[AccountValidationStatus],
    dependencies: &[AccountDependency],
) -> Vec<ValidationWarning> {
    let by_address: HashMap<&Pubkey, &AccountValidationStatus> =
        statuses.iter().map(|s| (&s.address, s)).collect();
    let mut warnings = Vec::new();

    for dep in dependencies {
        let issue = |reason: String| ValidationWarning::PotentialDependencyIssue {
            dependent: dep.dependent,
            dependency: dep.dependency,
            reason,
        };

        let dependent = by_address.get(&dep.dependent).filter(|s| s.exists);
        let dependency = by_address.get(&dep.dependency).filter(|s| s.exists);
        let (Some(dependent), Some(_)) = (dependent, dependency) else {
            warnings.push(issue("dependent or dependency account unavailable".to_string()));
            continue;
        };

        match dep.dependency_type {
            DependencyType::Ownership => {
                if dependent.owner != Some(dep.dependency) {
                    let actual = dependent
                        .owner
                        .map(|o| o.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    warnings.push(issue(format!("owned by {}", actual)));
                }
            }
            other => {
                debug!(
                    dependent = %dep.dependent,
                    dependency = %dep.dependency,
                    dependency_type = ?other,
                    "Dependency type not checked"
                );
            }
        }
    }

    warnings
}
