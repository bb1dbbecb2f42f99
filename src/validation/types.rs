//! Account validation data model

use crate::rpc::Commitment;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// How account state is fetched for a chunk of addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// One `getAccountInfo` per address, run concurrently within a chunk
    #[default]
    PerAccount,
    /// One `getMultipleAccounts` per chunk
    MultipleAccounts,
}

/// Account validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub validate_existence: bool,

    #[serde(default = "default_true")]
    pub validate_ownership: bool,

    /// Skip network checks for system and token program addresses
    #[serde(default = "default_true")]
    pub skip_system_account_validation: bool,

    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Validate in concurrent chunks; sequential otherwise
    #[serde(default = "default_true")]
    pub batch_mode: bool,

    /// Chunk size (and in-flight request bound) in batch mode
    #[serde(default = "default_max_parallel_requests")]
    pub max_parallel_requests: usize,

    #[serde(default)]
    pub fetch_strategy: FetchStrategy,

    #[serde(default)]
    pub commitment: Commitment,

    /// Balances below this raise a `LowBalance` warning
    #[serde(default = "default_min_balance_lamports")]
    pub min_balance_lamports: u64,

    /// Data larger than this raises an `OversizedData` warning
    #[serde(default = "default_max_data_bytes")]
    pub max_data_bytes: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_parallel_requests() -> usize {
    10
}

fn default_min_balance_lamports() -> u64 {
    1_000_000
}

fn default_max_data_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            validate_existence: true,
            validate_ownership: true,
            skip_system_account_validation: true,
            use_cache: true,
            batch_mode: true,
            max_parallel_requests: default_max_parallel_requests(),
            fetch_strategy: FetchStrategy::default(),
            commitment: Commitment::default(),
            min_balance_lamports: default_min_balance_lamports(),
            max_data_bytes: default_max_data_bytes(),
        }
    }
}

/// Per-address validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationErrorKind {
    AccountNotFound,
    OwnershipMismatch { expected: Pubkey, actual: Pubkey },
    /// Fetch failed or timed out; the address could not be checked
    Network { message: String, timeout: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub address: Pubkey,
    pub kind: ValidationErrorKind,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ValidationErrorKind::AccountNotFound => write!(f, "account {} not found", self.address),
            ValidationErrorKind::OwnershipMismatch { expected, actual } => write!(
                f,
                "account {} owned by {}, expected {}",
                self.address, actual, expected
            ),
            ValidationErrorKind::Network { message, .. } => {
                write!(f, "could not fetch {}: {}", self.address, message)
            }
        }
    }
}

/// Non-blocking per-address finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationWarning {
    LowBalance { lamports: u64, minimum: u64 },
    OversizedData { data_len: usize, maximum: usize },
    /// Well-known program address accepted without a network check
    SystemAccountSkipped,
    PotentialDependencyIssue {
        dependent: Pubkey,
        dependency: Pubkey,
        reason: String,
    },
}

/// Validation outcome for one address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountValidationStatus {
    pub address: Pubkey,
    pub exists: bool,
    pub owner: Option<Pubkey>,
    pub lamports: u64,
    pub data_length: usize,
    pub executable: bool,
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl AccountValidationStatus {
    pub(crate) fn empty(address: Pubkey) -> Self {
        Self {
            address,
            exists: false,
            owner: None,
            lamports: 0,
            data_length: 0,
            executable: false,
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn push_error(&mut self, kind: ValidationErrorKind) {
        self.errors.push(ValidationError {
            address: self.address,
            kind,
        });
        self.is_valid = false;
    }

    /// True when the only problem is a failed fetch
    pub fn is_network_failure(&self) -> bool {
        !self.errors.is_empty()
            && self
                .errors
                .iter()
                .all(|e| matches!(e.kind, ValidationErrorKind::Network { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// `dependent` must be owned by `dependency`
    Ownership,
    StateConsistency,
    CrossReference,
    PdaDerived,
}

/// Declared relationship between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDependency {
    pub dependent: Pubkey,
    pub dependency: Pubkey,
    pub dependency_type: DependencyType,
}

impl AccountDependency {
    pub fn ownership(dependent: Pubkey, owner: Pubkey) -> Self {
        Self {
            dependent,
            dependency: owner,
            dependency_type: DependencyType::Ownership,
        }
    }
}

/// Outcome of [`AccountValidator::validate`](crate::validation::AccountValidator::validate)
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// No address reported an error
    pub success: bool,
    /// One status per distinct input address, in input order
    pub statuses: Vec<AccountValidationStatus>,
    pub dependency_warnings: Vec<ValidationWarning>,
    pub cache_hits: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ValidationResult {
    pub fn status(&self, address: &Pubkey) -> Option<&AccountValidationStatus> {
        self.statuses.iter().find(|s| s.address == *address)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.statuses.iter().flat_map(|s| s.errors.iter())
    }

    pub fn invalid_accounts(&self) -> Vec<Pubkey> {
        self.statuses
            .iter()
            .filter(|s| !s.is_valid)
            .map(|s| s.address)
            .collect()
    }

    pub fn warning_count(&self) -> usize {
        self.statuses.iter().map(|s| s.warnings.len()).sum::<usize>() + self.dependency_warnings.len()
    }
}
