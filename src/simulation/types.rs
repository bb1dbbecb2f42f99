//! Simulation data model
//!
//! Everything returned by the remote dry-run is parsed into these fixed
//! shapes at the network boundary; no untyped JSON travels further.

use crate::rpc::Commitment;
use crate::validation::{AccountDependency, ValidationConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Point-in-time view of an on-chain account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub lamports: u64,
    pub owner: Pubkey,
    pub data_len: usize,
    pub executable: bool,
    pub rent_epoch: u64,
}

/// Data returned by the last program that set return data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnData {
    pub program_id: Pubkey,
    pub data: Vec<u8>,
}

/// Shape of the transaction that produced a simulation
///
/// The simulator records it on every result it produces. Account and
/// compute analyses prefer an explicitly supplied profile, then this one,
/// then what can be inferred from logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionProfile {
    pub instruction_count: usize,
    pub account_count: usize,
    pub writable_accounts: usize,
    pub signer_count: usize,
}

impl TransactionProfile {
    pub fn from_transaction(tx: &crate::tx_builder::Transaction) -> Self {
        let refs = tx.account_refs();
        Self {
            instruction_count: tx.instructions().len(),
            account_count: refs.len(),
            writable_accounts: refs.iter().filter(|r| r.is_writable).count(),
            signer_count: refs.iter().filter(|r| r.is_signer).count(),
        }
    }
}

/// Why a simulation did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationError {
    /// Account preflight rejected the transaction before any network call
    #[error("Preflight validation failed: {message}")]
    Preflight {
        message: String,
        invalid_accounts: Vec<Pubkey>,
    },

    /// The network collaborator failed (timeout, transport, malformed response)
    #[error("RPC error: {message}")]
    Rpc { message: String, retryable: bool },

    /// An instruction failed on-chain
    #[error("Instruction {index} failed: {detail}")]
    Instruction {
        index: u8,
        detail: String,
        custom_code: Option<u32>,
    },

    /// Transaction-level failure reported by the runtime
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl SimulationError {
    /// Parse the `err` member of a `simulateTransaction` response
    ///
    /// Accepted shapes: a bare string, or `{"InstructionError": [index, detail]}`
    /// where `detail` is a string or a single-key map such as `{"Custom": 6001}`.
    /// Anything else is kept as transaction-level text.
    pub fn from_rpc_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Transaction(s.clone()),
            Value::Object(map) => match map.get("InstructionError") {
                Some(Value::Array(parts)) if parts.len() == 2 => {
                    let index = parts[0]
                        .as_u64()
                        .and_then(|i| u8::try_from(i).ok());
                    match index {
                        Some(index) => Self::instruction_error(index, &parts[1]),
                        None => Self::Transaction(value.to_string()),
                    }
                }
                _ => Self::Transaction(value.to_string()),
            },
            _ => Self::Transaction(value.to_string()),
        }
    }

    fn instruction_error(index: u8, detail: &Value) -> Self {
        match detail {
            Value::String(s) => Self::Instruction {
                index,
                detail: s.clone(),
                custom_code: None,
            },
            Value::Object(map) => {
                let custom_code = map
                    .get("Custom")
                    .and_then(Value::as_u64)
                    .and_then(|c| u32::try_from(c).ok());
                let detail = match custom_code {
                    Some(code) => format!("Custom({})", code),
                    None => detail.to_string(),
                };
                Self::Instruction {
                    index,
                    detail,
                    custom_code,
                }
            }
            other => Self::Instruction {
                index,
                detail: other.to_string(),
                custom_code: None,
            },
        }
    }

    /// Taxonomy label for metrics and issue reporting
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Preflight { .. } => "preflight",
            Self::Rpc { .. } => "rpc",
            Self::Instruction { .. } => "instruction",
            Self::Transaction(_) => "transaction",
        }
    }

    pub fn custom_code(&self) -> Option<u32> {
        match self {
            Self::Instruction { custom_code, .. } => *custom_code,
            _ => None,
        }
    }
}

/// Options for [`Simulator::simulate`](crate::simulation::Simulator::simulate)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub commitment: Commitment,

    #[serde(default)]
    pub sig_verify: bool,

    #[serde(default = "default_true")]
    pub replace_recent_blockhash: bool,

    /// Return post-simulation account states
    #[serde(default)]
    pub include_accounts: bool,

    /// Accounts to return when `include_accounts` is set; empty means the
    /// transaction's writable accounts
    #[serde(default)]
    pub accounts: Vec<Pubkey>,
}

fn default_true() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            commitment: Commitment::default(),
            sig_verify: false,
            replace_recent_blockhash: true,
            include_accounts: false,
            accounts: Vec::new(),
        }
    }
}

/// Account checks run by `simulate_with_preflight`
#[derive(Debug, Clone, Default)]
pub struct PreflightConfig {
    pub validation: ValidationConfig,

    /// Addresses to validate; `None` validates every account the transaction references
    pub addresses: Option<Vec<Pubkey>>,

    pub dependencies: Vec<AccountDependency>,
    pub expected_owners: HashMap<Pubkey, Pubkey>,
}

/// Outcome of one dry-run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Unique id of this result (shared by cache hits)
    pub id: String,
    /// Fingerprint of the simulated transaction
    pub fingerprint: String,
    pub success: bool,
    pub logs: Vec<String>,
    pub error: Option<SimulationError>,
    pub compute_units_consumed: Option<u64>,
    pub accounts: BTreeMap<Pubkey, Option<AccountSnapshot>>,
    pub return_data: Option<ReturnData>,
    /// Shape of the simulated transaction, when known
    #[serde(default)]
    pub profile: Option<TransactionProfile>,
    pub simulated_at: DateTime<Utc>,
}

impl SimulationResult {
    /// Successful or on-chain-failed result
    pub fn new(
        fingerprint: impl Into<String>,
        logs: Vec<String>,
        error: Option<SimulationError>,
        compute_units_consumed: Option<u64>,
        accounts: BTreeMap<Pubkey, Option<AccountSnapshot>>,
        return_data: Option<ReturnData>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint: fingerprint.into(),
            success: error.is_none(),
            logs,
            error,
            compute_units_consumed,
            accounts,
            return_data,
            profile: None,
            simulated_at: Utc::now(),
        }
    }

    pub fn with_profile(mut self, profile: TransactionProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Result for a simulation that never reached the runtime
    pub fn failure(fingerprint: impl Into<String>, error: SimulationError) -> Self {
        Self::new(fingerprint, Vec::new(), Some(error), None, BTreeMap::new(), None)
    }

    /// Digest of the result content, excluding id and timestamp
    ///
    /// Two results with equal content keys analyze identically.
    pub fn content_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint.as_bytes());
        hasher.update([self.success as u8]);
        for line in &self.logs {
            hasher.update((line.len() as u64).to_le_bytes());
            hasher.update(line.as_bytes());
        }
        if let Some(error) = &self.error {
            hasher.update(error.to_string().as_bytes());
        }
        hasher.update(self.compute_units_consumed.unwrap_or(u64::MAX).to_le_bytes());
        for (address, snapshot) in &self.accounts {
            hasher.update(address.as_ref());
            if let Some(s) = snapshot {
                hasher.update(s.lamports.to_le_bytes());
                hasher.update(s.owner.as_ref());
                hasher.update((s.data_len as u64).to_le_bytes());
            }
        }
        if let Some(rd) = &self.return_data {
            hasher.update(rd.program_id.as_ref());
            hasher.update(&rd.data);
        }
        if let Some(p) = &self.profile {
            for count in [p.instruction_count, p.account_count, p.writable_accounts, p.signer_count] {
                hasher.update((count as u64).to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_string_error() {
        let err = SimulationError::from_rpc_value(&json!("AccountNotFound"));
        assert_eq!(err, SimulationError::Transaction("AccountNotFound".to_string()));
    }

    #[test]
    fn test_parse_custom_instruction_error() {
        let err = SimulationError::from_rpc_value(&json!({"InstructionError": [1, {"Custom": 6001}]}));
        assert_eq!(
            err,
            SimulationError::Instruction {
                index: 1,
                detail: "Custom(6001)".to_string(),
                custom_code: Some(6001),
            }
        );
        assert_eq!(err.custom_code(), Some(6001));
        assert_eq!(err.kind(), "instruction");
    }

    #[test]
    fn test_parse_named_instruction_error() {
        let err = SimulationError::from_rpc_value(&json!({"InstructionError": [0, "InvalidAccountData"]}));
        assert_eq!(
            err,
            SimulationError::Instruction {
                index: 0,
                detail: "InvalidAccountData".to_string(),
                custom_code: None,
            }
        );
    }

    #[test]
    fn test_parse_unknown_shape() {
        let err = SimulationError::from_rpc_value(&json!({"InsufficientFundsForRent": {"account_index": 2}}));
        assert!(matches!(err, SimulationError::Transaction(text) if text.contains("InsufficientFundsForRent")));

        let err = SimulationError::from_rpc_value(&json!({"InstructionError": [999, "X"]}));
        assert!(matches!(err, SimulationError::Transaction(_)));
    }

    #[test]
    fn test_content_key_ignores_identity() {
        let a = SimulationResult::new("fp", vec!["Program log: hi".into()], None, Some(10), BTreeMap::new(), None);
        let mut b = a.clone();
        b.id = "other".to_string();
        b.simulated_at = Utc::now();
        assert_eq!(a.content_key(), b.content_key());

        let c = SimulationResult::new("fp", vec![], None, Some(11), BTreeMap::new(), None);
        assert_ne!(a.content_key(), c.content_key());
    }

    #[test]
    fn test_failure_is_unsuccessful() {
        let result = SimulationResult::failure(
            "fp",
            SimulationError::Rpc {
                message: "timeout".into(),
                retryable: true,
            },
        );
        assert!(!result.success);
        assert!(result.logs.is_empty());
        assert_eq!(result.error.as_ref().map(|e| e.kind()), Some("rpc"));
    }
}
