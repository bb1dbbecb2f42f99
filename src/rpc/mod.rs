//! Network collaborator boundary
//!
//! Every remote call the pipeline makes goes through [`NetworkClient`].
//! Production code uses [`RpcNetworkClient`]; tests inject a stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, transaction::Transaction as SolanaTransaction};

pub mod rpc_client;
pub mod rpc_config;
pub mod rpc_errors;

pub use rpc_client::RpcNetworkClient;
pub use rpc_config::{Commitment, RpcConfig};
pub use rpc_errors::{NetworkError, RetryPolicy};

use crate::simulation::{AccountSnapshot, ReturnData, SimulationError};

/// Request options for `simulateTransaction`
#[derive(Debug, Clone, PartialEq)]
pub struct SimulateOptions {
    pub commitment: Commitment,
    pub sig_verify: bool,
    pub replace_recent_blockhash: bool,
    /// Accounts whose post-simulation state should be returned
    pub accounts: Option<Vec<Pubkey>>,
}

/// Typed `simulateTransaction` response value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSimulation {
    pub err: Option<SimulationError>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
    /// Same order as `SimulateOptions::accounts`
    pub accounts: Vec<Option<AccountSnapshot>>,
    pub return_data: Option<ReturnData>,
}

/// One `getRecentPrioritizationFees` sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrioritizationFee {
    pub slot: u64,
    /// Micro-lamports per compute unit
    pub prioritization_fee: u64,
}

/// Remote JSON-RPC methods consumed by the pipeline
#[async_trait]
pub trait NetworkClient: Send + Sync + std::fmt::Debug {
    /// Endpoint label used in logs and errors
    fn endpoint(&self) -> &str;

    async fn get_account_info(
        &self,
        address: &Pubkey,
        commitment: Commitment,
    ) -> Result<Option<AccountSnapshot>, NetworkError>;

    /// Results are returned in request order
    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
        commitment: Commitment,
    ) -> Result<Vec<Option<AccountSnapshot>>, NetworkError>;

    /// Base58 blockhash
    async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<String, NetworkError>;

    async fn simulate_transaction(
        &self,
        transaction: &SolanaTransaction,
        options: &SimulateOptions,
    ) -> Result<RawSimulation, NetworkError>;

    async fn get_recent_prioritization_fees(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<PrioritizationFee>, NetworkError>;
}
