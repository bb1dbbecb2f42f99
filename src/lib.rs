//! txforge
//!
//! Client-side Solana transaction pipeline: build, validate accounts,
//! simulate against a network collaborator, analyze the outcome and replay
//! cached simulations.
//!
//! ## Modules
//!
//! - **tx_builder**: instruction assembly, size/compute estimation, validation, optimization
//! - **validation**: batched account existence/ownership/balance checks
//! - **simulation**: cached simulation with optional preflight validation
//! - **analysis**: log parsing, compute/CPI analysis, fee tiers
//! - **cache**: bounded LRU layer shared by the above, and session replay
//! - **rpc**: the `NetworkClient` seam and its solana-client implementation

pub mod analysis;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod rpc;
pub mod simulation;
pub mod structured_logging;
pub mod test_utils;
pub mod tx_builder;
pub mod validation;

pub use analysis::{AnalysisResult, ComputeUnitAnalyzer, ResultAnalyzer};
pub use cache::{CacheConfig, CacheLayer};
pub use config::Config;
pub use rpc::{NetworkClient, NetworkError, RpcNetworkClient};
pub use simulation::{SimulationResult, Simulator};
pub use tx_builder::{Transaction, TransactionBuilder};
pub use validation::{AccountValidator, ValidationResult};

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
