//! Remote dry-run execution
//!
//! - **types**: simulation data model and `err` parsing
//! - **simulator**: cached `Simulator` with account preflight

pub mod simulator;
pub mod types;

pub use simulator::{SimulationCache, Simulator};
pub use types::{
    AccountSnapshot, PreflightConfig, ReturnData, SimulationConfig, SimulationError,
    SimulationResult, TransactionProfile,
};
