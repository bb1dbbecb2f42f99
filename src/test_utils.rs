//! Test Utilities Module
//!
//! Deterministic network collaborator for unit and integration tests. No
//! network access; every response is scripted and every call is counted.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::rpc::{
    Commitment, NetworkClient, NetworkError, PrioritizationFee, RawSimulation, SimulateOptions,
};
use crate::simulation::AccountSnapshot;
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{hash::Hash, pubkey::Pubkey, transaction::Transaction as SolanaTransaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Account snapshot shorthand for tests
pub fn snapshot(owner: Pubkey, lamports: u64, data_len: usize) -> AccountSnapshot {
    AccountSnapshot {
        lamports,
        owner,
        data_len,
        executable: false,
        rent_epoch: 0,
    }
}

#[derive(Debug, Default)]
struct MockState {
    accounts: HashMap<Pubkey, AccountSnapshot>,
    account_errors: HashMap<Pubkey, NetworkError>,
    account_delays: HashMap<Pubkey, Duration>,
    multiple_accounts_error: Option<NetworkError>,
    blockhash: Option<String>,
    blockhash_error: Option<NetworkError>,
    simulation: RawSimulation,
    simulation_error: Option<NetworkError>,
    fees: Vec<PrioritizationFee>,
    fees_error: Option<NetworkError>,
    delay: Option<Duration>,
    last_simulate_options: Option<SimulateOptions>,
}

/// Mock network collaborator
///
/// Accounts not registered with `with_account` are reported as missing.
#[derive(Debug, Default)]
pub struct MockNetworkClient {
    state: Mutex<MockState>,
    account_info_calls: AtomicUsize,
    multiple_accounts_calls: AtomicUsize,
    blockhash_calls: AtomicUsize,
    simulate_calls: AtomicUsize,
    fee_calls: AtomicUsize,
}

impl MockNetworkClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, address: Pubkey, account: AccountSnapshot) -> Self {
        self.state.lock().accounts.insert(address, account);
        self
    }

    pub fn with_account_error(self, address: Pubkey, error: NetworkError) -> Self {
        self.state.lock().account_errors.insert(address, error);
        self
    }

    /// Delay responses for one address (to scramble completion order)
    pub fn with_account_delay(self, address: Pubkey, delay: Duration) -> Self {
        self.state.lock().account_delays.insert(address, delay);
        self
    }

    pub fn with_blockhash(self, blockhash: impl Into<String>) -> Self {
        self.state.lock().blockhash = Some(blockhash.into());
        self
    }

    pub fn with_simulation(self, simulation: RawSimulation) -> Self {
        self.state.lock().simulation = simulation;
        self
    }

    pub fn with_fees(self, fees: Vec<PrioritizationFee>) -> Self {
        self.state.lock().fees = fees;
        self
    }

    /// Delay applied to every call
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().delay = Some(delay);
        self
    }

    pub fn set_account(&self, address: Pubkey, account: Option<AccountSnapshot>) {
        let mut state = self.state.lock();
        match account {
            Some(account) => state.accounts.insert(address, account),
            None => state.accounts.remove(&address),
        };
    }

    pub fn set_blockhash_error(&self, error: Option<NetworkError>) {
        self.state.lock().blockhash_error = error;
    }

    pub fn set_multiple_accounts_error(&self, error: Option<NetworkError>) {
        self.state.lock().multiple_accounts_error = error;
    }

    pub fn set_simulation(&self, simulation: RawSimulation) {
        self.state.lock().simulation = simulation;
    }

    pub fn set_simulation_error(&self, error: Option<NetworkError>) {
        self.state.lock().simulation_error = error;
    }

    pub fn set_fees_error(&self, error: Option<NetworkError>) {
        self.state.lock().fees_error = error;
    }

    pub fn account_info_calls(&self) -> usize {
        self.account_info_calls.load(Ordering::SeqCst)
    }

    pub fn multiple_accounts_calls(&self) -> usize {
        self.multiple_accounts_calls.load(Ordering::SeqCst)
    }

    pub fn blockhash_calls(&self) -> usize {
        self.blockhash_calls.load(Ordering::SeqCst)
    }

    pub fn simulate_calls(&self) -> usize {
        self.simulate_calls.load(Ordering::SeqCst)
    }

    pub fn fee_calls(&self) -> usize {
        self.fee_calls.load(Ordering::SeqCst)
    }

    pub fn last_simulate_options(&self) -> Option<SimulateOptions> {
        self.state.lock().last_simulate_options.clone()
    }

    async fn pause(&self, address: Option<&Pubkey>) {
        let delay = {
            let state = self.state.lock();
            address
                .and_then(|a| state.account_delays.get(a).copied())
                .or(state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn lookup(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>, NetworkError> {
        let state = self.state.lock();
        if let Some(error) = state.account_errors.get(address) {
            return Err(error.clone());
        }
        Ok(state.accounts.get(address).cloned())
    }
}

#[async_trait]
impl NetworkClient for MockNetworkClient {
    fn endpoint(&self) -> &str {
        "mock"
    }

    async fn get_account_info(
        &self,
        address: &Pubkey,
        _commitment: Commitment,
    ) -> Result<Option<AccountSnapshot>, NetworkError> {
        self.account_info_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(Some(address)).await;
        self.lookup(address)
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
        _commitment: Commitment,
    ) -> Result<Vec<Option<AccountSnapshot>>, NetworkError> {
        self.multiple_accounts_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(None).await;
        if let Some(error) = self.state.lock().multiple_accounts_error.clone() {
            return Err(error);
        }
        addresses.iter().map(|a| self.lookup(a)).collect()
    }

    async fn get_latest_blockhash(&self, _commitment: Commitment) -> Result<String, NetworkError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(None).await;
        let state = self.state.lock();
        if let Some(error) = &state.blockhash_error {
            return Err(error.clone());
        }
        Ok(state
            .blockhash
            .clone()
            .unwrap_or_else(|| Hash::new_from_array([9u8; 32]).to_string()))
    }

    async fn simulate_transaction(
        &self,
        _transaction: &SolanaTransaction,
        options: &SimulateOptions,
    ) -> Result<RawSimulation, NetworkError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(None).await;

        let mut state = self.state.lock();
        state.last_simulate_options = Some(options.clone());
        if let Some(error) = &state.simulation_error {
            return Err(error.clone());
        }

        let mut simulation = state.simulation.clone();
        if let Some(addresses) = &options.accounts {
            if simulation.accounts.is_empty() {
                simulation.accounts = addresses
                    .iter()
                    .map(|a| state.accounts.get(a).cloned())
                    .collect();
            }
        }
        Ok(simulation)
    }

    async fn get_recent_prioritization_fees(
        &self,
        _addresses: &[Pubkey],
    ) -> Result<Vec<PrioritizationFee>, NetworkError> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if let Some(error) = &state.fees_error {
            return Err(error.clone());
        }
        Ok(state.fees.clone())
    }
}
