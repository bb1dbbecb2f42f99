//! solana-client backed [`NetworkClient`]

use crate::metrics::{metrics, Timer};
use crate::rpc::{
    Commitment, NetworkClient, NetworkError, PrioritizationFee, RawSimulation, RetryPolicy,
    RpcConfig, SimulateOptions,
};
use crate::simulation::{AccountSnapshot, ReturnData, SimulationError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_account_decoder::{UiAccount, UiAccountData, UiAccountEncoding};
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSimulateTransactionAccountsConfig, RpcSimulateTransactionConfig};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, pubkey::Pubkey,
    transaction::Transaction as SolanaTransaction,
};
use solana_transaction_status::UiTransactionEncoding;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// JSON-RPC collaborator with per-request timeouts and read retries
pub struct RpcNetworkClient {
    client: RpcClient,
    endpoint: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl fmt::Debug for RpcNetworkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcNetworkClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RpcNetworkClient {
    pub fn new(config: &RpcConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        Self {
            client: RpcClient::new_with_timeout(config.url.clone(), timeout),
            endpoint: config.url.clone(),
            timeout,
            retry: config.retry.clone(),
        }
    }

    /// Run one request under the timeout, recording latency and errors
    async fn call<T, Fut>(&self, method: &'static str, request: Fut) -> Result<T, NetworkError>
    where
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let timer = Timer::new();
        let outcome = tokio::time::timeout(self.timeout, request).await;
        timer.observe_duration(&metrics().rpc_latency);

        let result = match outcome {
            Err(_) => Err(NetworkError::timeout(&self.endpoint, self.timeout)),
            Ok(Err(e)) => Err(NetworkError::from_client_error(&e, &self.endpoint)),
            Ok(Ok(value)) => Ok(value),
        };

        if let Err(e) = &result {
            metrics().record_rpc_error(e.category());
            warn!(method, endpoint = %self.endpoint, error = %e, "RPC call failed");
        }
        result
    }

    /// `call` with exponential backoff on retryable errors (idempotent reads only)
    async fn call_with_retry<T, F, Fut>(
        &self,
        method: &'static str,
        mut make_request: F,
    ) -> Result<T, NetworkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match self.call(method, make_request()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match self.retry.calculate_delay(attempt) {
                    Some(delay) => {
                        debug!(
                            method,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying RPC call"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }
}

fn snapshot_from_account(account: &Account) -> AccountSnapshot {
    AccountSnapshot {
        lamports: account.lamports,
        owner: account.owner,
        data_len: account.data.len(),
        executable: account.executable,
        rent_epoch: account.rent_epoch,
    }
}

/// Map an encoded account from a simulation response
pub(crate) fn snapshot_from_ui_account(account: &UiAccount) -> Result<AccountSnapshot, NetworkError> {
    let owner = Pubkey::from_str(&account.owner).map_err(|e| {
        NetworkError::MalformedResponse(format!("invalid owner '{}': {}", account.owner, e))
    })?;

    let data_len = match account.space {
        Some(space) => space as usize,
        None => match &account.data {
            UiAccountData::Binary(data, _) | UiAccountData::LegacyBinary(data) => BASE64
                .decode(data)
                .map(|bytes| bytes.len())
                .map_err(|e| NetworkError::MalformedResponse(format!("account data: {}", e)))?,
            UiAccountData::Json(parsed) => parsed.space as usize,
        },
    };

    Ok(AccountSnapshot {
        lamports: account.lamports,
        owner,
        data_len,
        executable: account.executable,
        rent_epoch: account.rent_epoch,
    })
}

#[async_trait]
impl NetworkClient for RpcNetworkClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn get_account_info(
        &self,
        address: &Pubkey,
        commitment: Commitment,
    ) -> Result<Option<AccountSnapshot>, NetworkError> {
        let commitment: CommitmentConfig = commitment.into();
        let response = self
            .call_with_retry("getAccountInfo", move || {
                self.client.get_account_with_commitment(address, commitment)
            })
            .await?;
        Ok(response.value.as_ref().map(snapshot_from_account))
    }

    #[instrument(skip(self, addresses), fields(endpoint = %self.endpoint, count = addresses.len()))]
    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
        commitment: Commitment,
    ) -> Result<Vec<Option<AccountSnapshot>>, NetworkError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let commitment: CommitmentConfig = commitment.into();
        let response = self
            .call_with_retry("getMultipleAccounts", move || {
                self.client
                    .get_multiple_accounts_with_commitment(addresses, commitment)
            })
            .await?;

        if response.value.len() != addresses.len() {
            return Err(NetworkError::MalformedResponse(format!(
                "getMultipleAccounts returned {} entries for {} addresses",
                response.value.len(),
                addresses.len()
            )));
        }
        Ok(response
            .value
            .iter()
            .map(|account| account.as_ref().map(snapshot_from_account))
            .collect())
    }

    async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<String, NetworkError> {
        let commitment: CommitmentConfig = commitment.into();
        let (hash, _last_valid_height) = self
            .call_with_retry("getLatestBlockhash", move || {
                self.client.get_latest_blockhash_with_commitment(commitment)
            })
            .await?;
        Ok(hash.to_string())
    }

    #[instrument(skip(self, transaction, options), fields(endpoint = %self.endpoint))]
    async fn simulate_transaction(
        &self,
        transaction: &SolanaTransaction,
        options: &SimulateOptions,
    ) -> Result<RawSimulation, NetworkError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: options.sig_verify,
            replace_recent_blockhash: options.replace_recent_blockhash,
            commitment: Some(options.commitment.into()),
            encoding: Some(UiTransactionEncoding::Base64),
            accounts: options
                .accounts
                .as_ref()
                .map(|addresses| RpcSimulateTransactionAccountsConfig {
                    encoding: Some(UiAccountEncoding::Base64),
                    addresses: addresses.iter().map(|a| a.to_string()).collect(),
                }),
            ..RpcSimulateTransactionConfig::default()
        };

        // Not retried: a dry-run is cheap to re-request at the caller's discretion
        let response = self
            .call(
                "simulateTransaction",
                self.client.simulate_transaction_with_config(transaction, config),
            )
            .await?;
        let value = response.value;

        let err = match value.err {
            Some(e) => {
                let json = serde_json::to_value(&e)
                    .map_err(|e| NetworkError::MalformedResponse(e.to_string()))?;
                Some(SimulationError::from_rpc_value(&json))
            }
            None => None,
        };

        let accounts = match value.accounts {
            Some(accounts) => accounts
                .iter()
                .map(|a| a.as_ref().map(snapshot_from_ui_account).transpose())
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let return_data = match value.return_data {
            Some(rd) => {
                let program_id = Pubkey::from_str(&rd.program_id).map_err(|e| {
                    NetworkError::MalformedResponse(format!("return data program: {}", e))
                })?;
                let data = BASE64
                    .decode(&rd.data.0)
                    .map_err(|e| NetworkError::MalformedResponse(format!("return data: {}", e)))?;
                Some(ReturnData { program_id, data })
            }
            None => None,
        };

        Ok(RawSimulation {
            err,
            logs: value.logs.unwrap_or_default(),
            units_consumed: value.units_consumed,
            accounts,
            return_data,
        })
    }

    async fn get_recent_prioritization_fees(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<PrioritizationFee>, NetworkError> {
        let fees = self
            .call_with_retry("getRecentPrioritizationFees", move || {
                self.client.get_recent_prioritization_fees(addresses)
            })
            .await?;
        Ok(fees
            .into_iter()
            .map(|f| PrioritizationFee {
                slot: f.slot,
                prioritization_fee: f.prioritization_fee,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ui_account(data: UiAccountData, space: Option<u64>) -> UiAccount {
        UiAccount {
            lamports: 42,
            data,
            owner: solana_sdk::system_program::id().to_string(),
            executable: false,
            rent_epoch: 7,
            space,
        }
    }

    #[test]
    fn test_snapshot_uses_space_when_present() {
        let account = ui_account(
            UiAccountData::Binary(String::new(), UiAccountEncoding::Base64),
            Some(165),
        );
        let snapshot = snapshot_from_ui_account(&account).expect("valid account");
        assert_eq!(snapshot.data_len, 165);
        assert_eq!(snapshot.lamports, 42);
        assert_eq!(snapshot.owner, solana_sdk::system_program::id());
    }

    #[test]
    fn test_snapshot_decodes_binary_length() {
        let encoded = BASE64.encode([0u8; 10]);
        let account = ui_account(UiAccountData::Binary(encoded, UiAccountEncoding::Base64), None);
        let snapshot = snapshot_from_ui_account(&account).expect("valid account");
        assert_eq!(snapshot.data_len, 10);
    }

    #[test]
    fn test_snapshot_rejects_bad_owner() {
        let mut account = ui_account(UiAccountData::LegacyBinary(String::new()), None);
        account.owner = "not-a-key".to_string();
        assert!(matches!(
            snapshot_from_ui_account(&account),
            Err(NetworkError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_debug_hides_client() {
        let client = RpcNetworkClient::new(&RpcConfig::default());
        let rendered = format!("{:?}", client);
        assert!(rendered.contains("api.mainnet-beta.solana.com"));
        assert_eq!(client.endpoint(), "https://api.mainnet-beta.solana.com");
    }
}
