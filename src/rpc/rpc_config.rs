use crate::rpc::rpc_errors::RetryPolicy;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::fmt;
use std::str::FromStr;

/// Commitment level requested from the network collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level '{}'", other)),
        }
    }
}

impl From<Commitment> for CommitmentConfig {
    fn from(commitment: Commitment) -> Self {
        match commitment {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

/// Connection settings for the solana-client backed collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// The RPC endpoint URL
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub commitment: Commitment,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry policy for idempotent reads
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            commitment: Commitment::default(),
            timeout_ms: default_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_parse() {
        assert_eq!("Finalized".parse::<Commitment>(), Ok(Commitment::Finalized));
        assert!("recent".parse::<Commitment>().is_err());
        assert_eq!(Commitment::default().to_string(), "confirmed");
    }

    #[test]
    fn test_rpc_config_defaults_from_empty_toml() {
        let config: RpcConfig = toml::from_str("").expect("empty table should parse");
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
