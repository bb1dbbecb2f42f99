use serde::{Deserialize, Serialize};
use solana_rpc_client_api::client_error::{Error as ClientError, ErrorKind as ClientErrorKind};
use solana_rpc_client_api::request::RpcError;
use std::time::Duration;
use thiserror::Error;

/// Failures of the network collaborator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    /// Request did not complete within the configured timeout
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// Transport-level errors (network, connection, HTTP status)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimited { endpoint: String },

    /// Response could not be mapped to the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NetworkError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Timeout { .. } => true,
            NetworkError::Transport { .. } => true,
            NetworkError::RateLimited { .. } => true,

            NetworkError::RpcResponse { code, .. } => {
                // Retry on server errors (5xx)
                matches!(code, Some(c) if (500..600).contains(c))
            }

            NetworkError::MalformedResponse(_) => false,
            NetworkError::Internal(_) => false,
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            NetworkError::Timeout { endpoint, .. } => Some(endpoint),
            NetworkError::Transport { endpoint, .. } => Some(endpoint),
            NetworkError::RpcResponse { endpoint, .. } => Some(endpoint),
            NetworkError::RateLimited { endpoint } => Some(endpoint),
            _ => None,
        }
    }

    /// Label for metrics
    pub fn category(&self) -> &'static str {
        match self {
            NetworkError::Timeout { .. } => "timeout",
            NetworkError::Transport { .. } => "transport",
            NetworkError::RpcResponse { .. } => "rpc_response",
            NetworkError::RateLimited { .. } => "rate_limited",
            NetworkError::MalformedResponse(_) => "malformed",
            NetworkError::Internal(_) => "internal",
        }
    }

    pub fn timeout(endpoint: &str, timeout: Duration) -> Self {
        NetworkError::Timeout {
            endpoint: endpoint.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: &ClientError, endpoint: &str) -> Self {
        if let ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) =
            err.kind()
        {
            return NetworkError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: message.clone(),
                code: Some(*code),
            };
        }
        if let ClientErrorKind::SerdeJson(e) = err.kind() {
            return NetworkError::MalformedResponse(e.to_string());
        }

        let err_str = err.to_string().to_lowercase();

        // Classify based on error message
        if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            NetworkError::RateLimited {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            NetworkError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 0,
            }
        } else if err_str.contains("invalid type")
            || err_str.contains("missing field")
            || err_str.contains("failed to deserialize")
        {
            NetworkError::MalformedResponse(err.to_string())
        } else {
            NetworkError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Retry policy for RPC operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_attempts: u32,

    /// Base delay in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 - 1.0)
    pub jitter_factor: f64,

    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            jitter_factor: 0.1,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        // Exponential backoff
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        // Add jitter to prevent thundering herd
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * self.jitter_factor;
        let jittered_delay = (delay_ms * (1.0 + jitter)).max(0.0) as u64;

        Some(Duration::from_millis(jittered_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(NetworkError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_retryable());

        assert!(NetworkError::timeout("test", Duration::from_secs(5)).is_retryable());

        assert!(NetworkError::RpcResponse {
            endpoint: "test".to_string(),
            message: "busy".to_string(),
            code: Some(503),
        }
        .is_retryable());

        assert!(!NetworkError::RpcResponse {
            endpoint: "test".to_string(),
            message: "invalid params".to_string(),
            code: Some(-32602),
        }
        .is_retryable());

        assert!(!NetworkError::MalformedResponse("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_error_endpoint() {
        let err = NetworkError::timeout("https://test.com", Duration::from_millis(5000));
        assert_eq!(err.endpoint(), Some("https://test.com"));
        assert_eq!(err.to_string(), "Timeout after 5000ms (endpoint: https://test.com)");

        assert_eq!(NetworkError::Internal("x".to_string()).endpoint(), None);
    }

    #[test]
    fn test_retry_policy_delay() {
        let policy = RetryPolicy::default();

        let delay1 = policy.calculate_delay(0);
        assert!(delay1.is_some());

        // Second attempt should be longer
        let delay2 = policy.calculate_delay(1);
        assert!(delay2.is_some());
        assert!(delay2.unwrap() >= delay1.unwrap());

        // Beyond max attempts
        assert!(policy.calculate_delay(10).is_none());
    }

    #[test]
    fn test_retry_policy_none() {
        assert!(RetryPolicy::none().calculate_delay(0).is_none());
    }
}
