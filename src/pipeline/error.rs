//! Error taxonomy for the RSI pipeline
//!
//! Only `Universe` is fatal to a cycle. Per-asset `Upstream`/`RateLimited`
//! errors are downgraded to undefined readings by the engine, malformed
//! candle rows are skipped, and notifier failures are counted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Non-success HTTP status from the market-data provider
    #[error("upstream returned HTTP {status} for {endpoint}")]
    UpstreamStatus { endpoint: String, status: u16 },

    /// Transport failure (connect, timeout, body decode)
    #[error("upstream request to {endpoint} failed: {source}")]
    UpstreamTransport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Still rate-limited after the single backoff retry
    #[error("upstream still rate-limited after retry: {endpoint}")]
    RateLimited { endpoint: String },

    /// Response body was not the expected shape
    #[error("malformed upstream data from {endpoint}: {reason}")]
    MalformedData { endpoint: String, reason: String },

    /// Per-asset fetch exceeded its deadline
    #[error("candle fetch for {asset_id} timed out after {}ms", .after.as_millis())]
    Timeout {
        asset_id: String,
        after: std::time::Duration,
    },

    /// Ranked-asset fetch failed; nothing to report this cycle
    #[error("ranked asset universe unavailable: {0}")]
    Universe(Box<PipelineError>),

    /// Outbound notification not delivered
    #[error("notification not delivered: {0}")]
    Notifier(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universe_error_wraps_cause() {
        let inner = PipelineError::UpstreamStatus {
            endpoint: "/coins/markets".to_string(),
            status: 503,
        };

        let fatal = PipelineError::Universe(Box::new(inner));
        assert_eq!(
            fatal.to_string(),
            "ranked asset universe unavailable: upstream returned HTTP 503 for /coins/markets"
        );
    }
}
