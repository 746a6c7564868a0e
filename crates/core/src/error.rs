//! Error types for source adapters.
//!
//! An adapter raises only for total failure: the network call failed, the
//! response was a non-success status, or the page/payload structure no
//! longer matches expectations. Individual malformed rows are skipped, not
//! raised. Timeouts are stamped by the orchestrator when a scrape exceeds
//! its per-adapter budget.

use thiserror::Error;

/// Errors an adapter scrape can end in.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Network-level failure or non-2xx response.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// HTTP request completed with a non-success status.
    #[error("fetch failed: HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Source structure no longer matches expectations.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Exceeded the per-adapter time budget.
    #[error("timed out after {budget_secs}s")]
    Timeout {
        /// The budget that was exceeded, in seconds.
        budget_secs: u64,
    },
}

impl AdapterError {
    /// Creates a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    /// Creates a non-success status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(budget_secs: u64) -> Self {
        Self::Timeout { budget_secs }
    }

    /// Returns true if a retry on the next scheduled run could plausibly
    /// succeed without an adapter code change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Parse(_) => false,
        }
    }
}

/// Result type alias for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display_carries_code_and_body() {
        let err = AdapterError::status(403, "forbidden");
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("forbidden"));
    }

    #[test]
    fn timeout_display_names_budget() {
        let err = AdapterError::timeout(60);
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn network_and_timeout_are_transient() {
        assert!(AdapterError::fetch("connection reset").is_transient());
        assert!(AdapterError::timeout(60).is_transient());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(AdapterError::status(503, "unavailable").is_transient());
        assert!(AdapterError::status(429, "slow down").is_transient());
        assert!(!AdapterError::status(404, "gone").is_transient());
    }

    #[test]
    fn parse_errors_are_not_transient() {
        assert!(!AdapterError::parse("selector matched nothing").is_transient());
    }
}
