//! Errors returned by the external API capabilities.

use thiserror::Error;

/// Classification for retry policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// The request is fundamentally invalid and retrying won't help.
    Never,
    /// Transient failure; retry with exponential backoff.
    WithBackoff,
}

/// Errors surfaced by the Nhanh.vn / Shopify capability implementations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The API throttled the request (HTTP 429).
    #[error("Rate limited by {api}")]
    RateLimited { api: String },

    #[error("Timeout calling {api}")]
    Timeout { api: String },

    #[error("Network error calling {api}: {message}")]
    Network { api: String, message: String },

    /// 5xx responses.
    #[error("{api} server error ({status}): {message}")]
    Server {
        api: String,
        status: u16,
        message: String,
    },

    #[error("{api} rejected credentials")]
    Unauthorized { api: String },

    /// 4xx responses other than auth and throttling, e.g. a validation failure.
    #[error("{api} rejected the request ({status}): {message}")]
    Rejected {
        api: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {api}: {message}")]
    InvalidResponse { api: String, message: String },

    /// The record cannot be synced as-is (missing key, malformed field).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl ApiError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ApiError::RateLimited { .. }
            | ApiError::Timeout { .. }
            | ApiError::Network { .. }
            | ApiError::Server { .. } => RetryClass::WithBackoff,
            ApiError::Unauthorized { .. }
            | ApiError::Rejected { .. }
            | ApiError::InvalidResponse { .. }
            | ApiError::InvalidRecord(_) => RetryClass::Never,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class() == RetryClass::WithBackoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let transient = [
            ApiError::RateLimited {
                api: "nhanh".into(),
            },
            ApiError::Timeout {
                api: "nhanh".into(),
            },
            ApiError::Network {
                api: "shopify".into(),
                message: "connection reset".into(),
            },
            ApiError::Server {
                api: "shopify".into(),
                status: 502,
                message: "bad gateway".into(),
            },
        ];
        for err in transient {
            assert_eq!(err.retry_class(), RetryClass::WithBackoff, "{}", err);
        }

        let terminal = [
            ApiError::Unauthorized {
                api: "nhanh".into(),
            },
            ApiError::Rejected {
                api: "shopify".into(),
                status: 422,
                message: "email has already been taken".into(),
            },
            ApiError::InvalidRecord("missing sku".into()),
        ];
        for err in terminal {
            assert!(!err.is_retryable(), "{}", err);
        }
    }
}
