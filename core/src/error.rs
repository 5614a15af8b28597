//! Normalized error type for every failure path of the client.
//!
//! # Design
//! Transport failures, non-2xx statuses and non-success envelope codes all
//! converge on `ApiError` before reaching a caller. Domain modules wrap the
//! error in `Context` to attach a label; `kind()` looks through any number
//! of labels so retry decisions and callers still see the original
//! classification.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by the client, the registry and the domain modules.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (connection refused, DNS failure, reset).
    #[error("{message}")]
    Network { message: String, cause: String },

    /// The transport aborted the attempt after the configured timeout.
    #[error("{message}")]
    Timeout { message: String, after: Duration },

    /// A response arrived with a non-2xx transport status.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        message: String,
        body: String,
    },

    /// A 2xx response whose envelope carried a non-success business code.
    #[error("{message} (code {code})")]
    Business { code: i64, message: String },

    /// Transient failures persisted past the retry budget.
    #[error("retry limit exceeded after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<ApiError> },

    #[error("API module '{0}' not found, register it first")]
    ModuleNotFound(String),

    /// A module is registered under the name but with another type.
    #[error("API module '{name}' is not a {expected}")]
    ModuleType { name: String, expected: &'static str },

    #[error("service config not found: {0}")]
    ServiceConfigMissing(String),

    /// A configuration value could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport refused to build or send the request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Token persistence failed.
    #[error("token storage failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A failure labeled by a domain module before being propagated.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ApiError>,
    },
}

/// Coarse classification of an [`ApiError`], ignoring context labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Timeout,
    HttpStatus(u16),
    Business(i64),
    RetryExhausted,
    ModuleNotFound,
    ModuleType,
    ServiceConfigMissing,
    Config,
    InvalidRequest,
    Serialization,
    Deserialization,
    Storage,
    Io,
}

impl ApiError {
    /// The innermost error, with every `Context` label removed.
    pub fn root(&self) -> &ApiError {
        let mut current = self;
        while let ApiError::Context { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Timeout { .. } => ErrorKind::Timeout,
            ApiError::HttpStatus { status, .. } => ErrorKind::HttpStatus(*status),
            ApiError::Business { code, .. } => ErrorKind::Business(*code),
            ApiError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            ApiError::ModuleNotFound(_) => ErrorKind::ModuleNotFound,
            ApiError::ModuleType { .. } => ErrorKind::ModuleType,
            ApiError::ServiceConfigMissing(_) => ErrorKind::ServiceConfigMissing,
            ApiError::Config(_) => ErrorKind::Config,
            ApiError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ApiError::Serialization(_) => ErrorKind::Serialization,
            ApiError::Deserialization(_) => ErrorKind::Deserialization,
            ApiError::Storage(_) => ErrorKind::Storage,
            ApiError::Io(_) => ErrorKind::Io,
            ApiError::Context { .. } => unreachable!("root() strips context"),
        }
    }

    /// Whether the request wrapper should reissue the request.
    ///
    /// Only a missing response or a 502/503/504 gateway status qualify.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network | ErrorKind::HttpStatus(502 | 503 | 504)
        )
    }

    /// The human readable message of the innermost error.
    pub fn message(&self) -> String {
        match self.root() {
            ApiError::Network { message, .. }
            | ApiError::Timeout { message, .. }
            | ApiError::HttpStatus { message, .. }
            | ApiError::Business { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Wrap the error with a label describing the failed operation.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ApiError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> ApiError {
        ApiError::Network {
            message: "offline".to_string(),
            cause: "connection refused".to_string(),
        }
    }

    fn status(code: u16) -> ApiError {
        ApiError::HttpStatus {
            status: code,
            message: "status".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn gateway_statuses_and_network_are_transient() {
        assert!(network().is_transient());
        for code in [502, 503, 504] {
            assert!(status(code).is_transient(), "{code} should retry");
        }
    }

    #[test]
    fn other_failures_are_terminal() {
        for code in [400, 401, 403, 404, 500] {
            assert!(!status(code).is_transient(), "{code} should not retry");
        }
        let business = ApiError::Business {
            code: 1001,
            message: "bad".to_string(),
        };
        assert!(!business.is_transient());
        let timeout = ApiError::Timeout {
            message: "slow".to_string(),
            after: Duration::from_secs(1),
        };
        assert!(!timeout.is_transient());
    }

    #[test]
    fn kind_looks_through_context_labels() {
        let err = status(404).with_context("get file").with_context("outer");
        assert_eq!(err.kind(), ErrorKind::HttpStatus(404));
        assert_eq!(err.message(), "status");
        assert_eq!(err.to_string(), "outer: get file: HTTP 404: status");
    }

    #[test]
    fn context_keeps_transient_classification() {
        assert!(network().with_context("upload").is_transient());
    }

    #[test]
    fn retry_exhausted_mentions_last_failure() {
        let err = ApiError::RetryExhausted {
            attempts: 4,
            last: Box::new(network()),
        };
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        assert_eq!(
            err.to_string(),
            "retry limit exceeded after 4 attempts: offline"
        );
    }
}
