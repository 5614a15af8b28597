//! Service configuration and retry policy.
//!
//! # Environment Variables
//! Each service reads an optional base URL and timeout override:
//! - `API_BASE_URL` / `API_TIMEOUT_MS` (main)
//! - `USER_API_BASE_URL` / `USER_API_TIMEOUT_MS`
//! - `FILE_API_BASE_URL` / `FILE_API_TIMEOUT_MS`
//! - `PAYMENT_API_BASE_URL` / `PAYMENT_API_TIMEOUT_MS`
//!
//! and the retry policy reads `RETRY_COUNT` and `RETRY_DELAY_MS`. Missing
//! variables fall back to the defaults; unparseable values are errors.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ApiError;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";
const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// A backend service the client can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceName {
    Main,
    User,
    File,
    Payment,
}

impl ServiceName {
    pub const ALL: [ServiceName; 4] = [
        ServiceName::Main,
        ServiceName::User,
        ServiceName::File,
        ServiceName::Payment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceName::Main => "main",
            ServiceName::User => "user",
            ServiceName::File => "file",
            ServiceName::Payment => "payment",
        }
    }

    fn env_prefix(self) -> &'static str {
        match self {
            ServiceName::Main => "API",
            ServiceName::User => "USER_API",
            ServiceName::File => "FILE_API",
            ServiceName::Payment => "PAYMENT_API",
        }
    }

    fn default_config(self) -> ServiceConfig {
        let (path, timeout_ms) = match self {
            ServiceName::Main => ("/api", 10_000),
            ServiceName::User => ("/user-api", 15_000),
            ServiceName::File => ("/file-api", 30_000),
            ServiceName::Payment => ("/payment-api", 20_000),
        };
        ServiceConfig::new(format!("{DEFAULT_ORIGIN}{path}"))
            .with_timeout(Duration::from_millis(timeout_ms))
            .with_header("Content-Type", JSON_CONTENT_TYPE)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ApiError::ServiceConfigMissing(s.to_string()))
    }
}

/// Connection settings for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
            headers: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Per-client adjustments applied on top of a service's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOverrides {
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
}

impl ServiceOverrides {
    pub(crate) fn apply(self, mut config: ServiceConfig) -> ServiceConfig {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        for (name, value) in self.headers {
            match config
                .headers
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
            {
                Some(slot) => slot.1 = value,
                None => config.headers.push((name, value)),
            }
        }
        config
    }
}

/// Configuration for every known service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicesConfig {
    services: HashMap<ServiceName, ServiceConfig>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            services: ServiceName::ALL
                .into_iter()
                .map(|name| (name, name.default_config()))
                .collect(),
        }
    }
}

impl ServicesConfig {
    /// A configuration with no services; add them with [`Self::with_service`].
    pub fn empty() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let mut config = Self::default();
        for name in ServiceName::ALL {
            let prefix = name.env_prefix();
            let mut service = name.default_config();
            if let Some(base_url) = lookup(&format!("{prefix}_BASE_URL")) {
                service.base_url = base_url.trim_end_matches('/').to_string();
            }
            if let Some(ms) = lookup(&format!("{prefix}_TIMEOUT_MS")) {
                service.timeout = parse_millis(&format!("{prefix}_TIMEOUT_MS"), &ms)?;
            }
            config.services.insert(name, service);
        }
        tracing::debug!("service configuration loaded from environment");
        Ok(config)
    }

    pub fn with_service(mut self, name: ServiceName, config: ServiceConfig) -> Self {
        self.services.insert(name, config);
        self
    }

    pub fn without_service(mut self, name: ServiceName) -> Self {
        self.services.remove(&name);
        self
    }

    /// Look up a service's configuration.
    ///
    /// # Errors
    /// `ServiceConfigMissing` if the service has no entry.
    pub fn get(&self, name: ServiceName) -> Result<&ServiceConfig, ApiError> {
        self.services
            .get(&name)
            .ok_or_else(|| ApiError::ServiceConfigMissing(name.to_string()))
    }
}

/// Linear retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let mut policy = Self::default();
        if let Some(count) = lookup("RETRY_COUNT") {
            policy.max_retries = count.trim().parse().map_err(|e| {
                ApiError::Config(format!("RETRY_COUNT={count:?} is not a count: {e}"))
            })?;
        }
        if let Some(ms) = lookup("RETRY_DELAY_MS") {
            policy.delay = parse_millis("RETRY_DELAY_MS", &ms)?;
        }
        Ok(policy)
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration, ApiError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ApiError::Config(format!("{key}={raw:?} is not milliseconds: {e}")))
}
