//! Provider configuration value objects.
//!
//! A [`ProviderConfig`] is consumed at initialization time and never
//! mutated in place: reconfiguration merges a [`ConfigPatch`] into a new
//! value and re-initializes with it.

use compact_str::CompactString;
use std::{fmt, time::Duration};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of retries for retryable failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// An opaque credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Access the secret for building a request.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is blank.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<&str> for Credential {
    fn from(secret: &str) -> Self {
        Self::new(secret)
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self(secret)
    }
}

/// Configuration a provider instance is initialized with.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Vendor credential.
    pub credential: Option<Credential>,
    /// Endpoint override.
    pub endpoint: Option<String>,
    /// Organization identifier.
    pub organization: Option<CompactString>,
    /// Project identifier.
    pub project: Option<CompactString>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for retryable failures.
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            credential: None,
            endpoint: None,
            organization: None,
            project: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ProviderConfig {
    /// A config with only a credential set.
    pub fn with_credential(credential: impl Into<Credential>) -> Self {
        Self {
            credential: Some(credential.into()),
            ..Default::default()
        }
    }

    /// Set the endpoint override.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry count.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Produce a new config with every field set in `patch` replaced.
    pub fn merge(&self, patch: &ConfigPatch) -> Self {
        Self {
            credential: patch.credential.clone().or_else(|| self.credential.clone()),
            endpoint: patch.endpoint.clone().or_else(|| self.endpoint.clone()),
            organization: patch
                .organization
                .clone()
                .or_else(|| self.organization.clone()),
            project: patch.project.clone().or_else(|| self.project.clone()),
            timeout: patch.timeout.unwrap_or(self.timeout),
            max_retries: patch.max_retries.unwrap_or(self.max_retries),
        }
    }
}

/// A partial configuration update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    /// New credential.
    pub credential: Option<Credential>,
    /// New endpoint override.
    pub endpoint: Option<String>,
    /// New organization identifier.
    pub organization: Option<CompactString>,
    /// New project identifier.
    pub project: Option<CompactString>,
    /// New timeout.
    pub timeout: Option<Duration>,
    /// New retry count.
    pub max_retries: Option<u32>,
}
