//! Error taxonomy shared by providers, the registry and the manager.

use crate::provider::ProviderState;
use compact_str::CompactString;
use std::{fmt, time::Duration};

/// Result alias over [`ProviderError`].
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

/// Boxed underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where a rate limit decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitOrigin {
    /// The manager's local in-flight cap.
    Local,
    /// The vendor answered 429.
    Vendor,
}

impl fmt::Display for RateLimitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local admission control"),
            Self::Vendor => f.write_str("vendor"),
        }
    }
}

/// Errors surfaced by the provider runtime.
///
/// Every variant tied to a provider keeps its id; wrapped vendor and
/// transport failures keep the original cause as `source`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider id was never registered.
    #[error("provider '{0}' not found")]
    NotFound(CompactString),

    /// No provider is selected, or the provider was never initialized.
    #[error("{}", not_configured(.provider))]
    NotConfigured {
        /// The provider, if one was named.
        provider: Option<CompactString>,
    },

    /// The operation needs a ready provider.
    #[error("provider '{provider}' is not ready (state: {state})")]
    NotReady {
        /// The provider id.
        provider: CompactString,
        /// The state it was in.
        state: ProviderState,
    },

    /// Configuration validation failed.
    #[error("invalid config for '{provider}': {message}")]
    InvalidConfig {
        /// The provider id.
        provider: CompactString,
        /// What was wrong.
        message: String,
    },

    /// The vendor API returned an error.
    #[error("'{provider}' api error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        /// The provider id.
        provider: CompactString,
        /// HTTP status code if available.
        status: Option<u16>,
        /// Error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Too many requests, either locally or at the vendor.
    #[error("rate limit exceeded for '{provider}' ({origin}){}", .retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimited {
        /// The provider id.
        provider: CompactString,
        /// Who made the decision.
        origin: RateLimitOrigin,
        /// Suggested time to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// The request timed out.
    #[error("request to '{provider}' timed out after {timeout:?}")]
    Timeout {
        /// The provider id.
        provider: CompactString,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The connection could not be established or broke.
    #[error("connection to '{provider}' failed: {message}")]
    Connection {
        /// The provider id.
        provider: CompactString,
        /// Error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// The provider does not support the operation.
    #[error("'{provider}' does not support {operation}")]
    Unsupported {
        /// The provider id.
        provider: CompactString,
        /// The operation name.
        operation: &'static str,
    },

    /// The request was dropped before it finished.
    #[error("request to '{provider}' was cancelled")]
    Cancelled {
        /// The provider id.
        provider: CompactString,
    },

    /// A provider kind could not be registered.
    #[error("cannot register provider '{provider}': {reason}")]
    Registration {
        /// The provider id.
        provider: CompactString,
        /// Why registration was rejected.
        reason: String,
    },

    /// Failover exhausted the priority list without attempting anything.
    #[error("all providers failed (candidates: {})", .candidates.join(", "))]
    AllProvidersFailed {
        /// The ids that were considered.
        candidates: Vec<CompactString>,
    },
}

impl ProviderError {
    /// Shorthand for an [`ProviderError::Api`] without a status or cause.
    pub fn api(provider: impl Into<CompactString>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status: None,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an [`ProviderError::InvalidConfig`].
    pub fn invalid_config(provider: impl Into<CompactString>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// The provider this error originated from, if any.
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::NotFound(provider) => Some(provider),
            Self::NotConfigured { provider } => provider.as_deref(),
            Self::NotReady { provider, .. }
            | Self::InvalidConfig { provider, .. }
            | Self::Api { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Connection { provider, .. }
            | Self::Unsupported { provider, .. }
            | Self::Cancelled { provider }
            | Self::Registration { provider, .. } => Some(provider),
            Self::AllProvidersFailed { .. } => None,
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Transport failures, vendor rate limits and 5xx responses are
    /// retryable. The local admission cap is not: it says "not now, here".
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::RateLimited { origin, .. } => *origin == RateLimitOrigin::Vendor,
            Self::Api { status, .. } => matches!(status, Some(500..=599)),
            _ => false,
        }
    }

    /// Suggested wait before retrying, when the vendor gave one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the error means the provider itself is broken, as opposed
    /// to the request or a transient condition.
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            Self::InvalidConfig { .. } => true,
            Self::Api { status, .. } => matches!(status, Some(401 | 403)),
            _ => false,
        }
    }
}

fn not_configured(provider: &Option<CompactString>) -> String {
    match provider {
        Some(id) => format!("provider '{id}' is not configured"),
        None => "no provider configured".to_owned(),
    }
}
