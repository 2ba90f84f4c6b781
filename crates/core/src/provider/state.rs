//! Provider lifecycle state machine.
//!
//! ```text
//! disconnected ──► configuring ──► ready ◄──► error
//!      ▲                             │  ▲
//!      │                             ▼  │
//!      └──────── (dispose) ──── rate_limited
//! ```
//!
//! `disconnected` is re-entered from any state on dispose, and any state
//! may fall into `error`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    /// Not initialized, or disposed.
    #[default]
    Disconnected,
    /// Validating configuration and connecting.
    Configuring,
    /// Accepting requests.
    Ready,
    /// Vendor asked us to slow down; the next success returns to `Ready`.
    RateLimited,
    /// Initialization or a health check failed.
    Error,
}

impl ProviderState {
    /// Whether `self → to` is a legal transition.
    pub fn can_transition(self, to: Self) -> bool {
        use ProviderState::*;
        match (self, to) {
            (_, Disconnected | Error) => true,
            (Disconnected, Configuring) => true,
            (Configuring, Ready) => true,
            (Ready, Configuring | RateLimited) => true,
            (RateLimited, Ready | Configuring) => true,
            (Error, Configuring | Ready) => true,
            _ => false,
        }
    }

    /// Whether generation calls may proceed without re-initializing.
    ///
    /// `RateLimited` still accepts calls: the next success is what moves
    /// the provider back to `Ready`.
    pub fn accepts_requests(self) -> bool {
        matches!(self, Self::Ready | Self::RateLimited)
    }

    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Configuring => "configuring",
            Self::Ready => "ready",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
