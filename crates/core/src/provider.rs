//! The provider contract.
//!
//! Every vendor adapter implements [`Provider`]. The registry and manager
//! only ever talk to vendors through this trait; they never build HTTP
//! requests themselves.

use crate::{
    config::{ConfigPatch, ProviderConfig},
    error::Result,
    event::{Event, EventBus},
    model::{
        CostEstimate, GenerationRequest, GenerationResult, ModelInfo, Usage, estimate_text_tokens,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use std::{pin::Pin, time::Duration};

pub use base::{ProviderBase, RetryPolicy};
pub use descriptor::{Capabilities, ProviderDescriptor};
pub use state::ProviderState;

mod base;
mod descriptor;
mod state;

/// A lazily produced, finite sequence of partial results.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerationResult>> + Send>>;

/// Outcome of a health probe.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    /// Whether the provider answered as expected.
    pub healthy: bool,
    /// Round-trip latency of the probe.
    pub latency: Duration,
    /// Optional detail from the provider.
    pub message: Option<String>,
}

impl HealthStatus {
    /// A healthy probe result.
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            latency,
            message: None,
        }
    }

    /// An unhealthy probe result.
    pub fn unhealthy(latency: Duration, message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency,
            message: Some(message.into()),
        }
    }
}

/// Last health probe recorded on an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    /// When the probe finished.
    pub checked_at: DateTime<Utc>,
    /// Probe latency.
    pub latency: Duration,
    /// Whether the probe succeeded.
    pub healthy: bool,
}

/// Notifications emitted by a provider instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// The lifecycle state changed.
    StatusChanged {
        /// Previous state.
        from: ProviderState,
        /// New state.
        to: ProviderState,
    },
    /// A failure occurred outside of a caller's request.
    Error {
        /// Human-readable message.
        message: String,
        /// Whether the provider cannot continue without reconfiguration.
        unrecoverable: bool,
    },
    /// The configuration was replaced.
    ConfigUpdated,
    /// The model list changed.
    ModelsChanged {
        /// Number of models now listed.
        count: usize,
    },
}

/// Routing key for [`ProviderEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    /// [`ProviderEvent::StatusChanged`]
    Status,
    /// [`ProviderEvent::Error`]
    Error,
    /// [`ProviderEvent::ConfigUpdated`]
    Config,
    /// [`ProviderEvent::ModelsChanged`]
    Models,
}

impl ProviderEventKind {
    /// Every kind, for subscribers that forward everything.
    pub const ALL: [Self; 4] = [Self::Status, Self::Error, Self::Config, Self::Models];
}

impl Event for ProviderEvent {
    type Kind = ProviderEventKind;

    fn kind(&self) -> ProviderEventKind {
        match self {
            Self::StatusChanged { .. } => ProviderEventKind::Status,
            Self::Error { .. } => ProviderEventKind::Error,
            Self::ConfigUpdated => ProviderEventKind::Config,
            Self::ModelsChanged { .. } => ProviderEventKind::Models,
        }
    }
}

/// The contract every LLM vendor adapter satisfies.
///
/// Instances are shared behind `Arc`, so every method takes `&self` and
/// implementations use interior mutability (see [`ProviderBase`]).
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Static identity of this provider kind.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Current lifecycle state.
    fn state(&self) -> ProviderState;

    /// The configuration the instance was last initialized with.
    fn config(&self) -> Option<ProviderConfig>;

    /// Last recorded health probe.
    fn last_health(&self) -> Option<HealthSnapshot>;

    /// Event bus for lifecycle notifications.
    fn events(&self) -> &EventBus<ProviderEvent>;

    /// Validate `config`, connect, and move to `ready`.
    async fn initialize(&self, config: ProviderConfig) -> Result<()>;

    /// Merge `patch` into the current config and re-initialize.
    async fn configure(&self, patch: ConfigPatch) -> Result<()> {
        let config = self.config().unwrap_or_default().merge(&patch);
        self.initialize(config).await
    }

    /// Models offered by this provider, in vendor order.
    async fn available_models(&self) -> Result<Vec<ModelInfo>>;

    /// Run a generation to completion.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;

    /// Start a streaming generation. Each call opens a fresh vendor stream.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<ChunkStream>;

    /// Best-effort token count. Never fails.
    async fn count_tokens(&self, text: &str, _model: Option<&str>) -> usize {
        estimate_text_tokens(text)
    }

    /// Price `usage` on `model`. Pure; unknown models cost zero.
    fn estimate_cost(&self, usage: &Usage, model: &str) -> CostEstimate;

    /// Probe the vendor.
    async fn check_health(&self) -> Result<HealthStatus>;

    /// Release credentials and resources. Idempotent, never fails.
    async fn dispose(&self);
}
