//! Core types and the provider contract for the Quill LLM runtime

pub use {
    config::{ConfigPatch, Credential, ProviderConfig},
    error::{ProviderError, RateLimitOrigin, Result},
    event::{Event, EventBus, Handler, Subscription},
    model::{
        CostEstimate, FinishReason, GenerationRequest, GenerationResult, Message, ModelInfo, Role,
        Usage,
    },
    provider::{
        Capabilities, ChunkStream, HealthSnapshot, HealthStatus, Provider, ProviderBase,
        ProviderDescriptor, ProviderEvent, ProviderEventKind, ProviderState, RetryPolicy,
    },
};

pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod provider;
#[cfg(feature = "testing")]
pub mod testing;
