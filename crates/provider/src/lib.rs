//! Provider registry and runtime manager for the Quill LLM runtime.
//!
//! The [`ProviderRegistry`] owns provider instances; the [`ProviderManager`]
//! picks the current one, admits and accounts requests, and fails over.

pub use {
    config::{ManagerConfig, ProviderSettings},
    manager::{
        DEFAULT_MAX_CONCURRENT_REQUESTS, HealthReport, ManagerEvent, ManagerEventKind,
        ProviderManager, SwitchReason, UsageStatistics,
    },
    registry::{ProviderFactory, ProviderRegistry, RegistryEvent},
};

pub mod config;
mod manager;
mod registry;
mod utils;
