//! Manager configuration
//!
//! A closed, versioned TOML schema. Each `[providers.<id>]` table names a
//! registered provider id and is discriminated by its `kind` field, so the
//! per-kind fields sit at the same level:
//!
//! ```toml
//! version = 1
//! fallback = ["groq"]
//!
//! [providers.openai]
//! kind = "openai"
//! api_key = "${OPENAI_API_KEY}"
//!
//! [providers.ollama]
//! kind = "ollama"
//! base_url = "http://localhost:11434/v1"
//! ```

use crate::{manager::DEFAULT_MAX_CONCURRENT_REQUESTS, utils::expand_env_vars};
use anyhow::{Context, bail};
use compact_str::CompactString;
use qcore::{Credential, ProviderConfig};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};

/// The only schema version understood.
pub const CONFIG_VERSION: u32 = 1;

/// Top-level manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Provider to select after initialization, instead of the first one
    /// that came up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<CompactString>,
    /// Fallback ids tried after the current provider, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<CompactString>,
    /// In-flight cap for providers without their own.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Health probe interval. Unset disables periodic probing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval_secs: Option<u64>,
    /// Provider settings keyed by provider id.
    ///
    /// Kept sorted by id, not in file order. Providers are initialized in
    /// this order, so without `default` the alphabetically first provider
    /// that comes up becomes current.
    #[serde(default)]
    pub providers: BTreeMap<CompactString, ProviderSettings>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default: None,
            fallback: Vec::new(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            health_check_interval_secs: None,
            providers: BTreeMap::new(),
        }
    }
}

impl ManagerConfig {
    /// Parse a TOML string, expanding `${VAR}` references first.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let expanded = expand_env_vars(toml_str);
        let config: Self = toml::from_str(&expanded).context("invalid manager config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("failed to load {}", path.display()))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} (expected {CONFIG_VERSION})",
                self.version
            );
        }
        if let Some(default) = &self.default {
            if !self.providers.contains_key(default) {
                bail!("default provider '{default}' is not configured");
            }
        }
        for id in &self.fallback {
            if !self.providers.contains_key(id) {
                tracing::warn!("fallback provider '{id}' has no settings");
            }
        }
        for (id, settings) in &self.providers {
            if let Some(url) = settings.base_url() {
                url::Url::parse(url)
                    .with_context(|| format!("provider '{id}': invalid base_url '{url}'"))?;
            }
        }
        Ok(())
    }

    /// The probe interval, if periodic probing is enabled.
    pub fn health_check_interval(&self) -> Option<Duration> {
        self.health_check_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Provider-specific settings, discriminated by the `kind` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSettings {
    /// OpenAI API.
    #[serde(rename = "openai")]
    OpenAi(RemoteSettings),
    /// Groq, OpenAI-compatible.
    Groq(RemoteSettings),
    /// OpenRouter, OpenAI-compatible.
    #[serde(rename = "openrouter")]
    OpenRouter(RemoteSettings),
    /// Anthropic Messages API.
    Anthropic(RemoteSettings),
    /// Ollama local API, no key required.
    Ollama(LocalSettings),
    /// Any other endpoint registered under its own id.
    Custom(CustomSettings),
}

/// Settings for hosted APIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// API key (supports `${ENV_VAR}` expansion).
    #[serde(default)]
    pub api_key: String,
    /// Optional base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Organization id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<CompactString>,
    /// Project id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<CompactString>,
    /// Shared knobs.
    #[serde(flatten)]
    pub common: CommonSettings,
}

/// Settings for local runtimes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Optional base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Shared knobs.
    #[serde(flatten)]
    pub common: CommonSettings,
}

/// Settings for a custom endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSettings {
    /// Endpoint base URL.
    pub base_url: String,
    /// Optional API key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// Shared knobs.
    #[serde(flatten)]
    pub common: CommonSettings,
}

/// Knobs every kind accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonSettings {
    /// Skip this provider during initialization.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Retries for retryable failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// In-flight cap for this provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<usize>,
}

impl Default for CommonSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: None,
            max_retries: None,
            max_concurrent_requests: None,
        }
    }
}

impl ProviderSettings {
    /// Kind string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai",
            Self::Groq(_) => "groq",
            Self::OpenRouter(_) => "openrouter",
            Self::Anthropic(_) => "anthropic",
            Self::Ollama(_) => "ollama",
            Self::Custom(_) => "custom",
        }
    }

    fn common(&self) -> &CommonSettings {
        match self {
            Self::OpenAi(s) | Self::Groq(s) | Self::OpenRouter(s) | Self::Anthropic(s) => &s.common,
            Self::Ollama(s) => &s.common,
            Self::Custom(s) => &s.common,
        }
    }

    /// Whether the provider should be initialized.
    pub fn enabled(&self) -> bool {
        self.common().enabled
    }

    /// Per-provider in-flight cap, if set.
    pub fn max_concurrent_requests(&self) -> Option<usize> {
        self.common().max_concurrent_requests
    }

    /// The endpoint override, if any.
    pub fn base_url(&self) -> Option<&str> {
        match self {
            Self::OpenAi(s) | Self::Groq(s) | Self::OpenRouter(s) | Self::Anthropic(s) => {
                s.base_url.as_deref()
            }
            Self::Ollama(s) => s.base_url.as_deref(),
            Self::Custom(s) => Some(&s.base_url),
        }
    }

    /// Convert into the value a provider is initialized with.
    pub fn to_provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::default();
        match self {
            Self::OpenAi(s) | Self::Groq(s) | Self::OpenRouter(s) | Self::Anthropic(s) => {
                config.credential = credential(&s.api_key);
                config.organization = s.organization.clone();
                config.project = s.project.clone();
            }
            Self::Ollama(_) => {}
            Self::Custom(s) => config.credential = credential(&s.api_key),
        }
        config.endpoint = self.base_url().map(str::to_owned);

        let common = self.common();
        if let Some(secs) = common.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = common.max_retries {
            config.max_retries = retries;
        }
        config
    }
}

fn credential(key: &str) -> Option<Credential> {
    (!key.trim().is_empty()).then(|| Credential::new(key))
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

fn default_enabled() -> bool {
    true
}
