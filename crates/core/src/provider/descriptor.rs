//! Static identity of a provider kind.

use crate::model::DEFAULT_CURRENCY;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Capability flags advertised by a provider kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Capabilities {
    /// Supports streaming generation.
    #[serde(default)]
    pub streaming: bool,
    /// Runs on the local machine.
    #[serde(default)]
    pub local: bool,
    /// Supports function calling.
    #[serde(default)]
    pub function_calling: bool,
    /// Requires a credential to initialize.
    #[serde(default)]
    pub requires_credential: bool,
    /// Accepts an endpoint override.
    #[serde(default)]
    pub custom_endpoint: bool,
}

impl Capabilities {
    /// No flags set.
    pub const NONE: Self = Self {
        streaming: false,
        local: false,
        function_calling: false,
        requires_credential: false,
        custom_endpoint: false,
    };

    /// Whether no flag is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// Whether every flag set in `required` is also set here.
    pub fn satisfies(&self, required: &Self) -> bool {
        (!required.streaming || self.streaming)
            && (!required.local || self.local)
            && (!required.function_calling || self.function_calling)
            && (!required.requires_credential || self.requires_credential)
            && (!required.custom_endpoint || self.custom_endpoint)
    }

    /// Set the streaming flag.
    pub const fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Set the local flag.
    pub const fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Set the function calling flag.
    pub const fn function_calling(mut self) -> Self {
        self.function_calling = true;
        self
    }

    /// Set the requires-credential flag.
    pub const fn requires_credential(mut self) -> Self {
        self.requires_credential = true;
        self
    }

    /// Set the custom endpoint flag.
    pub const fn custom_endpoint(mut self) -> Self {
        self.custom_endpoint = true;
        self
    }
}

/// Static identity of a provider kind. Defined once per kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderDescriptor {
    /// Unique provider id (`"openai"`, `"groq"`).
    pub id: CompactString,
    /// Display name for selection UIs.
    pub name: String,
    /// Capability flags.
    pub capabilities: Capabilities,
    /// Endpoint used when the config does not override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_endpoint: Option<String>,
    /// Currency used for cost estimates of unknown models.
    #[serde(default = "default_currency")]
    pub currency: CompactString,
}

impl ProviderDescriptor {
    /// Create a descriptor with no default endpoint, priced in USD.
    pub fn new(
        id: impl Into<CompactString>,
        name: impl Into<String>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities,
            default_endpoint: None,
            currency: default_currency(),
        }
    }

    /// Set the default endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.default_endpoint = Some(endpoint.into());
        self
    }

    /// Check the descriptor is fit for registration.
    ///
    /// Returns the reason when it is not.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".into());
        }
        if self.name.trim().is_empty() {
            return Err("display name must not be empty".into());
        }
        if self.capabilities.is_empty() {
            return Err("capability set must not be empty".into());
        }
        Ok(())
    }
}

fn default_currency() -> CompactString {
    CompactString::const_new(DEFAULT_CURRENCY)
}
