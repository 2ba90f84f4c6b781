//! Generation request type.

use crate::model::Message;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A generation request.
///
/// Contains everything a provider needs to make one call: the target model,
/// the ordered conversation and optional sampling parameters. Provider
/// implementations translate this into their wire format.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenerationRequest {
    /// The model to use.
    pub model: CompactString,

    /// The conversation messages, in order.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Sampling parameters.
    #[serde(default, flatten)]
    pub sampling: Sampling,
}

impl GenerationRequest {
    /// Create a new request for the given model.
    pub fn new(model: impl Into<CompactString>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            sampling: Sampling::default(),
        }
    }

    /// Set the messages for this request.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Append a message to this request.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.sampling.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of output tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.sampling.max_tokens = Some(max_tokens);
        self
    }

    /// Set the stop sequences.
    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.sampling.stop = stop;
        self
    }
}

/// Optional sampling parameters. `None` leaves the vendor default in place.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Sampling {
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling probability mass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Maximum number of output tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Frequency penalty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// Presence penalty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}
