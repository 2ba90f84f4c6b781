//! Chat completions wire format.
//!
//! Only the fields the runtime reads are modelled; unknown response fields
//! are ignored so vendors can extend the schema freely.

use compact_str::CompactString;
use qcore::{FinishReason, GenerationRequest, GenerationResult, Message, Usage};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'r> {
    /// Target model.
    pub model: &'r str,

    /// Conversation in order. [`Message`] already uses the vendor shape.
    pub messages: &'r [Message],

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Not part of the OpenAI schema; only sent to vendors that accept it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<&'r [String]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Whether to stream the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Ask for a final usage chunk when streaming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,
}

impl<'r> ChatRequest<'r> {
    /// Translate a neutral request. `top_k` is dropped unless `with_top_k`.
    pub fn new(request: &'r GenerationRequest, with_top_k: bool) -> Self {
        let sampling = &request.sampling;
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            top_k: sampling.top_k.filter(|_| with_top_k),
            max_tokens: sampling.max_tokens,
            stop: Some(sampling.stop.as_slice()).filter(|s| !s.is_empty()),
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            stream: None,
            stream_options: None,
        }
    }

    /// Enable streaming with a trailing usage chunk.
    pub fn stream(mut self) -> Self {
        self.stream = Some(true);
        self.stream_options = Some(json!({ "include_usage": true }));
        self
    }
}

/// Token accounting as reported by the vendor.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        let mut usage = Usage::new(wire.prompt_tokens, wire.completion_tokens);
        if let Some(total) = wire.total_tokens {
            usage.total_tokens = total;
        }
        usage
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireContent {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default, alias = "delta")]
    pub message: WireContent,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Response body of a non-streaming completion, and of each SSE chunk.
///
/// Streaming chunks carry `delta` instead of `message`; both decode into
/// the same shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

impl ChatResponse {
    /// Convert a complete response. A missing finish reason means `stop`.
    pub fn into_result(self) -> GenerationResult {
        let mut result = self.into_chunk();
        result.finish_reason.get_or_insert(FinishReason::Stop);
        result
    }

    /// Convert one streamed chunk, keeping an absent finish reason absent.
    pub fn into_chunk(self) -> GenerationResult {
        let choice = self.choices.into_iter().next();
        let (text, finish_reason) = match choice {
            Some(choice) => (
                choice.message.content.unwrap_or_default(),
                choice.finish_reason.as_deref().map(FinishReason::from_vendor),
            ),
            None => (String::new(), None),
        };
        GenerationResult {
            text,
            usage: self.usage.map(Into::into),
            finish_reason,
            model: self.model,
        }
    }
}

/// Response body of `GET /models`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: CompactString,
}

/// Vendor error envelope: `{"error": {"message": ...}}`.
#[derive(Debug, Clone, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Extract a readable message from an error response body.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_owned(),
        Err(_) => body.trim().chars().take(512).collect(),
    }
}
