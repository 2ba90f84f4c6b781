//! Generation result abstractions.

use serde::{Deserialize, Serialize};

/// The result of a generation call, or one chunk of a streamed generation.
///
/// Streamed chunks carry partial `text`; usage and finish reason are set
/// on the chunk where the vendor reports them (usually the last one).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GenerationResult {
    /// The generated text.
    pub text: String,

    /// Token usage, `None` when the provider did not report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// The reason the model stopped generating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// The model that produced the result, as reported by the vendor.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
}

impl GenerationResult {
    /// Create a completed result.
    pub fn new(text: impl Into<String>, usage: Option<Usage>, reason: FinishReason) -> Self {
        Self {
            text: text.into(),
            usage,
            finish_reason: Some(reason),
            model: String::new(),
        }
    }

    /// Create a partial text chunk.
    pub fn chunk(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Whether this chunk terminates a stream.
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// The reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model finished naturally
    Stop,

    /// The model hit the max token limit
    Length,

    /// Content was filtered
    ContentFilter,

    /// The generation failed
    Error,

    /// The model is making a function call
    FunctionCall,
}

impl FinishReason {
    /// Map a vendor finish-reason string onto the fixed enumeration.
    ///
    /// Unrecognized values map to [`FinishReason::Stop`].
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "length" | "max_tokens" => Self::Length,
            "content_filter" | "safety" => Self::ContentFilter,
            "function_call" | "tool_calls" | "tool_use" => Self::FunctionCall,
            "error" => Self::Error,
            _ => Self::Stop,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,

    /// Number of tokens in the completion
    pub completion_tokens: u32,

    /// Total number of tokens used
    pub total_tokens: u32,
}

impl Usage {
    /// Build usage from prompt and completion counts; the total is derived.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}
