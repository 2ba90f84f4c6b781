//! OpenAI-compatible chat completions provider.
//!
//! One adapter covers every vendor speaking the `/chat/completions` dialect.
//! Presets fix the endpoint, capabilities and price table per vendor.

pub use {
    catalog::catalog,
    http::status_error,
    provider::OpenAiCompat,
    sse::{SseDecoder, SseEvent},
};

pub mod catalog;
mod http;
mod provider;
pub mod sse;
pub mod wire;
