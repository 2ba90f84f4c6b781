//! Provider-neutral request, result and catalog types.
//!
//! Every adapter translates [`GenerationRequest`] into its vendor schema and
//! its vendor response back into [`GenerationResult`].

pub use cost::{CostEstimate, DEFAULT_CURRENCY, ModelInfo};
pub use limits::default_context_limit;
pub use message::{Message, Role, estimate_text_tokens, estimate_tokens};
pub use request::{GenerationRequest, Sampling};
pub use response::{FinishReason, GenerationResult, Usage};

mod cost;
mod limits;
mod message;
mod request;
mod response;
