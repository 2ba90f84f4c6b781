//! Default context limits for known model families.
//!
//! Used when a vendor lists a model without reporting its context window.

/// Returns the default context limit (in tokens) for a known model ID.
///
/// Uses prefix matching against known model families. Unknown models
/// return 8192 as a conservative default.
pub fn default_context_limit(model_id: &str) -> usize {
    // Vendor-prefixed ids (openrouter style) match on the model part.
    let model_id = model_id.rsplit('/').next().unwrap_or(model_id);

    // Claude family
    if model_id.starts_with("claude-") {
        return 200_000;
    }
    // GPT-4o / GPT-4-turbo / GPT-4.1 family
    if model_id.starts_with("gpt-4o")
        || model_id.starts_with("gpt-4-turbo")
        || model_id.starts_with("gpt-4.1")
    {
        return 128_000;
    }
    // GPT-4 (non-turbo)
    if model_id.starts_with("gpt-4") {
        return 8_192;
    }
    // GPT-3.5
    if model_id.starts_with("gpt-3.5") {
        return 16_385;
    }
    // OpenAI o-series (o1, o3, o4)
    if model_id.starts_with("o1") || model_id.starts_with("o3") || model_id.starts_with("o4") {
        return 200_000;
    }
    // Llama 3.x (Groq, Ollama)
    if model_id.starts_with("llama-3") || model_id.starts_with("llama3") {
        return 131_072;
    }
    // Mixtral
    if model_id.starts_with("mixtral-") {
        return 32_768;
    }
    // Gemma
    if model_id.starts_with("gemma") {
        return 8_192;
    }
    // DeepSeek family
    if model_id.starts_with("deepseek-") {
        return 64_000;
    }
    // Qwen family
    if model_id.starts_with("qwen") || model_id.starts_with("qwq-") {
        return 32_768;
    }
    // Unknown model, conservative default
    8_192
}
