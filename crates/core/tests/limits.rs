//! Tests for the default context limit map.

use quill_core::model::default_context_limit;

#[test]
fn limit_gpt4o() {
    assert_eq!(default_context_limit("gpt-4o"), 128_000);
    assert_eq!(default_context_limit("gpt-4o-mini"), 128_000);
}

#[test]
fn limit_gpt4_base() {
    assert_eq!(default_context_limit("gpt-4"), 8_192);
}

#[test]
fn limit_claude() {
    assert_eq!(default_context_limit("claude-3-sonnet"), 200_000);
}

#[test]
fn limit_llama() {
    assert_eq!(default_context_limit("llama-3.1-8b-instant"), 131_072);
    assert_eq!(default_context_limit("llama3"), 131_072);
}

#[test]
fn limit_vendor_prefixed() {
    assert_eq!(default_context_limit("openai/gpt-4o"), 128_000);
    assert_eq!(default_context_limit("mistralai/mixtral-8x7b"), 32_768);
}

#[test]
fn limit_unknown() {
    assert_eq!(default_context_limit("foobar-model"), 8_192);
}
