//! Tests for provider config values.

use quill_core::{ConfigPatch, Credential, ProviderConfig, config::DEFAULT_TIMEOUT};
use std::time::Duration;

#[test]
fn defaults() {
    let config = ProviderConfig::default();
    assert!(config.credential.is_none());
    assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    assert_eq!(config.max_retries, 3);
}

#[test]
fn credential_is_redacted() {
    let config = ProviderConfig::with_credential("sk-secret");
    let debug = format!("{config:?}");
    assert!(!debug.contains("sk-secret"));
    assert!(debug.contains("Credential(***)"));
}

#[test]
fn blank_credential() {
    assert!(Credential::from("  ").is_blank());
    assert!(!Credential::from("sk").is_blank());
}

#[test]
fn merge_replaces_set_fields() {
    let base = ProviderConfig::with_credential("old")
        .endpoint("http://localhost:1")
        .timeout(Duration::from_secs(5));
    let patch = ConfigPatch {
        credential: Some("new".into()),
        max_retries: Some(0),
        ..Default::default()
    };

    let merged = base.merge(&patch);
    assert_eq!(merged.credential.as_ref().map(Credential::expose), Some("new"));
    assert_eq!(merged.endpoint.as_deref(), Some("http://localhost:1"));
    assert_eq!(merged.timeout, Duration::from_secs(5));
    assert_eq!(merged.max_retries, 0);
    assert_eq!(base.credential.as_ref().map(Credential::expose), Some("old"));
}
