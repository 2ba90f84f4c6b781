//! Tests for the manager configuration schema.

use qcore::{Provider, ProviderState, testing::MockProvider};
use quill_provider::{ManagerConfig, ProviderManager, ProviderRegistry, ProviderSettings};
use std::{io::Write, sync::Arc, time::Duration};

const FULL: &str = r#"
version = 1
default = "groq"
fallback = ["groq", "ollama"]
max_concurrent_requests = 4
health_check_interval_secs = 60

[providers.openai]
kind = "openai"
api_key = "sk-test"
organization = "org-1"
timeout_secs = 30

[providers.groq]
kind = "groq"
api_key = "gsk-test"
max_retries = 1

[providers.ollama]
kind = "ollama"
base_url = "http://localhost:11434/v1"
max_concurrent_requests = 1

[providers.lab]
kind = "custom"
base_url = "https://llm.internal.example/v1"
enabled = false
"#;

#[test]
fn parse_full() {
    let config = ManagerConfig::from_toml(FULL).unwrap();
    assert_eq!(config.version, 1);
    assert_eq!(config.default.as_deref(), Some("groq"));
    assert_eq!(config.fallback, ["groq", "ollama"]);
    assert_eq!(config.max_concurrent_requests, 4);
    assert_eq!(config.health_check_interval(), Some(Duration::from_secs(60)));
    assert_eq!(config.providers.len(), 4);

    let openai = &config.providers["openai"];
    assert_eq!(openai.kind(), "openai");
    let provider_config = openai.to_provider_config();
    assert_eq!(provider_config.credential.unwrap().expose(), "sk-test");
    assert_eq!(provider_config.organization.as_deref(), Some("org-1"));
    assert_eq!(provider_config.timeout, Duration::from_secs(30));
    assert!(provider_config.endpoint.is_none());

    let ollama = &config.providers["ollama"];
    assert!(matches!(ollama, ProviderSettings::Ollama(_)));
    assert_eq!(ollama.max_concurrent_requests(), Some(1));
    let provider_config = ollama.to_provider_config();
    assert!(provider_config.credential.is_none());
    assert_eq!(
        provider_config.endpoint.as_deref(),
        Some("http://localhost:11434/v1")
    );

    assert!(!config.providers["lab"].enabled());
    assert_eq!(config.providers["groq"].to_provider_config().max_retries, 1);
}

#[test]
fn minimal_defaults() {
    let config = ManagerConfig::from_toml("").unwrap();
    assert_eq!(config, ManagerConfig::default());
    assert_eq!(config.health_check_interval(), None);
}

#[test]
fn env_expansion() {
    // SAFETY: no other test reads this variable.
    unsafe { std::env::set_var("QUILL_TEST_GROQ_KEY", "gsk-from-env") };
    let config = ManagerConfig::from_toml(
        r#"
[providers.groq]
kind = "groq"
api_key = "${QUILL_TEST_GROQ_KEY}"
"#,
    )
    .unwrap();
    let credential = config.providers["groq"].to_provider_config().credential;
    assert_eq!(credential.unwrap().expose(), "gsk-from-env");
}

#[test]
fn blank_key_has_no_credential() {
    let config = ManagerConfig::from_toml(
        r#"
[providers.openai]
kind = "openai"
api_key = "${QUILL_TEST_UNSET_VARIABLE}"
"#,
    )
    .unwrap();
    assert!(config.providers["openai"].to_provider_config().credential.is_none());
}

#[test]
fn rejects_unknown_version() {
    let err = ManagerConfig::from_toml("version = 2").unwrap_err();
    assert!(err.to_string().contains("unsupported config version"));
}

#[test]
fn rejects_unknown_kind() {
    let err = ManagerConfig::from_toml(
        r#"
[providers.x]
kind = "carrier-pigeon"
"#,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("carrier-pigeon"));
}

#[test]
fn rejects_missing_default() {
    let err = ManagerConfig::from_toml(r#"default = "nope""#).unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn rejects_bad_base_url() {
    let err = ManagerConfig::from_toml(
        r#"
[providers.ollama]
kind = "ollama"
base_url = "not a url"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("base_url"));
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();
    let config = ManagerConfig::load(file.path()).unwrap();
    assert_eq!(config.providers.len(), 4);

    let err = ManagerConfig::load(std::path::Path::new("/nonexistent/quill.toml")).unwrap_err();
    assert!(err.to_string().contains("failed to read"));
}

#[tokio::test]
async fn manager_from_config() {
    let registry = Arc::new(ProviderRegistry::new());
    let mut mocks = Vec::new();
    for id in ["openai", "groq", "ollama", "lab"] {
        let mock = Arc::new(MockProvider::new(id));
        registry
            .register_provider_kind(mock.descriptor().clone(), mock.factory())
            .unwrap();
        mocks.push(mock);
    }
    let mut config = ManagerConfig::from_toml(FULL).unwrap();
    config.health_check_interval_secs = None;

    let manager = ProviderManager::from_config(registry.clone(), &config).await;

    assert_eq!(manager.current_provider_id().unwrap(), "groq");
    assert_eq!(manager.fallback_providers(), ["groq", "ollama"]);
    assert_eq!(manager.concurrency_limit("ollama"), 1);
    assert_eq!(manager.concurrency_limit("openai"), 4);
    assert_eq!(mocks[0].state(), ProviderState::Ready);
    assert!(registry.get_provider("lab").is_none());
    assert!(!manager.health_checks_running());
}

#[tokio::test]
async fn without_default_first_id_becomes_current() {
    let registry = Arc::new(ProviderRegistry::new());
    for id in ["zeta", "alpha"] {
        let mock = Arc::new(MockProvider::new(id));
        registry
            .register_provider_kind(mock.descriptor().clone(), mock.factory())
            .unwrap();
    }
    let config = ManagerConfig::from_toml(
        r#"
[providers.zeta]
kind = "custom"
base_url = "http://zeta.internal/v1"

[providers.alpha]
kind = "custom"
base_url = "http://alpha.internal/v1"
"#,
    )
    .unwrap();
    let ids: Vec<_> = config.providers.keys().map(|k| k.as_str()).collect();
    assert_eq!(ids, ["alpha", "zeta"]);

    let manager = ProviderManager::from_config(registry.clone(), &config).await;
    assert_eq!(manager.current_provider_id().unwrap(), "alpha");
    assert!(registry.get_provider("zeta").is_some());
}
