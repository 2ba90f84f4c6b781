//! Tests for `ProviderManager` selection, admission and accounting.

use futures_util::StreamExt;
use parking_lot::Mutex;
use qcore::{
    GenerationRequest, Message, ModelInfo, Provider, ProviderConfig, ProviderError,
    ProviderState, RateLimitOrigin, Usage,
    testing::{MockFailure, MockProvider},
};
use quill_provider::{ManagerEvent, ManagerEventKind, ProviderManager, ProviderRegistry, SwitchReason};
use std::{sync::Arc, time::Duration};

fn request() -> GenerationRequest {
    GenerationRequest::new("mock-model").message(Message::user("hi"))
}

fn config() -> ProviderConfig {
    ProviderConfig::default().max_retries(0)
}

fn setup(mocks: Vec<MockProvider>) -> (ProviderManager, Vec<Arc<MockProvider>>) {
    let registry = Arc::new(ProviderRegistry::new());
    let mocks: Vec<_> = mocks.into_iter().map(Arc::new).collect();
    for mock in &mocks {
        registry
            .register_provider_kind(mock.descriptor().clone(), mock.factory())
            .unwrap();
    }
    (ProviderManager::new(registry), mocks)
}

#[tokio::test]
async fn first_initialized_is_current() {
    let (manager, _) = setup(vec![MockProvider::new("a"), MockProvider::new("b")]);
    assert!(manager.current_provider_id().is_none());

    manager.initialize_provider("b", config()).await.unwrap();
    manager.initialize_provider("a", config()).await.unwrap();
    assert_eq!(manager.current_provider_id().unwrap(), "b");
    assert!(manager.provider_statistics(Some("a")).is_some());
    assert_eq!(manager.all_statistics().len(), 2);
}

#[tokio::test]
async fn failed_initialize_is_not_selected() {
    let (manager, mocks) = setup(vec![MockProvider::new("a")]);
    mocks[0].fail_initialize(true);

    assert!(manager.initialize_provider("a", config()).await.is_err());
    assert!(manager.current_provider_id().is_none());
    assert!(manager.provider_statistics(Some("a")).is_none());
}

#[tokio::test]
async fn set_current_checks() {
    let (manager, mocks) = setup(vec![
        MockProvider::new("a"),
        MockProvider::new("b"),
        MockProvider::new("c"),
    ]);
    manager.initialize_provider("a", config()).await.unwrap();
    mocks[2].fail_initialize(true);
    let _ = manager.initialize_provider("c", config()).await;

    let err = manager.set_current_provider("zzz").unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
    let err = manager.set_current_provider("b").unwrap_err();
    assert!(matches!(err, ProviderError::NotConfigured { .. }));
    let err = manager.set_current_provider("c").unwrap_err();
    assert!(matches!(
        err,
        ProviderError::NotReady {
            state: ProviderState::Error,
            ..
        }
    ));
    assert_eq!(manager.current_provider_id().unwrap(), "a");
}

#[tokio::test]
async fn set_current_emits_manual_switch() {
    let (manager, _) = setup(vec![MockProvider::new("a"), MockProvider::new("b")]);
    manager.initialize_provider("a", config()).await.unwrap();
    manager.initialize_provider("b", config()).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.subscribe(ManagerEventKind::Switched, move |e| sink.lock().push(e.clone()));

    manager.set_current_provider("b").unwrap();
    assert_eq!(manager.current_provider_id().unwrap(), "b");
    assert_eq!(
        *seen.lock(),
        vec![ManagerEvent::ProviderSwitched {
            from: Some("a".into()),
            to: "b".into(),
            reason: SwitchReason::Manual,
        }]
    );
}

#[tokio::test]
async fn generate_without_provider() {
    let (manager, mocks) = setup(vec![MockProvider::new("a")]);
    let err = manager.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::NotConfigured { provider: None }));
    assert_eq!(mocks[0].vendor_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn statistics_average_latency() {
    let mock = MockProvider::new("a").latency(Duration::from_millis(100));
    let (manager, _) = setup(vec![mock]);
    manager.initialize_provider("a", config()).await.unwrap();

    for _ in 0..4 {
        manager.generate(&request()).await.unwrap();
    }

    let stats = manager.provider_statistics(None).unwrap();
    assert_eq!(stats.request_count, 4);
    assert_eq!(stats.error_count, 0);
    assert_eq!(stats.error_rate, 0.0);
    assert_eq!(stats.total_tokens, 60);
    assert!(stats.average_latency >= Duration::from_millis(100));
    assert!(stats.average_latency < Duration::from_millis(105));
    assert!(stats.last_used.is_some());
}

#[tokio::test]
async fn statistics_error_rate() {
    let (manager, mocks) = setup(vec![MockProvider::new("a")]);
    manager.initialize_provider("a", config()).await.unwrap();
    mocks[0].fail_next(MockFailure::Api(400));

    for _ in 0..4 {
        let _ = manager.generate(&request()).await;
    }

    let stats = manager.provider_statistics(Some("a")).unwrap();
    assert_eq!(stats.request_count, 4);
    assert_eq!(stats.error_count, 1);
    assert_eq!(stats.error_rate, 0.25);
}

#[tokio::test]
async fn statistics_accumulate_cost() {
    let catalog = vec![ModelInfo::remote("mock-model", "Mock", 8_192, 0.01, 0.02)];
    let mock = MockProvider::new("a").models(catalog).usage(Usage::new(10, 5));
    let (manager, _) = setup(vec![mock]);
    manager.initialize_provider("a", config()).await.unwrap();

    manager.generate(&request()).await.unwrap();
    manager.generate(&request()).await.unwrap();

    let stats = manager.provider_statistics(None).unwrap();
    assert!((stats.total_cost - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn usage_updated_event() {
    let (manager, _) = setup(vec![MockProvider::new("a")]);
    manager.initialize_provider("a", config()).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.subscribe(ManagerEventKind::Usage, move |e| {
        if let ManagerEvent::UsageUpdated {
            provider,
            statistics,
        } = e
        {
            sink.lock().push((provider.clone(), statistics.request_count));
        }
    });

    manager.generate(&request()).await.unwrap();
    assert_eq!(*seen.lock(), vec![("a".into(), 1)]);
}

#[tokio::test(start_paused = true)]
async fn concurrency_cap() {
    let mock = MockProvider::new("a").latency(Duration::from_millis(50));
    let (manager, mocks) = setup(vec![mock]);
    manager.initialize_provider("a", config()).await.unwrap();
    manager.set_concurrency_limit("a", 1);

    let request = request();
    let (first, second) = tokio::join!(manager.generate(&request), manager.generate(&request));
    let results = [first, second];

    let limited = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(ProviderError::RateLimited {
                    origin: RateLimitOrigin::Local,
                    ..
                })
            )
        })
        .count();
    assert_eq!(limited, 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(mocks[0].vendor_calls(), 1);
    assert_eq!(manager.in_flight("a"), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_request_releases_slot() {
    let mock = MockProvider::new("a").latency(Duration::from_secs(10));
    let (manager, _) = setup(vec![mock]);
    manager.initialize_provider("a", config()).await.unwrap();
    manager.set_concurrency_limit("a", 1);

    let request = request();
    let timed_out = tokio::time::timeout(Duration::from_millis(10), manager.generate(&request)).await;
    assert!(timed_out.is_err());

    assert_eq!(manager.in_flight("a"), 0);
    let stats = manager.provider_statistics(None).unwrap();
    assert_eq!(stats.request_count, 1);
    assert_eq!(stats.error_count, 1);
}

#[tokio::test]
async fn stream_records_on_end() {
    let mock = MockProvider::new("a").reply("one two three");
    let (manager, _) = setup(vec![mock]);
    manager.initialize_provider("a", config()).await.unwrap();

    let mut stream = manager.generate_stream(&request()).await.unwrap();
    assert_eq!(manager.in_flight("a"), 1);
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk.unwrap().text);
    }
    drop(stream);

    assert_eq!(text, "one two three");
    assert_eq!(manager.in_flight("a"), 0);
    let stats = manager.provider_statistics(None).unwrap();
    assert_eq!(stats.request_count, 1);
    assert_eq!(stats.error_count, 0);
    assert_eq!(stats.total_tokens, 15);
}

#[tokio::test]
async fn dropped_stream_counts_as_failure() {
    let mock = MockProvider::new("a").reply("one two three");
    let (manager, _) = setup(vec![mock]);
    manager.initialize_provider("a", config()).await.unwrap();

    let mut stream = manager.generate_stream(&request()).await.unwrap();
    stream.next().await.unwrap().unwrap();
    drop(stream);

    assert_eq!(manager.in_flight("a"), 0);
    let stats = manager.provider_statistics(None).unwrap();
    assert_eq!(stats.error_count, 1);
}

#[tokio::test]
async fn stream_error_counts_as_failure() {
    let mock = MockProvider::new("a").reply("one two three");
    let (manager, mocks) = setup(vec![mock]);
    manager.initialize_provider("a", config()).await.unwrap();
    mocks[0].fail_stream(MockFailure::Connection);

    let items: Vec<_> = manager
        .generate_stream(&request())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert!(items[1].is_err());

    let stats = manager.provider_statistics(None).unwrap();
    assert_eq!(stats.error_count, 1);
    assert_eq!(manager.in_flight("a"), 0);
}

#[tokio::test]
async fn dispose_clears_manager_only() {
    let (manager, mocks) = setup(vec![MockProvider::new("a")]);
    manager.initialize_provider("a", config()).await.unwrap();
    manager.generate(&request()).await.unwrap();
    manager.start_health_checks(Duration::from_secs(60));

    manager.dispose();

    assert!(manager.current_provider_id().is_none());
    assert!(manager.all_statistics().is_empty());
    assert!(!manager.health_checks_running());
    let err = manager.generate(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::NotConfigured { provider: None }));

    assert_eq!(mocks[0].disposals(), 0);
    assert_eq!(mocks[0].state(), ProviderState::Ready);
    assert!(manager.registry().get_provider("a").is_some());
}

#[tokio::test]
async fn defaults_without_provider() {
    let (manager, _) = setup(vec![MockProvider::new("a")]);
    assert_eq!(manager.count_tokens("abcdefgh", None).await, 2);
    let cost = manager.estimate_cost(&Usage::new(100, 100), "mock-model");
    assert_eq!(cost.total, 0.0);
    assert_eq!(cost.currency, "USD");
}

#[tokio::test]
async fn unknown_model_costs_nothing() {
    let (manager, _) = setup(vec![MockProvider::new("a")]);
    manager.initialize_provider("a", config()).await.unwrap();
    let cost = manager.estimate_cost(&Usage::new(100, 100), "unknown");
    assert_eq!(cost.total, 0.0);
    assert_eq!(cost.currency, "USD");
}

#[tokio::test]
async fn models_per_provider() {
    let catalog = vec![ModelInfo::remote("m1", "M1", 8_192, 0.0, 0.0)];
    let (manager, mocks) = setup(vec![
        MockProvider::new("a").models(catalog.clone()),
        MockProvider::new("b"),
        MockProvider::new("c"),
    ]);
    for id in ["a", "b", "c"] {
        manager.initialize_provider(id, config()).await.unwrap();
    }
    mocks[2].dispose().await;

    assert_eq!(manager.available_models(None).await.unwrap(), catalog);
    assert!(manager.available_models(Some("b")).await.unwrap().is_empty());
    assert!(manager.available_models(Some("c")).await.is_err());

    let all = manager.all_available_models().await;
    assert_eq!(all.keys().map(|k| k.as_str()).collect::<Vec<_>>(), ["a", "b"]);
}
