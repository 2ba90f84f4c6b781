//! Scriptable in-memory provider for tests.
//!
//! [`MockProvider`] goes through the same [`ProviderBase`] as a real
//! adapter, so state transitions, retries and events behave exactly as
//! they would against a vendor. Only the "vendor" itself is faked.

use crate::{
    config::ProviderConfig,
    error::{ProviderError, RateLimitOrigin, Result},
    event::EventBus,
    model::{CostEstimate, FinishReason, GenerationRequest, GenerationResult, ModelInfo, Usage},
    provider::{
        Capabilities, ChunkStream, HealthSnapshot, HealthStatus, Provider, ProviderBase,
        ProviderDescriptor, ProviderEvent, ProviderState, RetryPolicy,
    },
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// A vendor failure the mock can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Vendor API error with the given status.
    Api(u16),
    /// Vendor 429, optionally with a `Retry-After`.
    RateLimited(Option<Duration>),
    /// Request timeout.
    Timeout,
    /// Connection failure.
    Connection,
}

impl MockFailure {
    /// Build the error this failure stands for.
    pub fn into_error(self, provider: &str) -> ProviderError {
        match self {
            Self::Api(status) => ProviderError::Api {
                provider: provider.into(),
                status: Some(status),
                message: format!("mock status {status}"),
                source: None,
            },
            Self::RateLimited(retry_after) => ProviderError::RateLimited {
                provider: provider.into(),
                origin: RateLimitOrigin::Vendor,
                retry_after,
            },
            Self::Timeout => ProviderError::Timeout {
                provider: provider.into(),
                timeout: Duration::from_secs(1),
            },
            Self::Connection => ProviderError::Connection {
                provider: provider.into(),
                message: "mock connection refused".into(),
                source: None,
            },
        }
    }
}

/// A provider whose vendor is a script.
pub struct MockProvider {
    base: ProviderBase,
    reply: String,
    usage: Usage,
    latency: Duration,
    dispose_delay: Duration,
    models: Vec<ModelInfo>,
    script: Mutex<VecDeque<MockFailure>>,
    always: Mutex<Option<MockFailure>>,
    stream_failure: Mutex<Option<MockFailure>>,
    fail_initialize: AtomicBool,
    healthy: AtomicBool,
    calls: AtomicUsize,
    health_checks: AtomicUsize,
    disposals: AtomicUsize,
}

impl MockProvider {
    /// A streaming mock with no credential requirement.
    pub fn new(id: &str) -> Self {
        let caps = Capabilities::NONE.streaming().custom_endpoint();
        Self::with_descriptor(ProviderDescriptor::new(id, format!("Mock {id}"), caps))
    }

    /// A mock with a custom descriptor.
    pub fn with_descriptor(descriptor: ProviderDescriptor) -> Self {
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };
        Self {
            base: ProviderBase::new(descriptor).with_retry_policy(retry),
            reply: "hello from mock".into(),
            usage: Usage::new(10, 5),
            latency: Duration::ZERO,
            dispose_delay: Duration::ZERO,
            models: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            always: Mutex::new(None),
            stream_failure: Mutex::new(None),
            fail_initialize: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            disposals: AtomicUsize::new(0),
        }
    }

    /// Set the generated text.
    pub fn reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Set the reported usage.
    pub fn usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Sleep this long inside every vendor call.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sleep this long inside `dispose`, before releasing anything.
    pub fn dispose_delay(mut self, delay: Duration) -> Self {
        self.dispose_delay = delay;
        self
    }

    /// Set the model catalog.
    pub fn models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    /// Fail the next vendor call with `failure`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, failure: MockFailure) {
        self.script.lock().push_back(failure);
    }

    /// Fail every vendor call with `failure`, or stop failing with `None`.
    pub fn fail_always(&self, failure: Option<MockFailure>) {
        *self.always.lock() = failure;
    }

    /// Make the next stream fail after its first chunk.
    pub fn fail_stream(&self, failure: MockFailure) {
        *self.stream_failure.lock() = Some(failure);
    }

    /// Make `initialize` fail to connect.
    pub fn fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    /// Control the outcome of health probes.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Generation calls that reached the vendor, retries included.
    pub fn vendor_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Health probes that reached the vendor.
    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    /// Times `dispose` ran.
    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// Force a state transition, as a vendor event would.
    pub fn transition(&self, to: ProviderState) -> bool {
        self.base.transition(to)
    }

    /// The shared base, for asserting on lifecycle details.
    pub fn base(&self) -> &ProviderBase {
        &self.base
    }

    /// A factory handing out this instance.
    pub fn factory(self: &Arc<Self>) -> impl Fn() -> Arc<dyn Provider> + Send + Sync + 'static {
        let mock = self.clone();
        move || mock.clone() as Arc<dyn Provider>
    }

    fn next_failure(&self) -> Option<MockFailure> {
        if let Some(failure) = self.script.lock().pop_front() {
            return Some(failure);
        }
        *self.always.lock()
    }

    async fn call(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        assert!(
            self.base.config().is_some(),
            "mock '{}' reached the vendor without a config",
            self.base.id()
        );
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(failure) = self.next_failure() {
            return Err(failure.into_error(self.base.id()));
        }
        let mut result =
            GenerationResult::new(self.reply.clone(), Some(self.usage), FinishReason::Stop);
        result.model = request.model.to_string();
        Ok(result)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        self.base.descriptor()
    }

    fn state(&self) -> ProviderState {
        self.base.state()
    }

    fn config(&self) -> Option<ProviderConfig> {
        self.base.config()
    }

    fn last_health(&self) -> Option<HealthSnapshot> {
        self.base.last_health()
    }

    fn events(&self) -> &EventBus<ProviderEvent> {
        self.base.events()
    }

    async fn initialize(&self, config: ProviderConfig) -> Result<()> {
        let fail = self.fail_initialize.load(Ordering::SeqCst);
        let id = self.base.id().to_owned();
        self.base
            .initialize_with(config, |_| async move {
                if fail {
                    Err(MockFailure::Connection.into_error(&id))
                } else {
                    Ok(())
                }
            })
            .await
    }

    async fn available_models(&self) -> Result<Vec<ModelInfo>> {
        self.base.ensure_ready()?;
        Ok(self.models.clone())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let config = self.base.ensure_ready()?;
        let result = self
            .base
            .with_retry(config.max_retries, || self.call(request))
            .await;
        self.base.observe(&result);
        result
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        self.base.ensure_streaming()?;
        self.base.ensure_ready()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.next_failure() {
            let result: Result<ChunkStream> = Err(failure.into_error(self.base.id()));
            self.base.observe(&result);
            return result;
        }

        let id = self.base.id().to_owned();
        let words: Vec<String> = self.reply.split_inclusive(' ').map(String::from).collect();
        let usage = self.usage;
        let latency = self.latency;
        let model = request.model.to_string();
        let failure = self.stream_failure.lock().take();
        Ok(Box::pin(async_stream::stream! {
            for (index, word) in words.into_iter().enumerate() {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                if let (1, Some(failure)) = (index, failure) {
                    yield Err(failure.into_error(&id));
                    return;
                }
                yield Ok(GenerationResult::chunk(word));
            }
            let mut last = GenerationResult::new("", Some(usage), FinishReason::Stop);
            last.model = model;
            yield Ok(last);
        }))
    }

    fn estimate_cost(&self, usage: &Usage, model: &str) -> CostEstimate {
        self.base.estimate_cost(&self.models, usage, model)
    }

    async fn check_health(&self) -> Result<HealthStatus> {
        if self.base.config().is_none() {
            return Err(ProviderError::NotConfigured {
                provider: Some(self.base.id().into()),
            });
        }
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = if self.healthy.load(Ordering::SeqCst) {
            Ok(HealthStatus::healthy(self.latency))
        } else {
            Ok(HealthStatus::unhealthy(self.latency, "mock probe failed"))
        };
        self.base.record_health(&result);
        result
    }

    async fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        if !self.dispose_delay.is_zero() {
            tokio::time::sleep(self.dispose_delay).await;
        }
        self.base.dispose();
    }
}
