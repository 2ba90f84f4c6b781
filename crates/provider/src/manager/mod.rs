//! Runtime manager over a shared [`ProviderRegistry`].
//!
//! Picks the current provider, admits and accounts requests, fails over
//! and runs health sweeps.

use crate::{config::ManagerConfig, registry::ProviderRegistry};
use admission::{Admission, InFlight};
use compact_str::CompactString;
use futures_util::{StreamExt, future::join_all};
use health::HealthTask;
use parking_lot::Mutex;
use qcore::{
    ChunkStream, CostEstimate, Event, EventBus, GenerationRequest, GenerationResult, HealthStatus,
    ModelInfo, Provider, ProviderConfig, ProviderError, ProviderEventKind, ProviderState, Result,
    Subscription, Usage, model::DEFAULT_CURRENCY, model::estimate_text_tokens,
};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

pub use admission::DEFAULT_MAX_CONCURRENT_REQUESTS;
pub use health::HealthReport;
pub use stats::UsageStatistics;

mod admission;
mod failover;
mod health;
mod stats;

/// Why the current provider changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchReason {
    /// `set_current_provider` was called.
    Manual,
    /// `generate_with_failover` succeeded on another provider.
    Failover,
    /// The current provider reported an error and a ready fallback took
    /// over.
    AutomaticFailover,
}

/// Notifications emitted by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// The current provider changed.
    ProviderSwitched {
        /// Previous current provider.
        from: Option<CompactString>,
        /// New current provider.
        to: CompactString,
        /// What triggered the switch.
        reason: SwitchReason,
    },
    /// A health sweep finished.
    HealthChecked(Vec<HealthReport>),
    /// A request finished and its statistics were recorded.
    UsageUpdated {
        /// The provider the request ran on.
        provider: CompactString,
        /// Statistics after the update.
        statistics: UsageStatistics,
    },
    /// A provider reported an error outside of a request.
    Error {
        /// The reporting provider.
        provider: CompactString,
        /// The error message.
        message: String,
    },
}

/// Routing key for [`ManagerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerEventKind {
    /// [`ManagerEvent::ProviderSwitched`]
    Switched,
    /// [`ManagerEvent::HealthChecked`]
    Health,
    /// [`ManagerEvent::UsageUpdated`]
    Usage,
    /// [`ManagerEvent::Error`]
    Error,
}

impl Event for ManagerEvent {
    type Kind = ManagerEventKind;

    fn kind(&self) -> ManagerEventKind {
        match self {
            Self::ProviderSwitched { .. } => ManagerEventKind::Switched,
            Self::HealthChecked(_) => ManagerEventKind::Health,
            Self::UsageUpdated { .. } => ManagerEventKind::Usage,
            Self::Error { .. } => ManagerEventKind::Error,
        }
    }
}

/// Selects a current provider and runs requests against it.
///
/// Cloning is cheap and every clone shares state. The manager refers to
/// instances by id; the registry keeps ownership, and disposing the
/// manager leaves the registry and its instances untouched.
#[derive(Clone)]
pub struct ProviderManager {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<ProviderRegistry>,
    state: Mutex<State>,
    admission: Admission,
    events: EventBus<ManagerEvent>,
    health: Mutex<Option<HealthTask>>,
    forwarding: Mutex<Vec<Subscription<ProviderEventKind>>>,
    /// Providers a `generate_with_failover` call is currently trying, with
    /// the number of calls trying each.
    attempts: Mutex<HashMap<CompactString, usize>>,
    /// Bumped on dispose so requests still in flight do not write into
    /// the cleared statistics.
    epoch: AtomicU64,
}

#[derive(Default)]
struct State {
    current: Option<CompactString>,
    fallback: Vec<CompactString>,
    stats: BTreeMap<CompactString, UsageStatistics>,
}

impl ProviderManager {
    /// Create a manager over `registry` with the default in-flight cap.
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        let inner = Arc::new(Inner {
            registry,
            state: Mutex::new(State::default()),
            admission: Admission::new(DEFAULT_MAX_CONCURRENT_REQUESTS),
            events: EventBus::new(),
            health: Mutex::new(None),
            forwarding: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&inner);
        let forwarding = inner.registry.subscribe_many(
            &[ProviderEventKind::Status, ProviderEventKind::Error],
            move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_provider_event(event);
                }
            },
        );
        *inner.forwarding.lock() = forwarding;
        Self { inner }
    }

    /// Build a manager from `config` and initialize every enabled provider.
    ///
    /// Providers are initialized in id order; `config.default`, when set,
    /// then overrides the implicit first pick. Providers that fail to
    /// initialize are logged and skipped; they stay in the registry for a
    /// later retry.
    pub async fn from_config(registry: Arc<ProviderRegistry>, config: &ManagerConfig) -> Self {
        let manager = Self::new(registry);
        manager
            .inner
            .admission
            .set_default_limit(config.max_concurrent_requests);
        manager.set_fallback_providers(config.fallback.iter().cloned());

        for (id, settings) in &config.providers {
            if !settings.enabled() {
                tracing::debug!("provider '{id}' disabled in config");
                continue;
            }
            if let Some(limit) = settings.max_concurrent_requests() {
                manager.set_concurrency_limit(id, limit);
            }
            if let Err(e) = manager.initialize_provider(id, settings.to_provider_config()).await {
                tracing::warn!("failed to initialize provider '{id}': {e}");
            }
        }

        if let Some(default) = &config.default {
            if let Err(e) = manager.set_current_provider(default) {
                tracing::warn!("cannot select default provider '{default}': {e}");
            }
        }
        if let Some(interval) = config.health_check_interval() {
            manager.start_health_checks(interval);
        }
        manager
    }

    /// The registry this manager draws instances from.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    /// Create or reconfigure the instance for `id`.
    ///
    /// The first provider initialized becomes current.
    pub async fn initialize_provider(&self, id: &str, config: ProviderConfig) -> Result<()> {
        self.inner.registry.create_provider(id, Some(config)).await?;

        let selected = {
            let mut state = self.inner.state.lock();
            state.stats.entry(id.into()).or_default();
            if state.current.is_none() {
                state.current = Some(id.into());
                true
            } else {
                false
            }
        };
        if selected {
            tracing::info!("provider '{id}' selected as current");
        }
        Ok(())
    }

    /// Make `id` the current provider.
    pub fn set_current_provider(&self, id: &str) -> Result<()> {
        let registry = &self.inner.registry;
        if !registry.is_registered(id) {
            return Err(ProviderError::NotFound(id.into()));
        }
        let provider = registry
            .get_provider(id)
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: Some(id.into()),
            })?;
        let state = provider.state();
        if state != ProviderState::Ready {
            return Err(ProviderError::NotReady {
                provider: id.into(),
                state,
            });
        }
        self.inner.switch(id.into(), SwitchReason::Manual);
        Ok(())
    }

    /// Id of the current provider.
    pub fn current_provider_id(&self) -> Option<CompactString> {
        self.inner.current_id()
    }

    /// Replace the fallback list. Order is kept as given.
    pub fn set_fallback_providers<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        self.inner.state.lock().fallback = ids.into_iter().map(Into::into).collect();
    }

    /// The fallback list.
    pub fn fallback_providers(&self) -> Vec<CompactString> {
        self.inner.state.lock().fallback.clone()
    }

    /// Cap concurrent requests to `id`. Zero is treated as one.
    pub fn set_concurrency_limit(&self, id: &str, limit: usize) {
        self.inner.admission.set_limit(id, limit);
    }

    /// The in-flight cap for `id`.
    pub fn concurrency_limit(&self, id: &str) -> usize {
        self.inner.admission.limit(id)
    }

    /// Requests to `id` currently in flight.
    pub fn in_flight(&self, id: &str) -> usize {
        self.inner.admission.in_flight(id)
    }

    /// Generate with the current provider.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let (id, provider) = self.inner.current()?;
        self.inner.run(&id, provider, request).await
    }

    /// Stream from the current provider.
    ///
    /// The request holds its admission slot until the stream ends or is
    /// dropped; statistics are recorded then.
    pub async fn generate_stream(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        let (id, provider) = self.inner.current()?;
        let mut call = InFlight::new(&self.inner, id, provider.clone(), request.model.clone())?;
        let mut stream = match provider.generate_stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                call.fail();
                return Err(e);
            }
        };

        Ok(Box::pin(async_stream::stream! {
            while let Some(item) = stream.next().await {
                match &item {
                    Ok(chunk) => {
                        call.usage(chunk.usage);
                        if chunk.is_final() {
                            call.succeed();
                        }
                    }
                    Err(_) => call.fail(),
                }
                let failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }
            if call.is_pending() {
                call.succeed();
            }
        }))
    }

    /// Models offered by `id`, or by the current provider.
    pub async fn available_models(&self, id: Option<&str>) -> Result<Vec<ModelInfo>> {
        let (_, provider) = self.inner.resolve(id)?;
        provider.available_models().await
    }

    /// Models of every instance that accepts requests, keyed by id.
    ///
    /// Failing providers are logged and left out.
    pub async fn all_available_models(&self) -> BTreeMap<CompactString, Vec<ModelInfo>> {
        let providers = self.inner.registry.active_providers();
        let listed = join_all(
            providers
                .iter()
                .filter(|(_, p)| p.state().accepts_requests())
                .map(|(id, p)| async move { (id.clone(), p.available_models().await) }),
        )
        .await;

        listed
            .into_iter()
            .filter_map(|(id, models)| match models {
                Ok(models) => Some((id, models)),
                Err(e) => {
                    tracing::warn!("failed to list models for '{id}': {e}");
                    None
                }
            })
            .collect()
    }

    /// Token count from the current provider, or the length heuristic.
    pub async fn count_tokens(&self, text: &str, model: Option<&str>) -> usize {
        match self.inner.current() {
            Ok((_, provider)) => provider.count_tokens(text, model).await,
            Err(_) => estimate_text_tokens(text),
        }
    }

    /// Cost estimate from the current provider, zero without one.
    pub fn estimate_cost(&self, usage: &Usage, model: &str) -> CostEstimate {
        match self.inner.current() {
            Ok((_, provider)) => provider.estimate_cost(usage, model),
            Err(_) => CostEstimate::zero(DEFAULT_CURRENCY),
        }
    }

    /// Probe `id`, or the current provider.
    pub async fn check_provider_health(&self, id: Option<&str>) -> Result<HealthStatus> {
        let (_, provider) = self.inner.resolve(id)?;
        provider.check_health().await
    }

    /// Probe every instance concurrently and emit the reports.
    pub async fn check_all_providers(&self) -> Vec<HealthReport> {
        self.inner.check_all().await
    }

    /// Start probing every `interval`, replacing any running loop.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start_health_checks(&self, interval: Duration) {
        if interval.is_zero() {
            tracing::warn!("ignoring zero health check interval");
            return;
        }
        let task = HealthTask::spawn(Arc::downgrade(&self.inner), interval);
        if let Some(previous) = self.inner.health.lock().replace(task) {
            previous.stop();
        }
    }

    /// Stop the probe loop, if running.
    pub fn stop_health_checks(&self) {
        if let Some(task) = self.inner.health.lock().take() {
            task.stop();
        }
    }

    /// Whether the probe loop is running.
    pub fn health_checks_running(&self) -> bool {
        self.inner.health.lock().is_some()
    }

    /// Statistics for `id`, or for the current provider.
    pub fn provider_statistics(&self, id: Option<&str>) -> Option<UsageStatistics> {
        let state = self.inner.state.lock();
        let id = id.or(state.current.as_deref())?;
        state.stats.get(id).cloned()
    }

    /// Statistics for every initialized provider.
    pub fn all_statistics(&self) -> BTreeMap<CompactString, UsageStatistics> {
        self.inner.state.lock().stats.clone()
    }

    /// Listen to manager events of `kind`.
    pub fn subscribe<F>(&self, kind: ManagerEventKind, handler: F) -> Subscription<ManagerEventKind>
    where
        F: Fn(&ManagerEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(kind, handler)
    }

    /// Stop listening.
    pub fn unsubscribe(&self, subscription: &Subscription<ManagerEventKind>) -> bool {
        self.inner.events.unsubscribe(subscription)
    }

    /// Stop health checks, forget statistics, counters and the current
    /// provider, and drop every listener.
    ///
    /// The registry and its instances are left alone.
    pub fn dispose(&self) {
        self.stop_health_checks();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.inner.state.lock();
            state.current = None;
            state.stats.clear();
        }
        self.inner.admission.clear();
        self.inner.events.clear();
        for subscription in self.inner.forwarding.lock().drain(..) {
            self.inner.registry.unsubscribe(&subscription);
        }
        tracing::info!("provider manager disposed");
    }
}

impl Inner {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn current_id(&self) -> Option<CompactString> {
        self.state.lock().current.clone()
    }

    fn current(&self) -> Result<(CompactString, Arc<dyn Provider>)> {
        self.resolve(None)
    }

    /// Look up `id`, or the current provider when `None`.
    fn resolve(&self, id: Option<&str>) -> Result<(CompactString, Arc<dyn Provider>)> {
        let id = match id {
            Some(id) => CompactString::from(id),
            None => self
                .current_id()
                .ok_or(ProviderError::NotConfigured { provider: None })?,
        };
        if !self.registry.is_registered(&id) {
            return Err(ProviderError::NotFound(id));
        }
        let provider = self
            .registry
            .get_provider(&id)
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: Some(id.clone()),
            })?;
        Ok((id, provider))
    }

    async fn run(
        self: &Arc<Self>,
        id: &CompactString,
        provider: Arc<dyn Provider>,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let mut call = InFlight::new(self, id.clone(), provider.clone(), request.model.clone())?;
        let result = provider.generate(request).await;
        match &result {
            Ok(output) => {
                call.usage(output.usage);
                call.succeed();
            }
            Err(_) => call.fail(),
        }
        result
    }

    fn switch(&self, to: CompactString, reason: SwitchReason) {
        let from = self.state.lock().current.replace(to.clone());
        tracing::info!(
            "current provider {} -> '{to}' ({reason:?})",
            from.as_deref().unwrap_or("none")
        );
        self.events
            .emit(&ManagerEvent::ProviderSwitched { from, to, reason });
    }

    fn record_usage(&self, id: &str, latency: Duration, success: bool, tokens: u64, cost: f64) {
        let statistics = {
            let mut state = self.state.lock();
            let stats = state.stats.entry(id.into()).or_default();
            stats.record(latency, success, tokens, cost);
            stats.clone()
        };
        self.events.emit(&ManagerEvent::UsageUpdated {
            provider: id.into(),
            statistics,
        });
    }

    async fn check_all(&self) -> Vec<HealthReport> {
        let providers = self.registry.active_providers();
        let reports = join_all(providers.iter().map(|(id, provider)| async move {
            match provider.check_health().await {
                Ok(status) => HealthReport {
                    provider: id.clone(),
                    healthy: status.healthy,
                    latency: status.latency,
                    error: status.message.filter(|_| !status.healthy),
                },
                Err(e) => {
                    tracing::warn!("health check for '{id}' failed: {e}");
                    HealthReport {
                        provider: id.clone(),
                        healthy: false,
                        latency: Duration::ZERO,
                        error: Some(e.to_string()),
                    }
                }
            }
        }))
        .await;

        self.events.emit(&ManagerEvent::HealthChecked(reports.clone()));
        reports
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.health.get_mut().take() {
            task.stop();
        }
        for subscription in self.forwarding.get_mut().drain(..) {
            self.registry.unsubscribe(&subscription);
        }
    }
}

impl fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ProviderManager")
            .field("current", &state.current)
            .field("fallback", &state.fallback)
            .finish()
    }
}
