//! Shared provider behavior.
//!
//! Adapters compose a [`ProviderBase`] and delegate the cross-cutting parts
//! of the contract to it: the state machine, config validation, retry with
//! backoff and event emission. The adapter itself only translates requests
//! and responses.

use crate::{
    config::ProviderConfig,
    error::{ProviderError, RateLimitOrigin, Result},
    event::EventBus,
    model::{CostEstimate, ModelInfo, Usage},
    provider::{
        HealthSnapshot, HealthStatus, ProviderDescriptor, ProviderEvent, ProviderState,
    },
};
use chrono::Utc;
use parking_lot::Mutex;
use std::{future::Future, time::Duration};

/// Exponential backoff schedule for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

struct Inner {
    state: ProviderState,
    config: Option<ProviderConfig>,
    health: Option<HealthSnapshot>,
}

/// State machine, config holder and event bus for one provider instance.
pub struct ProviderBase {
    descriptor: ProviderDescriptor,
    retry: RetryPolicy,
    inner: Mutex<Inner>,
    events: EventBus<ProviderEvent>,
}

impl ProviderBase {
    /// Create a base in the `disconnected` state.
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self {
            descriptor,
            retry: RetryPolicy::default(),
            inner: Mutex::new(Inner {
                state: ProviderState::Disconnected,
                config: None,
                health: None,
            }),
            events: EventBus::new(),
        }
    }

    /// Replace the retry schedule.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Provider id.
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Static identity.
    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    /// Current state.
    pub fn state(&self) -> ProviderState {
        self.inner.lock().state
    }

    /// Current config.
    pub fn config(&self) -> Option<ProviderConfig> {
        self.inner.lock().config.clone()
    }

    /// Last health probe.
    pub fn last_health(&self) -> Option<HealthSnapshot> {
        self.inner.lock().health.clone()
    }

    /// Lifecycle event bus.
    pub fn events(&self) -> &EventBus<ProviderEvent> {
        &self.events
    }

    /// Move to `to` if the transition is legal, emitting `StatusChanged`.
    ///
    /// Returns `false` for a same-state or illegal transition.
    pub fn transition(&self, to: ProviderState) -> bool {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            if from == to {
                return false;
            }
            if !from.can_transition(to) {
                tracing::warn!("provider '{}': rejected transition {from} -> {to}", self.id());
                return false;
            }
            inner.state = to;
            from
        };
        tracing::debug!("provider '{}': {from} -> {to}", self.id());
        self.events.emit(&ProviderEvent::StatusChanged { from, to });
        true
    }

    /// Move from `expected` to `to`, only if still in `expected`.
    pub fn transition_from(&self, expected: ProviderState, to: ProviderState) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state != expected || !expected.can_transition(to) {
                return false;
            }
            inner.state = to;
        }
        tracing::debug!("provider '{}': {expected} -> {to}", self.id());
        self.events
            .emit(&ProviderEvent::StatusChanged { from: expected, to });
        true
    }

    /// Check `config` against the descriptor.
    pub fn validate(&self, config: &ProviderConfig) -> Result<()> {
        let caps = &self.descriptor.capabilities;
        if caps.requires_credential && config.credential.as_ref().is_none_or(|c| c.is_blank()) {
            return Err(ProviderError::invalid_config(self.id(), "credential is required"));
        }
        if let Some(endpoint) = &config.endpoint {
            if !caps.custom_endpoint {
                return Err(ProviderError::invalid_config(
                    self.id(),
                    "provider does not accept an endpoint override",
                ));
            }
            let url = url::Url::parse(endpoint).map_err(|e| {
                ProviderError::invalid_config(self.id(), format!("invalid endpoint '{endpoint}': {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ProviderError::invalid_config(
                    self.id(),
                    format!("endpoint scheme must be http or https, got '{}'", url.scheme()),
                ));
            }
        }
        if config.timeout.is_zero() {
            return Err(ProviderError::invalid_config(self.id(), "timeout must be non-zero"));
        }
        Ok(())
    }

    /// Drive `configuring → ready | error` around a vendor `connect` step.
    ///
    /// The config is stored once it validates, so a provider that failed
    /// to connect can still recover through a later health check.
    pub async fn initialize_with<F, Fut>(&self, config: ProviderConfig, connect: F) -> Result<()>
    where
        F: FnOnce(ProviderConfig) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.transition(ProviderState::Configuring);
        if let Err(e) = self.validate(&config) {
            self.fail(&e);
            return Err(e);
        }

        self.inner.lock().config = Some(config.clone());
        self.events.emit(&ProviderEvent::ConfigUpdated);

        match connect(config).await {
            Ok(()) => {
                self.transition(ProviderState::Ready);
                tracing::info!("provider '{}' ready", self.id());
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Fail-fast guard for operations that need a ready provider.
    ///
    /// Returns the live config so callers never touch the network without
    /// one.
    pub fn ensure_ready(&self) -> Result<ProviderConfig> {
        let inner = self.inner.lock();
        if !inner.state.accepts_requests() {
            return Err(ProviderError::NotReady {
                provider: self.descriptor.id.clone(),
                state: inner.state,
            });
        }
        inner
            .config
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: Some(self.descriptor.id.clone()),
            })
    }

    /// Fail with `Unsupported` unless the descriptor advertises streaming.
    pub fn ensure_streaming(&self) -> Result<()> {
        if self.descriptor.capabilities.streaming {
            Ok(())
        } else {
            Err(ProviderError::Unsupported {
                provider: self.descriptor.id.clone(),
                operation: "streaming",
            })
        }
    }

    /// Run `op`, retrying retryable failures with exponential backoff.
    ///
    /// A vendor `Retry-After` takes precedence over the schedule, capped at
    /// the policy maximum.
    pub async fn with_retry<T, F, Fut>(&self, max_retries: u32, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| self.retry.delay(attempt))
                        .min(self.retry.max_delay);
                    tracing::debug!(
                        "provider '{}': attempt {} failed, retrying in {delay:?}: {e}",
                        self.id(),
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Feed the outcome of a vendor call into the state machine.
    ///
    /// A vendor 429 moves `ready → rate_limited`; the next success moves it
    /// back. Errors that mean the provider is broken move it to `error`.
    pub fn observe<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) => {
                self.transition_from(ProviderState::RateLimited, ProviderState::Ready);
            }
            Err(ProviderError::RateLimited {
                origin: RateLimitOrigin::Vendor,
                ..
            }) => {
                self.transition_from(ProviderState::Ready, ProviderState::RateLimited);
            }
            Err(e) if e.is_unrecoverable() => self.fail(e),
            Err(_) => {}
        }
    }

    /// Record a health probe and move between `ready` and `error`.
    pub fn record_health(&self, result: &Result<HealthStatus>) {
        let (healthy, latency, message) = match result {
            Ok(status) => (status.healthy, status.latency, status.message.clone()),
            Err(e) => (false, Duration::ZERO, Some(e.to_string())),
        };
        let (state, configured) = {
            let mut inner = self.inner.lock();
            inner.health = Some(HealthSnapshot {
                checked_at: Utc::now(),
                latency,
                healthy,
            });
            (inner.state, inner.config.is_some())
        };

        if healthy {
            if state == ProviderState::Error && configured {
                tracing::info!("provider '{}' recovered", self.id());
                self.transition_from(ProviderState::Error, ProviderState::Ready);
            }
            return;
        }

        if state.accepts_requests() {
            let message = message.unwrap_or_else(|| "health check failed".to_owned());
            tracing::warn!("provider '{}' unhealthy: {message}", self.id());
            self.transition(ProviderState::Error);
            self.events.emit(&ProviderEvent::Error {
                message,
                unrecoverable: false,
            });
        }
    }

    /// Price `usage` against `catalog`, zero in the descriptor currency for
    /// unknown models.
    pub fn estimate_cost(&self, catalog: &[ModelInfo], usage: &Usage, model: &str) -> CostEstimate {
        CostEstimate::from_catalog(catalog, usage, model, &self.descriptor.currency)
    }

    /// Drop the config (and with it the credential) and disconnect.
    pub fn dispose(&self) {
        {
            let mut inner = self.inner.lock();
            inner.config = None;
            inner.health = None;
        }
        if self.transition(ProviderState::Disconnected) {
            tracing::info!("provider '{}' disposed", self.id());
        }
    }

    fn fail(&self, error: &ProviderError) {
        tracing::warn!("provider '{}' failed: {error}", self.id());
        self.transition(ProviderState::Error);
        self.events.emit(&ProviderEvent::Error {
            message: error.to_string(),
            unrecoverable: true,
        });
    }
}

impl std::fmt::Debug for ProviderBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ProviderBase")
            .field("id", &self.descriptor.id)
            .field("state", &inner.state)
            .field("configured", &inner.config.is_some())
            .finish()
    }
}
