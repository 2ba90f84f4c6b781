//! Local admission control and in-flight request tracking.

use super::Inner;
use compact_str::CompactString;
use parking_lot::Mutex;
use qcore::{Provider, ProviderError, RateLimitOrigin, Result, Usage};
use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::time::Instant;

/// Default per-provider in-flight cap.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 5;

/// Per-provider in-flight counters with a configurable cap.
pub(super) struct Admission {
    default_limit: AtomicUsize,
    limits: Mutex<HashMap<CompactString, usize>>,
    in_flight: Mutex<HashMap<CompactString, Arc<AtomicUsize>>>,
}

impl Admission {
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit: AtomicUsize::new(default_limit.max(1)),
            limits: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_default_limit(&self, limit: usize) {
        self.default_limit.store(limit.max(1), Ordering::SeqCst);
    }

    pub fn set_limit(&self, id: &str, limit: usize) {
        self.limits.lock().insert(id.into(), limit.max(1));
    }

    pub fn limit(&self, id: &str) -> usize {
        self.limits
            .lock()
            .get(id)
            .copied()
            .unwrap_or_else(|| self.default_limit.load(Ordering::SeqCst))
    }

    pub fn in_flight(&self, id: &str) -> usize {
        self.in_flight
            .lock()
            .get(id)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Take a slot for `id`, or fail with a local rate limit.
    pub fn acquire(&self, id: &str) -> Result<Permit> {
        let limit = self.limit(id);
        let counter = self.in_flight.lock().entry(id.into()).or_default().clone();
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .map_err(|_| ProviderError::RateLimited {
                provider: id.into(),
                origin: RateLimitOrigin::Local,
                retry_after: None,
            })?;
        Ok(Permit { counter })
    }

    /// Forget every counter. Outstanding permits release into the
    /// detached counters.
    pub fn clear(&self) {
        self.in_flight.lock().clear();
    }
}

/// An admitted slot, released on drop.
pub(super) struct Permit {
    counter: Arc<AtomicUsize>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Outcome {
    Pending,
    Succeeded,
    Failed,
}

/// One admitted request. Statistics are recorded when it drops, so a
/// request abandoned mid-flight still counts, as a failure.
pub(super) struct InFlight {
    manager: Weak<Inner>,
    epoch: u64,
    provider: Arc<dyn Provider>,
    id: CompactString,
    model: CompactString,
    started: Instant,
    usage: Option<Usage>,
    outcome: Outcome,
    _permit: Permit,
}

impl InFlight {
    pub fn new(
        manager: &Arc<Inner>,
        id: CompactString,
        provider: Arc<dyn Provider>,
        model: CompactString,
    ) -> Result<Self> {
        let permit = manager.admission.acquire(&id)?;
        Ok(Self {
            manager: Arc::downgrade(manager),
            epoch: manager.epoch(),
            provider,
            id,
            model,
            started: Instant::now(),
            usage: None,
            outcome: Outcome::Pending,
            _permit: permit,
        })
    }

    /// Remember the latest reported usage.
    pub fn usage(&mut self, usage: Option<Usage>) {
        if usage.is_some() {
            self.usage = usage;
        }
    }

    pub fn succeed(&mut self) {
        self.outcome = Outcome::Succeeded;
    }

    pub fn fail(&mut self) {
        self.outcome = Outcome::Failed;
    }

    /// Whether neither success nor failure was reported yet.
    pub fn is_pending(&self) -> bool {
        matches!(self.outcome, Outcome::Pending)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let latency = self.started.elapsed();
        let success = match self.outcome {
            Outcome::Succeeded => true,
            Outcome::Failed => false,
            Outcome::Pending => {
                tracing::debug!("request to '{}' cancelled after {latency:?}", self.id);
                false
            }
        };
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if manager.epoch() != self.epoch {
            return;
        }

        let (tokens, cost) = match &self.usage {
            Some(usage) => (
                u64::from(usage.total_tokens),
                self.provider.estimate_cost(usage, &self.model).total,
            ),
            None => (0, 0.0),
        };
        manager.record_usage(&self.id, latency, success, tokens, cost);
    }
}
