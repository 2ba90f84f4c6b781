//! Failover across the priority list.

use super::{Inner, ManagerEvent, ProviderManager, SwitchReason};
use crate::registry::RegistryEvent;
use compact_str::CompactString;
use qcore::{
    GenerationRequest, GenerationResult, ProviderError, ProviderEvent, ProviderState, Result,
};

impl Inner {
    /// `[current] ++ fallback`, deduplicated, order preserved.
    pub(super) fn priority_list(&self) -> Vec<CompactString> {
        let state = self.state.lock();
        let mut ids: Vec<CompactString> = Vec::with_capacity(state.fallback.len() + 1);
        for id in state.current.iter().chain(state.fallback.iter()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    fn is_ready(&self, id: &str) -> bool {
        self.registry
            .get_provider(id)
            .is_some_and(|p| p.state() == ProviderState::Ready)
    }

    /// React to a forwarded provider event.
    pub(super) fn on_provider_event(&self, event: &RegistryEvent) {
        let failed = match &event.event {
            ProviderEvent::StatusChanged {
                to: ProviderState::Error,
                ..
            } => true,
            ProviderEvent::Error {
                message,
                unrecoverable,
            } => {
                self.events.emit(&ManagerEvent::Error {
                    provider: event.provider.clone(),
                    message: message.clone(),
                });
                *unrecoverable
            }
            _ => false,
        };
        if !failed || self.attempts.lock().contains_key(&event.provider) {
            return;
        }
        if self.current_id().as_deref() == Some(event.provider.as_str()) {
            self.automatic_failover(&event.provider);
        }
    }

    /// Mark `id` as being tried by a failover call until the guard drops.
    ///
    /// Failures of a marked provider do not trigger automatic failover; the
    /// failover call decides the switch itself.
    fn attempting(&self, id: &CompactString) -> Attempt<'_> {
        *self.attempts.lock().entry(id.clone()).or_default() += 1;
        Attempt {
            inner: self,
            id: id.clone(),
        }
    }

    fn automatic_failover(&self, failed: &str) {
        let next = self
            .priority_list()
            .into_iter()
            .filter(|id| id.as_str() != failed)
            .find(|id| self.is_ready(id));
        match next {
            Some(id) => self.switch(id, SwitchReason::AutomaticFailover),
            None => tracing::warn!("provider '{failed}' failed and no ready fallback is available"),
        }
    }
}

impl ProviderManager {
    /// Generate with the first provider in the priority list that
    /// succeeds.
    ///
    /// Unregistered and non-ready ids are skipped. On exhaustion the last
    /// provider error is returned and the current provider is unchanged.
    pub async fn generate_with_failover(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let candidates = self.inner.priority_list();
        let mut last_error = None;

        for id in &candidates {
            let Some(provider) = self.inner.registry.get_provider(id) else {
                tracing::debug!("failover: skipping '{id}', not created");
                continue;
            };
            if provider.state() != ProviderState::Ready {
                tracing::debug!("failover: skipping '{id}' ({})", provider.state());
                continue;
            }

            let attempt = self.inner.attempting(id);
            let outcome = self.inner.run(id, provider, request).await;
            drop(attempt);
            match outcome {
                Ok(result) => {
                    if self.inner.current_id().as_ref() != Some(id) {
                        self.inner.switch(id.clone(), SwitchReason::Failover);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!("failover: '{id}' failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::AllProvidersFailed { candidates }))
    }
}

struct Attempt<'a> {
    inner: &'a Inner,
    id: CompactString,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        let mut attempts = self.inner.attempts.lock();
        if let Some(count) = attempts.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                attempts.remove(&self.id);
            }
        }
    }
}
