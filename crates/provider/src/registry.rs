//! Known provider kinds and their live instances.
//!
//! The registry is the only owner of provider instances. It keeps at most
//! one instance per id and forwards every instance's lifecycle events to
//! its own listeners, tagged with the id.

use compact_str::CompactString;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use qcore::{
    Capabilities, Event, EventBus, Provider, ProviderConfig, ProviderDescriptor, ProviderError,
    ProviderEvent, ProviderEventKind, Result, Subscription,
};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Builds a fresh, unconfigured provider instance.
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

/// A provider event, tagged with the id of the instance that emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEvent {
    /// The emitting provider.
    pub provider: CompactString,
    /// The event as emitted.
    pub event: ProviderEvent,
}

impl Event for RegistryEvent {
    type Kind = ProviderEventKind;

    fn kind(&self) -> ProviderEventKind {
        self.event.kind()
    }
}

struct Kind {
    descriptor: ProviderDescriptor,
    factory: ProviderFactory,
}

struct Instance {
    provider: Arc<dyn Provider>,
    forwarding: Vec<Subscription<ProviderEventKind>>,
}

/// An instance removed from the active set. Forwarding is detached on drop.
struct Detached(Instance);

impl Drop for Detached {
    fn drop(&mut self) {
        for subscription in &self.0.forwarding {
            self.0.provider.events().unsubscribe(subscription);
        }
    }
}

/// Registered provider kinds and the instances created from them.
///
/// Constructed once by the application and shared by reference; there is
/// no process-wide default.
pub struct ProviderRegistry {
    kinds: RwLock<Vec<Kind>>,
    active: Mutex<BTreeMap<CompactString, Instance>>,
    events: Arc<EventBus<RegistryEvent>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            kinds: RwLock::new(Vec::new()),
            active: Mutex::new(BTreeMap::new()),
            events: Arc::new(EventBus::new()),
        }
    }

    /// Register a provider kind.
    ///
    /// Fails if the id is already taken or the descriptor is incomplete
    /// (empty id, empty name, or no capabilities).
    pub fn register_provider_kind<F>(&self, descriptor: ProviderDescriptor, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        let registration = |reason: String| ProviderError::Registration {
            provider: descriptor.id.clone(),
            reason,
        };
        descriptor.validate().map_err(registration)?;

        let mut kinds = self.kinds.write();
        if kinds.iter().any(|k| k.descriptor.id == descriptor.id) {
            return Err(registration("already registered".into()));
        }
        tracing::info!("registered provider kind '{}'", descriptor.id);
        kinds.push(Kind {
            descriptor,
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// Whether `id` was registered.
    pub fn is_registered(&self, id: &str) -> bool {
        self.kinds.read().iter().any(|k| k.descriptor.id == id)
    }

    /// The descriptor registered for `id`.
    pub fn descriptor(&self, id: &str) -> Option<ProviderDescriptor> {
        self.kinds
            .read()
            .iter()
            .find(|k| k.descriptor.id == id)
            .map(|k| k.descriptor.clone())
    }

    /// Every registered descriptor, in registration order.
    pub fn supported_providers(&self) -> Vec<ProviderDescriptor> {
        self.kinds
            .read()
            .iter()
            .map(|k| k.descriptor.clone())
            .collect()
    }

    /// First registered descriptor whose capabilities cover `required`.
    pub fn find_best_provider(&self, required: &Capabilities) -> Option<ProviderDescriptor> {
        self.kinds
            .read()
            .iter()
            .find(|k| k.descriptor.capabilities.satisfies(required))
            .map(|k| k.descriptor.clone())
    }

    /// Get or create the instance for `id`, initializing it with `config`.
    ///
    /// An existing instance is reconfigured in place; a second instance is
    /// never created. Without a config the instance is returned as is.
    pub async fn create_provider(
        &self,
        id: &str,
        config: Option<ProviderConfig>,
    ) -> Result<Arc<dyn Provider>> {
        let factory = self
            .kinds
            .read()
            .iter()
            .find(|k| k.descriptor.id == id)
            .map(|k| k.factory.clone())
            .ok_or_else(|| ProviderError::NotFound(id.into()))?;

        let provider = {
            let mut active = self.active.lock();
            match active.get(id) {
                Some(instance) => instance.provider.clone(),
                None => {
                    let provider = factory();
                    if provider.descriptor().id != id {
                        return Err(ProviderError::Registration {
                            provider: id.into(),
                            reason: format!(
                                "factory built a provider with id '{}'",
                                provider.descriptor().id
                            ),
                        });
                    }
                    let forwarding = self.forward(id, &provider);
                    active.insert(
                        id.into(),
                        Instance {
                            provider: provider.clone(),
                            forwarding,
                        },
                    );
                    tracing::info!("created provider '{id}'");
                    provider
                }
            }
        };

        if let Some(config) = config {
            provider.initialize(config).await?;
        }
        Ok(provider)
    }

    /// The live instance for `id`, if one was created.
    pub fn get_provider(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.active.lock().get(id).map(|i| i.provider.clone())
    }

    /// Snapshot of every live instance, ordered by id.
    pub fn active_providers(&self) -> Vec<(CompactString, Arc<dyn Provider>)> {
        self.active
            .lock()
            .iter()
            .map(|(id, i)| (id.clone(), i.provider.clone()))
            .collect()
    }

    /// Dispose the instance for `id` and forget it.
    ///
    /// Returns `false` if no instance existed. The instance leaves the
    /// active set before disposal starts, so it is gone even if this future
    /// is dropped midway. Event forwarding stays attached until disposal
    /// finished or was abandoned, so listeners see the final `disconnected`
    /// transition.
    pub async fn dispose_provider(&self, id: &str) -> bool {
        let Some(instance) = self.active.lock().remove(id) else {
            return false;
        };
        let detached = Detached(instance);
        detached.0.provider.dispose().await;
        drop(detached);
        tracing::info!("disposed provider '{id}'");
        true
    }

    /// Dispose every live instance.
    pub async fn dispose_all(&self) {
        let ids: Vec<CompactString> = self.active.lock().keys().cloned().collect();
        join_all(ids.iter().map(|id| self.dispose_provider(id))).await;
    }

    /// Listen to forwarded provider events of `kind`.
    pub fn subscribe<F>(&self, kind: ProviderEventKind, handler: F) -> Subscription<ProviderEventKind>
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    /// Listen to forwarded provider events of several kinds.
    pub fn subscribe_many<F>(
        &self,
        kinds: &[ProviderEventKind],
        handler: F,
    ) -> Vec<Subscription<ProviderEventKind>>
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe_many(kinds, handler)
    }

    /// Stop listening.
    pub fn unsubscribe(&self, subscription: &Subscription<ProviderEventKind>) -> bool {
        self.events.unsubscribe(subscription)
    }

    fn forward(&self, id: &str, provider: &Arc<dyn Provider>) -> Vec<Subscription<ProviderEventKind>> {
        let events = self.events.clone();
        let id = CompactString::from(id);
        provider
            .events()
            .subscribe_many(&ProviderEventKind::ALL, move |event| {
                events.emit(&RegistryEvent {
                    provider: id.clone(),
                    event: event.clone(),
                });
            })
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<CompactString> = self
            .kinds
            .read()
            .iter()
            .map(|k| k.descriptor.id.clone())
            .collect();
        let active: Vec<CompactString> = self.active.lock().keys().cloned().collect();
        f.debug_struct("ProviderRegistry")
            .field("kinds", &kinds)
            .field("active", &active)
            .finish()
    }
}
