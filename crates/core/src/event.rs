//! Typed publish/subscribe bus.
//!
//! Components compose an [`EventBus`] instead of inheriting from an
//! emitter. Handlers are kept per event kind in subscription order and run
//! synchronously on the emitting task, so events from one emitter reach
//! every listener in the order they were emitted.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// An event that can be routed by kind.
pub trait Event: Send + Sync + 'static {
    /// Discriminant used to route the event.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// The kind of this event.
    fn kind(&self) -> Self::Kind;
}

/// A type-erased event handler.
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription<K> {
    kind: K,
    id: u64,
}

impl<K: Copy> Subscription<K> {
    /// The event kind this subscription listens to.
    pub fn kind(&self) -> K {
        self.kind
    }
}

/// Mapping from event kind to an ordered list of handlers.
pub struct EventBus<E: Event> {
    next: AtomicU64,
    handlers: Mutex<HashMap<E::Kind, Vec<(u64, Handler<E>)>>>,
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> EventBus<E> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: E::Kind, handler: F) -> Subscription<E::Kind>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_handler(kind, Arc::new(handler))
    }

    /// Register an already shared handler for events of `kind`.
    pub fn subscribe_handler(&self, kind: E::Kind, handler: Handler<E>) -> Subscription<E::Kind> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .entry(kind)
            .or_default()
            .push((id, handler));
        Subscription { kind, id }
    }

    /// Register one handler for several kinds.
    pub fn subscribe_many<F>(&self, kinds: &[E::Kind], handler: F) -> Vec<Subscription<E::Kind>>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let handler: Handler<E> = Arc::new(handler);
        kinds
            .iter()
            .map(|kind| self.subscribe_handler(*kind, handler.clone()))
            .collect()
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription<E::Kind>) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(&subscription.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        before != list.len()
    }

    /// Deliver `event` to every handler of its kind, in subscription order.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe while being called.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = {
            let handlers = self.handlers.lock();
            match handlers.get(&event.kind()) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of handlers listening to `kind`.
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.handlers.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Drop every handler.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}

impl<E: Event> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.lock();
        let kinds: Vec<_> = handlers
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &kinds).finish()
    }
}
