//! The connection-channel contract and handler fan-out.
//!
//! [`EventChannel`] is the boundary to the physical transport: the engine
//! only ever calls `send` and `subscribe`. Socket lifecycle (connect,
//! ready handshake, reconnect) lives behind the implementation.
//!
//! [`HandlerRegistry`] is the fan-out building block channel
//! implementations use to deliver every inbound event to every current
//! subscriber in arrival order. Dispatch snapshots the handler list
//! first, so a handler may drop its own [`SubscriptionGuard`]
//! mid-dispatch without invalidating the iteration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

use pine_core::Result;

/// An inbound event handler: receives the wire event type and the raw
/// envelope value. Must not block; enqueue and return.
pub type EventHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Abstract bidirectional event transport.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Emit an event with its envelope.
    ///
    /// Fails with [`pine_core::PineError::Channel`] when the transport is
    /// not connected.
    async fn send(&self, event_type: &str, envelope: Value) -> Result<()>;

    /// Register a handler for every inbound event. Delivery continues,
    /// preserving arrival order, until the guard is dropped.
    fn subscribe(&self, handler: EventHandler) -> SubscriptionGuard;
}

#[async_trait]
impl<C: EventChannel + ?Sized> EventChannel for Arc<C> {
    async fn send(&self, event_type: &str, envelope: Value) -> Result<()> {
        (**self).send(event_type, envelope).await
    }

    fn subscribe(&self, handler: EventHandler) -> SubscriptionGuard {
        (**self).subscribe(handler)
    }
}

#[derive(Default)]
struct RegistryInner {
    /// Insertion-ordered so fan-out order is stable.
    handlers: RwLock<Vec<(u64, EventHandler)>>,
    next_id: AtomicU64,
}

/// Fan-out list of active event handlers.
///
/// Registration and removal are safe while a dispatch is in progress.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RegistryInner>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. The returned guard removes it on drop.
    #[must_use]
    pub fn subscribe(&self, handler: EventHandler) -> SubscriptionGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.write().push((id, handler));
        SubscriptionGuard {
            inner: Arc::clone(&self.inner),
            id: Some(id),
        }
    }

    /// Deliver one inbound event to every current handler, in
    /// registration order.
    pub fn dispatch(&self, event_type: &str, raw: &Value) {
        // Snapshot under the read lock; handlers may unsubscribe
        // themselves while we iterate the copy.
        let snapshot: Vec<EventHandler> = self
            .inner
            .handlers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        trace!(event_type, handlers = snapshot.len(), "dispatching event");
        for handler in snapshot {
            handler(event_type, raw);
        }
    }

    /// Number of active handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its handler from the registry when dropped.
pub struct SubscriptionGuard {
    inner: Arc<RegistryInner>,
    id: Option<u64>,
}

impl SubscriptionGuard {
    /// Remove the handler now. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.id.take() {
            self.inner.handlers.write().retain(|(h_id, _)| *h_id != id);
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn counting_handler(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> EventHandler {
        Arc::new(move |event_type, _raw| {
            log.lock().push(format!("{tag}:{event_type}"));
        })
    }

    #[test]
    fn dispatch_reaches_all_handlers_in_order() {
        let registry = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = registry.subscribe(counting_handler(Arc::clone(&log), "a"));
        let _b = registry.subscribe(counting_handler(Arc::clone(&log), "b"));

        registry.dispatch("session:text", &Value::Null);

        assert_eq!(*log.lock(), vec!["a:session:text", "b:session:text"]);
    }

    #[test]
    fn guard_drop_removes_handler() {
        let registry = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let _guard = registry.subscribe(counting_handler(Arc::clone(&log), "a"));
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
        registry.dispatch("session:text", &Value::Null);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = HandlerRegistry::new();
        let mut guard = registry.subscribe(Arc::new(|_, _| {}));
        guard.unsubscribe();
        guard.unsubscribe();
        assert!(registry.is_empty());
        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn handler_can_unsubscribe_itself_mid_dispatch() {
        let registry = HandlerRegistry::new();
        let slot: Arc<Mutex<Option<SubscriptionGuard>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(Mutex::new(0_u32));

        let slot_clone = Arc::clone(&slot);
        let hits_clone = Arc::clone(&hits);
        let guard = registry.subscribe(Arc::new(move |_, _| {
            *hits_clone.lock() += 1;
            // Drop our own guard while the registry is mid-dispatch.
            if let Some(mut g) = slot_clone.lock().take() {
                g.unsubscribe();
            }
        }));
        *slot.lock() = Some(guard);

        registry.dispatch("session:text", &Value::Null);
        registry.dispatch("session:text", &Value::Null);

        assert_eq!(*hits.lock(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn removal_only_affects_own_handler() {
        let registry = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut a = registry.subscribe(counting_handler(Arc::clone(&log), "a"));
        let _b = registry.subscribe(counting_handler(Arc::clone(&log), "b"));

        a.unsubscribe();
        registry.dispatch("e", &Value::Null);

        assert_eq!(*log.lock(), vec!["b:e"]);
    }
}
