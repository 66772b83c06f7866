//! Listener registry: named event handlers with unsubscribe handles and
//! panic-isolated dispatch.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{error, warn};

use crate::models::{Leave, LeaveDeleted, LeaveStatusChange, Notification};

/// Event delivered to registered listeners: transport lifecycle plus the
/// semantic events pushed by the server.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    Disconnected { reason: String },
    ConnectError { message: String },
    Reconnect { attempt: u32 },
    ReconnectAttempt { attempt: u32 },
    ReconnectError { message: String },
    ReconnectFailed,
    NotificationNew(Notification),
    UnreadCount(u64),
    LeaveNew(Leave),
    LeaveStatusChanged(LeaveStatusChange),
    LeaveDeleted(LeaveDeleted),
}

/// Dispatch key for `ClientEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    ConnectError,
    Reconnect,
    ReconnectAttempt,
    ReconnectError,
    ReconnectFailed,
    NotificationNew,
    UnreadCount,
    LeaveNew,
    LeaveStatusChanged,
    LeaveDeleted,
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Connected => EventKind::Connect,
            ClientEvent::Disconnected { .. } => EventKind::Disconnect,
            ClientEvent::ConnectError { .. } => EventKind::ConnectError,
            ClientEvent::Reconnect { .. } => EventKind::Reconnect,
            ClientEvent::ReconnectAttempt { .. } => EventKind::ReconnectAttempt,
            ClientEvent::ReconnectError { .. } => EventKind::ReconnectError,
            ClientEvent::ReconnectFailed => EventKind::ReconnectFailed,
            ClientEvent::NotificationNew(_) => EventKind::NotificationNew,
            ClientEvent::UnreadCount(_) => EventKind::UnreadCount,
            ClientEvent::LeaveNew(_) => EventKind::LeaveNew,
            ClientEvent::LeaveStatusChanged(_) => EventKind::LeaveStatusChanged,
            ClientEvent::LeaveDeleted(_) => EventKind::LeaveDeleted,
        }
    }
}

type Handler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Registered handlers for one connection, keyed by event kind.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<EventKind, Vec<(u64, Handler)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        self: &Arc<Self>,
        kind: EventKind,
        handler: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .expect("registry lock poisoned")
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            inner: Some((Arc::downgrade(self), kind, id)),
        }
    }

    fn remove(&self, kind: EventKind, id: u64) {
        let mut handlers = self.handlers.lock().expect("registry lock poisoned");
        if let Some(list) = handlers.get_mut(&kind) {
            list.retain(|(hid, _)| *hid != id);
            if list.is_empty() {
                handlers.remove(&kind);
            }
        }
    }

    /// Strip every registered handler without touching the connection.
    pub fn clear(&self) {
        self.handlers.lock().expect("registry lock poisoned").clear();
    }

    /// Invoke all handlers registered for the event's kind. A panicking
    /// listener is logged and must not take down its siblings or the
    /// transport driver.
    pub fn dispatch(&self, event: &ClientEvent) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().expect("registry lock poisoned");
            handlers
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(kind = ?event.kind(), "event listener panicked; continuing");
            }
        }
    }

    #[cfg(test)]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .lock()
            .expect("registry lock poisoned")
            .get(&kind)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

/// Handle returned by every subscription helper. Calling `unsubscribe` (or
/// dropping a handle obtained before any connection existed) is always safe.
#[must_use = "dropping a Subscription without unsubscribe leaks the handler for the connection's lifetime"]
pub struct Subscription {
    inner: Option<(Weak<ListenerRegistry>, EventKind, u64)>,
}

impl Subscription {
    /// Inert handle for the no-connection case.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    pub fn unsubscribe(self) {
        if let Some((registry, kind, id)) = self.inner {
            match registry.upgrade() {
                Some(registry) => registry.remove(kind, id),
                // Connection already torn down; nothing to remove.
                None => warn!(kind = ?kind, "unsubscribe after connection teardown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dispatch_reaches_registered_handler() {
        let registry = Arc::new(ListenerRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let sub = registry.register(EventKind::Connect, move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&ClientEvent::Connected);
        registry.dispatch(&ClientEvent::ReconnectFailed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        registry.dispatch(&ClientEvent::Connected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_break_siblings() {
        let registry = Arc::new(ListenerRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let _bad = registry.register(EventKind::Connect, |_| panic!("listener bug"));
        let _good = registry.register(EventKind::Connect, move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&ClientEvent::Connected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let registry = Arc::new(ListenerRegistry::new());
        let _a = registry.register(EventKind::Connect, |_| {});
        let _b = registry.register(EventKind::Disconnect, |_| {});
        registry.clear();
        assert_eq!(registry.handler_count(EventKind::Connect), 0);
        assert_eq!(registry.handler_count(EventKind::Disconnect), 0);
    }

    #[test]
    fn noop_subscription_is_callable() {
        Subscription::noop().unsubscribe();
    }
}
