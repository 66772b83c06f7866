//! Event hub: the single source of UI-visible truth for connection status,
//! the notification list, and the unread count.
//!
//! The hub translates transport events into reactive state (`watch`
//! channels plus a snapshot list) and exposes the imperative actions pages
//! call. Leave events are deliberately NOT mirrored into hub state; pages
//! subscribe to them directly through the pass-through helpers.

pub mod notifier;

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::{Leave, LeaveDeleted, LeaveStatusChange, Notification, SyncState};
use crate::transport::{ConnectionManager, Subscription};

pub use notifier::{
    NoopNotifier, NotificationPermission, SystemNotifier, ToastLevel, ToastSink, TracingToastSink,
};

/// Cheaply cloneable handle to the shared hub state.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// `None` for a detached hub: every action degrades to an inert no-op
    /// instead of panicking, so pages render without real-time features.
    manager: Option<Arc<ConnectionManager>>,
    notifier: Arc<dyn SystemNotifier>,
    /// Most-recent-first, push-arrival order.
    notifications: RwLock<Vec<Notification>>,
    /// Independent of the list: incremented per inbound notification,
    /// overwritten by server snapshots. The two may drift; neither is
    /// derived from the other.
    unread_tx: watch::Sender<u64>,
    connected_tx: watch::Sender<bool>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventHub {
    pub fn new(manager: Arc<ConnectionManager>, notifier: Arc<dyn SystemNotifier>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                manager: Some(manager),
                notifier,
                notifications: RwLock::new(Vec::new()),
                unread_tx: watch::channel(0).0,
                connected_tx: watch::channel(false).0,
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Inert hub for trees without a real-time provider: disconnected,
    /// empty, and every action is a safe no-op.
    pub fn detached() -> Self {
        Self {
            inner: Arc::new(HubInner {
                manager: None,
                notifier: Arc::new(NoopNotifier),
                notifications: RwLock::new(Vec::new()),
                unread_tx: watch::channel(0).0,
                connected_tx: watch::channel(false).0,
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register the hub's transport handlers on the current connection.
    /// Called by the auth bridge after each `connect`; safe to call again
    /// (previous handlers are dropped first).
    pub fn attach(&self) {
        self.detach();
        let Some(manager) = &self.inner.manager else {
            debug!("detached hub: attach is a no-op");
            return;
        };

        let mut subs = Vec::new();

        let inner = Arc::clone(&self.inner);
        let mgr = Arc::clone(manager);
        subs.push(manager.on_connect(move || {
            inner.set_connected(true);
            info!("realtime connected");
            // Adopt the authoritative unread count once per connect.
            let inner = Arc::clone(&inner);
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move {
                let count = mgr.get_unread_count().await;
                inner.set_unread(count);
            });
        }));

        let inner = Arc::clone(&self.inner);
        subs.push(manager.on_disconnect(move |reason| {
            // List and count persist across reconnects within this hub.
            inner.set_connected(false);
            debug!(reason, "realtime disconnected");
        }));

        let inner = Arc::clone(&self.inner);
        subs.push(manager.on_connect_error(move |message| {
            inner.set_connected(false);
            debug!(message, "realtime connect error");
        }));

        let inner = Arc::clone(&self.inner);
        subs.push(manager.on_new_notification(move |n| {
            inner.push_notification(n);
        }));

        let inner = Arc::clone(&self.inner);
        subs.push(manager.on_unread_count(move |count| {
            inner.set_unread(count);
        }));

        *self.inner.subscriptions.lock().expect("hub lock poisoned") = subs;

        // If the transport connected before these handlers registered,
        // sync up instead of waiting for an event that already fired.
        if manager.is_connected() {
            self.inner.set_connected(true);
            let inner = Arc::clone(&self.inner);
            let mgr = Arc::clone(manager);
            tokio::spawn(async move {
                let count = mgr.get_unread_count().await;
                inner.set_unread(count);
            });
        }
    }

    /// Drop the hub's transport handlers. Reactive state is kept.
    pub fn detach(&self) {
        let subs: Vec<Subscription> = self
            .inner
            .subscriptions
            .lock()
            .expect("hub lock poisoned")
            .drain(..)
            .collect();
        for sub in subs {
            sub.unsubscribe();
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected_tx.borrow()
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.inner.connected_tx.subscribe()
    }

    pub fn unread_count(&self) -> u64 {
        *self.inner.unread_tx.borrow()
    }

    pub fn watch_unread(&self) -> watch::Receiver<u64> {
        self.inner.unread_tx.subscribe()
    }

    /// Snapshot of the notification list, most recent first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner
            .notifications
            .read()
            .expect("hub lock poisoned")
            .clone()
    }

    /// Optimistically mark a notification read, then tell the server.
    ///
    /// The local flip and the floored decrement happen before the network
    /// call and are NOT rolled back on failure; the notification's sync tag
    /// records the divergence instead. Resolves `false` when the server
    /// refused, never answered, or no connection exists.
    pub async fn mark_as_read(&self, notification_id: &str) -> bool {
        let Some(manager) = &self.inner.manager else {
            return false;
        };

        let found = {
            let mut list = self.inner.notifications.write().expect("hub lock poisoned");
            match list.iter_mut().find(|n| n.id == notification_id) {
                Some(n) => {
                    n.is_read = true;
                    n.sync = SyncState::PendingSync;
                    true
                }
                None => false,
            }
        };
        self.inner.unread_tx.send_modify(|c| *c = c.saturating_sub(1));

        let ok = manager.mark_notification_read(notification_id).await;
        if found {
            let mut list = self.inner.notifications.write().expect("hub lock poisoned");
            if let Some(n) = list.iter_mut().find(|n| n.id == notification_id) {
                n.sync = if ok { SyncState::Clean } else { SyncState::SyncFailed };
            }
        }
        if !ok {
            debug!(notification_id, "mark-as-read not acknowledged; keeping optimistic state");
        }
        ok
    }

    /// Ask the server for entity-scoped updates for this leave id.
    pub fn join_leave_room(&self, leave_id: &str) {
        if let Some(manager) = &self.inner.manager {
            manager.emit_join_leave(leave_id);
        }
    }

    pub fn leave_leave_room(&self, leave_id: &str) {
        if let Some(manager) = &self.inner.manager {
            manager.emit_leave_leave(leave_id);
        }
    }

    /// Pass-through subscription; leave events never enter hub state.
    pub fn on_new_leave(&self, f: impl Fn(&Leave) + Send + Sync + 'static) -> Subscription {
        match &self.inner.manager {
            Some(manager) => manager.on_new_leave(f),
            None => Subscription::noop(),
        }
    }

    pub fn on_leave_status_changed(
        &self,
        f: impl Fn(&LeaveStatusChange) + Send + Sync + 'static,
    ) -> Subscription {
        match &self.inner.manager {
            Some(manager) => manager.on_leave_status_changed(f),
            None => Subscription::noop(),
        }
    }

    pub fn on_leave_deleted(
        &self,
        f: impl Fn(&LeaveDeleted) + Send + Sync + 'static,
    ) -> Subscription {
        match &self.inner.manager {
            Some(manager) => manager.on_leave_deleted(f),
            None => Subscription::noop(),
        }
    }
}

impl HubInner {
    fn set_connected(&self, connected: bool) {
        self.connected_tx.send_replace(connected);
    }

    fn set_unread(&self, count: u64) {
        self.unread_tx.send_replace(count);
    }

    fn push_notification(&self, n: &Notification) {
        {
            let mut list = self.notifications.write().expect("hub lock poisoned");
            list.insert(0, n.clone());
        }
        self.unread_tx.send_modify(|c| *c += 1);
        notifier::notify_best_effort(self.notifier.as_ref(), &n.title, &n.message);
    }
}

#[cfg(test)]
mod tests {
    use super::notifier::test_support::RecordingNotifier;
    use super::*;
    use crate::config::ClientConfig;
    use chrono::Utc;
    use std::time::Duration;

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            kind: "leave".to_string(),
            title: format!("title {id}"),
            message: "msg".to_string(),
            created_at: Utc::now(),
            is_read: false,
            sync: SyncState::Clean,
        }
    }

    fn offline_hub() -> (EventHub, Arc<RecordingNotifier>) {
        let manager = Arc::new(ConnectionManager::new(ClientConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            ack_timeout: Duration::from_millis(20),
            ..ClientConfig::default()
        }));
        let notifier = Arc::new(RecordingNotifier::granted());
        let hub = EventHub::new(manager, Arc::clone(&notifier) as Arc<dyn SystemNotifier>);
        (hub, notifier)
    }

    #[tokio::test]
    async fn notifications_are_most_recent_first() {
        let (hub, _) = offline_hub();
        hub.inner.push_notification(&notification("n1"));
        hub.inner.push_notification(&notification("n2"));
        let list = hub.notifications();
        assert_eq!(list[0].id, "n2");
        assert_eq!(list[1].id, "n1");
        assert_eq!(hub.unread_count(), 2);
    }

    #[tokio::test]
    async fn system_popup_is_attempted_when_granted() {
        let (hub, notifier) = offline_hub();
        hub.inner.push_notification(&notification("n1"));
        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, "title n1");
    }

    #[tokio::test]
    async fn unread_snapshot_overwrites_local_increments() {
        let (hub, _) = offline_hub();
        hub.inner.push_notification(&notification("n1"));
        hub.inner.push_notification(&notification("n2"));
        hub.inner.set_unread(7);
        assert_eq!(hub.unread_count(), 7, "server snapshot is authoritative");
        // The list is an independent signal and keeps its own truth.
        assert_eq!(hub.notifications().len(), 2);
    }

    #[tokio::test]
    async fn mark_as_read_is_optimistic_and_floors_at_zero() {
        let (hub, _) = offline_hub();
        hub.inner.push_notification(&notification("n1"));
        assert_eq!(hub.unread_count(), 1);

        // Offline: the ack never comes, so the action reports failure but
        // keeps the optimistic flip.
        let ok = hub.mark_as_read("n1").await;
        assert!(!ok);
        let list = hub.notifications();
        assert!(list[0].is_read);
        assert_eq!(list[0].sync, SyncState::SyncFailed);
        assert_eq!(hub.unread_count(), 0);

        // More calls than unread notifications never go below zero.
        let _ = hub.mark_as_read("n1").await;
        let _ = hub.mark_as_read("missing").await;
        assert_eq!(hub.unread_count(), 0);
    }

    #[tokio::test]
    async fn detached_hub_degrades_gracefully() {
        let hub = EventHub::detached();
        assert!(!hub.is_connected());
        assert!(hub.notifications().is_empty());
        assert_eq!(hub.unread_count(), 0);
        assert!(!hub.mark_as_read("n1").await);
        hub.join_leave_room("L1");
        hub.leave_leave_room("L1");
        hub.on_new_leave(|_| {}).unsubscribe();
        hub.on_leave_status_changed(|_| {}).unsubscribe();
        hub.on_leave_deleted(|_| {}).unsubscribe();
        hub.attach();
        hub.detach();
    }
}
