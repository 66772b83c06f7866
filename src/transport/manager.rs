//! Connection manager: one live WebSocket per manager, reused across
//! repeated `connect` calls.
//!
//! Constructed once at application root and passed down as an `Arc`; only
//! the auth bridge calls `connect`/`disconnect`. Everything else reads
//! status and registers handlers. No method here panics or returns an error
//! at runtime: subscription helpers hand back inert handles when no
//! connection exists, and request/response calls resolve with defaults on
//! timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::models::{
    ClientFrame, Leave, LeaveDeleted, LeaveStatusChange, MarkReadPayload, Notification, RoomRef,
};
use crate::transport::registry::{ClientEvent, EventKind, ListenerRegistry, Subscription};
use crate::transport::socket::{run_driver, DriverShared};

/// Transport lifecycle state, driven only by the driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

struct ActiveConnection {
    token: String,
    generation: u64,
    shared: Arc<DriverShared>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    driver: JoinHandle<()>,
    next_request_id: AtomicU64,
}

impl ActiveConnection {
    /// A connection counts as live while its driver is still running,
    /// whether Connecting or Connected; re-dialing mid-handshake would
    /// orphan the in-flight driver.
    fn is_live(&self) -> bool {
        !self.driver.is_finished()
    }
}

/// Owns the single long-lived connection and its listener registry.
pub struct ConnectionManager {
    config: ClientConfig,
    /// Stable per-process client id, sent as a connection parameter.
    client_id: String,
    inner: Mutex<Option<Arc<ActiveConnection>>>,
    status_tx: watch::Sender<ConnectionState>,
    generations: AtomicU64,
    /// Generation whose driver is allowed to write status; superseded
    /// drivers see a mismatch and drop their teardown writes.
    live_generation: Arc<AtomicU64>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            client_id: generate_client_id(),
            inner: Mutex::new(None),
            status_tx,
            generations: AtomicU64::new(0),
            live_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Establish (or reuse) the connection authenticated with `token`.
    ///
    /// Idempotent while a live connection with the same token exists: the
    /// same generation is returned and no second transport is constructed.
    /// A different token tears the current connection down and dials fresh.
    /// Returns the generation of the connection in effect afterwards.
    pub fn connect(&self, token: &str) -> u64 {
        let mut inner = self.inner.lock().expect("connection lock poisoned");
        if let Some(conn) = inner.as_ref() {
            if conn.is_live() {
                if conn.token == token {
                    debug!(generation = conn.generation, "connect: reusing live connection");
                    return conn.generation;
                }
                info!("connect: credential changed, replacing connection");
                let _ = conn.shutdown.send(true);
            }
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        self.live_generation.store(generation, Ordering::SeqCst);
        let registry = Arc::new(ListenerRegistry::new());
        let shared = Arc::new(DriverShared {
            registry,
            pending: Mutex::new(Default::default()),
            status: self.status_tx.clone(),
            generation,
            live_generation: Arc::clone(&self.live_generation),
            attempts: Default::default(),
        });
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let url = format!(
            "{}?token={}&client_id={}",
            self.config.ws_url(),
            token,
            self.client_id
        );
        let driver = tokio::spawn(run_driver(
            self.config.clone(),
            url,
            Arc::clone(&shared),
            outbound_rx,
            shutdown_rx,
        ));
        info!(generation, "connect: dialing transport");

        *inner = Some(Arc::new(ActiveConnection {
            token: token.to_string(),
            generation,
            shared,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            driver,
            next_request_id: AtomicU64::new(1),
        }));
        generation
    }

    /// Tear down the active connection, cancelling any in-flight
    /// reconnection. Idempotent.
    pub fn disconnect(&self) {
        let conn = self.inner.lock().expect("connection lock poisoned").take();
        match conn {
            Some(conn) => {
                // The driver is no longer the status owner; the manager's
                // Disconnected below is final.
                self.live_generation.store(0, Ordering::SeqCst);
                let _ = conn.shutdown.send(true);
                self.status_tx.send_replace(ConnectionState::Disconnected);
                info!(generation = conn.generation, "disconnected");
            }
            None => debug!("disconnect: no active connection"),
        }
    }

    /// Strip every registered handler without closing the connection. Used
    /// during consumer teardown to avoid leaking handlers across remounts.
    pub fn remove_all_listeners(&self) {
        if let Some(conn) = self.current() {
            conn.shared.registry.clear();
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.status_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.status_tx.subscribe()
    }

    /// Generation of the connection currently in effect, if any.
    pub fn generation(&self) -> Option<u64> {
        self.current().map(|c| c.generation)
    }

    /// Reconnection attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.current()
            .map(|c| c.shared.attempts.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn current(&self) -> Option<Arc<ActiveConnection>> {
        self.inner
            .lock()
            .expect("connection lock poisoned")
            .as_ref()
            .map(Arc::clone)
    }

    fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> Subscription {
        match self.current() {
            Some(conn) => conn.shared.registry.register(kind, handler),
            // Load-bearing null safety: consumers subscribe during
            // render-adjacent setup before any connection may exist.
            None => {
                debug!(kind = ?kind, "subscribe before connect: returning inert handle");
                Subscription::noop()
            }
        }
    }

    pub fn on_connect(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::Connect, move |_| f())
    }

    pub fn on_disconnect(&self, f: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::Disconnect, move |e| {
            if let ClientEvent::Disconnected { reason } = e {
                f(reason)
            }
        })
    }

    pub fn on_connect_error(&self, f: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::ConnectError, move |e| {
            if let ClientEvent::ConnectError { message } = e {
                f(message)
            }
        })
    }

    pub fn on_reconnect(&self, f: impl Fn(u32) + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::Reconnect, move |e| {
            if let ClientEvent::Reconnect { attempt } = e {
                f(*attempt)
            }
        })
    }

    pub fn on_reconnect_attempt(&self, f: impl Fn(u32) + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::ReconnectAttempt, move |e| {
            if let ClientEvent::ReconnectAttempt { attempt } = e {
                f(*attempt)
            }
        })
    }

    pub fn on_reconnect_error(&self, f: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::ReconnectError, move |e| {
            if let ClientEvent::ReconnectError { message } = e {
                f(message)
            }
        })
    }

    pub fn on_reconnect_failed(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::ReconnectFailed, move |_| f())
    }

    pub fn on_new_notification(
        &self,
        f: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(EventKind::NotificationNew, move |e| {
            if let ClientEvent::NotificationNew(n) = e {
                f(n)
            }
        })
    }

    pub fn on_unread_count(&self, f: impl Fn(u64) + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::UnreadCount, move |e| {
            if let ClientEvent::UnreadCount(count) = e {
                f(*count)
            }
        })
    }

    pub fn on_new_leave(&self, f: impl Fn(&Leave) + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::LeaveNew, move |e| {
            if let ClientEvent::LeaveNew(leave) = e {
                f(leave)
            }
        })
    }

    pub fn on_leave_status_changed(
        &self,
        f: impl Fn(&LeaveStatusChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(EventKind::LeaveStatusChanged, move |e| {
            if let ClientEvent::LeaveStatusChanged(change) = e {
                f(change)
            }
        })
    }

    pub fn on_leave_deleted(
        &self,
        f: impl Fn(&LeaveDeleted) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(EventKind::LeaveDeleted, move |e| {
            if let ClientEvent::LeaveDeleted(deleted) = e {
                f(deleted)
            }
        })
    }

    /// Tell the server to scope `leave:*` updates for this id to us. No-op
    /// when not connected or the id is empty; joins are fire-and-forget and
    /// the server deduplicates repeats.
    pub fn emit_join_leave(&self, leave_id: &str) {
        self.emit_room(leave_id, true);
    }

    pub fn emit_leave_leave(&self, leave_id: &str) {
        self.emit_room(leave_id, false);
    }

    fn emit_room(&self, leave_id: &str, join: bool) {
        if leave_id.is_empty() {
            return;
        }
        if !self.is_connected() {
            debug!(leave_id, join, "room emit skipped: not connected");
            return;
        }
        let Some(conn) = self.current() else { return };
        let frame = if join {
            ClientFrame::JoinLeaveRoom { data: RoomRef { leave_id: leave_id.to_string() } }
        } else {
            ClientFrame::LeaveLeaveRoom { data: RoomRef { leave_id: leave_id.to_string() } }
        };
        match serde_json::to_string(&frame) {
            Ok(text) => {
                let _ = conn.outbound.send(text);
            }
            Err(e) => warn!(error = %e, "room frame serialization failed"),
        }
    }

    /// Send a request frame and await its ack, resolving `None` if the
    /// server never answers within the ack timeout or no connection exists.
    async fn request(&self, build: impl FnOnce(u64) -> ClientFrame) -> Option<serde_json::Value> {
        let (conn, id, ack_rx) = {
            let conn = self.current()?;
            if !self.is_connected() {
                return None;
            }
            let id = conn.next_request_id.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            conn.shared
                .pending
                .lock()
                .expect("pending lock poisoned")
                .insert(id, tx);
            (conn, id, rx)
        };

        let frame = match serde_json::to_string(&build(id)) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "request frame serialization failed");
                conn.shared.pending.lock().expect("pending lock poisoned").remove(&id);
                return None;
            }
        };
        if conn.outbound.send(frame).is_err() {
            conn.shared.pending.lock().expect("pending lock poisoned").remove(&id);
            return None;
        }

        match tokio::time::timeout(self.config.ack_timeout, ack_rx).await {
            Ok(Ok(value)) => Some(value),
            _ => {
                debug!(id, "ack timed out; resolving with default");
                conn.shared.pending.lock().expect("pending lock poisoned").remove(&id);
                None
            }
        }
    }

    /// Ask the server to mark a notification read. Resolves `false` on
    /// timeout or when disconnected; callers cannot distinguish a refusal
    /// from a missing answer.
    pub async fn mark_notification_read(&self, notification_id: &str) -> bool {
        let notification_id = notification_id.to_string();
        self.request(|id| ClientFrame::MarkRead {
            id,
            data: MarkReadPayload { notification_id },
        })
        .await
        .and_then(|v| v.get("ok").and_then(|b| b.as_bool()))
        .unwrap_or(false)
    }

    /// Fetch the authoritative unread count. Resolves `0` on timeout.
    pub async fn get_unread_count(&self) -> u64 {
        self.request(|id| ClientFrame::GetUnreadCount { id })
            .await
            .and_then(|v| v.get("count").and_then(|c| c.as_u64()))
            .unwrap_or(0)
    }

    /// Liveness probe over the event transport.
    pub async fn ping(&self) -> bool {
        self.request(|id| ClientFrame::Ping { id }).await.is_some()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(conn) = self.inner.lock().expect("connection lock poisoned").take() {
            let _ = conn.shutdown.send(true);
        }
    }
}

/// Generate a unique per-process client id.
fn generate_client_id() -> String {
    format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager_for(addr: &str) -> ConnectionManager {
        ConnectionManager::new(ClientConfig {
            server_url: format!("http://{addr}"),
            reconnect_attempts: 1,
            reconnect_base_delay: Duration::from_millis(10),
            reconnect_max_delay: Duration::from_millis(20),
            connect_timeout: Duration::from_secs(30),
            ack_timeout: Duration::from_millis(50),
            ..ClientConfig::default()
        })
    }

    /// Listener that accepts TCP but never answers the WebSocket upgrade,
    /// keeping the driver parked in its handshake.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn connect_is_idempotent_for_same_token() {
        let addr = silent_server().await;
        let manager = manager_for(&addr);
        let first = manager.connect("tok-a");
        let second = manager.connect("tok-a");
        assert_eq!(first, second, "same token must reuse the live connection");
        assert_eq!(manager.generation(), Some(first));
    }

    #[tokio::test]
    async fn connect_with_different_token_replaces_connection() {
        let addr = silent_server().await;
        let manager = manager_for(&addr);
        let first = manager.connect("tok-a");
        let second = manager.connect("tok-b");
        assert_ne!(first, second, "a new credential must dial a fresh transport");
        assert_eq!(manager.generation(), Some(second));
    }

    #[tokio::test]
    async fn replaced_connection_keeps_the_live_status() {
        let addr = silent_server().await;
        let manager = manager_for(&addr);
        manager.connect("tok-a");
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.connect("tok-b");

        // Give the superseded driver time to exit; its teardown must not
        // mask the replacement, which is still mid-handshake.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn subscriptions_before_connect_are_null_safe() {
        let manager = manager_for("127.0.0.1:9");
        let sub = manager.on_new_notification(|_| {});
        sub.unsubscribe();
        let sub = manager.on_leave_status_changed(|_| {});
        sub.unsubscribe();
        let sub = manager.on_unread_count(|_| {});
        sub.unsubscribe();
        let sub = manager.on_new_leave(|_| {});
        sub.unsubscribe();
        let sub = manager.on_leave_deleted(|_| {});
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn requests_resolve_defaults_when_disconnected() {
        let manager = manager_for("127.0.0.1:9");
        assert!(!manager.mark_notification_read("n1").await);
        assert_eq!(manager.get_unread_count().await, 0);
        assert!(!manager.ping().await);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let addr = silent_server().await;
        let manager = manager_for(&addr);
        manager.disconnect();
        manager.connect("tok");
        manager.disconnect();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.generation(), None);
    }

    #[tokio::test]
    async fn room_emits_are_noops_when_offline() {
        let manager = manager_for("127.0.0.1:9");
        manager.emit_join_leave("L1");
        manager.emit_leave_leave("L1");
        manager.emit_join_leave("");
    }
}
