//! WebSocket driver task: handshake with timeout, read/write pump, and
//! bounded exponential-backoff reconnection.
//!
//! One driver runs per established connection. Transport failures never
//! escape this task; they become status flips and dispatched lifecycle
//! events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::models::ServerFrame;
use crate::transport::manager::ConnectionState;
use crate::transport::registry::{ClientEvent, ListenerRegistry};

/// State shared between the driver task and the connection manager.
pub(crate) struct DriverShared {
    pub registry: Arc<ListenerRegistry>,
    /// Request id -> ack waiter. Entries are removed on ack, on caller
    /// timeout, or wholesale when the connection drops.
    pub pending: Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
    pub status: watch::Sender<ConnectionState>,
    /// Generation this driver was spawned for.
    pub generation: u64,
    /// Generation of the connection the manager currently holds. A
    /// superseded driver can be parked in a close handshake against a dead
    /// peer while its replacement is already up; its teardown writes must
    /// not mask the live connection's status.
    pub live_generation: Arc<AtomicU64>,
    /// Reconnection attempts since the last successful connect.
    pub attempts: AtomicU32,
}

impl DriverShared {
    fn set_status(&self, state: ConnectionState) {
        self.status.send_if_modified(|current| {
            if self.live_generation.load(Ordering::SeqCst) != self.generation {
                return false;
            }
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn fail_pending(&self) {
        // Dropping the senders resolves every in-flight request with its
        // default value on the caller side.
        self.pending.lock().expect("pending lock poisoned").clear();
    }
}

pub(crate) async fn run_driver(
    config: ClientConfig,
    url: String,
    shared: Arc<DriverShared>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }
        shared.set_status(ConnectionState::Connecting);
        if attempt > 0 {
            shared.attempts.store(attempt, Ordering::SeqCst);
            shared
                .registry
                .dispatch(&ClientEvent::ReconnectAttempt { attempt });
        }

        let handshake = tokio::time::timeout(config.connect_timeout, connect_async(&url));
        let result = tokio::select! {
            r = handshake => r,
            _ = shutdown.changed() => break,
        };

        match result {
            Ok(Ok((stream, _response))) => {
                shared.attempts.store(0, Ordering::SeqCst);
                shared.set_status(ConnectionState::Connected);
                if attempt > 0 {
                    info!(attempt, "transport reconnected");
                    shared.registry.dispatch(&ClientEvent::Reconnect { attempt });
                }
                shared.registry.dispatch(&ClientEvent::Connected);
                attempt = 0;

                let reason = pump(stream, &shared, &mut outbound, &mut shutdown).await;
                shared.fail_pending();
                shared.set_status(ConnectionState::Disconnected);
                debug!(reason = %reason, "transport disconnected");
                shared
                    .registry
                    .dispatch(&ClientEvent::Disconnected { reason });
                if *shutdown.borrow() {
                    break;
                }
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                warn!(error = %message, "transport connect failed");
                shared.set_status(ConnectionState::Error);
                shared
                    .registry
                    .dispatch(&ClientEvent::ConnectError { message: message.clone() });
                if attempt > 0 {
                    shared
                        .registry
                        .dispatch(&ClientEvent::ReconnectError { message });
                }
            }
            Err(_elapsed) => {
                warn!("transport connect timed out");
                shared.set_status(ConnectionState::Error);
                shared.registry.dispatch(&ClientEvent::ConnectError {
                    message: "connect timed out".to_string(),
                });
                if attempt > 0 {
                    shared.registry.dispatch(&ClientEvent::ReconnectError {
                        message: "connect timed out".to_string(),
                    });
                }
            }
        }

        attempt += 1;
        if attempt > config.reconnect_attempts {
            warn!(attempts = config.reconnect_attempts, "reconnection budget exhausted");
            shared.registry.dispatch(&ClientEvent::ReconnectFailed);
            shared.set_status(ConnectionState::Disconnected);
            break;
        }
        let delay = backoff_delay(&config, attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    shared.fail_pending();
    shared.set_status(ConnectionState::Disconnected);
}

/// Read/write loop for one established socket. Returns the disconnect reason.
async fn pump(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    shared: &Arc<DriverShared>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> String {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return "client disconnect".to_string();
            }
            msg = outbound.recv() => {
                match msg {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            return format!("send failed: {e}");
                        }
                    }
                    // Manager side dropped; treat as shutdown.
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return "client disconnect".to_string();
                    }
                }
            }
            msg = source.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_frame(shared, &text),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "server closed".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return format!("receive failed: {e}"),
                    None => return "stream ended".to_string(),
                }
            }
        }
    }
}

fn handle_frame(shared: &Arc<DriverShared>, text: &str) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            // Malformed or unknown events are dropped, never propagated.
            warn!(error = %e, "unparseable server frame");
            return;
        }
    };
    match frame {
        ServerFrame::ConnectionEstablished { data } => {
            debug!(socket_id = %data.socket_id, "connection established");
        }
        ServerFrame::Ack { id, data } => {
            let waiter = shared
                .pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(data);
                }
                None => debug!(id, "ack for unknown or timed-out request"),
            }
        }
        ServerFrame::NotificationNew { data } => {
            shared.registry.dispatch(&ClientEvent::NotificationNew(data));
        }
        ServerFrame::UnreadCount { data } => {
            shared.registry.dispatch(&ClientEvent::UnreadCount(data.count));
        }
        ServerFrame::LeaveNew { data } => {
            shared.registry.dispatch(&ClientEvent::LeaveNew(data));
        }
        ServerFrame::LeaveStatusChanged { data } => {
            shared
                .registry
                .dispatch(&ClientEvent::LeaveStatusChanged(data));
        }
        ServerFrame::LeaveDeleted { data } => {
            shared.registry.dispatch(&ClientEvent::LeaveDeleted(data));
        }
    }
}

/// Exponential backoff: base doubles per attempt, capped at the ceiling.
fn backoff_delay(config: &ClientConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = config
        .reconnect_base_delay
        .saturating_mul(2u32.saturating_pow(exp));
    delay.min(config.reconnect_max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(base_ms: u64, max_ms: u64) -> ClientConfig {
        ClientConfig {
            reconnect_base_delay: Duration::from_millis(base_ms),
            reconnect_max_delay: Duration::from_millis(max_ms),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_until_ceiling() {
        let config = cfg(100, 500);
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(500));
        assert_eq!(backoff_delay(&config, 10), Duration::from_millis(500));
    }

    #[test]
    fn backoff_is_stable_at_high_attempts() {
        let config = cfg(1_000, 5_000);
        assert_eq!(backoff_delay(&config, 60), Duration::from_millis(5_000));
    }

    #[test]
    fn superseded_driver_status_writes_are_dropped() {
        let (status_tx, status_rx) = watch::channel(ConnectionState::Connected);
        let live = Arc::new(AtomicU64::new(2));
        let shared = DriverShared {
            registry: Arc::new(ListenerRegistry::new()),
            pending: Mutex::new(HashMap::new()),
            status: status_tx,
            generation: 1,
            live_generation: Arc::clone(&live),
            attempts: AtomicU32::new(0),
        };

        // Generation 2 took over; generation 1's teardown write is ignored.
        shared.set_status(ConnectionState::Disconnected);
        assert_eq!(*status_rx.borrow(), ConnectionState::Connected);

        // While it is the live generation, its writes land.
        live.store(1, Ordering::SeqCst);
        shared.set_status(ConnectionState::Disconnected);
        assert_eq!(*status_rx.borrow(), ConnectionState::Disconnected);
    }
}
