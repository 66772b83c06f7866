//! Auth/token availability bridge.
//!
//! Reconciles three facts that become true in any order: the user is
//! authenticated, the user object is loaded, and the token is retrievable.
//! The primary path awaits the auth collaborator's `watch` channel; direct
//! storage reads are a defensive fallback for the window where reactive
//! state lags behind storage writes. Redundant connect attempts are cheap
//! because the manager's `connect` is idempotent.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::store::{stored_token, TokenStore};
use crate::config::ClientConfig;
use crate::hub::EventHub;
use crate::models::AuthSnapshot;
use crate::transport::ConnectionManager;

/// Owns the connect/disconnect lifecycle; nothing else calls them.
pub struct AuthBridge {
    manager: Arc<ConnectionManager>,
    hub: EventHub,
    store: Arc<dyn TokenStore>,
}

/// Running bridge tasks. `shutdown` detaches the hub and closes the
/// transport.
pub struct AuthBridgeHandle {
    tasks: Vec<JoinHandle<()>>,
    manager: Arc<ConnectionManager>,
    hub: EventHub,
}

impl AuthBridge {
    pub fn new(manager: Arc<ConnectionManager>, hub: EventHub, store: Arc<dyn TokenStore>) -> Self {
        Self { manager, hub, store }
    }

    /// Start the bridge against the auth collaborator's state channel.
    pub fn spawn(self, auth_rx: watch::Receiver<AuthSnapshot>) -> AuthBridgeHandle {
        let config = self.manager.config().clone();
        let main = tokio::spawn(run(
            Arc::clone(&self.manager),
            self.hub.clone(),
            Arc::clone(&self.store),
            config.clone(),
            auth_rx,
        ));
        let watchdog = tokio::spawn(watchdog(
            Arc::clone(&self.manager),
            self.hub.clone(),
            Arc::clone(&self.store),
            config,
        ));
        AuthBridgeHandle {
            tasks: vec![main, watchdog],
            manager: self.manager,
            hub: self.hub,
        }
    }
}

impl AuthBridgeHandle {
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.hub.detach();
        self.manager.disconnect();
    }
}

enum WaitOutcome {
    Connected(String),
    AuthChanged,
    GaveUp,
    Closed,
}

async fn run(
    manager: Arc<ConnectionManager>,
    hub: EventHub,
    store: Arc<dyn TokenStore>,
    config: ClientConfig,
    mut auth_rx: watch::Receiver<AuthSnapshot>,
) {
    // (user id, token) of the connection we last established; connect fires
    // exactly once per distinct tuple.
    let mut connected_tuple: Option<(String, String)> = None;
    loop {
        let snap = auth_rx.borrow_and_update().clone();
        if snap.ready() {
            if let (Some(user), Some(token)) = (&snap.user, &snap.token) {
                let tuple = (user.id.clone(), token.clone());
                if connected_tuple.as_ref() != Some(&tuple) {
                    info!(user = %user.id, "auth ready; connecting realtime transport");
                    manager.connect(token);
                    hub.attach();
                    connected_tuple = Some(tuple);
                }
            }
        } else if snap.awaiting_token() {
            let user_id = snap.user.as_ref().map(|u| u.id.clone()).unwrap_or_default();
            match wait_for_token(&manager, &hub, &store, &config, &mut auth_rx).await {
                WaitOutcome::Connected(token) => {
                    connected_tuple = Some((user_id, token));
                }
                WaitOutcome::AuthChanged => continue,
                WaitOutcome::GaveUp => {}
                WaitOutcome::Closed => break,
            }
        } else if connected_tuple.take().is_some() {
            info!("auth cleared; tearing down realtime connection");
            hub.detach();
            manager.disconnect();
        }

        if auth_rx.changed().await.is_err() {
            break;
        }
    }
}

/// Authenticated with a loaded user but no token in reactive state: treat
/// storage as ground truth and poll it until the token appears, auth state
/// changes, or the ceiling elapses (give up silently, log only).
async fn wait_for_token(
    manager: &Arc<ConnectionManager>,
    hub: &EventHub,
    store: &Arc<dyn TokenStore>,
    config: &ClientConfig,
    auth_rx: &mut watch::Receiver<AuthSnapshot>,
) -> WaitOutcome {
    if let Some(token) = stored_token(store.as_ref()).await {
        debug!("storage fallback: token present before reactive state; scheduling connect");
        tokio::select! {
            _ = tokio::time::sleep(config.token_poll_interval) => {
                manager.connect(&token);
                hub.attach();
                WaitOutcome::Connected(token)
            }
            res = auth_rx.changed() => {
                if res.is_ok() { WaitOutcome::AuthChanged } else { WaitOutcome::Closed }
            }
        }
    } else {
        warn!("authenticated without a visible token; polling storage (fallback path)");
        let deadline = tokio::time::Instant::now() + config.token_poll_ceiling;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(config.token_poll_interval) => {
                    if let Some(token) = stored_token(store.as_ref()).await {
                        debug!("storage fallback: token appeared; connecting");
                        manager.connect(&token);
                        hub.attach();
                        return WaitOutcome::Connected(token);
                    }
                    if tokio::time::Instant::now() >= deadline {
                        debug!("token never appeared within the polling ceiling; giving up");
                        return WaitOutcome::GaveUp;
                    }
                }
                res = auth_rx.changed() => {
                    return if res.is_ok() { WaitOutcome::AuthChanged } else { WaitOutcome::Closed };
                }
            }
        }
    }
}

/// Independent storage re-probe at fixed offsets after spawn. Covers the
/// case where reactive auth state never catches up to storage at all.
async fn watchdog(
    manager: Arc<ConnectionManager>,
    hub: EventHub,
    store: Arc<dyn TokenStore>,
    config: ClientConfig,
) {
    let start = tokio::time::Instant::now();
    for delay in config.watchdog_delays {
        tokio::time::sleep_until(start + delay).await;
        if manager.is_connected() {
            continue;
        }
        if let Some(token) = stored_token(store.as_ref()).await {
            info!("watchdog: storage holds a token but transport is down; forcing connect");
            manager.connect(&token);
            hub.attach();
        }
    }
}
