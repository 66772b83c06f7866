//! Entry point: a small demo client that connects, prints inbound
//! notifications, and tracks the unread count until interrupted.

use std::sync::Arc;

use leavelink::auth::{AuthBridge, MemoryTokenStore, TokenStore, TOKEN_KEY, USER_KEY};
use leavelink::config::ClientConfig;
use leavelink::hub::{EventHub, NoopNotifier};
use leavelink::models::{AuthSnapshot, UserRef};
use leavelink::transport::ConnectionManager;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let token = std::env::var("LEAVELINK_TOKEN")
        .map_err(|_| anyhow::anyhow!("set LEAVELINK_TOKEN to authenticate the demo client"))?;
    let user_id = std::env::var("LEAVELINK_USER_ID").unwrap_or_else(|_| "demo".to_string());

    let user = UserRef { id: user_id, name: None };
    let store = Arc::new(MemoryTokenStore::new());
    store.set(TOKEN_KEY, &token).await;
    store.set(USER_KEY, &serde_json::to_string(&user)?).await;

    let manager = Arc::new(ConnectionManager::new(config));
    let hub = EventHub::new(Arc::clone(&manager), Arc::new(NoopNotifier));
    let (auth_tx, auth_rx) = watch::channel(AuthSnapshot::default());
    let bridge = AuthBridge::new(Arc::clone(&manager), hub.clone(), store);
    let handle = bridge.spawn(auth_rx);

    auth_tx.send_replace(AuthSnapshot {
        is_authenticated: true,
        user: Some(user),
        token: Some(token),
    });

    let mut unread = hub.watch_unread();
    let mut connected = hub.watch_connected();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            res = connected.changed() => {
                if res.is_err() { break; }
                tracing::info!(connected = *connected.borrow(), "connection status");
            }
            res = unread.changed() => {
                if res.is_err() { break; }
                tracing::info!(unread = *unread.borrow(), "unread count");
                if let Some(latest) = hub.notifications().first() {
                    tracing::info!(id = %latest.id, title = %latest.title, "latest notification");
                }
            }
        }
    }

    handle.shutdown();
    Ok(())
}
