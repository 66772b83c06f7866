//! Real-time client for the LeaveLink HR backend.
//!
//! Wraps a WebSocket push transport behind a connection manager, bridges
//! asynchronously hydrating auth credentials to the connection lifecycle,
//! and publishes notification/leave-event state for page-level consumers.

pub mod auth;
pub mod config;
pub mod consumers;
pub mod error;
pub mod hub;
pub mod models;
pub mod transport;

pub use auth::{AuthBridge, AuthBridgeHandle, MemoryTokenStore, TokenStore};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use hub::{EventHub, NoopNotifier, SystemNotifier, ToastSink, TracingToastSink};
pub use transport::{ClientEvent, ConnectionManager, ConnectionState, Subscription};
