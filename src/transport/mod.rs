//! Transport layer: WebSocket connection manager, driver task, and listener
//! registry.

pub mod manager;
pub mod registry;
pub(crate) mod socket;

pub use manager::{ConnectionManager, ConnectionState};
pub use registry::{ClientEvent, EventKind, Subscription};
