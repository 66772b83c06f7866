//! Auth/token availability bridge and storage seam.

pub mod bridge;
pub mod store;

pub use bridge::{AuthBridge, AuthBridgeHandle};
pub use store::{MemoryTokenStore, TokenStore, TOKEN_KEY, USER_KEY};
