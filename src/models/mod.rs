//! Data models for notifications, leaves, auth state, and wire frames.

pub mod auth;
pub mod event;
pub mod leave;
pub mod notification;

pub use auth::*;
pub use event::*;
pub use leave::*;
pub use notification::*;
