//! Notification payloads and client-side sync tagging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client-local sync status for optimistic mutations.
///
/// `mark_as_read` flips a notification locally before the server acks; the
/// tag records whether that flip has been confirmed. Never sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Matches the server's view.
    #[default]
    Clean,
    /// Local mutation applied, ack pending.
    PendingSync,
    /// Ack never arrived or the server rejected; local state kept anyway.
    SyncFailed,
}

/// A notification pushed from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(skip, default)]
    pub sync: SyncState,
}

/// Authoritative unread-count snapshot pushed by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnreadCountPayload {
    pub count: u64,
}
