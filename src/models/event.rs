//! Wire frames exchanged over the WebSocket.
//!
//! Frames are tagged JSON objects `{"event": ..., "data": ...}`; request/
//! response calls additionally carry an `id` the server echoes back in its
//! `ack` frame. Unknown inbound events fail to parse and are dropped with a
//! log line by the transport driver.

use serde::{Deserialize, Serialize};

use crate::models::leave::{Leave, LeaveDeleted, LeaveStatusChange};
use crate::models::notification::{Notification, UnreadCountPayload};

/// Frame pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerFrame {
    /// Greeting sent right after the socket opens.
    #[serde(rename = "connection_established")]
    ConnectionEstablished { data: ConnectionInfo },
    #[serde(rename = "notification:new")]
    NotificationNew { data: Notification },
    #[serde(rename = "notification:unread_count")]
    UnreadCount { data: UnreadCountPayload },
    #[serde(rename = "leave:new")]
    LeaveNew { data: Leave },
    #[serde(rename = "leave:status_changed")]
    LeaveStatusChanged { data: LeaveStatusChange },
    #[serde(rename = "leave:deleted")]
    LeaveDeleted { data: LeaveDeleted },
    /// Acknowledgement for a request/response frame.
    #[serde(rename = "ack")]
    Ack {
        id: u64,
        #[serde(default)]
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub socket_id: String,
}

/// Frame emitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ClientFrame {
    #[serde(rename = "leave:join")]
    JoinLeaveRoom { data: RoomRef },
    #[serde(rename = "leave:leave")]
    LeaveLeaveRoom { data: RoomRef },
    #[serde(rename = "notification:markRead")]
    MarkRead { id: u64, data: MarkReadPayload },
    #[serde(rename = "notification:getUnreadCount")]
    GetUnreadCount { id: u64 },
    #[serde(rename = "ping")]
    Ping { id: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub leave_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadPayload {
    pub notification_id: String,
}
