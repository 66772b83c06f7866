//! Auth state as published by the application's auth collaborator.

use serde::{Deserialize, Serialize};

/// Minimal user reference carried in auth state and persistent storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Snapshot of the three auth facts that can become true in any order.
///
/// Published on a `tokio::sync::watch` channel by the application; the token
/// may lag behind `is_authenticated` because storage writes and reactive
/// state hydrate independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub is_authenticated: bool,
    pub user: Option<UserRef>,
    pub token: Option<String>,
}

impl AuthSnapshot {
    /// Authenticated with a loaded user, token not yet visible here.
    pub fn awaiting_token(&self) -> bool {
        self.is_authenticated && self.user.is_some() && self.token.is_none()
    }

    /// All three facts present.
    pub fn ready(&self) -> bool {
        self.is_authenticated && self.user.is_some() && self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_classification() {
        let mut snap = AuthSnapshot::default();
        assert!(!snap.awaiting_token());
        assert!(!snap.ready());

        snap.is_authenticated = true;
        snap.user = Some(UserRef { id: "u1".to_string(), name: None });
        assert!(snap.awaiting_token());

        snap.token = Some("tok".to_string());
        assert!(snap.ready());
        assert!(!snap.awaiting_token());
    }
}
