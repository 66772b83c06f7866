//! Collaborator seams for user-facing side effects: system notification
//! popups and transient toasts. Both are best-effort sinks; failures are
//! logged, never propagated.

use tracing::{error, info, warn};

/// Platform notification permission status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Not yet requested.
    Default,
}

/// Platform notification API. The hub only attempts a popup when
/// `permission()` is `Granted`.
pub trait SystemNotifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;
    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()>;
}

/// Notifier for environments without a platform notification API.
pub struct NoopNotifier;

impl SystemNotifier for NoopNotifier {
    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Default
    }

    fn notify(&self, _title: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

/// Toast/snackbar sink consumers emit transient messages into.
pub trait ToastSink: Send + Sync {
    fn toast(&self, level: ToastLevel, message: &str);
}

/// Default sink: toasts go to the log.
pub struct TracingToastSink;

impl ToastSink for TracingToastSink {
    fn toast(&self, level: ToastLevel, message: &str) {
        match level {
            ToastLevel::Info => info!(toast = message),
            ToastLevel::Success => info!(toast = message, "success"),
            ToastLevel::Error => error!(toast = message),
        }
    }
}

/// Log a failed popup attempt without letting it escape.
pub(crate) fn notify_best_effort(notifier: &dyn SystemNotifier, title: &str, body: &str) {
    if notifier.permission() != NotificationPermission::Granted {
        return;
    }
    if let Err(e) = notifier.notify(title, body) {
        warn!(error = %e, "system notification failed");
    }
}
