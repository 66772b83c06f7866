//! Client configuration loaded from environment.

use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Client configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (e.g. `http://localhost:3000`); the WebSocket
    /// endpoint is derived from it.
    pub server_url: String,
    /// Maximum automatic reconnection attempts before giving up.
    pub reconnect_attempts: u32,
    /// First reconnection delay; doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Ceiling for the reconnection delay.
    pub reconnect_max_delay: Duration,
    /// Overall timeout for a single connection handshake.
    pub connect_timeout: Duration,
    /// How long a request/response call waits for a server ack before
    /// resolving with its default value.
    pub ack_timeout: Duration,
    /// Interval between storage probes while waiting for a token.
    pub token_poll_interval: Duration,
    /// Hard ceiling on the token polling loop.
    pub token_poll_ceiling: Duration,
    /// Watchdog probe schedule, offsets from bridge start.
    pub watchdog_delays: Vec<Duration>,
    /// How long a consumer keeps the "recently updated" highlight.
    pub highlight_ttl: Duration,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
}

impl ClientConfig {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> ClientResult<Self> {
        let server_url = std::env::var("LEAVELINK_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(ClientError::Config(
                "LEAVELINK_SERVER_URL must start with http:// or https://".to_string(),
            ));
        }

        let reconnect_attempts = env_u64("LEAVELINK_RECONNECT_ATTEMPTS", 5)? as u32;
        let reconnect_base_delay = Duration::from_millis(env_u64("LEAVELINK_RECONNECT_BASE_MS", 1_000)?);
        let reconnect_max_delay = Duration::from_millis(env_u64("LEAVELINK_RECONNECT_MAX_MS", 5_000)?);
        let connect_timeout = Duration::from_millis(env_u64("LEAVELINK_CONNECT_TIMEOUT_MS", 20_000)?);
        let ack_timeout = Duration::from_millis(env_u64("LEAVELINK_ACK_TIMEOUT_MS", 3_000)?);
        let token_poll_interval = Duration::from_millis(env_u64("LEAVELINK_TOKEN_POLL_MS", 1_000)?);
        let token_poll_ceiling = Duration::from_millis(env_u64("LEAVELINK_TOKEN_POLL_CEILING_MS", 15_000)?);
        let highlight_ttl = Duration::from_millis(env_u64("LEAVELINK_HIGHLIGHT_TTL_MS", 3_000)?);
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            server_url,
            reconnect_attempts,
            reconnect_base_delay,
            reconnect_max_delay,
            connect_timeout,
            ack_timeout,
            token_poll_interval,
            token_poll_ceiling,
            watchdog_delays: default_watchdog_delays(token_poll_interval),
            highlight_ttl,
            log_level,
        })
    }

    /// WebSocket endpoint derived from the configured base URL.
    pub fn ws_url(&self) -> String {
        let ws = if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.server_url.clone()
        };
        format!("{}/ws", ws.trim_end_matches('/'))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let token_poll_interval = Duration::from_millis(1_000);
        Self {
            server_url: "http://localhost:3000".to_string(),
            reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_millis(1_000),
            reconnect_max_delay: Duration::from_millis(5_000),
            connect_timeout: Duration::from_millis(20_000),
            ack_timeout: Duration::from_millis(3_000),
            token_poll_interval,
            token_poll_ceiling: Duration::from_millis(15_000),
            watchdog_delays: default_watchdog_delays(token_poll_interval),
            highlight_ttl: Duration::from_millis(3_000),
            log_level: "info".to_string(),
        }
    }
}

/// Storage re-probe offsets: 1, 2, 3, 5 poll intervals after bridge start.
fn default_watchdog_delays(unit: Duration) -> Vec<Duration> {
    [1u32, 2, 3, 5].iter().map(|&n| unit * n).collect()
}

fn env_u64(key: &str, default: u64) -> ClientResult<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map_err(|_| ClientError::Config(format!("{key} must be an integer"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_from_http() {
        let cfg = ClientConfig {
            server_url: "http://localhost:3000".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(cfg.ws_url(), "ws://localhost:3000/ws");
    }

    #[test]
    fn ws_url_from_https_trailing_slash() {
        let cfg = ClientConfig {
            server_url: "https://api.example.com/".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(cfg.ws_url(), "wss://api.example.com/ws");
    }

    #[test]
    fn from_env_rejects_non_http_url() {
        std::env::set_var("LEAVELINK_SERVER_URL", "ftp://example.com");
        let err = ClientConfig::from_env().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        std::env::remove_var("LEAVELINK_SERVER_URL");
    }

    #[test]
    fn watchdog_schedule_scales_with_poll_interval() {
        let delays = default_watchdog_delays(Duration::from_millis(100));
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(500),
            ]
        );
    }
}
