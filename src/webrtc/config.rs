//! WebRTC configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Public STUN server used unless configured otherwise
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// WebRTC configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
    /// Upper bound for ICE candidate gathering (ms)
    pub gathering_timeout_ms: u64,
    /// Interval between ICE gathering state polls (ms)
    pub gathering_poll_interval_ms: u64,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            turn_servers: vec![],
            gathering_timeout_ms: 10_000,
            gathering_poll_interval_ms: 100,
        }
    }
}

impl WebRtcConfig {
    pub fn gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.gathering_timeout_ms)
    }

    pub fn gathering_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gathering_poll_interval_ms.max(1))
    }
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs (e.g., ["turn:turn.example.com:3478?transport=udp"])
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}
