use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::video::source::StreamParams;
use crate::webrtc::config::WebRtcConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Stream defaults and session housekeeping
    pub stream: StreamConfig,
    /// WebRTC settings
    pub webrtc: WebRtcConfig,
}

impl AppConfig {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.web.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(AppError::Config(format!(
                "Invalid bind address: {}",
                self.web.bind_address
            )));
        }
        if self.webrtc.gathering_timeout_ms == 0 {
            return Err(AppError::Config(
                "webrtc.gathering_timeout_ms must be positive".to_string(),
            ));
        }
        if self.stream.cleanup_interval_secs == 0 {
            return Err(AppError::Config(
                "stream.cleanup_interval_secs must be positive".to_string(),
            ));
        }
        self.stream
            .defaults()
            .validated()
            .map_err(|e| AppError::Config(format!("Invalid stream defaults: {}", e)))?;
        Ok(())
    }
}

/// Web server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// HTTP port
    pub http_port: u16,
    /// Bind address
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            http_port: 8081,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

/// Stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Width used when an offer does not specify one
    pub default_width: u32,
    /// Height used when an offer does not specify one
    pub default_height: u32,
    /// Frame rate used when an offer does not specify one
    pub default_frame_rate: u32,
    /// Interval between stale session sweeps (seconds)
    pub cleanup_interval_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_width: 640,
            default_height: 480,
            default_frame_rate: 30,
            cleanup_interval_secs: 10,
        }
    }
}

impl StreamConfig {
    /// Parameters applied to offers that omit them
    pub fn defaults(&self) -> StreamParams {
        StreamParams::new(
            self.default_width,
            self.default_height,
            self.default_frame_rate,
        )
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }
}
