use std::sync::Arc;

use crate::config::AppConfig;
use crate::video::position::PositionRegistry;
use crate::webrtc::session::SessionManager;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Negotiated WebRTC sessions
    pub sessions: Arc<SessionManager>,
    /// Ground-truth ball positions, process-wide and per session
    pub positions: Arc<PositionRegistry>,
}

impl AppState {
    /// Create new application state from the startup configuration
    pub fn new(config: &AppConfig) -> Arc<Self> {
        let positions = Arc::new(PositionRegistry::new());
        let sessions = Arc::new(
            SessionManager::new(config.webrtc.clone(), positions.clone())
                .with_stream_defaults(config.stream.defaults()),
        );

        Arc::new(Self {
            sessions,
            positions,
        })
    }
}
