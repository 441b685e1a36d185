//! WebRTC session management

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::WebRtcConfig;
use super::negotiator::SessionNegotiator;
use super::signaling::{
    AnswerResponse, ConnectionState, IceCandidate, OfferRequest, DEFAULT_REQUEST_FRAME_RATE,
    DEFAULT_REQUEST_HEIGHT, DEFAULT_REQUEST_WIDTH,
};
use super::track::{spawn_pump, BallVideoTrack, PumpExit, TrackStats};
use super::transport::{PeerTransport, RtcPeerTransport};
use crate::error::{AppError, Result};
use crate::video::position::PositionRegistry;
use crate::video::source::StreamParams;

/// Session summary for listings
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub state: ConnectionState,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub streaming: bool,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Seconds since the session was negotiated
    pub age_secs: u64,
}

/// A negotiated session: its transport, track and frame pump
pub struct Session {
    session_id: String,
    transport: Arc<dyn PeerTransport>,
    track: Arc<BallVideoTrack>,
    params: StreamParams,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<PumpExit>>>,
    created_at: Instant,
}

impl Session {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.transport.connection_state().borrow()
    }

    pub fn params(&self) -> StreamParams {
        self.params
    }

    pub fn stats(&self) -> TrackStats {
        self.track.stats()
    }

    /// Whether the frame pump is still running
    pub fn is_streaming(&self) -> bool {
        self.pump
            .lock()
            .as_ref()
            .is_some_and(|pump| !pump.is_finished())
    }

    pub fn info(&self) -> SessionInfo {
        let stats = self.stats();
        SessionInfo {
            session_id: self.session_id.clone(),
            state: self.state(),
            width: self.params.width,
            height: self.params.height,
            frame_rate: self.params.frame_rate,
            streaming: self.is_streaming(),
            frames_sent: stats.frames_sent,
            bytes_sent: stats.bytes_sent,
            age_secs: self.created_at.elapsed().as_secs(),
        }
    }

    /// Stop the pump and close the peer connection
    async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        self.pump.lock().take();
        self.transport.close().await
    }
}

/// Owns all live sessions, keyed by session id
pub struct SessionManager {
    config: WebRtcConfig,
    /// Applied to offers that omit stream parameters
    defaults: StreamParams,
    positions: Arc<PositionRegistry>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Parent of every session's cancellation token
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(config: WebRtcConfig, positions: Arc<PositionRegistry>) -> Self {
        Self {
            config,
            defaults: StreamParams::new(
                DEFAULT_REQUEST_WIDTH,
                DEFAULT_REQUEST_HEIGHT,
                DEFAULT_REQUEST_FRAME_RATE,
            ),
            positions,
            sessions: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the stream parameters used for offers that omit them
    pub fn with_stream_defaults(mut self, defaults: StreamParams) -> Self {
        self.defaults = defaults;
        self
    }

    /// Negotiate a new session for an inbound offer
    pub async fn create_session(&self, request: OfferRequest) -> Result<AnswerResponse> {
        let request = request.with_defaults(self.defaults);
        request.stream_params().validated()?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let transport: Arc<dyn PeerTransport> =
            Arc::new(RtcPeerTransport::new(&self.config, &session_id).await?);

        self.create_session_with(session_id, request, transport)
            .await
    }

    pub(crate) async fn create_session_with(
        &self,
        session_id: String,
        request: OfferRequest,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<AnswerResponse> {
        let request = request.with_defaults(self.defaults);
        let position = self.positions.register(&session_id);
        let cancel = self.shutdown.child_token();
        let mut negotiator = SessionNegotiator::new(session_id.clone(), &self.config);

        let negotiated = match negotiator
            .negotiate(&request, transport.as_ref(), position, &cancel)
            .await
        {
            Ok(negotiated) => negotiated,
            Err(e) => {
                self.positions.unregister(&session_id);
                return Err(e);
            }
        };

        let mut sessions = self.sessions.write().await;
        if self.shutdown.is_cancelled() {
            // close_all() already drained the map
            drop(sessions);
            cancel.cancel();
            self.positions.unregister(&session_id);
            if let Err(e) = transport.close().await {
                warn!("Session {}: failed to close transport: {}", session_id, e);
            }
            return Err(AppError::Negotiation("cancelled".to_string()));
        }

        let pump = spawn_pump(
            session_id.clone(),
            Box::new(negotiated.source),
            negotiated.track.clone(),
            transport.connection_state(),
            cancel.clone(),
        );

        let session = Arc::new(Session {
            session_id: session_id.clone(),
            transport,
            track: negotiated.track,
            params: negotiated.params,
            cancel,
            pump: Mutex::new(Some(pump)),
            created_at: Instant::now(),
        });
        sessions.insert(session_id.clone(), session);
        drop(sessions);

        info!("WebRTC session created: {}", session_id);
        Ok(AnswerResponse::new(negotiated.answer, session_id))
    }

    async fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))
    }

    /// Add a trickled ICE candidate from the client
    pub async fn add_ice_candidate(&self, session_id: &str, candidate: IceCandidate) -> Result<()> {
        let session = self.get(session_id).await?;
        debug!("Session {}: remote candidate {}", session_id, candidate.candidate);
        session.transport.add_ice_candidate(candidate).await
    }

    pub async fn get_session(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|session| session.info())
    }

    /// Close a session
    pub async fn close_session(&self, session_id: &str) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))?;

        self.positions.unregister(session_id);
        info!("WebRTC session closed: {}", session_id);
        session.close().await
    }

    /// Close every session, returning how many were closed
    pub async fn close_all(&self) -> usize {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        let count = sessions.len();

        let closes = sessions.into_iter().map(|(id, session)| async move {
            self.positions.unregister(&id);
            if let Err(e) = session.close().await {
                warn!("Failed to close session {}: {}", id, e);
            }
        });
        join_all(closes).await;

        if count > 0 {
            info!("Closed {} WebRTC sessions", count);
        }
        count
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(|session| session.info())
            .collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        sessions
    }

    /// Remove sessions whose peer is disconnected, failed or closed
    pub async fn cleanup(&self) -> usize {
        let stale: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.state().is_terminal())
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &stale {
            debug!("Removing stale WebRTC session: {}", session.session_id);
            self.positions.unregister(&session.session_id);
            if let Err(e) = session.close().await {
                debug!("Closing stale session {}: {}", session.session_id, e);
            }
        }
        stale.len()
    }

    /// Run [`cleanup`](Self::cleanup) periodically until shutdown
    pub fn spawn_cleanup_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let removed = manager.cleanup().await;
                if removed > 0 {
                    info!("Cleaned up {} stale WebRTC sessions", removed);
                }
            }
        })
    }

    /// Cancel all negotiations and pumps, then close every session
    pub async fn shutdown(&self) -> usize {
        self.shutdown.cancel();
        self.close_all().await
    }
}
