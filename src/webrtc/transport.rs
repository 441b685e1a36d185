//! Peer transport: the seam between negotiation and the WebRTC engine
//!
//! [`PeerTransport`] exposes only what a session needs from the engine:
//! descriptions, codec preferences, ICE gathering state, trickle candidates,
//! connection state and teardown. [`RtcPeerTransport`] implements it on top of
//! a webrtc-rs `RTCPeerConnection`.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use super::codec::{default_audio_codec, default_video_codecs, CodecDescriptor};
use super::config::WebRtcConfig;
use super::signaling::{ConnectionState, IceCandidate, SdpType, SessionDescription};
use super::track::BallVideoTrack;
use crate::error::{AppError, Result};

/// ICE gathering progress as seen by the negotiator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

impl std::fmt::Display for IceGatheringState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IceGatheringState::New => write!(f, "new"),
            IceGatheringState::Gathering => write!(f, "gathering"),
            IceGatheringState::Complete => write!(f, "complete"),
        }
    }
}

/// Operations a session needs from the WebRTC engine
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Codec capability list registered with the engine
    fn codec_capabilities(&self) -> Vec<CodecDescriptor>;

    /// Attach the outbound video track
    async fn add_video_track(&self, track: &BallVideoTrack) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply codec preferences to every video transceiver.
    ///
    /// Returns the number of transceivers updated.
    async fn set_video_codec_preferences(&self, codecs: &[CodecDescriptor]) -> Result<usize>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Current gathering state; a closed gatherer is an error
    async fn ice_gathering_state(&self) -> Result<IceGatheringState>;

    /// Local description including the candidates gathered so far
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Add a remote (trickled) ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Subscribe to connection state changes
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    async fn close(&self) -> Result<()>;
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(AppError::Negotiation(
                "rollback descriptions are not supported".to_string(),
            ))
        }
    };
    parsed.map_err(|e| AppError::Negotiation(format!("Invalid SDP {}: {}", desc.sdp_type, e)))
}

fn from_rtc_description(desc: RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(AppError::Negotiation(
                "engine returned an unspecified description type".to_string(),
            ))
        }
    };
    Ok(SessionDescription::new(sdp_type, desc.sdp))
}

/// Gatherer state as published by the engine callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GathererState {
    Open(IceGatheringState),
    Closed,
}

/// webrtc-rs backed transport
pub struct RtcPeerTransport {
    session_id: String,
    pc: Arc<RTCPeerConnection>,
    codecs: Vec<CodecDescriptor>,
    state_rx: watch::Receiver<ConnectionState>,
    gathering_rx: watch::Receiver<GathererState>,
}

impl RtcPeerTransport {
    /// Create a peer connection with the default codec list registered
    pub async fn new(config: &WebRtcConfig, session_id: &str) -> Result<Self> {
        let codecs = default_video_codecs();

        let mut media_engine = MediaEngine::default();
        for codec in &codecs {
            media_engine
                .register_codec(codec.to_parameters(), RTPCodecType::Video)
                .map_err(|e| AppError::Internal(format!("Failed to register codec: {}", e)))?;
        }
        media_engine
            .register_codec(default_audio_codec().to_parameters(), RTPCodecType::Audio)
            .map_err(|e| AppError::Internal(format!("Failed to register codec: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::Internal(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let mut ice_servers = vec![];
        for stun_url in &config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }
        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::Internal(format!("Failed to create peer connection: {}", e))
        })?;
        let pc = Arc::new(pc);

        let (state_tx, state_rx) = watch::channel(ConnectionState::New);
        let (gathering_tx, gathering_rx) =
            watch::channel(GathererState::Open(IceGatheringState::New));

        let transport = Self {
            session_id: session_id.to_string(),
            pc,
            codecs,
            state_rx,
            gathering_rx,
        };
        transport.setup_event_handlers(state_tx, gathering_tx);

        Ok(transport)
    }

    fn setup_event_handlers(
        &self,
        state_tx: watch::Sender<ConnectionState>,
        gathering_tx: watch::Sender<GathererState>,
    ) {
        let state_tx = Arc::new(state_tx);
        let session_id = self.session_id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let state_tx = state_tx.clone();
                let session_id = session_id.clone();

                Box::pin(async move {
                    let new_state = match s {
                        RTCPeerConnectionState::New => ConnectionState::New,
                        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                        RTCPeerConnectionState::Connected => ConnectionState::Connected,
                        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                        RTCPeerConnectionState::Failed => ConnectionState::Failed,
                        RTCPeerConnectionState::Closed => ConnectionState::Closed,
                        _ => return,
                    };

                    info!("Session {} connection state: {}", session_id, new_state);
                    let _ = state_tx.send(new_state);
                })
            }));

        let gathering_tx = Arc::new(gathering_tx);
        let session_id = self.session_id.clone();
        self.pc
            .on_ice_gathering_state_change(Box::new(move |s: RTCIceGathererState| {
                let gathering_tx = gathering_tx.clone();
                let session_id = session_id.clone();

                Box::pin(async move {
                    let new_state = match s {
                        RTCIceGathererState::New => GathererState::Open(IceGatheringState::New),
                        RTCIceGathererState::Gathering => {
                            GathererState::Open(IceGatheringState::Gathering)
                        }
                        RTCIceGathererState::Complete => {
                            GathererState::Open(IceGatheringState::Complete)
                        }
                        RTCIceGathererState::Closed => GathererState::Closed,
                        _ => return,
                    };

                    debug!("Session {} ICE gathering state: {:?}", session_id, new_state);
                    let _ = gathering_tx.send(new_state);
                })
            }));
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    fn codec_capabilities(&self) -> Vec<CodecDescriptor> {
        self.codecs.clone()
    }

    async fn add_video_track(&self, track: &BallVideoTrack) -> Result<()> {
        let sender = self
            .pc
            .add_track(track.as_track_local())
            .await
            .map_err(|e| AppError::Internal(format!("Failed to add video track: {}", e)))?;

        // Drain RTCP so interceptors (NACK, reports) keep running
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        debug!("Session {}: video track added", self.session_id);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc_description(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to set remote description: {}", e)))
    }

    async fn set_video_codec_preferences(&self, codecs: &[CodecDescriptor]) -> Result<usize> {
        let params: Vec<_> = codecs.iter().map(CodecDescriptor::to_parameters).collect();
        let mut updated = 0;

        for transceiver in self.pc.get_transceivers().await {
            if transceiver.kind() != RTPCodecType::Video {
                continue;
            }
            transceiver
                .set_codec_preferences(params.clone())
                .await
                .map_err(|e| {
                    AppError::Negotiation(format!("Failed to set codec preferences: {}", e))
                })?;
            updated += 1;
        }

        Ok(updated)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to create answer: {}", e)))?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc_description(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to set local description: {}", e)))
    }

    async fn ice_gathering_state(&self) -> Result<IceGatheringState> {
        match *self.gathering_rx.borrow() {
            GathererState::Open(state) => Ok(state),
            GathererState::Closed => Err(AppError::Negotiation(
                "ICE gatherer closed during negotiation".to_string(),
            )),
        }
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        match from_rtc_description(desc) {
            Ok(desc) => Some(desc),
            Err(e) => {
                warn!("Session {}: {}", self.session_id, e);
                None
            }
        }
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to add ICE candidate: {}", e)))
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to close peer connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webrtc::testing::local_webrtc_config;

    #[test]
    fn test_rollback_rejected() {
        let result = to_rtc_description(SessionDescription::new(SdpType::Rollback, ""));
        assert!(matches!(result, Err(AppError::Negotiation(_))));
    }

    #[test]
    fn test_garbage_sdp_rejected() {
        let result = to_rtc_description(SessionDescription::offer("not an sdp"));
        assert!(matches!(result, Err(AppError::Negotiation(_))));
    }

    #[tokio::test]
    async fn test_new_transport_starts_idle() {
        let transport = RtcPeerTransport::new(&local_webrtc_config(), "t1")
            .await
            .unwrap();
        assert_eq!(transport.session_id(), "t1");
        assert_eq!(*transport.connection_state().borrow(), ConnectionState::New);
        assert_eq!(
            transport.ice_gathering_state().await.unwrap(),
            IceGatheringState::New
        );
        assert!(transport.local_description().await.is_none());
        assert_eq!(transport.codec_capabilities(), default_video_codecs());
        transport.close().await.unwrap();
    }
}
