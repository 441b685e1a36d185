//! Test doubles for negotiation and session tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use super::codec::{default_video_codecs, CodecDescriptor};
use super::config::WebRtcConfig;
use super::signaling::{ConnectionState, IceCandidate, SessionDescription};
use super::track::BallVideoTrack;
use super::transport::{IceGatheringState, PeerTransport};
use crate::error::{AppError, Result};

/// Host candidates only, so tests never reach a public STUN server
pub fn local_webrtc_config() -> WebRtcConfig {
    WebRtcConfig {
        stun_servers: vec![],
        ..Default::default()
    }
}

/// Transport that records every call and follows a fixed script
pub struct ScriptedTransport {
    calls: Mutex<Vec<String>>,
    pub codecs: Vec<CodecDescriptor>,
    /// Polls before gathering reports complete; `None` never completes
    pub complete_after: Option<usize>,
    polls: AtomicUsize,
    reject_remote: bool,
    closed: AtomicBool,
    state_tx: watch::Sender<ConnectionState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::New);
        Self {
            calls: Mutex::new(vec![]),
            codecs: default_video_codecs(),
            complete_after: Some(2),
            polls: AtomicUsize::new(0),
            reject_remote: false,
            closed: AtomicBool::new(false),
            state_tx,
        }
    }

    pub fn rejecting_remote(mut self) -> Self {
        self.reject_remote = true;
        self
    }

    pub fn never_completing(mut self) -> Self {
        self.complete_after = None;
        self
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerTransport for ScriptedTransport {
    fn codec_capabilities(&self) -> Vec<CodecDescriptor> {
        self.codecs.clone()
    }

    async fn add_video_track(&self, _track: &BallVideoTrack) -> Result<()> {
        self.record("add_track");
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(format!("remote:{}", desc.sdp_type));
        if self.reject_remote {
            return Err(AppError::Negotiation("bad sdp".to_string()));
        }
        Ok(())
    }

    async fn set_video_codec_preferences(&self, codecs: &[CodecDescriptor]) -> Result<usize> {
        let pts: Vec<String> = codecs.iter().map(|c| c.payload_type.to_string()).collect();
        self.record(format!("prefs:{}", pts.join(",")));
        Ok(1)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record("create_answer");
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(format!("local:{}", desc.sdp_type));
        Ok(())
    }

    async fn ice_gathering_state(&self) -> Result<IceGatheringState> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.complete_after {
            Some(n) if polls > n => Ok(IceGatheringState::Complete),
            _ => Ok(IceGatheringState::Gathering),
        }
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        Some(SessionDescription::answer("v=0 answer with candidates"))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(format!("candidate:{}", candidate.candidate));
        Ok(())
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn close(&self) -> Result<()> {
        self.record("close");
        self.closed.store(true, Ordering::SeqCst);
        self.state_tx.send_replace(ConnectionState::Closed);
        Ok(())
    }
}

/// A real webrtc-rs peer with a recvonly video transceiver and its complete offer
pub async fn offerer_sdp() -> (RTCPeerConnection, String) {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().unwrap();
    let registry = register_default_interceptors(Registry::new(), &mut media_engine).unwrap();
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();
    let pc = api.new_peer_connection(Default::default()).await.unwrap();

    pc.add_transceiver_from_kind(
        RTPCodecType::Video,
        Some(RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Recvonly,
            send_encodings: vec![],
        }),
    )
    .await
    .unwrap();

    let offer = pc.create_offer(None).await.unwrap();
    let mut gather_complete = pc.gathering_complete_promise().await;
    pc.set_local_description(offer).await.unwrap();
    let _ = gather_complete.recv().await;

    let sdp = pc.local_description().await.unwrap().sdp;
    (pc, sdp)
}
