//! Offer/answer negotiation for one session
//!
//! A [`SessionNegotiator`] turns one inbound offer into a complete local
//! answer:
//!
//! ```text
//! Created -> RemoteSet -> AnswerCreated -> LocalSet -> GatheringWait -> Done
//! ```
//!
//! The frame source and video track are built and attached in `Created`.
//! H.264 codec preferences are applied to every video transceiver after the
//! remote description is set and before the answer is created. ICE gathering
//! is awaited so the returned answer carries all candidates; the wait is
//! bounded by a timeout and a cancellation token. Any failure closes the
//! transport.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::CodecSelector;
use super::config::WebRtcConfig;
use super::signaling::{OfferRequest, SdpType, SessionDescription};
use super::track::BallVideoTrack;
use super::transport::{IceGatheringState, PeerTransport};
use crate::error::{AppError, Result};
use crate::video::position::PositionHandle;
use crate::video::source::{BallFrameSource, FrameProducer, StreamParams};

/// Negotiation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Created,
    RemoteSet,
    AnswerCreated,
    LocalSet,
    GatheringWait,
    Done,
    Failed,
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationState::Created => write!(f, "created"),
            NegotiationState::RemoteSet => write!(f, "remote-set"),
            NegotiationState::AnswerCreated => write!(f, "answer-created"),
            NegotiationState::LocalSet => write!(f, "local-set"),
            NegotiationState::GatheringWait => write!(f, "gathering-wait"),
            NegotiationState::Done => write!(f, "done"),
            NegotiationState::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a successful negotiation
pub struct NegotiatedSession {
    /// Final local description, with gathered candidates
    pub answer: SessionDescription,
    /// Validated stream parameters
    pub params: StreamParams,
    /// Frame source, handed to the session's pump
    pub source: BallFrameSource,
    /// Track attached to the transport
    pub track: Arc<BallVideoTrack>,
}

/// Per-request negotiation state machine
pub struct SessionNegotiator {
    session_id: String,
    state: NegotiationState,
    history: Vec<NegotiationState>,
    selector: CodecSelector,
    gathering_timeout: Duration,
    poll_interval: Duration,
}

impl SessionNegotiator {
    pub fn new(session_id: impl Into<String>, config: &WebRtcConfig) -> Self {
        Self {
            session_id: session_id.into(),
            state: NegotiationState::Created,
            history: vec![NegotiationState::Created],
            selector: CodecSelector::h264(),
            gathering_timeout: config.gathering_timeout(),
            poll_interval: config.gathering_poll_interval(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[NegotiationState] {
        &self.history
    }

    fn transition(&mut self, next: NegotiationState) {
        debug!(
            "Session {} negotiation: {} -> {}",
            self.session_id, self.state, next
        );
        self.state = next;
        self.history.push(next);
    }

    /// Negotiate an answer for `request`.
    ///
    /// On failure the transport is closed and the source and track are
    /// dropped; nothing stays attached.
    pub async fn negotiate(
        &mut self,
        request: &OfferRequest,
        transport: &dyn PeerTransport,
        position: PositionHandle,
        cancel: &CancellationToken,
    ) -> Result<NegotiatedSession> {
        match self.run(request, transport, position, cancel).await {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!(
                    "Session {} negotiation failed in state {}: {}",
                    self.session_id, self.state, e
                );
                self.transition(NegotiationState::Failed);
                if let Err(close_err) = transport.close().await {
                    warn!(
                        "Session {}: failed to close transport: {}",
                        self.session_id, close_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        request: &OfferRequest,
        transport: &dyn PeerTransport,
        position: PositionHandle,
        cancel: &CancellationToken,
    ) -> Result<NegotiatedSession> {
        let source = BallFrameSource::new(request.stream_params(), position)?;
        let params = source.params();
        let track = Arc::new(BallVideoTrack::for_session(&self.session_id));
        transport.add_video_track(&track).await?;

        if request.sdp_type != SdpType::Offer {
            return Err(AppError::Negotiation(format!(
                "expected an offer, got {}",
                request.sdp_type
            )));
        }
        transport.set_remote_description(request.description()).await?;
        self.transition(NegotiationState::RemoteSet);

        self.apply_codec_preferences(transport).await?;

        let answer = transport.create_answer().await?;
        self.transition(NegotiationState::AnswerCreated);

        transport.set_local_description(answer).await?;
        self.transition(NegotiationState::LocalSet);

        self.transition(NegotiationState::GatheringWait);
        self.wait_for_gathering(transport, cancel).await?;

        let answer = transport.local_description().await.ok_or_else(|| {
            AppError::Negotiation("no local description after gathering".to_string())
        })?;
        self.transition(NegotiationState::Done);

        info!(
            "Session {} negotiated: {} @ {} fps",
            self.session_id,
            params.resolution(),
            params.frame_rate
        );

        Ok(NegotiatedSession {
            answer,
            params,
            source,
            track,
        })
    }

    async fn apply_codec_preferences(&self, transport: &dyn PeerTransport) -> Result<()> {
        match self.selector.select_checked(&transport.codec_capabilities()) {
            Ok(codecs) => {
                let updated = transport.set_video_codec_preferences(&codecs).await?;
                debug!(
                    "Session {}: preferred {} {} codecs on {} transceivers",
                    self.session_id,
                    codecs.len(),
                    self.selector.mime_type(),
                    updated
                );
            }
            Err(e) => {
                warn!("Session {}: {}, keeping engine defaults", self.session_id, e);
            }
        }
        Ok(())
    }

    async fn wait_for_gathering(
        &self,
        transport: &dyn PeerTransport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let deadline = Instant::now() + self.gathering_timeout;

        loop {
            if transport.ice_gathering_state().await? == IceGatheringState::Complete {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AppError::GatheringTimeout(self.gathering_timeout));
            }

            let wait = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AppError::Negotiation("cancelled".to_string()));
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::position::PositionRegistry;
    use crate::webrtc::codec::CodecDescriptor;
    use crate::webrtc::testing::{local_webrtc_config, offerer_sdp, ScriptedTransport};
    use crate::webrtc::transport::RtcPeerTransport;
    use webrtc::api::media_engine::MIME_TYPE_VP8;
    use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

    fn negotiator() -> SessionNegotiator {
        SessionNegotiator::new("test-session", &local_webrtc_config())
    }

    fn request() -> OfferRequest {
        OfferRequest::new("v=0 offer")
    }

    async fn run(
        neg: &mut SessionNegotiator,
        req: &OfferRequest,
        transport: &ScriptedTransport,
    ) -> Result<NegotiatedSession> {
        neg.negotiate(
            req,
            transport,
            PositionHandle::detached("test-session"),
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_order() {
        let transport = ScriptedTransport::new();
        let registry = PositionRegistry::new();
        let mut neg = negotiator();

        let session = neg
            .negotiate(
                &request(),
                &transport,
                registry.register("test-session"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(session.answer.sdp_type, SdpType::Answer);
        assert_eq!(session.answer.sdp, "v=0 answer with candidates");
        assert_eq!(session.params, StreamParams::new(640, 480, 30));
        assert_eq!(
            transport.calls(),
            vec![
                "add_track",
                "remote:offer",
                "prefs:102,127,125,108,123",
                "create_answer",
                "local:answer",
            ]
        );
        assert_eq!(
            neg.history(),
            &[
                NegotiationState::Created,
                NegotiationState::RemoteSet,
                NegotiationState::AnswerCreated,
                NegotiationState::LocalSet,
                NegotiationState::GatheringWait,
                NegotiationState::Done,
            ]
        );
        assert!(!transport.closed());
        assert_eq!(transport.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_h264_keeps_defaults() {
        let mut transport = ScriptedTransport::new();
        transport.codecs = vec![CodecDescriptor::video(MIME_TYPE_VP8, 96, "")];
        let mut neg = negotiator();

        run(&mut neg, &request(), &transport).await.unwrap();

        assert!(!transport.calls().iter().any(|c| c.starts_with("prefs")));
        assert_eq!(neg.state(), NegotiationState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_type_rejected_and_closed() {
        let transport = ScriptedTransport::new();
        let mut req = request();
        req.sdp_type = SdpType::Answer;
        let mut neg = negotiator();

        let result = run(&mut neg, &req, &transport).await;

        assert!(matches!(result, Err(AppError::Negotiation(_))));
        assert!(transport.closed());
        assert!(!transport.calls().iter().any(|c| c.starts_with("remote")));
        assert_eq!(neg.state(), NegotiationState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_remote_closes_transport() {
        let transport = ScriptedTransport::new().rejecting_remote();
        let mut neg = negotiator();

        let result = run(&mut neg, &request(), &transport).await;

        assert!(matches!(result, Err(AppError::Negotiation(_))));
        assert!(transport.closed());
        assert!(!transport.calls().contains(&"create_answer".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_dimensions_rejected_before_transport_use() {
        let transport = ScriptedTransport::new();
        let mut req = request();
        req.width = Some(641);
        let mut neg = negotiator();

        let result = run(&mut neg, &req, &transport).await;

        assert!(matches!(result, Err(AppError::Render(_))));
        assert_eq!(transport.calls(), vec!["close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gathering_timeout() {
        let transport = ScriptedTransport::new().never_completing();
        let config = WebRtcConfig {
            gathering_timeout_ms: 1_000,
            ..Default::default()
        };
        let mut neg = SessionNegotiator::new("slow", &config);

        let start = Instant::now();
        let result = run(&mut neg, &request(), &transport).await;

        assert!(matches!(
            result,
            Err(AppError::GatheringTimeout(d)) if d == Duration::from_secs(1)
        ));
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1_200));
        assert!(transport.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gathering_cancelled() {
        let transport = ScriptedTransport::new().never_completing();
        let cancel = CancellationToken::new();
        let mut neg = negotiator();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            canceller.cancel();
        });

        let result = neg
            .negotiate(&request(), &transport, PositionHandle::detached("c"), &cancel)
            .await;

        match result {
            Err(AppError::Negotiation(msg)) => assert_eq!(msg, "cancelled"),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("negotiation should have been cancelled"),
        }
        assert!(transport.closed());
    }

    #[tokio::test]
    async fn test_end_to_end_against_real_offerer() {
        let (offerer, offer_sdp) = offerer_sdp().await;

        let config = local_webrtc_config();
        let transport = RtcPeerTransport::new(&config, "e2e").await.unwrap();
        let mut neg = SessionNegotiator::new("e2e", &config);

        let session = neg
            .negotiate(
                &OfferRequest::new(offer_sdp),
                &transport,
                PositionHandle::detached("e2e"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(session.answer.sdp_type, SdpType::Answer);
        assert!(!session.answer.sdp.is_empty());
        assert!(session.answer.sdp.contains("H264"));
        assert_eq!(neg.state(), NegotiationState::Done);

        let answer = RTCSessionDescription::answer(session.answer.sdp.clone()).unwrap();
        offerer.set_remote_description(answer).await.unwrap();

        transport.close().await.unwrap();
        offerer.close().await.unwrap();
    }
}
