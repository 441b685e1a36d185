//! WebRTC signaling types and messages

use serde::{Deserialize, Serialize};

use super::session::SessionInfo;
use crate::video::source::StreamParams;

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
            SdpType::Pranswer => write!(f, "pranswer"),
            SdpType::Rollback => write!(f, "rollback"),
        }
    }
}

/// Session description; the SDP body is opaque to this crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(sdp_type: SdpType, sdp: impl Into<String>) -> Self {
        Self {
            sdp_type,
            sdp: sdp.into(),
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Offer, sdp)
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Answer, sdp)
    }
}

/// Request defaults, distinct from [`StreamParams::default`]
pub const DEFAULT_REQUEST_WIDTH: u32 = 640;
pub const DEFAULT_REQUEST_HEIGHT: u32 = 480;
pub const DEFAULT_REQUEST_FRAME_RATE: u32 = 30;

/// WebRTC offer request (from HTTP API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    /// SDP offer
    pub sdp: String,
    /// Description type, must be "offer"
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
}

impl OfferRequest {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
            width: None,
            height: None,
            frame_rate: None,
        }
    }

    /// The offer as a session description
    pub fn description(&self) -> SessionDescription {
        SessionDescription::new(self.sdp_type, self.sdp.clone())
    }

    /// Fill in omitted stream parameters from `defaults`
    pub fn with_defaults(mut self, defaults: StreamParams) -> Self {
        self.width.get_or_insert(defaults.width);
        self.height.get_or_insert(defaults.height);
        self.frame_rate.get_or_insert(defaults.frame_rate);
        self
    }

    /// Requested stream parameters with request defaults applied
    pub fn stream_params(&self) -> StreamParams {
        StreamParams::new(
            self.width.unwrap_or(DEFAULT_REQUEST_WIDTH),
            self.height.unwrap_or(DEFAULT_REQUEST_HEIGHT),
            self.frame_rate.unwrap_or(DEFAULT_REQUEST_FRAME_RATE),
        )
    }
}

/// WebRTC answer response (from HTTP API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// SDP answer
    pub sdp: String,
    /// Always "answer"
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Session ID for this connection
    pub session_id: String,
}

impl AnswerResponse {
    pub fn new(answer: SessionDescription, session_id: impl Into<String>) -> Self {
        Self {
            sdp: answer.sdp,
            sdp_type: answer.sdp_type,
            session_id: session_id.into(),
        }
    }
}

/// ICE candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string
    pub candidate: String,
    /// SDP mid (media ID)
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    /// SDP mline index
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    /// Username fragment
    #[serde(rename = "usernameFragment")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// ICE candidate request (trickle ICE)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    /// Session ID
    pub session_id: String,
    /// ICE candidate
    pub candidate: IceCandidate,
}

/// Session listing response
#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

/// Connection state notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Whether the peer can no longer carry media
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_request_defaults() {
        let req: OfferRequest = serde_json::from_str(r#"{"sdp":"v=0","type":"offer"}"#).unwrap();
        assert_eq!(req.sdp_type, SdpType::Offer);
        assert_eq!(req.stream_params(), StreamParams::new(640, 480, 30));
    }

    #[test]
    fn test_offer_request_overrides() {
        let req: OfferRequest = serde_json::from_str(
            r#"{"sdp":"v=0","type":"offer","width":320,"height":240,"frame_rate":15}"#,
        )
        .unwrap();
        assert_eq!(req.stream_params(), StreamParams::new(320, 240, 15));
    }

    #[test]
    fn test_offer_request_configured_defaults() {
        let req = OfferRequest {
            width: Some(320),
            ..OfferRequest::new("v=0")
        }
        .with_defaults(StreamParams::new(800, 600, 24));
        assert_eq!(req.stream_params(), StreamParams::new(320, 600, 24));
    }

    #[test]
    fn test_offer_request_requires_sdp_and_type() {
        assert!(serde_json::from_str::<OfferRequest>(r#"{"type":"offer"}"#).is_err());
        assert!(serde_json::from_str::<OfferRequest>(r#"{"sdp":"v=0"}"#).is_err());
        assert!(serde_json::from_str::<OfferRequest>(r#"{"sdp":"v=0","type":"bogus"}"#).is_err());
    }

    #[test]
    fn test_answer_response_shape() {
        let resp = AnswerResponse::new(SessionDescription::answer("v=0"), "abc");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["sdp"], "v=0");
        assert_eq!(json["session_id"], "abc");
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(!ConnectionState::New.is_terminal());
    }
}
