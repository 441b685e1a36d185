//! WebRTC signaling and media delivery
//!
//! ```text
//! POST /offer
//!        |
//!        v
//! SessionManager ---- SessionNegotiator ---- PeerTransport (webrtc-rs)
//!        |                                          ^
//!        v                                          |
//! frame pump: BallFrameSource -> H264Encoder -> BallVideoTrack
//! ```

pub mod codec;
pub mod config;
pub mod negotiator;
pub mod session;
pub mod signaling;
pub mod track;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{CodecDescriptor, CodecSelector};
pub use config::{TurnServer, WebRtcConfig};
pub use negotiator::{NegotiatedSession, NegotiationState, SessionNegotiator};
pub use session::{SessionInfo, SessionManager};
pub use signaling::{
    AnswerResponse, ConnectionState, IceCandidate, IceCandidateRequest, OfferRequest, SdpType,
    SessionDescription,
};
pub use track::{BallVideoTrack, TrackStats};
pub use transport::{IceGatheringState, PeerTransport, RtcPeerTransport};
