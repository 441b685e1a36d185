//! Video encoder implementations
//!
//! Only H.264 is produced: the negotiator prefers the H.264 family and the
//! outbound track is an H.264 sample track.

pub mod h264;
pub mod traits;

pub use h264::{is_keyframe, H264Encoder};
pub use traits::{EncodedFrame, Encoder, EncoderConfig};
