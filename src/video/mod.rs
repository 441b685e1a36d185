//! Synthetic video: bouncing-ball physics, rendering, pacing and encoding

pub mod encoder;
pub mod format;
pub mod frame;
pub mod physics;
pub mod position;
pub mod render;
pub mod source;

pub use encoder::{EncodedFrame, Encoder, H264Encoder};
pub use format::{PixelFormat, Resolution};
pub use frame::{TimeBase, VideoFrame};
pub use physics::BallState;
pub use position::{Position, PositionHandle, PositionRegistry};
pub use source::{BallFrameSource, FrameProducer, StreamParams};
