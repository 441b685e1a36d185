//! Encoder traits and common types

use bytes::Bytes;
use std::time::Duration;

use crate::error::Result;
use crate::video::format::Resolution;
use crate::video::frame::VideoFrame;

/// Target bits per pixel per frame for the default bitrate
const DEFAULT_BITS_PER_PIXEL: f64 = 0.1;
const MIN_BITRATE_BPS: u32 = 100_000;
const MAX_BITRATE_BPS: u32 = 20_000_000;

/// Encoder configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Target resolution
    pub resolution: Resolution,
    /// Target frame rate, fed to rate control
    pub fps: u32,
    /// Target bitrate in bits per second
    pub bitrate_bps: u32,
}

impl EncoderConfig {
    /// H.264 config with a bitrate scaled to resolution and frame rate
    pub fn h264(resolution: Resolution, fps: u32) -> Self {
        Self {
            resolution,
            fps,
            bitrate_bps: default_bitrate(resolution, fps),
        }
    }
}

fn default_bitrate(resolution: Resolution, fps: u32) -> u32 {
    let bps = resolution.pixels() as f64 * fps as f64 * DEFAULT_BITS_PER_PIXEL;
    (bps as u32).clamp(MIN_BITRATE_BPS, MAX_BITRATE_BPS)
}

/// Encoded frame output
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded data (H.264 Annex B access unit)
    pub data: Bytes,
    pub resolution: Resolution,
    /// Whether this is a key frame
    pub key_frame: bool,
    /// Frame sequence number
    pub sequence: u64,
    /// Presentation timestamp copied from the source frame
    pub pts: u64,
    /// Display duration of this frame
    pub duration: Duration,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Generic encoder trait
/// Note: Not Sync because the underlying codec contexts are not thread-safe
pub trait Encoder: Send {
    /// Encode a raw frame with the given display duration
    fn encode(&mut self, frame: &VideoFrame, duration: Duration) -> Result<EncodedFrame>;

    /// Get current configuration
    fn config(&self) -> &EncoderConfig;
}
