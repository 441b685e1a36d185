//! Video frame data structures

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::format::{PixelFormat, Resolution};

/// 90 kHz RTP video clock
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Rational time base (seconds per pts tick = num / den)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Time base of the 90 kHz video clock
    pub const VIDEO: TimeBase = TimeBase::new(1, VIDEO_CLOCK_RATE);

    /// Convert a number of ticks to wall duration
    pub fn to_duration(&self, ticks: u64) -> Duration {
        let nanos = ticks as u128 * self.num as u128 * 1_000_000_000 / self.den as u128;
        Duration::from_nanos(nanos as u64)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A rendered video frame with presentation metadata
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw frame data
    data: Arc<Bytes>,
    /// Frame resolution
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Presentation timestamp in `time_base` units
    pub pts: u64,
    pub time_base: TimeBase,
    /// Frame sequence number
    pub sequence: u64,
}

impl VideoFrame {
    /// Create a new RGB24 frame
    pub fn rgb24(
        data: impl Into<Bytes>,
        resolution: Resolution,
        pts: u64,
        time_base: TimeBase,
        sequence: u64,
    ) -> Self {
        Self {
            data: Arc::new(data.into()),
            resolution,
            format: PixelFormat::Rgb24,
            pts,
            time_base,
            sequence,
        }
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get data length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// RGB triple at (x, y)
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        super::render::pixel_at(self.data(), self.resolution.width, x, y)
    }
}
