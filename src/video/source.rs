//! Time-paced frame sources
//!
//! A [`FrameProducer`] yields an infinite, non-restartable sequence of frames.
//! [`BallFrameSource`] is the bouncing-ball implementation: each call advances
//! the physics by one fixed frame interval, renders, stamps a gap-free
//! presentation timestamp derived from the frame counter, publishes the new
//! ball center and then sleeps for one frame interval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::format::Resolution;
use super::frame::{TimeBase, VideoFrame, VIDEO_CLOCK_RATE};
use super::physics::{BallState, RADIUS_DIVISOR};
use super::position::PositionHandle;
use super::render;
use crate::error::{AppError, Result};

/// Highest supported frame rate; larger requests are clamped
pub const MAX_FRAME_RATE: u32 = 60;

/// Largest accepted frame side
pub const MAX_DIMENSION: u32 = 4096;

/// Stream geometry and cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for StreamParams {
    /// Defaults of a track built without request parameters
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 60,
        }
    }
}

impl StreamParams {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Validate dimensions and normalize the frame rate.
    ///
    /// Width and height must be positive, even (4:2:0 encoding), at most
    /// [`MAX_DIMENSION`], and large enough for a ball radius of at least one
    /// pixel. A zero frame rate is rejected; rates above [`MAX_FRAME_RATE`]
    /// are clamped.
    pub fn validated(self) -> Result<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(AppError::Render(format!(
                "dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(AppError::Render(format!(
                "dimensions must not exceed {}, got {}x{}",
                MAX_DIMENSION, self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(AppError::Render(format!(
                "dimensions must be even for 4:2:0 encoding, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width.min(self.height) < RADIUS_DIVISOR {
            return Err(AppError::Render(format!(
                "smaller side must be at least {} pixels, got {}x{}",
                RADIUS_DIVISOR, self.width, self.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(AppError::Render("frame rate must be positive".to_string()));
        }

        let mut params = self;
        if params.frame_rate > MAX_FRAME_RATE {
            warn!(
                "Requested frame rate {} exceeds {}, clamping",
                params.frame_rate, MAX_FRAME_RATE
            );
            params.frame_rate = MAX_FRAME_RATE;
        }
        Ok(params)
    }

    /// Seconds between frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }

    /// Presentation timestamp increment per frame on the 90 kHz clock
    pub fn pts_step(&self) -> u64 {
        ((VIDEO_CLOCK_RATE as f64 / self.frame_rate as f64).round() as u64).max(1)
    }
}

/// Capability interface for anything that produces paced video frames
///
/// [`produce`](Self::produce) is CPU-bound and may be called from a blocking
/// thread; [`next_frame`](Self::next_frame) adds real-time pacing on top.
#[async_trait]
pub trait FrameProducer: Send {
    /// Produce the next frame immediately
    fn produce(&mut self) -> VideoFrame;

    /// Stream parameters of this producer
    fn params(&self) -> StreamParams;

    /// Delay between two frames
    fn frame_interval(&self) -> Duration {
        self.params().frame_interval()
    }

    /// Produce the next frame, suspending the caller for about one frame interval
    async fn next_frame(&mut self) -> VideoFrame {
        let frame = self.produce();
        tokio::time::sleep(self.frame_interval()).await;
        frame
    }
}

/// Bouncing-ball frame source
pub struct BallFrameSource {
    params: StreamParams,
    state: BallState,
    /// Frames produced so far
    sequence: u64,
    pts_step: u64,
    dt: f64,
    interval: Duration,
    position: PositionHandle,
}

impl BallFrameSource {
    /// Create a source; fails fast on invalid dimensions
    pub fn new(params: StreamParams, position: PositionHandle) -> Result<Self> {
        let params = params.validated()?;
        let state = BallState::initial(params.resolution());

        debug!(
            "Creating ball frame source {} @ {} fps (radius {}, session {})",
            params.resolution(),
            params.frame_rate,
            state.radius,
            position.session_id()
        );

        Ok(Self {
            params,
            state,
            sequence: 0,
            pts_step: params.pts_step(),
            dt: 1.0 / params.frame_rate as f64,
            interval: params.frame_interval(),
            position,
        })
    }

    /// Current ground-truth ball center
    pub fn position(&self) -> (f64, f64) {
        self.state.position()
    }
}

#[async_trait]
impl FrameProducer for BallFrameSource {
    fn produce(&mut self) -> VideoFrame {
        let pts = self.sequence * self.pts_step;

        self.state.update(self.dt);
        let pixels = render::render(&self.state);

        let frame = VideoFrame::rgb24(
            pixels,
            self.params.resolution(),
            pts,
            TimeBase::VIDEO,
            self.sequence,
        );
        self.sequence += 1;

        self.position.publish(self.state.x, self.state.y);
        frame
    }

    fn params(&self) -> StreamParams {
        self.params
    }

    fn frame_interval(&self) -> Duration {
        self.interval
    }
}
