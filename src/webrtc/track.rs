//! H.264 video track and the per-session frame pump
//!
//! ```text
//! FrameProducer (RGB24, blocking pool)
//!        |
//!        v
//! H264Encoder (RGB24 -> I420 -> Annex B)
//!        |
//!        v
//! BallVideoTrack (TrackLocalStaticSample, built-in H.264 payloader)
//!        |
//!        v
//! WebRTC PeerConnection
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use webrtc::api::media_engine::MIME_TYPE_H264;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::signaling::ConnectionState;
use crate::error::Result;
use crate::video::encoder::{EncodedFrame, Encoder, EncoderConfig, H264Encoder};
use crate::video::frame::{TimeBase, VIDEO_CLOCK_RATE};
use crate::video::source::{FrameProducer, StreamParams};

/// fmtp line of the outbound track
const TRACK_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

/// Video track statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub keyframes_sent: u64,
    pub write_errors: u64,
}

/// Outbound H.264 sample track of one session
pub struct BallVideoTrack {
    track: Arc<TrackLocalStaticSample>,
    stats: Mutex<TrackStats>,
}

impl BallVideoTrack {
    pub fn new(track_id: &str, stream_id: &str) -> Self {
        let capability = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_string(),
            clock_rate: VIDEO_CLOCK_RATE,
            channels: 0,
            sdp_fmtp_line: TRACK_FMTP.to_string(),
            rtcp_feedback: vec![],
        };

        Self {
            track: Arc::new(TrackLocalStaticSample::new(
                capability,
                track_id.to_string(),
                stream_id.to_string(),
            )),
            stats: Mutex::new(TrackStats::default()),
        }
    }

    /// Track for a session, identified by the session id
    pub fn for_session(session_id: &str) -> Self {
        Self::new("video", &format!("ball-{}", session_id))
    }

    /// Get track as TrackLocal for peer connection
    pub fn as_track_local(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.track.clone()
    }

    pub fn id(&self) -> &str {
        self.track.id()
    }

    pub fn stream_id(&self) -> &str {
        self.track.stream_id()
    }

    /// Write one encoded access unit as a single sample.
    ///
    /// The payloader splits the Annex B stream into NAL units and aggregates
    /// SPS/PPS itself. Write failures (no bound peer yet) are counted, not
    /// propagated.
    pub async fn write_frame(&self, frame: &EncodedFrame) {
        let sample = Sample {
            data: frame.data.clone(),
            duration: frame.duration,
            ..Default::default()
        };

        if let Err(e) = self.track.write_sample(&sample).await {
            debug!("H264 write_sample failed: {}", e);
            self.stats.lock().write_errors += 1;
            return;
        }

        let mut stats = self.stats.lock();
        stats.frames_sent += 1;
        stats.bytes_sent += frame.len() as u64;
        if frame.key_frame {
            stats.keyframes_sent += 1;
        }
    }

    pub fn stats(&self) -> TrackStats {
        *self.stats.lock()
    }
}

/// Why a frame pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// Session cancelled (closed by the manager or shutdown)
    Cancelled,
    /// Peer reached a terminal state before connecting
    NeverConnected,
    /// Peer left the connected state
    PeerClosed,
    /// Encoder could not be created or failed on a frame
    EncodeFailed,
}

/// Spawn the task that feeds a session's track.
///
/// The producer is owned by the task and pulled sequentially, so samples are
/// written in strictly increasing pts order. Rendering and encoding run on
/// the blocking pool; pacing stays on the async runtime.
pub fn spawn_pump(
    session_id: String,
    producer: Box<dyn FrameProducer>,
    track: Arc<BallVideoTrack>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) -> JoinHandle<PumpExit> {
    tokio::spawn(async move {
        let exit = run_pump(&session_id, producer, &track, state_rx, cancel).await;
        let stats = track.stats();
        info!(
            "Frame pump for session {} stopped ({:?}): {} frames, {} bytes sent",
            session_id, exit, stats.frames_sent, stats.bytes_sent
        );
        exit
    })
}

/// Producer and encoder, moved to a blocking thread for each frame
struct FrameWorker {
    producer: Box<dyn FrameProducer>,
    encoder: H264Encoder,
}

impl FrameWorker {
    fn step(&mut self, duration: Duration) -> (u64, Result<EncodedFrame>) {
        let frame = self.producer.produce();
        let encoded = self.encoder.encode(&frame, duration);
        (frame.sequence, encoded)
    }
}

async fn run_pump(
    session_id: &str,
    producer: Box<dyn FrameProducer>,
    track: &BallVideoTrack,
    mut state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) -> PumpExit {
    if let Some(exit) = wait_connected(&mut state_rx, &cancel).await {
        return exit;
    }

    let params = producer.params();
    let interval = producer.frame_interval();
    let duration = TimeBase::VIDEO.to_duration(params.pts_step());
    let encoder = match create_encoder(&params) {
        Ok(encoder) => encoder,
        Err(e) => {
            error!("Session {}: {}", session_id, e);
            return PumpExit::EncodeFailed;
        }
    };
    let mut worker = FrameWorker { producer, encoder };
    info!(
        "Session {} connected, streaming {} @ {} fps",
        session_id,
        params.resolution(),
        params.frame_rate
    );

    loop {
        if cancel.is_cancelled() {
            return PumpExit::Cancelled;
        }

        let job = tokio::task::spawn_blocking(move || {
            let result = worker.step(duration);
            (worker, result)
        });
        let (sequence, encoded) = match job.await {
            Ok((returned, result)) => {
                worker = returned;
                result
            }
            Err(e) => {
                error!("Session {} frame worker panicked: {}", session_id, e);
                return PumpExit::EncodeFailed;
            }
        };

        if state_rx.borrow().is_terminal() {
            return PumpExit::PeerClosed;
        }

        match encoded {
            Ok(encoded) if encoded.is_empty() => {
                // The encoder may skip a frame under rate control
                trace!("Session {}: empty bitstream for frame {}", session_id, sequence);
            }
            Ok(encoded) => track.write_frame(&encoded).await,
            Err(e) => {
                error!("Session {} stream stopped: {}", session_id, e);
                return PumpExit::EncodeFailed;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return PumpExit::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

fn create_encoder(params: &StreamParams) -> Result<H264Encoder> {
    H264Encoder::new(EncoderConfig::h264(params.resolution(), params.frame_rate))
}

/// Returns `None` once connected, or the reason to stop
async fn wait_connected(
    state_rx: &mut watch::Receiver<ConnectionState>,
    cancel: &CancellationToken,
) -> Option<PumpExit> {
    loop {
        let state = *state_rx.borrow_and_update();
        if state == ConnectionState::Connected {
            return None;
        }
        if state.is_terminal() {
            return Some(PumpExit::NeverConnected);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Some(PumpExit::Cancelled),
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return Some(PumpExit::NeverConnected);
                }
            }
        }
    }
}
