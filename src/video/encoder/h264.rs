//! H.264 software encoder backed by Cisco OpenH264
//!
//! Input frames are RGB24; OpenH264 converts them into a reusable I420
//! buffer and encodes one Annex B access unit per frame. The first encoded
//! frame is always an IDR carrying SPS/PPS.

use bytes::Bytes;
use openh264::encoder::{
    BitRate, Encoder as OpenH264, EncoderConfig as OpenH264Config, FrameRate,
};
use openh264::formats::{RgbSliceU8, YUVBuffer};
use openh264::{nal_units, OpenH264API};
use std::time::Duration;
use tracing::{debug, info, trace};

use super::traits::{EncodedFrame, Encoder, EncoderConfig};
use crate::error::{AppError, Result};
use crate::video::format::PixelFormat;
use crate::video::frame::VideoFrame;

/// NAL unit types of interest
pub mod nal_type {
    pub const IDR_SLICE: u8 = 5;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
}

/// NAL header byte of a unit, with or without its start code
fn nal_header(unit: &[u8]) -> Option<u8> {
    let first = unit.iter().position(|&b| b != 0)?;
    if first >= 2 && unit[first] == 1 {
        unit.get(first + 1).copied()
    } else {
        unit.get(first).copied()
    }
}

/// NAL unit types of an Annex B byte stream, in stream order
pub fn annexb_nal_types(data: &[u8]) -> Vec<u8> {
    nal_units(data)
        .filter_map(nal_header)
        .map(|header| header & 0x1F)
        .collect()
}

/// Whether an Annex B access unit contains an IDR slice
pub fn is_keyframe(data: &[u8]) -> bool {
    annexb_nal_types(data).contains(&nal_type::IDR_SLICE)
}

fn openh264_config(config: &EncoderConfig) -> OpenH264Config {
    OpenH264Config::new()
        .bitrate(BitRate::from_bps(config.bitrate_bps))
        .max_frame_rate(FrameRate::from_hz(config.fps as f32))
}

/// H.264 encoder (software, OpenH264)
pub struct H264Encoder {
    inner: OpenH264,
    yuv: YUVBuffer,
    config: EncoderConfig,
    frames_encoded: u64,
}

impl H264Encoder {
    /// Create an encoder for RGB24 input at the configured resolution
    pub fn new(config: EncoderConfig) -> Result<Self> {
        let inner =
            OpenH264::with_api_config(OpenH264API::from_source(), openh264_config(&config))
                .map_err(|e| {
                    AppError::Encode(format!("Failed to create OpenH264 encoder: {}", e))
                })?;

        info!(
            "Created OpenH264 encoder: {} @ {} fps, {} kbps",
            config.resolution,
            config.fps,
            config.bitrate_bps / 1000
        );

        Ok(Self {
            inner,
            yuv: YUVBuffer::new(
                config.resolution.width as usize,
                config.resolution.height as usize,
            ),
            config,
            frames_encoded: 0,
        })
    }

}

impl Encoder for H264Encoder {
    fn encode(&mut self, frame: &VideoFrame, duration: Duration) -> Result<EncodedFrame> {
        if frame.resolution != self.config.resolution {
            return Err(AppError::Encode(format!(
                "Frame resolution {} does not match encoder resolution {}",
                frame.resolution, self.config.resolution
            )));
        }
        let expected = PixelFormat::Rgb24.frame_size(frame.resolution);
        if frame.format != PixelFormat::Rgb24 || frame.len() != expected {
            return Err(AppError::Encode(format!(
                "Expected {} bytes of {}, got {} bytes of {}",
                expected,
                PixelFormat::Rgb24,
                frame.len(),
                frame.format
            )));
        }

        let dimensions = (
            frame.resolution.width as usize,
            frame.resolution.height as usize,
        );
        self.yuv
            .read_rgb8(RgbSliceU8::new(frame.data(), dimensions));

        let bitstream = self
            .inner
            .encode(&self.yuv)
            .map_err(|e| AppError::Encode(format!("OpenH264 encode failed: {}", e)))?;
        let data = bitstream.to_vec();

        let key_frame = is_keyframe(&data);
        if self.frames_encoded == 0 {
            debug!(
                "First encoded frame: {} bytes, NAL types {:?}",
                data.len(),
                annexb_nal_types(&data)
            );
        }
        trace!(
            "Encoded frame {}: {} bytes, keyframe={}",
            frame.sequence,
            data.len(),
            key_frame
        );
        self.frames_encoded += 1;

        Ok(EncodedFrame {
            data: Bytes::from(data),
            resolution: frame.resolution,
            key_frame,
            sequence: frame.sequence,
            pts: frame.pts,
            duration,
        })
    }

    fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::format::Resolution;
    use crate::video::frame::TimeBase;
    use crate::video::position::PositionHandle;
    use crate::video::source::{BallFrameSource, FrameProducer, StreamParams};
    use openh264::formats::YUVSource;

    fn solid(resolution: Resolution, rgb: [u8; 3]) -> VideoFrame {
        let data: Vec<u8> = rgb
            .iter()
            .copied()
            .cycle()
            .take(PixelFormat::Rgb24.frame_size(resolution))
            .collect();
        VideoFrame::rgb24(data, resolution, 0, TimeBase::VIDEO, 0)
    }

    fn encoded_bytes(config: EncoderConfig, frames: usize) -> usize {
        let params = StreamParams::new(
            config.resolution.width,
            config.resolution.height,
            config.fps,
        );
        let mut source = BallFrameSource::new(params, PositionHandle::detached("rate")).unwrap();
        let mut encoder = H264Encoder::new(config).unwrap();
        (0..frames)
            .map(|_| {
                encoder
                    .encode(&source.produce(), params.frame_interval())
                    .unwrap()
                    .len()
            })
            .skip(1)
            .sum()
    }

    #[test]
    fn test_nal_type_scan() {
        let data = [
            0, 0, 0, 1, 0x67, 0xAA, // SPS
            0, 0, 0, 1, 0x68, 0xBB, // PPS
            0, 0, 1, 0x65, 0xCC, // IDR
        ];
        assert_eq!(
            annexb_nal_types(&data),
            vec![nal_type::SPS, nal_type::PPS, nal_type::IDR_SLICE]
        );
        assert!(is_keyframe(&data));
        assert!(!is_keyframe(&[0, 0, 1, 0x41, 0x00]));
    }

    #[test]
    fn test_rgb_conversion_is_limited_range() {
        let res = Resolution::new(64, 48);
        let mut yuv = YUVBuffer::new(64, 48);

        let white = solid(res, [255, 255, 255]);
        yuv.read_rgb8(RgbSliceU8::new(white.data(), (64, 48)));
        assert!(yuv.y().iter().all(|&y| (234..=236).contains(&y)));
        assert!(yuv.u().iter().all(|&u| (127..=129).contains(&u)));
        assert!(yuv.v().iter().all(|&v| (127..=129).contains(&v)));

        let black = solid(res, [0, 0, 0]);
        yuv.read_rgb8(RgbSliceU8::new(black.data(), (64, 48)));
        assert!(yuv.y().iter().all(|&y| (15..=17).contains(&y)));
        assert!(yuv.u().iter().all(|&u| (127..=129).contains(&u)));
    }

    #[test]
    fn test_encodes_ball_frames() {
        let params = StreamParams::new(160, 120, 30);
        let mut source = BallFrameSource::new(params, PositionHandle::detached("enc")).unwrap();
        let mut encoder = H264Encoder::new(EncoderConfig::h264(params.resolution(), 30)).unwrap();

        let first = encoder
            .encode(&source.produce(), params.frame_interval())
            .unwrap();
        assert!(!first.is_empty());
        assert!(first.key_frame);
        assert!(annexb_nal_types(&first.data).contains(&nal_type::SPS));

        let second = encoder
            .encode(&source.produce(), params.frame_interval())
            .unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.pts, 3000);
        assert_eq!(encoder.frames_encoded, 2);
    }

    #[test]
    fn test_configured_rate_reaches_rate_control() {
        let base = EncoderConfig::h264(Resolution::new(320, 240), 30);
        let encoder = H264Encoder::new(base.clone()).unwrap();
        assert_eq!(encoder.config().fps, 30);
        assert_eq!(encoder.config().bitrate_bps, 230_400);

        let low = encoded_bytes(
            EncoderConfig {
                bitrate_bps: 100_000,
                ..base.clone()
            },
            60,
        );
        let high = encoded_bytes(
            EncoderConfig {
                bitrate_bps: 8_000_000,
                ..base
            },
            60,
        );
        assert!(high > low, "high={} low={}", high, low);
    }

    #[test]
    fn test_rejects_mismatched_frames() {
        let mut encoder =
            H264Encoder::new(EncoderConfig::h264(Resolution::new(64, 48), 30)).unwrap();

        let wrong_size = solid(Resolution::new(160, 120), [0, 0, 0]);
        let result = encoder.encode(&wrong_size, Duration::from_millis(33));
        assert!(matches!(result, Err(AppError::Encode(_))));

        let truncated = VideoFrame::rgb24(
            vec![0u8; 10],
            Resolution::new(64, 48),
            0,
            TimeBase::VIDEO,
            0,
        );
        let result = encoder.encode(&truncated, Duration::from_millis(33));
        assert!(matches!(result, Err(AppError::Encode(_))));
    }
}
