//! Codec capabilities and codec preference selection

use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8, MIME_TYPE_VP9};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters};
use webrtc::rtp_transceiver::RTCPFeedback;

use crate::error::{AppError, Result};

/// RTCP feedback mechanism advertised for a codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpFeedback {
    pub typ: String,
    pub parameter: String,
}

impl RtcpFeedback {
    fn new(typ: &str, parameter: &str) -> Self {
        Self {
            typ: typ.to_string(),
            parameter: parameter.to_string(),
        }
    }
}

/// One entry of the transport engine's codec capability list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: String,
    pub payload_type: u8,
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl CodecDescriptor {
    pub fn video(mime_type: &str, payload_type: u8, sdp_fmtp_line: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            clock_rate: 90_000,
            channels: 0,
            sdp_fmtp_line: sdp_fmtp_line.to_string(),
            payload_type,
            rtcp_feedback: video_rtcp_feedback(),
        }
    }

    pub fn is_family(&self, mime_type: &str) -> bool {
        self.mime_type.eq_ignore_ascii_case(mime_type)
    }

    pub fn to_capability(&self) -> RTCRtpCodecCapability {
        RTCRtpCodecCapability {
            mime_type: self.mime_type.clone(),
            clock_rate: self.clock_rate,
            channels: self.channels,
            sdp_fmtp_line: self.sdp_fmtp_line.clone(),
            rtcp_feedback: self
                .rtcp_feedback
                .iter()
                .map(|fb| RTCPFeedback {
                    typ: fb.typ.clone(),
                    parameter: fb.parameter.clone(),
                })
                .collect(),
        }
    }

    pub fn to_parameters(&self) -> RTCRtpCodecParameters {
        RTCRtpCodecParameters {
            capability: self.to_capability(),
            payload_type: self.payload_type,
            ..Default::default()
        }
    }
}

fn video_rtcp_feedback() -> Vec<RtcpFeedback> {
    vec![
        RtcpFeedback::new("goog-remb", ""),
        RtcpFeedback::new("ccm", "fir"),
        RtcpFeedback::new("nack", ""),
        RtcpFeedback::new("nack", "pli"),
    ]
}

/// Video codecs registered with the media engine, in preference order of the engine
pub fn default_video_codecs() -> Vec<CodecDescriptor> {
    vec![
        CodecDescriptor::video(MIME_TYPE_VP8, 96, ""),
        CodecDescriptor::video(MIME_TYPE_VP9, 98, "profile-id=0"),
        CodecDescriptor::video(
            MIME_TYPE_H264,
            102,
            "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f",
        ),
        CodecDescriptor::video(
            MIME_TYPE_H264,
            127,
            "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42001f",
        ),
        CodecDescriptor::video(
            MIME_TYPE_H264,
            125,
            "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f",
        ),
        CodecDescriptor::video(
            MIME_TYPE_H264,
            108,
            "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42e01f",
        ),
        CodecDescriptor::video(
            MIME_TYPE_H264,
            123,
            "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=640032",
        ),
    ]
}

/// Opus, registered so audio sections of an offer can be answered
pub fn default_audio_codec() -> CodecDescriptor {
    CodecDescriptor {
        mime_type: MIME_TYPE_OPUS.to_string(),
        clock_rate: 48_000,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        payload_type: 111,
        rtcp_feedback: vec![],
    }
}

/// Filters a capability list down to a single codec family
#[derive(Debug, Clone)]
pub struct CodecSelector {
    mime_type: &'static str,
}

impl Default for CodecSelector {
    fn default() -> Self {
        Self::h264()
    }
}

impl CodecSelector {
    pub fn h264() -> Self {
        Self {
            mime_type: MIME_TYPE_H264,
        }
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type
    }

    /// Entries of the target family, in their original relative order
    pub fn select(&self, all: &[CodecDescriptor]) -> Vec<CodecDescriptor> {
        all.iter()
            .filter(|c| c.is_family(self.mime_type))
            .cloned()
            .collect()
    }

    /// Like [`select`](Self::select), but reports an empty result as
    /// `UnsupportedCodec` so callers can log it before degrading.
    pub fn select_checked(&self, all: &[CodecDescriptor]) -> Result<Vec<CodecDescriptor>> {
        let selected = self.select(all);
        if selected.is_empty() {
            return Err(AppError::UnsupportedCodec(format!(
                "{} not present among {} codecs",
                self.mime_type,
                all.len()
            )));
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_matching_in_order() {
        let all = vec![
            CodecDescriptor::video(MIME_TYPE_VP8, 96, ""),
            CodecDescriptor::video(MIME_TYPE_H264, 102, "a"),
            CodecDescriptor::video(MIME_TYPE_VP9, 98, ""),
            CodecDescriptor::video(MIME_TYPE_H264, 125, "b"),
            CodecDescriptor::video("video/AV1", 41, ""),
        ];
        let selected = CodecSelector::h264().select(&all);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].payload_type, 102);
        assert_eq!(selected[1].payload_type, 125);
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let all = vec![CodecDescriptor::video("video/h264", 102, "")];
        assert_eq!(CodecSelector::h264().select(&all).len(), 1);
    }

    #[test]
    fn test_missing_family_is_reported_not_fatal() {
        let all = vec![CodecDescriptor::video(MIME_TYPE_VP8, 96, "")];
        let selector = CodecSelector::h264();
        assert!(selector.select(&all).is_empty());
        assert!(matches!(
            selector.select_checked(&all),
            Err(AppError::UnsupportedCodec(_))
        ));
        assert!(selector.select(&[]).is_empty());
    }

    #[test]
    fn test_default_list_contains_h264() {
        let selected = CodecSelector::h264().select(&default_video_codecs());
        assert_eq!(
            selected.iter().map(|c| c.payload_type).collect::<Vec<_>>(),
            vec![102, 127, 125, 108, 123]
        );
    }

    #[test]
    fn test_to_parameters() {
        let params = CodecDescriptor::video(MIME_TYPE_H264, 102, "x=1").to_parameters();
        assert_eq!(params.payload_type, 102);
        assert_eq!(params.capability.clock_rate, 90_000);
        assert_eq!(params.capability.sdp_fmtp_line, "x=1");
        assert_eq!(params.capability.rtcp_feedback.len(), 4);
    }
}
