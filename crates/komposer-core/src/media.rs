//! Probed container/stream metadata.

use serde::{Deserialize, Serialize};

/// Container-level probe result for a media file (spec §3 "MediaInfo").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container format name as reported by ffprobe (e.g. "mov,mp4,m4a").
    pub format: String,
    /// Duration in seconds. Always present for probed video — absence is a
    /// probe error, never a silent default (spec §3 invariant).
    pub duration: f64,
    /// Per-stream descriptors, in ffprobe's stream order.
    pub streams: Vec<StreamInfo>,
    /// Cache bookkeeping: unix seconds this entry was written.
    pub cached_at: u64,
}

impl MediaInfo {
    /// Returns `true` if any stream is a video stream.
    pub fn has_video(&self) -> bool {
        self.streams.iter().any(|s| s.is_video())
    }

    /// Returns `true` if any stream is an audio stream.
    pub fn has_audio(&self) -> bool {
        self.streams.iter().any(|s| s.is_audio())
    }

    /// The first video stream's (width, height), if any.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.streams.iter().find_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        })
    }

    /// `true` when the first video stream is taller than it is wide.
    pub fn is_portrait(&self) -> bool {
        matches!(self.dimensions(), Some((w, h)) if h > w)
    }
}

/// A single stream's descriptor within a probed container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// ffprobe's `codec_type`: "video", "audio", "subtitle", ...
    pub codec_type: String,
    /// ffprobe's `codec_name`.
    pub codec_name: String,
    /// Frame width in pixels, for video streams.
    pub width: Option<u32>,
    /// Frame height in pixels, for video streams.
    pub height: Option<u32>,
    /// Frames per second, for video streams. Required for probed video per
    /// spec §3; `None` only for non-video streams.
    pub framerate: Option<f64>,
    /// Sample rate in Hz, for audio streams.
    pub sample_rate: Option<u32>,
    /// Channel count, for audio streams.
    pub channels: Option<u32>,
}

impl StreamInfo {
    /// `true` if `codec_type == "video"`.
    pub fn is_video(&self) -> bool {
        self.codec_type == "video"
    }

    /// `true` if `codec_type == "audio"`.
    pub fn is_audio(&self) -> bool {
        self.codec_type == "audio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream(w: u32, h: u32) -> StreamInfo {
        StreamInfo {
            codec_type: "video".into(),
            codec_name: "h264".into(),
            width: Some(w),
            height: Some(h),
            framerate: Some(30.0),
            sample_rate: None,
            channels: None,
        }
    }

    #[test]
    fn portrait_detection() {
        let info = MediaInfo {
            format: "mov,mp4,m4a".into(),
            duration: 10.0,
            streams: vec![video_stream(1080, 1920)],
            cached_at: 0,
        };
        assert!(info.is_portrait());
        assert!(info.has_video());
        assert!(!info.has_audio());
    }

    #[test]
    fn landscape_is_not_portrait() {
        let info = MediaInfo {
            format: "mov,mp4,m4a".into(),
            duration: 10.0,
            streams: vec![video_stream(1920, 1080)],
            cached_at: 0,
        };
        assert!(!info.is_portrait());
    }
}
