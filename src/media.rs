//! Data model shared by the demuxer, the decoder manager and the engine.

use std::sync::Arc;

/// Immutable snapshot produced once per successful load.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MediaInfo {
    pub duration_ms: f64,
    pub video: Option<VideoTrackInfo>,
    pub audio: Option<AudioTrackInfo>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VideoTrackInfo {
    pub track_id: u32,
    /// WebCodecs-style codec string, e.g. `avc1.64001f`.
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    pub display_width: u32,
    pub display_height: u32,
    pub duration_ms: f64,
    pub frame_rate: f64,
    /// Average bitrate in bits per second.
    pub bitrate: f64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioTrackInfo {
    pub track_id: u32,
    pub codec: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub duration_ms: f64,
    pub bitrate: f64,
}

/// One coded access unit as it came out of the container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemuxedSample {
    pub track_id: u32,
    pub data: Arc<[u8]>,
    /// Presentation timestamp.
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub is_keyframe: bool,
}

/// Decoder setup for a video track: codec string plus the out-of-band description
/// (`avcC` payload for H.264, `hvcC` for HEVC).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoTrackConfig {
    pub track_id: u32,
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    pub description: Option<Arc<[u8]>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioTrackConfig {
    pub track_id: u32,
    pub codec: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// AudioSpecificConfig bytes from `esds`, when present.
    pub description: Option<Arc<[u8]>>,
}
