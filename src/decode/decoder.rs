use std::sync::Arc;

use crate::decode::frame::DecodedFrame;
use crate::foundation::error::PlayerResult;
use crate::media::{DemuxedSample, VideoTrackConfig};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoDecoderConfig {
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    /// Out-of-band codec description (`avcC` for H.264).
    pub description: Option<Arc<[u8]>>,
}

impl From<&VideoTrackConfig> for VideoDecoderConfig {
    fn from(cfg: &VideoTrackConfig) -> Self {
        Self {
            codec: cfg.codec.clone(),
            coded_width: cfg.coded_width,
            coded_height: cfg.coded_height,
            description: cfg.description.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkType {
    Key,
    Delta,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedVideoChunk {
    pub chunk_type: ChunkType,
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub data: Arc<[u8]>,
}

impl From<&DemuxedSample> for EncodedVideoChunk {
    fn from(s: &DemuxedSample) -> Self {
        Self {
            chunk_type: if s.is_keyframe {
                ChunkType::Key
            } else {
                ChunkType::Delta
            },
            timestamp_us: s.timestamp_us,
            duration_us: s.duration_us,
            data: s.data.clone(),
        }
    }
}

/// A video decoder driven by polling.
///
/// `decode` only submits work; finished frames are collected with `poll_output`. Output is
/// expected in presentation order.
pub trait VideoDecoder: Send {
    fn configure(&mut self, config: &VideoDecoderConfig) -> PlayerResult<()>;

    fn is_configured(&self) -> bool;

    fn decode(&mut self, chunk: EncodedVideoChunk) -> PlayerResult<()>;

    /// Chunks submitted but not yet returned as frames.
    fn decode_queue_size(&self) -> usize;

    /// Next finished frame, if any. Must not block.
    fn poll_output(&mut self) -> PlayerResult<Option<DecodedFrame>>;

    /// Finish all submitted work and return the remaining frames.
    ///
    /// The decoder stays configured; the next chunk must be a keyframe.
    fn flush(&mut self) -> PlayerResult<Vec<DecodedFrame>>;

    /// Release decoder resources. Idempotent.
    fn close(&mut self);
}

/// Builds a fresh decoder for every load.
pub trait DecoderFactory: Send {
    fn create(&self) -> PlayerResult<Box<dyn VideoDecoder>>;
}

impl<F> DecoderFactory for F
where
    F: Fn() -> PlayerResult<Box<dyn VideoDecoder>> + Send,
{
    fn create(&self) -> PlayerResult<Box<dyn VideoDecoder>> {
        self()
    }
}

/// System `ffmpeg` decoder when built with `media-ffmpeg`, otherwise an error on `create`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDecoderFactory;

impl DecoderFactory for DefaultDecoderFactory {
    fn create(&self) -> PlayerResult<Box<dyn VideoDecoder>> {
        #[cfg(feature = "media-ffmpeg")]
        {
            Ok(Box::new(crate::decode::ffmpeg::FfmpegVideoDecoder::new()))
        }
        #[cfg(not(feature = "media-ffmpeg"))]
        {
            Err(crate::foundation::error::PlayerError::decoder(
                "no video decoder available (build with the `media-ffmpeg` feature)",
            ))
        }
    }
}
