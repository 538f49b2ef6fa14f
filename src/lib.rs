//! Reelplay is a frame-accurate MP4/H.264 playback engine.
//!
//! The pipeline runs demux, decode, buffer, schedule and composite:
//!
//! - [`demux::Mp4Demuxer`] parses the container and extracts coded samples
//! - [`decode::DecoderManager`] feeds a [`decode::VideoDecoder`] and keeps a bounded frame buffer
//! - [`schedule::FrameScheduler`] advances a virtual clock from host animation frames
//! - [`render::CanvasCompositor`] paints the current frame plus overlay layers
//! - [`PlaybackEngine`] ties them into one state machine
#![forbid(unsafe_code)]

pub mod decode;
pub mod demux;
pub mod engine;
pub mod foundation;
pub mod media;
pub mod render;
pub mod schedule;
pub mod timeline;

pub use crate::decode::{
    DecodedFrame, DecoderFactory, DefaultDecoderFactory, DefaultFetcher, MediaFetcher,
    MemoryFetcher, VideoDecoder,
};
pub use crate::engine::{EngineDeps, EngineEvent, PlaybackEngine, PlaybackState};
pub use crate::foundation::config::EngineConfig;
pub use crate::foundation::core::{Affine, Rect, Rgba8, Size};
pub use crate::foundation::error::{PlayerError, PlayerResult};
pub use crate::media::{AudioTrackInfo, MediaInfo, VideoTrackInfo};
pub use crate::render::{ExportFormat, FitMode, Layer};
pub use crate::timeline::Timeline;
