pub mod decoder;
pub mod fetch;
#[cfg(feature = "media-ffmpeg")]
pub mod ffmpeg;
pub mod frame;
mod manager;

pub use decoder::{
    ChunkType, DecoderFactory, DefaultDecoderFactory, EncodedVideoChunk, VideoDecoder,
    VideoDecoderConfig,
};
pub use fetch::{AbortHandle, CancelToken, DefaultFetcher, MediaFetcher, MemoryFetcher};
pub use frame::{DecodedFrame, FrameImage, PixelFormat};
pub use manager::{DecoderEvent, DecoderManager, DecoderManagerOptions, DecoderState};
