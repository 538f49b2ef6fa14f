//! Synthetic decoder: every chunk becomes a solid RGBA frame whose colour encodes the index
//! the fixture writer stored in the sample.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reelplay::decode::{
    DecodedFrame, EncodedVideoChunk, FrameImage, PixelFormat, VideoDecoder, VideoDecoderConfig,
};
use reelplay::{PlayerError, PlayerResult};

use super::mp4::frame_index;

/// Opaque colour for frame `index`. Neighbouring frames differ by 5 in red.
pub fn colour_for(index: u32) -> [u8; 4] {
    [((index % 51) * 5) as u8, ((index / 51) * 40) as u8, 128, 255]
}

#[derive(Clone, Debug, Default)]
pub struct DecoderStats {
    pub created: Arc<AtomicUsize>,
    pub configured: Arc<AtomicUsize>,
    pub decoded: Arc<AtomicUsize>,
}

impl DecoderStats {
    pub fn configured(&self) -> usize {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn decoded(&self) -> usize {
        self.decoded.load(Ordering::SeqCst)
    }
}

pub struct SolidColourDecoder {
    width: u32,
    height: u32,
    configured: bool,
    /// Chunks held back before output starts, like a pipelined hardware decoder.
    lag: usize,
    pending: VecDeque<EncodedVideoChunk>,
    stats: DecoderStats,
}

impl SolidColourDecoder {
    pub fn new(lag: usize, stats: DecoderStats) -> Self {
        stats.created.fetch_add(1, Ordering::SeqCst);
        Self {
            width: 0,
            height: 0,
            configured: false,
            lag,
            pending: VecDeque::new(),
            stats,
        }
    }

    fn to_frame(&self, chunk: &EncodedVideoChunk) -> PlayerResult<DecodedFrame> {
        let index = frame_index(&chunk.data)
            .ok_or_else(|| PlayerError::decoder("sample carries no frame index"))?;
        let pixels = colour_for(index).repeat((self.width * self.height) as usize);
        Ok(DecodedFrame {
            image: FrameImage::new(PixelFormat::Rgba8, self.width, self.height, pixels)?,
            timestamp_us: chunk.timestamp_us,
            duration_us: chunk.duration_us,
        })
    }
}

impl VideoDecoder for SolidColourDecoder {
    fn configure(&mut self, config: &VideoDecoderConfig) -> PlayerResult<()> {
        if !config.codec.starts_with("avc") {
            return Err(PlayerError::decoder(format!(
                "unsupported codec '{}'",
                config.codec
            )));
        }
        self.width = config.coded_width;
        self.height = config.coded_height;
        self.configured = true;
        self.stats.configured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn decode(&mut self, chunk: EncodedVideoChunk) -> PlayerResult<()> {
        if !self.configured {
            return Err(PlayerError::decoder("decode before configure"));
        }
        self.stats.decoded.fetch_add(1, Ordering::SeqCst);
        self.pending.push_back(chunk);
        Ok(())
    }

    fn decode_queue_size(&self) -> usize {
        self.pending.len()
    }

    fn poll_output(&mut self) -> PlayerResult<Option<DecodedFrame>> {
        if self.pending.len() <= self.lag {
            return Ok(None);
        }
        match self.pending.pop_front() {
            Some(chunk) => self.to_frame(&chunk).map(Some),
            None => Ok(None),
        }
    }

    fn flush(&mut self) -> PlayerResult<Vec<DecodedFrame>> {
        let chunks: Vec<_> = self.pending.drain(..).collect();
        chunks.iter().map(|c| self.to_frame(c)).collect()
    }

    fn close(&mut self) {
        self.pending.clear();
        self.configured = false;
    }
}

pub fn factory(
    lag: usize,
    stats: DecoderStats,
) -> impl Fn() -> PlayerResult<Box<dyn VideoDecoder>> + Send + 'static {
    move || Ok(Box::new(SolidColourDecoder::new(lag, stats.clone())) as Box<dyn VideoDecoder>)
}
