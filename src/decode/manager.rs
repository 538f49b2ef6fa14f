use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::decode::decoder::{DecoderFactory, EncodedVideoChunk, VideoDecoder, VideoDecoderConfig};
use crate::decode::fetch::{AbortHandle, MediaFetcher};
use crate::decode::frame::DecodedFrame;
use crate::demux::{DemuxEvent, Mp4Demuxer};
use crate::foundation::core::ms_to_us;
use crate::foundation::error::{PlayerError, PlayerResult};
use crate::foundation::events::{EventEmitter, SubscriptionId};
use crate::media::{DemuxedSample, MediaInfo};

#[derive(Clone, Debug, PartialEq)]
pub struct DecoderManagerOptions {
    /// Upper bound on buffered decoded frames plus frames still inside the decoder.
    pub max_buffered_frames: usize,
    pub fetch_timeout: Duration,
}

impl Default for DecoderManagerOptions {
    fn default() -> Self {
        Self {
            max_buffered_frames: 30,
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderState {
    Idle,
    Loading,
    Ready,
    Seeking,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecoderEvent {
    StateChanged(DecoderState),
    InfoReady(MediaInfo),
    FrameDecoded { timestamp_us: i64 },
    Error(PlayerError),
}

/// Drives one video decoder and keeps a bounded buffer of decoded frames.
///
/// Per-load state is torn down by every `load`; subscriptions survive until `dispose`.
pub struct DecoderManager {
    options: DecoderManagerOptions,
    fetcher: Box<dyn MediaFetcher>,
    factory: Box<dyn DecoderFactory>,
    events: EventEmitter<DecoderEvent>,
    state: DecoderState,
    abort: AbortHandle,
    disposed: bool,
    last_error: Option<PlayerError>,

    source: Option<Arc<[u8]>>,
    demuxer: Option<Mp4Demuxer>,
    decoder: Option<Box<dyn VideoDecoder>>,
    video_track_id: Option<u32>,
    media_info: Option<MediaInfo>,
    samples: VecDeque<DemuxedSample>,
    frames: VecDeque<DecodedFrame>,
    submitting: bool,
    need_keyframe: bool,
    end_drained: bool,
    preroll_until_us: Option<i64>,
}

impl DecoderManager {
    pub fn new(
        options: DecoderManagerOptions,
        fetcher: Box<dyn MediaFetcher>,
        factory: Box<dyn DecoderFactory>,
    ) -> Self {
        Self {
            options,
            fetcher,
            factory,
            events: EventEmitter::new(),
            state: DecoderState::Idle,
            abort: AbortHandle::default(),
            disposed: false,
            last_error: None,
            source: None,
            demuxer: None,
            decoder: None,
            video_track_id: None,
            media_info: None,
            samples: VecDeque::new(),
            frames: VecDeque::new(),
            submitting: false,
            need_keyframe: true,
            end_drained: false,
            preroll_until_us: None,
        }
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&DecoderEvent) + Send + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn events_mut(&mut self) -> &mut EventEmitter<DecoderEvent> {
        &mut self.events
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.media_info.as_ref()
    }

    /// Failure that moved the manager into `Error`, until the next `load`.
    pub fn last_error(&self) -> Option<&PlayerError> {
        self.last_error.as_ref()
    }

    pub fn options(&self) -> &DecoderManagerOptions {
        &self.options
    }

    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn queued_samples(&self) -> usize {
        self.samples.len()
    }

    /// Frames submitted to the decoder that have not come back yet.
    pub fn in_flight(&self) -> usize {
        self.decoder.as_ref().map_or(0, |d| d.decode_queue_size())
    }

    pub fn frames(&self) -> impl Iterator<Item = &DecodedFrame> {
        self.frames.iter()
    }

    /// Handle that aborts the fetch of an in-progress `load` from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Fetch `url`, parse its headers and start decoding.
    ///
    /// Returns once `MediaInfo` is known. Any failure on the way moves the manager to `Error`,
    /// emits `DecoderEvent::Error` and is returned here.
    #[tracing::instrument(skip(self))]
    pub fn load(&mut self, url: &str) -> PlayerResult<MediaInfo> {
        if self.disposed {
            return Err(PlayerError::state("decoder manager is disposed"));
        }
        self.reset();
        self.set_state(DecoderState::Loading);

        let token = self.abort.arm();
        let fetched = self.fetcher.fetch(url, &token, self.options.fetch_timeout);
        self.abort.disarm();
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail_load(e)),
        };
        info!(bytes = bytes.len(), "fetched source");
        self.source = Some(Arc::from(bytes));

        match self.factory.create() {
            Ok(decoder) => self.decoder = Some(decoder),
            Err(e) => return Err(self.fail_load(e)),
        }
        self.demuxer = Some(Mp4Demuxer::new());
        self.append_source_from(0)?;

        let Some(info) = self.media_info.clone() else {
            return Err(self.fail_load(PlayerError::container(
                "no moov box found in the source",
            )));
        };

        self.pump();
        match (self.state, &self.last_error) {
            (DecoderState::Error, Some(e)) => Err(e.clone()),
            _ => Ok(info),
        }
    }

    /// Submit queued samples while the buffer has headroom.
    ///
    /// Returns the number of chunks submitted.
    pub fn process_queue(&mut self) -> usize {
        if self.submitting || self.state == DecoderState::Error {
            return 0;
        }
        self.submitting = true;
        let max = self.options.max_buffered_frames;
        let mut submitted = 0usize;

        let result = loop {
            let Some(decoder) = self.decoder.as_mut() else {
                break Ok(());
            };
            if !decoder.is_configured() {
                break Ok(());
            }
            if self.frames.len() + decoder.decode_queue_size() >= max {
                break Ok(());
            }
            let Some(sample) = self.samples.pop_front() else {
                break Ok(());
            };
            if self.need_keyframe {
                if !sample.is_keyframe {
                    trace!(timestamp_us = sample.timestamp_us, "dropping delta before keyframe");
                    continue;
                }
                self.need_keyframe = false;
            }
            if let Err(e) = decoder.decode(EncodedVideoChunk::from(&sample)) {
                break Err(e);
            }
            submitted += 1;
        };

        self.submitting = false;
        if let Err(e) = result {
            self.fail_load(e);
        }
        submitted
    }

    /// Collect finished frames and keep the decoder fed until neither side makes progress.
    ///
    /// Returns the number of frames received from the decoder.
    pub fn pump(&mut self) -> usize {
        let mut received = 0usize;
        loop {
            let mut progressed = false;
            loop {
                let Some(decoder) = self.decoder.as_mut() else {
                    break;
                };
                match decoder.poll_output() {
                    Ok(Some(frame)) => {
                        received += 1;
                        progressed = true;
                        self.admit_frame(frame);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.fail_load(e);
                        return received;
                    }
                }
            }
            if self.process_queue() > 0 {
                progressed = true;
            }
            if self.state == DecoderState::Error {
                return received;
            }
            if !progressed {
                // The whole source is appended up front, so an empty queue is end of stream.
                if self.samples.is_empty() && !self.end_drained && self.in_flight() > 0 {
                    received += self.drain_at_end_of_stream();
                    continue;
                }
                return received;
            }
        }
    }

    fn drain_at_end_of_stream(&mut self) -> usize {
        self.end_drained = true;
        let Some(decoder) = self.decoder.as_mut() else {
            return 0;
        };
        match decoder.flush() {
            Ok(frames) => {
                debug!(count = frames.len(), "drained decoder at end of stream");
                self.need_keyframe = true;
                let n = frames.len();
                frames.into_iter().for_each(|f| self.admit_frame(f));
                n
            }
            Err(e) => {
                self.fail_load(e);
                0
            }
        }
    }

    /// Buffered frame whose timestamp is closest to `time_us`.
    pub fn get_frame_at_time(&self, time_us: i64) -> Option<&DecodedFrame> {
        self.frames
            .iter()
            .min_by_key(|f| (f.timestamp_us - time_us).unsigned_abs())
    }

    /// Remove and return every frame that ends at or before `time_us`, then refill.
    pub fn consume_frames_up_to(&mut self, time_us: i64) -> Vec<DecodedFrame> {
        let mut consumed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.frames.len());
        for frame in self.frames.drain(..) {
            if frame.end_us() <= time_us {
                consumed.push(frame);
            } else {
                kept.push_back(frame);
            }
        }
        self.frames = kept;
        if !consumed.is_empty() {
            trace!(count = consumed.len(), time_us, "consumed frames");
            self.pump();
        }
        consumed
    }

    pub fn release_frame(&mut self, frame: DecodedFrame) {
        frame.close();
    }

    /// Drop all buffered work and restart decoding at `time_ms`.
    #[tracing::instrument(skip(self))]
    pub fn seek(&mut self, time_ms: f64) -> PlayerResult<()> {
        if self.disposed {
            return Err(PlayerError::state("decoder manager is disposed"));
        }
        if self.state == DecoderState::Error {
            return Err(PlayerError::state("cannot seek after a decoder failure"));
        }
        if self.source.is_none() || self.media_info.is_none() {
            return Err(PlayerError::state("nothing is loaded"));
        }
        self.set_state(DecoderState::Seeking);

        self.clear_buffers();
        if let Some(decoder) = self.decoder.as_mut() {
            match decoder.flush() {
                Ok(stale) => stale.into_iter().for_each(DecodedFrame::close),
                Err(e) => return Err(self.fail_load(e)),
            }
        }
        self.need_keyframe = true;
        self.end_drained = false;

        if time_ms <= 0.0 {
            // Offset-0 seeks rebuild the demuxer and re-append everything.
            self.preroll_until_us = None;
            if let Some(mut old) = self.demuxer.take() {
                old.dispose();
            }
            self.demuxer = Some(Mp4Demuxer::new());
            self.append_source_from(0)?;
        } else {
            self.preroll_until_us = Some(ms_to_us(time_ms));
            let offset = match self.demuxer.as_mut() {
                Some(demuxer) => demuxer.seek(time_ms),
                None => 0,
            };
            self.append_source_from(offset)?;
        }

        self.set_state(DecoderState::Ready);
        self.pump();
        Ok(())
    }

    /// Tear down per-load state; subscriptions are kept.
    pub fn reset(&mut self) {
        self.abort.abort();
        self.abort.disarm();
        self.clear_buffers();
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }
        if let Some(mut demuxer) = self.demuxer.take() {
            demuxer.dispose();
        }
        self.source = None;
        self.video_track_id = None;
        self.media_info = None;
        self.need_keyframe = true;
        self.end_drained = false;
        self.preroll_until_us = None;
        self.last_error = None;
        self.state = DecoderState::Idle;
    }

    /// Final teardown: `reset` plus dropping every subscription.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.reset();
        self.events.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Single failure path: abort the fetch, enter `Error`, emit it, hand it back to the caller.
    fn fail_load(&mut self, err: PlayerError) -> PlayerError {
        warn!(error = %err, "decoder manager failed");
        self.abort.abort();
        self.samples.clear();
        self.last_error = Some(err.clone());
        self.set_state(DecoderState::Error);
        self.events.emit(&DecoderEvent::Error(err.clone()));
        err
    }

    fn set_state(&mut self, next: DecoderState) {
        if self.state == next {
            return;
        }
        debug!(from = ?self.state, to = ?next, "decoder state");
        self.state = next;
        self.events.emit(&DecoderEvent::StateChanged(next));
    }

    fn clear_buffers(&mut self) {
        self.samples.clear();
        self.frames.drain(..).for_each(DecodedFrame::close);
    }

    fn admit_frame(&mut self, frame: DecodedFrame) {
        if let Some(until) = self.preroll_until_us {
            if frame.end_us() <= until {
                // Before the seek target: keep only the newest one.
                self.frames.drain(..).for_each(DecodedFrame::close);
                let timestamp_us = frame.timestamp_us;
                self.frames.push_back(frame);
                self.events.emit(&DecoderEvent::FrameDecoded { timestamp_us });
                return;
            }
            self.preroll_until_us = None;
        }

        if self.frames.len() >= self.options.max_buffered_frames {
            warn!(timestamp_us = frame.timestamp_us, "frame buffer full, dropping frame");
            frame.close();
            return;
        }
        let timestamp_us = frame.timestamp_us;
        self.frames.push_back(frame);
        self.events.emit(&DecoderEvent::FrameDecoded { timestamp_us });
    }

    fn append_source_from(&mut self, offset: u64) -> PlayerResult<()> {
        let (Some(source), Some(demuxer)) = (self.source.as_ref(), self.demuxer.as_mut()) else {
            return Ok(());
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(source.len());
        demuxer.append_data(&source[start..], start as u64);
        demuxer.flush();
        self.drain_demuxer()
    }

    fn drain_demuxer(&mut self) -> PlayerResult<()> {
        let events = match self.demuxer.as_mut() {
            Some(demuxer) => demuxer.drain_events(),
            None => return Ok(()),
        };

        for event in events {
            match event {
                DemuxEvent::VideoConfig(cfg) => {
                    if self.video_track_id.is_none() {
                        self.video_track_id = Some(cfg.track_id);
                    }
                    let Some(decoder) = self.decoder.as_mut() else {
                        continue;
                    };
                    if decoder.is_configured() {
                        trace!("decoder already configured");
                        continue;
                    }
                    let config = VideoDecoderConfig::from(&cfg);
                    debug!(codec = %config.codec, "configuring decoder");
                    if let Err(e) = decoder.configure(&config) {
                        return Err(self.fail_load(e));
                    }
                }
                DemuxEvent::AudioConfig(cfg) => {
                    debug!(codec = %cfg.codec, "audio track present; not decoded");
                }
                DemuxEvent::Ready(info) => {
                    if self.media_info.is_some() {
                        continue;
                    }
                    if info.video.is_none() {
                        return Err(self.fail_load(PlayerError::container(
                            "source has no supported video track",
                        )));
                    }
                    self.media_info = Some(info.clone());
                    self.set_state(DecoderState::Ready);
                    self.events.emit(&DecoderEvent::InfoReady(info));
                }
                DemuxEvent::VideoSamples { track_id, samples } => {
                    if Some(track_id) == self.video_track_id {
                        self.samples.extend(samples);
                    }
                }
                DemuxEvent::AudioSamples { samples, .. } => {
                    trace!(count = samples.len(), "dropping audio samples");
                }
                DemuxEvent::Error(e) => return Err(self.fail_load(e)),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for DecoderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderManager")
            .field("state", &self.state)
            .field("buffered_frames", &self.frames.len())
            .field("queued_samples", &self.samples.len())
            .field("media_info", &self.media_info)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/manager.rs"]
mod tests;
