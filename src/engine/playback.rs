//! The engine ties the decoder manager, scheduler and compositor into one state machine.
//!
//! Subordinate events arrive over channels (`EventEmitter::forward_to`) and are drained after
//! every command and every animation frame, so all engine state changes happen on the caller's
//! thread.

use std::sync::mpsc::{self, Receiver};

use tracing::{debug, info, trace, warn};

use crate::decode::{
    AbortHandle, DecodedFrame, DecoderEvent, DecoderFactory, DecoderManager,
    DecoderManagerOptions, DefaultDecoderFactory, DefaultFetcher, MediaFetcher,
};
use crate::foundation::config::EngineConfig;
use crate::foundation::core::{US_PER_MS, ms_to_us, us_to_ms};
use crate::foundation::error::{PlayerError, PlayerResult};
use crate::foundation::events::{EventEmitter, SubscriptionId};
use crate::media::MediaInfo;
use crate::render::{CanvasCompositor, CompositorOptions, ExportFormat, Layer};
use crate::schedule::{FrameScheduler, SchedulerEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Seeking,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    TimeUpdate {
        current_time_ms: f64,
    },
    InfoReady(MediaInfo),
    Error(PlayerError),
    Ended,
}

/// Host-provided seams. `Default` uses the filesystem/HTTP fetcher and the default decoder.
pub struct EngineDeps {
    pub fetcher: Box<dyn MediaFetcher>,
    pub decoder_factory: Box<dyn DecoderFactory>,
}

impl Default for EngineDeps {
    fn default() -> Self {
        Self {
            fetcher: Box::new(DefaultFetcher),
            decoder_factory: Box::new(DefaultDecoderFactory),
        }
    }
}

pub struct PlaybackEngine {
    config: EngineConfig,
    state: PlaybackState,
    decoder: DecoderManager,
    scheduler: FrameScheduler,
    compositor: Option<CanvasCompositor>,
    decoder_rx: Receiver<DecoderEvent>,
    scheduler_rx: Receiver<SchedulerEvent>,
    events: EventEmitter<EngineEvent>,
    last_drawn_us: Option<i64>,
    last_tick_us: Option<i64>,
    disposed: bool,
}

impl PlaybackEngine {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> PlayerResult<Self> {
        config.validate()?;
        let mut decoder = DecoderManager::new(
            DecoderManagerOptions {
                max_buffered_frames: config.buffer_size,
                fetch_timeout: config.fetch_timeout(),
            },
            deps.fetcher,
            deps.decoder_factory,
        );
        let (decoder_tx, decoder_rx) = mpsc::channel();
        decoder.events_mut().forward_to(decoder_tx);

        let mut scheduler = FrameScheduler::new();
        scheduler.set_playback_rate(config.playback_rate);
        scheduler.set_loop(config.looping);
        let (scheduler_tx, scheduler_rx) = mpsc::channel();
        scheduler.events_mut().forward_to(scheduler_tx);

        Ok(Self {
            config,
            state: PlaybackState::Idle,
            decoder,
            scheduler,
            compositor: None,
            decoder_rx,
            scheduler_rx,
            events: EventEmitter::new(),
            last_drawn_us: None,
            last_tick_us: None,
            disposed: false,
        })
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&EngineEvent) + Send + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.decoder.media_info()
    }

    pub fn current_time_ms(&self) -> f64 {
        self.scheduler.current_time_ms()
    }

    pub fn duration_ms(&self) -> f64 {
        us_to_ms(self.scheduler.duration_us())
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn playback_rate(&self) -> f64 {
        self.scheduler.playback_rate()
    }

    pub fn is_looping(&self) -> bool {
        self.scheduler.is_looping()
    }

    pub fn buffered_frames(&self) -> usize {
        self.decoder.buffered_frames()
    }

    pub fn get_frame_at_time(&self, time_us: i64) -> Option<&DecodedFrame> {
        self.decoder.get_frame_at_time(time_us)
    }

    /// Aborts the fetch of an in-progress `load` from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.decoder.abort_handle()
    }

    pub fn compositor(&self) -> Option<&CanvasCompositor> {
        self.compositor.as_ref()
    }

    pub fn compositor_mut(&mut self) -> Option<&mut CanvasCompositor> {
        self.compositor.as_mut()
    }

    /// Load `url`, replacing whatever was loaded. Always enters `Loading` first.
    #[tracing::instrument(skip(self))]
    pub fn load(&mut self, url: &str) -> PlayerResult<MediaInfo> {
        if self.disposed {
            return Err(PlayerError::state("engine is disposed"));
        }
        self.scheduler.pause();
        self.scheduler.set_duration_us(0);
        self.last_drawn_us = None;
        self.last_tick_us = None;
        self.set_state(PlaybackState::Loading);

        let result = self.decoder.load(url);
        self.process_events();
        match result {
            Ok(info) => {
                info!(duration_ms = info.duration_ms, "media loaded");
                Ok(info)
            }
            Err(e) => {
                self.enter_error(e.clone());
                Err(e)
            }
        }
    }

    pub fn play(&mut self) {
        if self.disposed || !matches!(self.state, PlaybackState::Ready | PlaybackState::Paused) {
            return;
        }
        let at_end = self.scheduler.duration_us() > 0 && self.scheduler.is_at_end();
        if at_end && !self.scheduler.is_looping() && self.seek(0.0).is_err() {
            return;
        }
        self.scheduler.play();
        self.set_state(PlaybackState::Playing);
        self.process_events();
    }

    pub fn pause(&mut self) {
        if self.disposed || self.state != PlaybackState::Playing {
            return;
        }
        self.scheduler.pause();
        self.set_state(PlaybackState::Paused);
        self.process_events();
    }

    pub fn toggle_playback(&mut self) {
        if self.state == PlaybackState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Jump to `time_ms` and settle in `Playing` or `Paused` within this call.
    #[tracing::instrument(skip(self))]
    pub fn seek(&mut self, time_ms: f64) -> PlayerResult<()> {
        if self.disposed {
            return Err(PlayerError::state("engine is disposed"));
        }
        if self.state == PlaybackState::Error {
            return Err(PlayerError::state("cannot seek after a failure; load again"));
        }
        if self.decoder.media_info().is_none() {
            return Err(PlayerError::state("nothing is loaded"));
        }
        let was_playing = self.state == PlaybackState::Playing;
        self.set_state(PlaybackState::Seeking);
        self.scheduler.seek_ms(time_ms);
        let target_ms = self.scheduler.current_time_ms();

        let result = self.decoder.seek(target_ms);
        self.process_events();
        if let Err(e) = result {
            self.enter_error(e.clone());
            return Err(e);
        }
        if self.state == PlaybackState::Error {
            return Err(self
                .decoder
                .last_error()
                .cloned()
                .unwrap_or_else(|| PlayerError::decoder("decoder failed during seek")));
        }

        self.set_state(if was_playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        });
        self.last_drawn_us = None;
        self.last_tick_us = None;
        self.render_frame_at(self.scheduler.current_time_us());
        self.process_events();
        Ok(())
    }

    pub fn skip_forward(&mut self) -> PlayerResult<()> {
        let step_ms = self.config.skip_seconds * 1_000.0;
        self.seek(self.current_time_ms() + step_ms)
    }

    pub fn skip_backward(&mut self) -> PlayerResult<()> {
        let step_ms = self.config.skip_seconds * 1_000.0;
        self.seek(self.current_time_ms() - step_ms)
    }

    pub fn go_to_start(&mut self) -> PlayerResult<()> {
        self.seek(0.0)
    }

    pub fn go_to_end(&mut self) -> PlayerResult<()> {
        self.seek(self.duration_ms())
    }

    /// Returns the rate in effect after clamping.
    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        self.scheduler.set_playback_rate(rate)
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.scheduler.set_loop(looping);
    }

    /// Drive one host animation frame at host time `now_ms`.
    pub fn on_animation_frame(&mut self, now_ms: f64) {
        if self.disposed {
            return;
        }
        self.decoder.pump();
        if let Some(compositor) = self.compositor.as_mut()
            && let Err(e) = compositor.poll()
        {
            warn!(error = %e, "compositor poll failed");
        }
        self.scheduler.on_animation_frame(now_ms);
        self.process_events();
    }

    /// Attach a drawing surface of `width` x `height` logical pixels, replacing any previous one.
    pub fn attach_canvas(&mut self, width: f64, height: f64) -> PlayerResult<()> {
        if self.disposed {
            return Err(PlayerError::state("engine is disposed"));
        }
        if let Some(mut old) = self.compositor.take() {
            old.dispose();
        }
        let mut compositor = CanvasCompositor::new(CompositorOptions {
            width,
            height,
            device_pixel_ratio: self.config.device_pixel_ratio,
            background: self.config.background,
            fit_mode: self.config.fit_mode,
        })?;
        if let Some((w, h)) = self.decoder.media_info().and_then(video_dimensions) {
            compositor.set_video_dimensions(w, h);
        }
        self.compositor = Some(compositor);
        self.last_drawn_us = None;
        self.render_frame_at(self.scheduler.current_time_us());
        Ok(())
    }

    pub fn resize_canvas(&mut self, width: f64, height: f64) -> PlayerResult<()> {
        self.compositor_or_err()?.resize(width, height)
    }

    pub fn add_layer(&mut self, layer: Layer) -> PlayerResult<()> {
        self.compositor_or_err()?.add_layer(layer)
    }

    pub fn remove_layer(&mut self, id: &str) -> PlayerResult<bool> {
        self.compositor_or_err()?.remove_layer(id)
    }

    pub fn set_layer_visibility(&mut self, id: &str, visible: bool) -> PlayerResult<bool> {
        self.compositor_or_err()?.set_layer_visibility(id, visible)
    }

    /// Block until the compositor has converted the last drawn frame.
    pub fn flush_rendering(&mut self) -> PlayerResult<()> {
        if let Some(compositor) = self.compositor.as_mut() {
            compositor.flush_pending()?;
        }
        Ok(())
    }

    pub fn export_frame(&self, format: ExportFormat, quality: f32) -> PlayerResult<String> {
        self.compositor
            .as_ref()
            .ok_or_else(|| PlayerError::state("no canvas attached"))?
            .export_frame(format, quality)
    }

    /// Tear everything down. Later commands are no-ops or `State` errors.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.scheduler.dispose();
        self.decoder.dispose();
        if let Some(mut compositor) = self.compositor.take() {
            compositor.dispose();
        }
        self.events.clear();
        self.state = PlaybackState::Idle;
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn compositor_or_err(&mut self) -> PlayerResult<&mut CanvasCompositor> {
        self.compositor
            .as_mut()
            .ok_or_else(|| PlayerError::state("no canvas attached"))
    }

    fn set_state(&mut self, to: PlaybackState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(?from, ?to, "playback state");
        self.state = to;
        self.events.emit(&EngineEvent::StateChanged { from, to });
    }

    fn enter_error(&mut self, err: PlayerError) {
        if self.state == PlaybackState::Error {
            return;
        }
        warn!(error = %err, "playback failed");
        self.scheduler.pause();
        self.set_state(PlaybackState::Error);
        self.events.emit(&EngineEvent::Error(err));
    }

    fn process_events(&mut self) {
        loop {
            let mut handled = false;
            while let Ok(event) = self.decoder_rx.try_recv() {
                handled = true;
                self.on_decoder_event(event);
            }
            while let Ok(event) = self.scheduler_rx.try_recv() {
                handled = true;
                self.on_scheduler_event(event);
            }
            if !handled {
                return;
            }
        }
    }

    fn on_decoder_event(&mut self, event: DecoderEvent) {
        match event {
            DecoderEvent::InfoReady(info) => {
                self.scheduler.set_duration_us(ms_to_us(info.duration_ms));
                if let Some((w, h)) = video_dimensions(&info)
                    && let Some(compositor) = self.compositor.as_mut()
                {
                    compositor.set_video_dimensions(w, h);
                }
                self.events.emit(&EngineEvent::InfoReady(info));
                if matches!(self.state, PlaybackState::Idle | PlaybackState::Loading) {
                    self.set_state(PlaybackState::Ready);
                }
            }
            DecoderEvent::FrameDecoded { timestamp_us } => {
                trace!(timestamp_us, "frame decoded");
                if matches!(self.state, PlaybackState::Ready | PlaybackState::Paused) {
                    self.render_frame_at(self.scheduler.current_time_us());
                }
            }
            DecoderEvent::Error(e) => self.enter_error(e),
            DecoderEvent::StateChanged(s) => trace!(state = ?s, "decoder state"),
        }
    }

    fn on_scheduler_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Tick {
                current_time_us, ..
            } => self.on_tick(current_time_us),
            SchedulerEvent::Ended => {
                if self.state == PlaybackState::Playing {
                    self.set_state(PlaybackState::Paused);
                }
                self.events.emit(&EngineEvent::Ended);
            }
            SchedulerEvent::Seek { .. } | SchedulerEvent::Play | SchedulerEvent::Pause => {}
        }
    }

    fn on_tick(&mut self, time_us: i64) {
        if self.last_tick_us.is_some_and(|prev| time_us < prev) {
            // Loop wraparound: the decoder restarts from the new position.
            debug!(time_us, "clock wrapped");
            self.last_drawn_us = None;
            if let Err(e) = self.decoder.seek(us_to_ms(time_us)) {
                self.enter_error(e);
                return;
            }
        }
        self.last_tick_us = Some(time_us);
        self.events.emit(&EngineEvent::TimeUpdate {
            current_time_ms: us_to_ms(time_us),
        });
        self.render_frame_at(time_us);
        let lookbehind_us = (self.config.eviction_lookbehind_ms as i64).saturating_mul(US_PER_MS);
        let evicted = self
            .decoder
            .consume_frames_up_to(time_us.saturating_sub(lookbehind_us));
        for frame in evicted {
            self.decoder.release_frame(frame);
        }
    }

    /// Draw the buffered frame nearest `time_us` unless it is already on the surface.
    fn render_frame_at(&mut self, time_us: i64) {
        let Some(frame) = self.decoder.get_frame_at_time(time_us) else {
            return;
        };
        if self.last_drawn_us == Some(frame.timestamp_us) {
            return;
        }
        let Some(compositor) = self.compositor.as_mut() else {
            return;
        };
        match compositor.draw_frame(frame) {
            Ok(()) => self.last_drawn_us = Some(frame.timestamp_us),
            Err(e) => warn!(error = %e, "draw_frame failed"),
        }
    }
}

fn video_dimensions(info: &MediaInfo) -> Option<(u32, u32)> {
    let video = info.video.as_ref()?;
    if video.display_width > 0 && video.display_height > 0 {
        Some((video.display_width, video.display_height))
    } else {
        Some((video.coded_width, video.coded_height))
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state)
            .field("decoder", &self.decoder)
            .field("scheduler", &self.scheduler)
            .field("compositor", &self.compositor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/playback.rs"]
mod tests;
