//! Virtual playback clock driven by host animation-frame callbacks.
//!
//! The clock only moves inside [`FrameScheduler::on_animation_frame`] and on explicit seeks, so it
//! advances at wall-clock pace regardless of how fast frames are decoded.

use tracing::debug;

use crate::foundation::core::{US_PER_MS, US_PER_SEC, us_to_ms};
use crate::foundation::events::{EventEmitter, SubscriptionId};

pub const MIN_PLAYBACK_RATE: f64 = 0.1;
pub const MAX_PLAYBACK_RATE: f64 = 4.0;

#[derive(Clone, Debug, PartialEq)]
pub enum SchedulerEvent {
    Tick { current_time_us: i64, delta_ms: f64 },
    Seek { time_us: i64 },
    Play,
    Pause,
    /// A non-looping clock reached the duration and stopped.
    Ended,
}

#[derive(Debug)]
pub struct FrameScheduler {
    current_time_us: i64,
    duration_us: i64,
    playback_rate: f64,
    looping: bool,
    running: bool,
    last_tick_ms: Option<f64>,
    events: EventEmitter<SchedulerEvent>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            current_time_us: 0,
            duration_us: 0,
            playback_rate: 1.0,
            looping: false,
            running: false,
            last_tick_ms: None,
            events: EventEmitter::new(),
        }
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&SchedulerEvent) + Send + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn events_mut(&mut self) -> &mut EventEmitter<SchedulerEvent> {
        &mut self.events
    }

    pub fn current_time_us(&self) -> i64 {
        self.current_time_us
    }

    pub fn current_time_ms(&self) -> f64 {
        us_to_ms(self.current_time_us)
    }

    pub fn duration_us(&self) -> i64 {
        self.duration_us
    }

    /// Set the clip length; the current time is clamped into the new range.
    pub fn set_duration_us(&mut self, duration_us: i64) {
        self.duration_us = duration_us.max(0);
        self.current_time_us = self.current_time_us.clamp(0, self.duration_us);
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    /// Clamp `rate` to `[MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE]` and apply it.
    ///
    /// NaN leaves the rate unchanged. Returns the rate in effect.
    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        if !rate.is_nan() {
            self.playback_rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        }
        self.playback_rate
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_playing(&self) -> bool {
        self.running
    }

    pub fn is_at_end(&self) -> bool {
        self.current_time_us >= self.duration_us
    }

    /// Start the clock. The first callback after this computes a zero delta.
    pub fn play(&mut self) {
        if self.running {
            return;
        }
        if !self.looping && self.duration_us > 0 && self.is_at_end() {
            self.seek(0);
        }
        self.running = true;
        self.last_tick_ms = None;
        self.events.emit(&SchedulerEvent::Play);
    }

    pub fn pause(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.last_tick_ms = None;
        self.events.emit(&SchedulerEvent::Pause);
    }

    /// Advance the clock to host time `now_ms`.
    ///
    /// Returns `false` without emitting anything while stopped.
    pub fn on_animation_frame(&mut self, now_ms: f64) -> bool {
        if !self.running {
            return false;
        }
        let delta_ms = match self.last_tick_ms {
            Some(prev) if now_ms.is_finite() => (now_ms - prev).max(0.0),
            _ => 0.0,
        };
        if now_ms.is_finite() {
            self.last_tick_ms = Some(now_ms);
        }

        let advance_us = (delta_ms * self.playback_rate * US_PER_MS as f64).round() as i64;
        let mut next = self.current_time_us.saturating_add(advance_us);
        let mut ended = false;
        if next >= self.duration_us {
            if self.looping {
                next = if self.duration_us > 0 {
                    next % self.duration_us
                } else {
                    0
                };
            } else {
                next = self.duration_us;
                ended = true;
            }
        }
        self.current_time_us = next;
        self.events.emit(&SchedulerEvent::Tick {
            current_time_us: next,
            delta_ms,
        });

        if ended {
            debug!(time_us = next, "clock reached the end");
            self.running = false;
            self.last_tick_ms = None;
            self.events.emit(&SchedulerEvent::Ended);
        }
        true
    }

    /// Jump to `time_us`, clamped to `[0, duration]`.
    pub fn seek(&mut self, time_us: i64) {
        let t = time_us.clamp(0, self.duration_us);
        self.current_time_us = t;
        if self.running {
            self.last_tick_ms = None;
        }
        self.events.emit(&SchedulerEvent::Seek { time_us: t });
    }

    pub fn seek_ms(&mut self, time_ms: f64) {
        self.seek(crate::foundation::core::ms_to_us(time_ms));
    }

    pub fn skip_forward(&mut self, seconds: f64) {
        self.seek(self.current_time_us.saturating_add(secs_to_us(seconds)));
    }

    pub fn skip_backward(&mut self, seconds: f64) {
        self.seek(self.current_time_us.saturating_sub(secs_to_us(seconds)));
    }

    pub fn go_to_start(&mut self) {
        self.seek(0);
    }

    pub fn go_to_end(&mut self) {
        self.seek(self.duration_us);
    }

    /// Stop, drop all subscriptions and zero the clock.
    pub fn dispose(&mut self) {
        self.pause();
        self.events.clear();
        self.current_time_us = 0;
        self.duration_us = 0;
    }
}

fn secs_to_us(seconds: f64) -> i64 {
    if !seconds.is_finite() {
        return 0;
    }
    (seconds * US_PER_SEC as f64).round() as i64
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/scheduler.rs"]
mod tests;
