use std::path::Path;
use std::time::Duration;

use crate::foundation::core::Rgba8;
use crate::foundation::error::{PlayerError, PlayerResult};
use crate::render::fit::FitMode;

/// Engine-wide tunables.
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on decoded frames held by the decoder manager.
    pub buffer_size: usize,
    /// Deadline for fetching the whole source file.
    pub fetch_timeout_ms: u64,
    /// Frames ending more than this far behind the playhead are evicted after each render.
    pub eviction_lookbehind_ms: u64,
    /// Step used by `skip_forward`/`skip_backward`.
    pub skip_seconds: f64,
    /// Backing-store pixels per logical pixel.
    pub device_pixel_ratio: f64,
    /// Color the surface is cleared to before each composite pass.
    pub background: Rgba8,
    pub fit_mode: FitMode,
    pub looping: bool,
    pub playback_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 30,
            fetch_timeout_ms: 15_000,
            eviction_lookbehind_ms: 100,
            skip_seconds: 5.0,
            device_pixel_ratio: 1.0,
            background: Rgba8::BLACK,
            fit_mode: FitMode::Contain,
            looping: false,
            playback_rate: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> PlayerResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| PlayerError::config(format!("engine config json parse failed: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> PlayerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PlayerError::config(format!("failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Apply `REELPLAY_*` environment overrides on top of `self`.
    ///
    /// Unparseable or zero values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_u64("REELPLAY_BUFFER_SIZE") {
            self.buffer_size = n as usize;
        }
        if let Some(n) = env_u64("REELPLAY_FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = n;
        }
        if let Some(n) = env_u64("REELPLAY_EVICTION_LOOKBEHIND_MS") {
            self.eviction_lookbehind_ms = n;
        }
        self
    }

    pub fn validate(&self) -> PlayerResult<()> {
        if self.buffer_size == 0 {
            return Err(PlayerError::config("buffer_size must be > 0"));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(PlayerError::config("fetch_timeout_ms must be > 0"));
        }
        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            return Err(PlayerError::config("device_pixel_ratio must be finite and > 0"));
        }
        if !self.skip_seconds.is_finite() || self.skip_seconds < 0.0 {
            return Err(PlayerError::config("skip_seconds must be finite and >= 0"));
        }
        if !self.playback_rate.is_finite() {
            return Err(PlayerError::config("playback_rate must be finite"));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&n| n > 0)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
