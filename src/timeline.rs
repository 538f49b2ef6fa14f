//! Host-side mapping from a project timeline to the clip the engine should show.
//!
//! The playback engine knows nothing about tracks or clips; the host resolves a global time here
//! and issues `load` + `seek` for the result.

use std::collections::HashMap;

use crate::foundation::error::{PlayerError, PlayerResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Audio,
    Image,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Asset {
    pub kind: AssetKind,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Clip {
    pub asset_id: String,
    pub start_ms: f64,
    pub duration_ms: f64,
    /// Offset into the asset where the clip starts.
    #[serde(default)]
    pub trim_start_ms: f64,
}

impl Clip {
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }

    pub fn covers(&self, global_ms: f64) -> bool {
        global_ms >= self.start_ms && global_ms < self.end_ms()
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Track {
    #[serde(default)]
    pub clips: Vec<Clip>,
}

/// Where the engine should be for a given timeline position.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipCursor {
    pub asset_id: String,
    pub url: String,
    pub local_ms: f64,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub assets: HashMap<String, Asset>,
}

impl Timeline {
    pub fn from_json_str(s: &str) -> PlayerResult<Self> {
        let timeline: Self = serde_json::from_str(s)
            .map_err(|e| PlayerError::validation(format!("timeline json parse failed: {e}")))?;
        timeline.validate()?;
        Ok(timeline)
    }

    /// Every clip must reference a known asset and have a finite, non-negative placement.
    pub fn validate(&self) -> PlayerResult<()> {
        for (ti, track) in self.tracks.iter().enumerate() {
            for (ci, clip) in track.clips.iter().enumerate() {
                let finite = [clip.start_ms, clip.duration_ms, clip.trim_start_ms]
                    .iter()
                    .all(|v| v.is_finite() && *v >= 0.0);
                if !finite {
                    return Err(PlayerError::validation(format!(
                        "track {ti} clip {ci}: times must be finite and >= 0"
                    )));
                }
                if !self.assets.contains_key(&clip.asset_id) {
                    return Err(PlayerError::validation(format!(
                        "track {ti} clip {ci}: unknown asset '{}'",
                        clip.asset_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// End of the last clip on any track.
    pub fn duration_ms(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .map(Clip::end_ms)
            .fold(0.0, f64::max)
    }

    /// The video clip visible at `global_ms`: later tracks sit on top of earlier ones.
    pub fn resolve(&self, global_ms: f64) -> Option<ClipCursor> {
        self.tracks.iter().rev().find_map(|track| {
            track.clips.iter().find_map(|clip| {
                if !clip.covers(global_ms) {
                    return None;
                }
                let asset = self.assets.get(&clip.asset_id)?;
                (asset.kind == AssetKind::Video).then(|| ClipCursor {
                    asset_id: clip.asset_id.clone(),
                    url: asset.url.clone(),
                    local_ms: global_ms - clip.start_ms + clip.trim_start_ms,
                })
            })
        })
    }
}

#[cfg(test)]
#[path = "../tests/unit/timeline.rs"]
mod tests;
