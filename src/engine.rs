mod playback;

pub use playback::{EngineDeps, EngineEvent, PlaybackEngine, PlaybackState};
