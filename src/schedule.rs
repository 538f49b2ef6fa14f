mod scheduler;

pub use scheduler::{FrameScheduler, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE, SchedulerEvent};
