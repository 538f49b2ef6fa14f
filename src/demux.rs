pub mod avc;
pub mod boxes;
pub mod buffer;
mod demuxer;
pub mod sample_table;

pub use avc::AvcConfig;
pub use buffer::SourceBuffer;
pub use demuxer::{DemuxEvent, Mp4Demuxer};
