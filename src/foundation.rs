pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub(crate) mod math;
