use std::time::Duration;

/// Convenience alias used across the crate.
pub type PlayerResult<T> = Result<T, PlayerError>;

/// Every failure the playback pipeline can surface.
///
/// Fetch, container and decoder failures all funnel into the same `error` state at the engine
/// level; the variant only tells the host which stage gave up.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// Network or filesystem failure while fetching the source (including non-2xx responses).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The fetch did not complete before its deadline.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The fetch was cancelled through its abort handle.
    #[error("fetch aborted")]
    Aborted,

    /// Malformed container data or a missing codec description.
    #[error("container error: {0}")]
    Container(String),

    /// Decoder construction, configuration or runtime failure.
    #[error("decoder error: {0}")]
    Decoder(String),

    /// Drawing surface or frame export failure.
    #[error("render error: {0}")]
    Render(String),

    /// An operation was issued in a state that cannot honor it.
    #[error("invalid state: {0}")]
    State(String),

    /// Configuration could not be parsed or is out of range.
    #[error("config error: {0}")]
    Config(String),

    /// Caller-provided input failed validation.
    #[error("validation error: {0}")]
    Validation(String),
}

impl PlayerError {
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }

    pub fn decoder(msg: impl Into<String>) -> Self {
        Self::Decoder(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// `true` for failures caused by the fetch stage (network, timeout, abort).
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Timeout(_) | Self::Aborted)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
