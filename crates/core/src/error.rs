/// Result alias that carries the custom [`PreviewError`] type.
pub type Result<T> = std::result::Result<T, PreviewError>;

/// Common error type for the core crate.
///
/// Only boundary operations (loading files, normalizing scenes, creating audio
/// handles) return it. Transport commands and scheduler ticks never fail.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// Free-form error message.
    #[error("{0}")]
    Message(String),
    /// The supplied scene description cannot be played.
    #[error("invalid scene: {0}")]
    InvalidScene(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in a scene or configuration file.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Failure reported by a single audio handle.
    #[error(transparent)]
    Handle(#[from] HandleError),
}

impl PreviewError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_scene<T: Into<String>>(msg: T) -> Self {
        Self::InvalidScene(msg.into())
    }
}

impl From<&str> for PreviewError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PreviewError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Failure of an individual audio handle. The pool absorbs these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// The host refused to start playback, usually because no user gesture
    /// has unlocked audio yet.
    #[error("playback blocked by the host")]
    PlaybackBlocked,
    /// The underlying resource is missing or cannot be decoded.
    #[error("audio resource `{0}` is unavailable")]
    Unavailable(String),
}
