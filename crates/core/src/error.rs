/// Result alias that carries the custom [`LightSyncError`] type.
pub type Result<T> = std::result::Result<T, LightSyncError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum LightSyncError {
    /// Caller supplied something unusable: an unknown mode, a palette of the
    /// wrong size, an out-of-range test count, or a dispatcher used out of
    /// order. Raised before any actuator is commanded.
    #[error("invalid input: {0}")]
    Validation(String),
    /// The feature provider could not read or analyse the audio source.
    #[error("failed to decode audio: {0}")]
    AudioDecode(String),
    /// Schedule adjustment removed every event.
    #[error("schedule is empty after latency adjustment")]
    EmptySchedule,
    /// A single actuator rejected or failed a command.
    #[error("actuator `{actuator}` failed: {reason}")]
    ActuatorCommand { actuator: String, reason: String },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Config and feature cache (de)serialisation failures.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl LightSyncError {
    /// Creates a validation error that wraps the provided message.
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a decode error that wraps the provided message.
    pub fn decode<T: Into<String>>(msg: T) -> Self {
        Self::AudioDecode(msg.into())
    }

    pub fn actuator(actuator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActuatorCommand {
            actuator: actuator.into(),
            reason: reason.into(),
        }
    }
}

impl From<hound::Error> for LightSyncError {
    fn from(value: hound::Error) -> Self {
        Self::decode(value.to_string())
    }
}
