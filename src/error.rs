//! Error types for the Reverie engine

use thiserror::Error;

/// Reverie errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReverieError {
    /// Malformed audio payload (misaligned PCM, unparseable container)
    #[error("Decode error: {0}")]
    Decode(String),

    /// No audio-processing capability on this platform
    #[error("Playback unsupported: {0}")]
    PlaybackUnsupported(String),

    /// Platform refused to start audio until a user gesture
    #[error("Audio playback blocked until user interaction")]
    AutoplayBlocked,

    /// Duplicate start on a running sequencer
    #[error("Meditation session already active")]
    SessionAlreadyActive,

    /// Audio device initialization or operation error
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// Audio processing error (resampling, rendering)
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Persistence layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generation step failed
    #[error("Generation failed at step '{step}': {message}")]
    Generation { step: String, message: String },

    /// Too many requests for a rate-limit bucket
    #[error("Rate limit reached for '{key}', retry in {retry_after_secs}s")]
    RateLimited { key: String, retry_after_secs: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    IO(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    Channel(String),
}

impl From<std::io::Error> for ReverieError {
    fn from(e: std::io::Error) -> Self {
        ReverieError::IO(e.to_string())
    }
}

impl From<serde_json::Error> for ReverieError {
    fn from(e: serde_json::Error) -> Self {
        ReverieError::Serialization(e.to_string())
    }
}

impl ReverieError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors degrade the session (mute, partial audio) instead of
    /// stopping it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReverieError::Decode(_) => true,
            // Nothing to play on; the session must not start
            ReverieError::PlaybackUnsupported(_) => false,
            ReverieError::AutoplayBlocked => true,
            ReverieError::SessionAlreadyActive => true,
            ReverieError::AudioDevice(_) => false,
            ReverieError::AudioProcessing(_) => true,
            ReverieError::Storage(_) => false,
            ReverieError::Serialization(_) => false,
            ReverieError::Generation { .. } => true,
            ReverieError::RateLimited { .. } => true,
            ReverieError::Config(_) => false,
            ReverieError::IO(_) => false,
            ReverieError::Channel(_) => false,
        }
    }

    /// Get a user-friendly description of the error
    pub fn user_message(&self) -> String {
        match self {
            ReverieError::Decode(_) => {
                "Some audio could not be decoded and will be skipped.".to_string()
            }
            ReverieError::PlaybackUnsupported(_) => {
                "Audio playback is not supported on this device. Immersion mode is unavailable."
                    .to_string()
            }
            ReverieError::AutoplayBlocked => "Tap anywhere to enable sound.".to_string(),
            ReverieError::SessionAlreadyActive => {
                "A meditation session is already running.".to_string()
            }
            ReverieError::AudioDevice(_) => {
                "Audio device error. Please check your speakers.".to_string()
            }
            ReverieError::AudioProcessing(_) => {
                "Audio processing failed. Playback may be incomplete.".to_string()
            }
            ReverieError::Storage(_) => "Could not access saved sessions.".to_string(),
            ReverieError::Serialization(_) => "Saved data is corrupted.".to_string(),
            ReverieError::Generation { step, .. } => {
                format!("Could not complete step '{}'. Please try again.", step)
            }
            ReverieError::RateLimited { retry_after_secs, .. } => format!(
                "Request limit reached. Please wait {} seconds.",
                retry_after_secs
            ),
            ReverieError::Config(_) => "Configuration error. Please check settings.".to_string(),
            ReverieError::IO(_) => "File system error occurred.".to_string(),
            ReverieError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

/// Result type alias for Reverie operations
pub type Result<T> = std::result::Result<T, ReverieError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unsupported_playback_blocks_a_session() {
        assert!(!ReverieError::PlaybackUnsupported("no device".into()).is_recoverable());
        assert!(ReverieError::Decode("odd length".into()).is_recoverable());
        assert!(ReverieError::AutoplayBlocked.is_recoverable());
        assert!(ReverieError::SessionAlreadyActive.is_recoverable());
    }

    #[test]
    fn test_generation_message_names_step() {
        let err = ReverieError::Generation {
            step: "analysis".into(),
            message: "timeout".into(),
        };
        assert!(err.user_message().contains("analysis"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ReverieError = io.into();
        assert!(matches!(err, ReverieError::IO(_)));
    }
}
