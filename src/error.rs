//! Error types for the playback engine.
//!
//! The real-time paths (output callback, producer loop) never return these;
//! they degrade to silence or idle waiting. Errors only surface from the
//! building blocks that can genuinely fail: decoder construction, resampler
//! setup, device initialization and configuration loading.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container or codec errors reported by the decoder
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// The source has no playable audio track
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Sample-rate conversion setup or processing errors
    #[error("Resample error: {0}")]
    Resample(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current engine state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller passed parameters outside the accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<symphonia::core::errors::Error> for EngineError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymphoniaError;
        match err {
            SymphoniaError::IoError(e) => EngineError::Io(e),
            SymphoniaError::Unsupported(what) => EngineError::UnsupportedFormat(what.to_string()),
            other => EngineError::Decode(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
