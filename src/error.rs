//! Error types shared by every stage of a conversion.

use std::path::PathBuf;

/// Errors produced by the reduction, rendering and assembly stages.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source ended after {decoded} of {declared} declared frames")]
    DecodeExhausted { decoded: u64, declared: u64 },

    #[error("Video encoding failed: {0}")]
    EncodingFailed(String),

    #[error("No frames were collected, nothing to encode")]
    EmptySequence,

    #[error("Video decoding error: {0}")]
    Decode(String),

    #[error("Unsupported input {path}: {reason}")]
    UnsupportedInput { path: PathBuf, reason: String },

    #[error("Font error: {0}")]
    Font(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;
