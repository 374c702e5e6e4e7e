//! Error types for the voice loop

use thiserror::Error;

/// Result type alias for voice loop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while listening, capturing, generating or speaking
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio input device error (fatal, the device is shared by every phase)
    #[error("device error: {0}")]
    Device(String),

    /// Keyword spotter failed on a single frame
    #[error("spotter error: {0}")]
    Spotter(String),

    /// Transcription or synthesis connection failure
    #[error("stream error: {0}")]
    Stream(String),

    /// Response generator failure
    #[error("generation error: {0}")]
    Generation(String),

    /// Audio sink unavailable or died
    #[error("playback error: {0}")]
    Playback(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error should end the process rather than the current turn
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Device(_) | Self::Config(_))
    }
}
