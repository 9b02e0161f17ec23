//! # Error Handling
//!
//! Custom error type shared by every part of the voice pipeline.
//!
//! ## Error Categories:
//! - **Config**: missing credential or invalid settings, reported before any I/O
//! - **Transport**: WebSocket connect/send/receive failures
//! - **Decode**: a control message from the agent could not be understood
//! - **Device**: opening, writing or closing an audio device failed
//! - **Backend**: the order/menu HTTP service failed or answered with an error
//!
//! None of these are retried. A task that hits one returns it, the session
//! coordinator tears the session down, and `main` prints it.

use std::fmt;
use tokio_tungstenite::tungstenite;

/// Custom error types for the voice client.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(VoiceError::Device("no output device available".to_string()));
/// ```
#[derive(Debug)]
pub enum VoiceError {
    /// Configuration file, environment variable or credential problems
    Config(String),

    /// The duplex connection could not be opened, written or read
    Transport(String),

    /// An inbound control message was malformed
    Decode(String),

    /// Audio device failure (input or output)
    Device(String),

    /// The backend order service failed
    Backend(String),
}

impl VoiceError {
    /// Short machine-readable name, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceError::Config(_) => "config",
            VoiceError::Transport(_) => "transport",
            VoiceError::Decode(_) => "decode",
            VoiceError::Device(_) => "device",
            VoiceError::Backend(_) => "backend",
        }
    }
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::Config(msg) => write!(f, "Configuration error: {}", msg),
            VoiceError::Transport(msg) => write!(f, "Transport error: {}", msg),
            VoiceError::Decode(msg) => write!(f, "Decode error: {}", msg),
            VoiceError::Device(msg) => write!(f, "Audio device error: {}", msg),
            VoiceError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for VoiceError {}

/// WebSocket failures are always transport errors.
impl From<tungstenite::Error> for VoiceError {
    fn from(err: tungstenite::Error) -> Self {
        VoiceError::Transport(err.to_string())
    }
}

/// JSON failures only happen while decoding agent control messages or
/// encoding the handshake, both of which are protocol problems.
impl From<serde_json::Error> for VoiceError {
    fn from(err: serde_json::Error) -> Self {
        VoiceError::Decode(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        VoiceError::Backend(err.to_string())
    }
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, VoiceError>`.
pub type VoiceResult<T> = Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category() {
        let err = VoiceError::Device("speaker unplugged".to_string());
        assert_eq!(err.to_string(), "Audio device error: speaker unplugged");
        assert_eq!(err.kind(), "device");
    }

    #[test]
    fn test_json_errors_become_decode_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: VoiceError = json_err.into();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn test_transport_conversion() {
        let err: VoiceError = tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, VoiceError::Transport(_)));
    }
}
