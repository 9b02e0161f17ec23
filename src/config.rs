//! # Configuration Management
//!
//! This module handles loading the client configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (`APP_AGENT__URL`, `APP_AUDIO__CAPTURE_SAMPLE_RATE`, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The agent credential is deliberately *not* part of this struct. It is read
//! from the environment variable named by `agent.api_key_env` so it never ends
//! up in a config file or a debug log.

use crate::audio::AudioFormat;
use crate::backend::Item;
use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main client configuration that contains all settings.
///
/// ## Why separate config structs:
/// The agent, the backend and the audio devices are configured independently,
/// so each gets its own section in config.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub backend: BackendConfig,
    pub audio: AudioConfig,
}

/// Remote speech agent settings.
///
/// ## Fields:
/// - `url`: WebSocket address of the agent endpoint
/// - `api_key_env`: name of the environment variable holding the credential
/// - `listen_model` / `think_*` / `speak_model`: agent behaviour sent in the handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub url: String,
    pub api_key_env: String,
    pub listen_model: String,
    pub think_provider: String,
    pub think_model: String,
    pub instructions: String,
    pub speak_model: String,
}

/// Backend order/menu service settings.
///
/// `seed_menu` is optional. When it has entries the menu on the backend is
/// replaced with them before the session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    #[serde(default)]
    pub seed_menu: Vec<Item>,
}

/// Audio device and pipeline timing settings.
///
/// ## Fields:
/// - `capture_sample_rate` / `capture_frame_samples`: microphone format, one frame
///   is `capture_frame_samples` mono 16-bit samples
/// - `playback_sample_rate`: speaker format, must match what the agent synthesizes
/// - `playback_buffer_size`: agent-side output buffer hint, sent in the handshake
/// - `playback_poll_ms`: how long the playback worker waits for a chunk before
///   re-checking its stop signal (bounds shutdown latency)
/// - `capture_poll_ms`: how often the capture loop checks the device is still active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    pub capture_frame_samples: usize,
    pub playback_sample_rate: u32,
    pub playback_buffer_size: u32,
    pub playback_poll_ms: u64,
    pub capture_poll_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                url: "ws://localhost:4000/agent".to_string(),
                api_key_env: "DEEPGRAM_API_KEY".to_string(),
                listen_model: "nova-2".to_string(),
                think_provider: "open_ai".to_string(),
                think_model: "gpt-4o".to_string(),
                instructions: "You are a drive-thru attendant taking food and drink orders. \
                               Only offer items that are on the menu."
                    .to_string(),
                speak_model: "aura-asteria-en".to_string(),
            },
            backend: BackendConfig {
                url: "http://localhost:3000".to_string(),
                seed_menu: Vec::new(),
            },
            audio: AudioConfig {
                capture_sample_rate: 48_000,
                capture_frame_samples: 8_000, // 1/6 s per frame
                playback_sample_rate: 16_000,
                playback_buffer_size: 250,
                playback_poll_ms: 50,
                capture_poll_ms: 100,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_AGENT__URL=wss://agent.example.com/agent`
    /// - `APP_BACKEND__URL=http://10.0.0.5:3000`
    /// - `APP_AUDIO__PLAYBACK_POLL_MS=20`
    ///
    /// The double underscore separates nesting levels so that field names
    /// containing a single underscore still map correctly.
    pub fn load() -> VoiceResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> VoiceResult<()> {
        check_url("agent.url", &self.agent.url, &["ws://", "wss://"])?;
        check_url("backend.url", &self.backend.url, &["http://", "https://"])?;

        if self.agent.api_key_env.trim().is_empty() {
            return Err(VoiceError::Config("agent.api_key_env cannot be empty".to_string()));
        }

        let audio = &self.audio;
        if audio.capture_sample_rate == 0 || audio.playback_sample_rate == 0 {
            return Err(VoiceError::Config("Sample rates must be greater than 0".to_string()));
        }
        if audio.capture_frame_samples == 0 {
            return Err(VoiceError::Config(
                "audio.capture_frame_samples must be greater than 0".to_string(),
            ));
        }
        if audio.playback_poll_ms == 0 || audio.capture_poll_ms == 0 {
            return Err(VoiceError::Config("Poll intervals must be greater than 0".to_string()));
        }

        for item in &self.backend.seed_menu {
            if item.name.trim().is_empty() {
                return Err(VoiceError::Config("Menu items need a name".to_string()));
            }
        }

        Ok(())
    }
}

impl AgentConfig {
    /// Read the agent credential from the environment.
    ///
    /// A missing or empty variable is a fatal configuration error; the caller
    /// is expected to report it before opening any device or connection.
    pub fn api_key(&self) -> VoiceResult<String> {
        match env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(VoiceError::Config(format!(
                "{} env var not present",
                self.api_key_env
            ))),
        }
    }
}

impl AudioConfig {
    /// Microphone format (mono, 16-bit).
    pub fn capture_format(&self) -> AudioFormat {
        AudioFormat::mono16(self.capture_sample_rate)
    }

    /// Speaker format (mono, 16-bit).
    pub fn playback_format(&self) -> AudioFormat {
        AudioFormat::mono16(self.playback_sample_rate)
    }

    pub fn playback_poll(&self) -> Duration {
        Duration::from_millis(self.playback_poll_ms)
    }

    pub fn capture_poll(&self) -> Duration {
        Duration::from_millis(self.capture_poll_ms)
    }
}

fn check_url(field: &str, url: &str, schemes: &[&str]) -> VoiceResult<()> {
    if schemes.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(())
    } else {
        Err(VoiceError::Config(format!(
            "{} must start with one of {:?}, got '{}'",
            field, schemes, url
        )))
    }
}
