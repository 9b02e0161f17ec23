//! # Drive-Thru Voice Agent - Main Application Entry Point
//!
//! Streams the default microphone to a remote speech agent over a WebSocket
//! and plays the agent's synthesized speech on the default speaker, while
//! the agent places orders on the drive-thru backend.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (config.toml + environment variables)
//! - **error**: Error categories shared by every component
//! - **audio**: Microphone capture, the Frame Queue, speaker playback
//! - **agent**: WebSocket connection, handshake payload, inbound messages
//! - **backend**: HTTP client for the order/menu service
//! - **session**: Uplink, downlink, barge-in and teardown for one conversation

// Without a device backend only the library logic is compiled in
#![cfg_attr(not(feature = "audio-io"), allow(dead_code))]

mod agent;   // Agent connection and protocol (agent/ directory)
mod audio;   // Capture and playback (audio/ directory)
mod backend; // Order/menu service client (backend.rs)
mod config;  // Configuration management (config.rs)
mod error;   // Error handling types (error.rs)
mod session; // One voice session (session/ directory)

use anyhow::Result;
use config::AppConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from `.env`, config.toml and environment variables
/// 2. **Sets up logging**
/// 3. **Reads the API key**, failing before any network or device I/O
/// 4. **Runs one voice session** until the agent hangs up or Ctrl-C
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;
    let api_key = config.agent.api_key()?;

    info!("Starting drive-thru-agent v{}", env!("CARGO_PKG_VERSION"));
    info!(agent = %config.agent.url, backend = %config.backend.url, "Configuration loaded");

    run_session(config, api_key).await
}

#[cfg(feature = "audio-io")]
async fn run_session(config: AppConfig, api_key: String) -> Result<()> {
    use audio::cpal_device::{CpalMicrophone, CpalSpeakers};
    use session::coordinator::VoiceSession;

    let microphone = CpalMicrophone::new(
        config.audio.capture_format(),
        config.audio.capture_frame_samples,
    );

    let summary = VoiceSession::new(config, api_key, microphone, CpalSpeakers)
        .run()
        .await?;

    info!(
        session_id = %summary.session_id,
        duration_seconds = summary.duration_seconds,
        "Session finished"
    );
    Ok(())
}

#[cfg(not(feature = "audio-io"))]
async fn run_session(_config: AppConfig, _api_key: String) -> Result<()> {
    anyhow::bail!("built without audio device support; rebuild with `--features audio-io`")
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "drive_thru_agent=trace")
/// - If not set, defaults to "drive_thru_agent=debug,tokio_tungstenite=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drive_thru_agent=debug,tokio_tungstenite=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
