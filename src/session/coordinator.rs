//! # Session Coordinator
//!
//! Runs one conversation from connect to teardown.
//!
//! ## Startup Order:
//! 1. Connect and authenticate to the agent
//! 2. Create the call on the backend (its id becomes the SessionId)
//! 3. Seed and fetch the menu
//! 4. Build the handshake
//! 5. Open the speaker (PlaybackContext)
//!
//! Capture, uplink, downlink and event reporting then run concurrently on
//! the current task. The first one to finish, a speaker failure, or Ctrl-C
//! ends the session.
//!
//! ## Teardown Order:
//! 1. Mark the session Closing or Errored
//! 2. Stop the microphone
//! 3. Close the connection
//! 4. Release the PlaybackContext (join the playback thread, close the speaker)

use crate::agent::connection;
use crate::agent::settings::SettingsConfiguration;
use crate::audio::capture::{self, CaptureDevice};
use crate::audio::frame_queue;
use crate::audio::playback::{PlaybackContext, SpeakerDevice, SpeakerFactory};
use crate::backend::{BackendClient, Menu};
use crate::config::AppConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::session::status::{SessionStatus, SessionSummary};
use crate::session::{downlink, events, uplink};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One voice session over a capture device and a speaker factory.
pub struct VoiceSession<C, F> {
    config: AppConfig,
    api_key: String,
    capture: C,
    speakers: F,
    backend: BackendClient,
}

impl<C, F> VoiceSession<C, F>
where
    C: CaptureDevice,
    F: SpeakerFactory,
{
    pub fn new(config: AppConfig, api_key: String, capture: C, speakers: F) -> Self {
        let backend = BackendClient::new(&config.backend.url);
        Self {
            config,
            api_key,
            capture,
            speakers,
            backend,
        }
    }

    /// Run the session to completion.
    ///
    /// Returns the traffic summary when a task ended normally (the agent
    /// closed the connection, the microphone went away, or Ctrl-C), or the
    /// first error any task hit. A speaker that stops on a write error ends
    /// the session with that error. Devices are released on every path.
    pub async fn run(mut self) -> VoiceResult<SessionSummary> {
        let ws = connection::connect(&self.config.agent.url, &self.api_key).await?;

        let session_id = self.backend.create_call().await?;
        info!(session_id = %session_id, "Session created");

        let menu = self.prepare_menu().await?;
        let settings = SettingsConfiguration::for_session(
            &self.config.agent,
            &self.config.audio,
            &self.backend,
            &session_id,
            menu.as_ref(),
        );

        let audio = &self.config.audio;
        let playback = PlaybackContext::open(
            &self.speakers,
            audio.playback_format(),
            audio.playback_poll(),
        )?;

        let status = SessionStatus::new(session_id.clone());
        let (mut sink, mut stream) = ws.split();
        let (frame_tx, frame_rx) = frame_queue::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let capture_poll = audio.capture_poll();
        let mut playback_failed = false;

        let outcome = tokio::select! {
            result = capture::run(&mut self.capture, frame_tx, capture_poll) => {
                debug!("Capture finished first");
                result
            }
            result = uplink::run(&mut sink, &settings, frame_rx, &status) => {
                debug!("Uplink finished first");
                result
            }
            result = downlink::run(&mut stream, playback.queue(), event_tx, &status) => {
                debug!("Downlink finished first");
                result
            }
            _ = events::report(&self.backend, &session_id, event_rx) => {
                debug!("Event reporter finished first");
                Ok(())
            }
            _ = playback.failed() => {
                playback_failed = true;
                Err(VoiceError::Device("Speaker playback stopped".to_string()))
            }
            _ = interrupted(tokio::signal::ctrl_c()) => Ok(()),
        };

        match &outcome {
            Ok(()) => status.mark_closing(),
            Err(e) => status.mark_errored(e.to_string()),
        }
        info!(session_id = %session_id, state = status.state().as_str(), "Tearing down session");

        if let Err(e) = self.capture.stop() {
            warn!(error = %e, "Failed to stop microphone");
        }
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Connection already closed");
        }
        let released = release_playback(playback).await;

        let summary = status.summary();
        info!(
            session_id = %summary.session_id,
            state = summary.state.as_str(),
            frames_sent = summary.frames_sent,
            bytes_sent = summary.bytes_sent,
            chunks_received = summary.chunks_received,
            bytes_received = summary.bytes_received,
            control_messages = summary.control_messages,
            barge_ins = summary.barge_ins,
            chunks_discarded = summary.chunks_discarded,
            duration_seconds = summary.duration_seconds,
            "Session ended"
        );

        if playback_failed {
            // The write error from the playback thread says more than the signal
            released?;
            outcome?;
        } else {
            outcome?;
            released?;
        }
        Ok(summary)
    }

    /// Seed the backend menu if configured, then fetch it.
    ///
    /// Seeding errors are fatal. A failed fetch only means the handshake goes
    /// out without the menu.
    async fn prepare_menu(&self) -> VoiceResult<Option<Menu>> {
        let seed = &self.config.backend.seed_menu;
        if !seed.is_empty() {
            self.backend.clear_menu().await?;
            for item in seed {
                self.backend.add_menu_item(item).await?;
            }
            info!(items = seed.len(), "Menu seeded");
        }

        match self.backend.get_menu().await {
            Ok(menu) => {
                debug!(items = menu.items.len(), "Menu fetched");
                Ok(Some(menu))
            }
            Err(e) => {
                warn!(error = %e, "Could not fetch menu, handshake will not list it");
                Ok(None)
            }
        }
    }
}

/// Stop the playback thread and close the speaker on the blocking pool.
async fn release_playback<S: SpeakerDevice>(playback: PlaybackContext<S>) -> VoiceResult<()> {
    tokio::task::spawn_blocking(move || playback.release())
        .await
        .map_err(|e| VoiceError::Device(format!("Playback release task failed: {}", e)))?
}

/// Resolves when `signal` reports Ctrl-C. If the handler could not be
/// installed the session can only end on its own, so this never resolves.
async fn interrupted<Fut>(signal: Fut)
where
    Fut: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Interrupted, ending session"),
        Err(e) => {
            warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await
        }
    }
}
