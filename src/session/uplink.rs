//! Uplink: handshake first, then microphone frames in capture order.

use crate::agent::settings::SettingsConfiguration;
use crate::audio::frame_queue::FrameReceiver;
use crate::error::VoiceResult;
use crate::session::status::SessionStatus;
use futures_util::{Sink, SinkExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace};

/// Send the `SettingsConfiguration` message.
pub async fn send_handshake<S>(sink: &mut S, settings: &SettingsConfiguration) -> VoiceResult<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let json = settings.to_json()?;
    debug!(bytes = json.len(), "Sending handshake");
    sink.send(Message::Text(json)).await?;
    Ok(())
}

/// Forward every frame from the queue as a binary message until the queue
/// closes.
pub async fn forward_frames<S>(
    sink: &mut S,
    frames: &mut FrameReceiver,
    status: &SessionStatus,
) -> VoiceResult<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(frame) = frames.next().await {
        let bytes = frame.len();
        sink.send(Message::Binary(frame.into_bytes())).await?;
        status.record_frame_sent(bytes);
        trace!(bytes, backlog = frames.backlog(), "Frame sent");
    }

    debug!("Frame queue closed");
    Ok(())
}

/// Run the uplink for one session.
///
/// Frames are only read from the queue after the handshake went out, so
/// nothing captured early can overtake it. Errors are logged here and then
/// returned to the coordinator.
pub async fn run<S>(
    sink: &mut S,
    settings: &SettingsConfiguration,
    mut frames: FrameReceiver,
    status: &SessionStatus,
) -> VoiceResult<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let result = async {
        send_handshake(sink, settings).await?;
        status.mark_streaming();
        info!(session_id = %status.session_id, "Handshake sent, streaming microphone audio");

        forward_frames(sink, &mut frames, status).await
    }
    .await;

    if let Err(e) = &result {
        error!(error = %e, session_id = %status.session_id, "Uplink failed");
    }
    result
}
