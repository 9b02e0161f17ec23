//! # Downlink
//!
//! Reads everything the agent sends and routes it:
//! - **Binary speech** → Playback Queue, in receipt order
//! - **`UserStartedSpeaking`** → barge-in, the Playback Queue is drained
//! - **Other control events** → the event reporter
//! - **Close / end of stream** → normal end of the session

use crate::agent::protocol::{self, ControlMessage, InboundMessage};
use crate::audio::playback::PlaybackQueue;
use crate::error::VoiceResult;
use crate::session::status::SessionStatus;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace};

pub async fn run<S>(
    stream: &mut S,
    playback: &PlaybackQueue,
    events: UnboundedSender<ControlMessage>,
    status: &SessionStatus,
) -> VoiceResult<()>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let result = receive(stream, playback, &events, status).await;
    if let Err(e) = &result {
        error!(error = %e, session_id = %status.session_id, "Downlink failed");
    }
    result
}

async fn receive<S>(
    stream: &mut S,
    playback: &PlaybackQueue,
    events: &UnboundedSender<ControlMessage>,
    status: &SessionStatus,
) -> VoiceResult<()>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let message = message?;

        if let Message::Close(frame) = &message {
            info!(frame = ?frame, "Agent closed the connection");
            return Ok(());
        }

        match protocol::decode(message)? {
            Some(InboundMessage::Audio(chunk)) => {
                status.record_chunk_received(chunk.len());
                trace!(bytes = chunk.len(), queued = playback.len(), "Speech chunk received");
                playback.push(chunk);
            }
            Some(InboundMessage::Control(control)) => {
                status.record_control();
                route_control(control, playback, events, status);
            }
            None => {}
        }
    }

    info!("Agent connection ended");
    Ok(())
}

fn route_control(
    control: ControlMessage,
    playback: &PlaybackQueue,
    events: &UnboundedSender<ControlMessage>,
    status: &SessionStatus,
) {
    if control.is_barge_in() {
        let discarded = playback.drain();
        status.record_barge_in(discarded);
        info!(discarded, "User started speaking, agent speech interrupted");
        return;
    }

    if events.send(control).is_err() {
        debug!("Event reporter is gone, control message dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::protocol::ControlEvent;
    use crate::audio::playback::tests::RecordingSpeakers;
    use crate::audio::playback::PlaybackContext;
    use crate::audio::AudioFormat;
    use crate::backend::SessionId;
    use crate::error::VoiceError;
    use futures_util::stream;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn status() -> SessionStatus {
        SessionStatus::new(SessionId::parse("s-1").unwrap())
    }

    fn text(json: &str) -> Result<Message, WsError> {
        Ok(Message::Text(json.to_string()))
    }

    fn audio(tag: u8) -> Result<Message, WsError> {
        Ok(Message::Binary(vec![tag; 4]))
    }

    #[tokio::test]
    async fn test_barge_in_discards_queued_speech() {
        let status = status();
        let queue = PlaybackQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut incoming = stream::iter(vec![
            audio(1),
            audio(2),
            text(r#"{"type":"UserStartedSpeaking"}"#),
            audio(3),
        ]);
        run(&mut incoming, &queue, tx, &status).await.unwrap();

        assert_eq!(queue.len(), 1);
        let summary = status.summary();
        assert_eq!(summary.chunks_received, 3);
        assert_eq!(summary.barge_ins, 1);
        assert_eq!(summary.chunks_discarded, 2);

        // Barge-in is handled here, never forwarded
        assert!(rx.recv().await.is_none());

        let speakers = RecordingSpeakers::default();
        let playback = PlaybackContext::with_queue(
            &speakers,
            AudioFormat::mono16(16_000),
            Duration::from_millis(5),
            queue,
        )
        .unwrap();
        speakers.wait_for_writes(1);
        playback.release().unwrap();

        assert_eq!(speakers.written(), vec![vec![3u8; 4]]);
    }

    #[tokio::test]
    async fn test_other_control_messages_are_forwarded() {
        let status = status();
        let queue = PlaybackQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut incoming = stream::iter(vec![
            text(r#"{"type":"Welcome"}"#),
            text(r#"{"type":"ConversationText","role":"assistant","content":"Hi!"}"#),
            Ok(Message::Ping(vec![1])),
        ]);
        run(&mut incoming, &queue, tx, &status).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event, ControlEvent::Welcome);
        assert_eq!(rx.recv().await.unwrap().tag(), "ConversationText");
        assert!(rx.recv().await.is_none());
        assert_eq!(status.summary().control_messages, 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_close_frame_ends_normally() {
        let status = status();
        let queue = PlaybackQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut incoming = stream::iter(vec![audio(1), Ok(Message::Close(None)), audio(2)]);
        run(&mut incoming, &queue, tx, &status).await.unwrap();

        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_control_message_aborts() {
        let status = status();
        let queue = PlaybackQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut incoming = stream::iter(vec![text("not json"), audio(1)]);
        let err = run(&mut incoming, &queue, tx, &status).await.unwrap_err();

        assert!(matches!(err, VoiceError::Decode(_)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let status = status();
        let queue = PlaybackQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut incoming = stream::iter(vec![audio(1), Err(WsError::ConnectionClosed)]);
        let err = run(&mut incoming, &queue, tx, &status).await.unwrap_err();

        assert!(matches!(err, VoiceError::Transport(_)));
    }
}
