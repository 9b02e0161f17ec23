//! # Agent Wire Protocol (inbound)
//!
//! Everything the agent sends is either a JSON text frame describing an event
//! or a binary frame of synthesized speech. Frames are classified once, here,
//! into [`InboundMessage`] so the downlink can match exhaustively instead of
//! inspecting raw frames.
//!
//! ## Message Format:
//! - **Agent → Client, text**: `{"type": "<Tag>", ...}`
//! - **Agent → Client, binary**: 16-bit PCM audio at the playback rate

use crate::audio::AudioChunk;
use crate::error::{VoiceError, VoiceResult};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Tag of the event that triggers barge-in.
pub const USER_STARTED_SPEAKING: &str = "UserStartedSpeaking";

/// A decoded frame from the agent.
#[derive(Debug)]
pub enum InboundMessage {
    Control(ControlMessage),
    Audio(AudioChunk),
}

/// Events the client understands well enough to log with their fields.
///
/// Anything else keeps its tag in `Other` and is passed along untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    /// Greeting sent right after the connection opens
    Welcome,

    /// The handshake was accepted
    SettingsApplied,

    /// A line of the transcript, from either side
    ConversationText {
        #[serde(default)]
        role: String,
        #[serde(default)]
        content: String,
    },

    /// The human started talking; unplayed agent speech must be dropped
    UserStartedSpeaking,

    AgentThinking,

    AgentStartedSpeaking,

    /// The agent finished sending audio for this turn
    AgentAudioDone,

    /// The agent reported a problem
    Error {
        #[serde(default, alias = "message")]
        description: String,
    },

    /// Unrecognized tag, kept as-is
    #[serde(skip)]
    Other(String),
}

/// One control event plus the raw JSON it came from.
#[derive(Debug, Clone)]
pub struct ControlMessage {
    pub event: ControlEvent,
    tag: String,
    pub raw: Value,
}

impl ControlMessage {
    /// Decode a text frame.
    ///
    /// Fails if the text is not JSON or has no string `type` field. A known
    /// tag whose payload doesn't match the expected shape, or an unknown tag,
    /// decodes to [`ControlEvent::Other`].
    pub fn parse(text: &str) -> VoiceResult<Self> {
        let raw: Value = serde_json::from_str(text)?;
        let tag = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                VoiceError::Decode(format!("Control message without a type field: {}", text))
            })?
            .to_string();

        let event = ControlEvent::deserialize(&raw).unwrap_or_else(|_| ControlEvent::Other(tag.clone()));

        Ok(Self { event, tag, raw })
    }

    /// The `type` field exactly as received.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_barge_in(&self) -> bool {
        matches!(self.event, ControlEvent::UserStartedSpeaking)
    }
}

/// Classify one WebSocket frame.
///
/// Returns `Ok(None)` for frames that carry nothing for the pipeline (ping,
/// pong, raw frames). Close frames are handled by the caller before this is
/// reached.
pub fn decode(message: Message) -> VoiceResult<Option<InboundMessage>> {
    match message {
        Message::Text(text) => Ok(Some(InboundMessage::Control(ControlMessage::parse(&text)?))),
        Message::Binary(data) => Ok(Some(InboundMessage::Audio(AudioChunk::new(data)))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
        Message::Close(_) => Ok(None),
    }
}
