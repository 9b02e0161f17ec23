//! # Session Status
//!
//! State machine and traffic counters for the one conversation a process
//! runs. Shared by reference between the uplink, the downlink and the
//! coordinator, all of which run on the same task.
//!
//! ## Session Lifecycle:
//! 1. **AwaitingHandshakeSent**: connected, nothing sent yet
//! 2. **Streaming**: handshake sent, audio flowing both ways
//! 3. **Closing**: a task finished normally (or Ctrl-C); tearing down
//! 4. **Errored**: a task failed; tearing down

use crate::backend::SessionId;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    AwaitingHandshakeSent,
    Streaming,
    Closing,
    Errored(String),
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::AwaitingHandshakeSent => "awaiting_handshake_sent",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
            SessionState::Errored(_) => "errored",
        }
    }

    /// Closing and Errored are final; the first one reached sticks.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Errored(_))
    }
}

/// Live status of the current session.
pub struct SessionStatus {
    pub session_id: SessionId,
    state: Mutex<SessionState>,
    pub created_at: DateTime<Utc>,
    ended_at: Mutex<Option<DateTime<Utc>>>,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    chunks_received: AtomicU64,
    bytes_received: AtomicU64,
    control_messages: AtomicU64,
    barge_ins: AtomicU64,
    chunks_discarded: AtomicU64,
}

/// Snapshot of a session's counters, logged at teardown.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub state: SessionState,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub control_messages: u64,
    pub barge_ins: u64,
    pub chunks_discarded: u64,
    pub duration_seconds: f64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionStatus {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: Mutex::new(SessionState::AwaitingHandshakeSent),
            created_at: Utc::now(),
            ended_at: Mutex::new(None),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            control_messages: AtomicU64::new(0),
            barge_ins: AtomicU64::new(0),
            chunks_discarded: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.state).clone()
    }

    /// AwaitingHandshakeSent → Streaming. Ignored in any other state.
    pub fn mark_streaming(&self) {
        let mut state = lock(&self.state);
        if *state == SessionState::AwaitingHandshakeSent {
            *state = SessionState::Streaming;
        }
    }

    pub fn mark_closing(&self) {
        self.finish(SessionState::Closing);
    }

    pub fn mark_errored(&self, reason: impl Into<String>) {
        self.finish(SessionState::Errored(reason.into()));
    }

    fn finish(&self, terminal: SessionState) {
        let mut state = lock(&self.state);
        if !state.is_terminal() {
            *state = terminal;
            *lock(&self.ended_at) = Some(Utc::now());
        }
    }

    pub fn record_frame_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_chunk_received(&self, bytes: usize) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_control(&self) {
        self.control_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_barge_in(&self, discarded: usize) {
        self.barge_ins.fetch_add(1, Ordering::Relaxed);
        self.chunks_discarded.fetch_add(discarded as u64, Ordering::Relaxed);
    }

    /// Seconds from creation to the end of the session (or to now).
    pub fn duration_seconds(&self) -> f64 {
        let end = lock(&self.ended_at).unwrap_or_else(Utc::now);
        end.signed_duration_since(self.created_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.to_string(),
            state: self.state(),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            control_messages: self.control_messages.load(Ordering::Relaxed),
            barge_ins: self.barge_ins.load(Ordering::Relaxed),
            chunks_discarded: self.chunks_discarded.load(Ordering::Relaxed),
            duration_seconds: self.duration_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> SessionStatus {
        SessionStatus::new(SessionId::parse("s-1").unwrap())
    }

    #[test]
    fn test_state_transitions() {
        let status = status();
        assert_eq!(status.state(), SessionState::AwaitingHandshakeSent);

        status.mark_streaming();
        assert_eq!(status.state(), SessionState::Streaming);

        status.mark_errored("uplink failed");
        assert_eq!(status.state(), SessionState::Errored("uplink failed".to_string()));
    }

    #[test]
    fn test_first_terminal_state_wins() {
        let status = status();
        status.mark_streaming();
        status.mark_closing();
        status.mark_errored("late failure");
        status.mark_streaming();
        assert_eq!(status.state(), SessionState::Closing);
        assert_eq!(status.state().as_str(), "closing");
    }

    #[test]
    fn test_summary_counts_traffic() {
        let status = status();
        status.record_frame_sent(16_000);
        status.record_frame_sent(16_000);
        status.record_chunk_received(500);
        status.record_control();
        status.record_barge_in(3);
        status.mark_closing();

        let summary = status.summary();
        assert_eq!(summary.session_id, "s-1");
        assert_eq!(summary.frames_sent, 2);
        assert_eq!(summary.bytes_sent, 32_000);
        assert_eq!(summary.chunks_received, 1);
        assert_eq!(summary.bytes_received, 500);
        assert_eq!(summary.control_messages, 1);
        assert_eq!(summary.barge_ins, 1);
        assert_eq!(summary.chunks_discarded, 3);
        assert!(summary.duration_seconds >= 0.0);
    }
}
