//! Frame Queue: microphone frames waiting to go out over the connection.
//!
//! Unbounded and order-preserving. The sending half is pushed from the audio
//! device's callback thread and never blocks; the receiving half is awaited by
//! the uplink.

use crate::audio::AudioFrame;
use tokio::sync::mpsc;

/// Create a connected sender/receiver pair for one session.
pub fn channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameSender { tx }, FrameReceiver { rx })
}

/// Producer half, owned by the capture device.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<AudioFrame>,
}

impl FrameSender {
    /// Enqueue a frame without blocking.
    ///
    /// Returns `false` once the uplink has gone away, in which case the frame
    /// is dropped.
    pub fn push(&self, frame: AudioFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Consumer half, owned by the uplink.
pub struct FrameReceiver {
    rx: mpsc::UnboundedReceiver<AudioFrame>,
}

impl FrameReceiver {
    /// Wait for the next frame. `None` once every sender is dropped and the
    /// queue is empty.
    pub async fn next(&mut self) -> Option<AudioFrame> {
        self.rx.recv().await
    }

    /// Number of frames captured but not yet picked up.
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}
