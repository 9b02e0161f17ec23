//! # Capture Source
//!
//! Owns the microphone for the duration of a session. The device itself
//! delivers audio on its own callback thread and pushes whole frames into
//! the Frame Queue; the async side here only starts the device and keeps an
//! eye on whether it is still running.

use crate::audio::frame_queue::FrameSender;
use crate::error::VoiceResult;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An input device that can stream fixed-size frames into a Frame Queue.
///
/// Implementations must never block inside their delivery callback; pushing
/// to the `FrameSender` is the only thing the callback is expected to do.
pub trait CaptureDevice {
    /// Open the stream and begin delivering frames to `frames`.
    fn start(&mut self, frames: FrameSender) -> VoiceResult<()>;

    /// `false` once the device stopped on its own (unplugged, stream error).
    fn is_active(&self) -> bool;

    /// Stop capturing and release the device. Safe to call more than once.
    fn stop(&mut self) -> VoiceResult<()>;
}

/// Run the capture side of a session.
///
/// Returns `Ok(())` when the device reports it is no longer active. The
/// session coordinator treats that like any other task finishing and tears
/// the session down; stopping the device is left to the coordinator so it
/// also happens when this future is dropped mid-poll.
pub async fn run<C>(device: &mut C, frames: FrameSender, poll: Duration) -> VoiceResult<()>
where
    C: CaptureDevice + ?Sized,
{
    device.start(frames)?;
    info!("Microphone capture started");

    while device.is_active() {
        tokio::time::sleep(poll).await;
    }

    warn!("Microphone is no longer active");
    debug!("Capture loop finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame_queue;
    use crate::audio::AudioFrame;
    use crate::error::VoiceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Pushes its frames on start, then stays active for a few polls.
    struct ScriptedMic {
        frames: Vec<AudioFrame>,
        polls_left: AtomicUsize,
    }

    impl CaptureDevice for ScriptedMic {
        fn start(&mut self, frames: FrameSender) -> VoiceResult<()> {
            for frame in self.frames.drain(..) {
                frames.push(frame);
            }
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.polls_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }

        fn stop(&mut self) -> VoiceResult<()> {
            Ok(())
        }
    }

    struct BrokenMic;

    impl CaptureDevice for BrokenMic {
        fn start(&mut self, _frames: FrameSender) -> VoiceResult<()> {
            Err(VoiceError::Device("no input device found".to_string()))
        }

        fn is_active(&self) -> bool {
            false
        }

        fn stop(&mut self) -> VoiceResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_capture_returns_when_device_goes_inactive() {
        let (tx, mut rx) = frame_queue::channel();
        let mut mic = ScriptedMic {
            frames: vec![AudioFrame::new(vec![1; 4]), AudioFrame::new(vec![2; 4])],
            polls_left: AtomicUsize::new(3),
        };

        run(&mut mic, tx, Duration::from_millis(1)).await.unwrap();

        assert_eq!(rx.next().await.unwrap().as_bytes(), &[1; 4]);
        assert_eq!(rx.next().await.unwrap().as_bytes(), &[2; 4]);
    }

    #[tokio::test]
    async fn test_capture_start_failure_is_reported() {
        let (tx, _rx) = frame_queue::channel();
        let err = run(&mut BrokenMic, tx, Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, VoiceError::Device(_)));
    }
}
