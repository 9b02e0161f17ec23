//! # Speaker Playback
//!
//! Synthesized speech arrives on the network task but has to be written to
//! the speaker with blocking calls that run at the device's pace. The two
//! sides meet in a [`PlaybackQueue`]:
//!
//! - the downlink pushes chunks without blocking and can [`drain`] the queue
//!   when the user barges in;
//! - a dedicated playback thread pops chunks with a short timeout and writes
//!   them to the device one at a time.
//!
//! [`PlaybackContext`] owns the device, the queue and the thread for one
//! session. Dropping or releasing it always stops the thread before the
//! device is closed. If the device fails mid-session the thread exits and
//! [`PlaybackContext::failed`] resolves, so the session can end instead of
//! queueing audio nobody plays.
//!
//! [`drain`]: PlaybackQueue::drain

use crate::audio::{AudioChunk, AudioFormat};
use crate::error::{VoiceError, VoiceResult};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// An opened output device.
///
/// `write` blocks until the device has accepted the whole chunk. Only the
/// playback thread ever calls it, so implementations need no locking of
/// their own.
pub trait SpeakerDevice: Send + 'static {
    fn write(&mut self, pcm: &[u8]) -> VoiceResult<()>;

    /// Close the device. Called exactly once, after the last `write`.
    fn close(self) -> VoiceResult<()>;
}

/// Opens output devices for a playback format.
pub trait SpeakerFactory {
    type Speaker: SpeakerDevice;

    fn open(&self, format: AudioFormat) -> VoiceResult<Self::Speaker>;
}

/// FIFO of chunks waiting to be played.
///
/// Unbounded; pushing never blocks. One producer (the downlink) and one
/// consumer (the playback thread).
pub struct PlaybackQueue {
    tx: Sender<AudioChunk>,
    rx: Receiver<AudioChunk>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Queue a chunk behind everything already waiting.
    pub fn push(&self, chunk: AudioChunk) {
        // The queue holds its own receiver, so the channel can't be disconnected
        let _ = self.tx.send(chunk);
    }

    /// Barge-in: throw away every chunk that has not been handed to the
    /// device yet. The playback thread keeps running, so anything pushed
    /// afterwards plays normally.
    ///
    /// Returns how many chunks were discarded.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn consumer(&self) -> Receiver<AudioChunk> {
        self.rx.clone()
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// What the playback thread hands back when it exits.
struct WorkerExit<S> {
    speaker: S,
    error: Option<VoiceError>,
}

/// Output device, playback queue and playback thread for one session.
///
/// ## Lifecycle:
/// 1. **Acquire** ([`open`](Self::open) / [`with_queue`](Self::with_queue)):
///    opens the device, spawns the playback thread
/// 2. **Use**: the downlink pushes to [`queue`](Self::queue)
/// 3. **Release** ([`release`](Self::release) or `Drop`): sets the stop
///    signal, joins the thread, then closes the device
///
/// Release takes `self`, so once it has happened nothing can enqueue more
/// audio.
pub struct PlaybackContext<S: SpeakerDevice> {
    queue: PlaybackQueue,
    stop: Arc<AtomicBool>,
    failure: Arc<Notify>,
    worker: Option<JoinHandle<WorkerExit<S>>>,
}

impl<S: SpeakerDevice> PlaybackContext<S> {
    /// Open the speaker and start playing from a fresh queue.
    pub fn open<F>(factory: &F, format: AudioFormat, poll: Duration) -> VoiceResult<Self>
    where
        F: SpeakerFactory<Speaker = S>,
    {
        Self::with_queue(factory, format, poll, PlaybackQueue::new())
    }

    /// Open the speaker and start playing from an existing queue.
    pub fn with_queue<F>(
        factory: &F,
        format: AudioFormat,
        poll: Duration,
        queue: PlaybackQueue,
    ) -> VoiceResult<Self>
    where
        F: SpeakerFactory<Speaker = S>,
    {
        let speaker = factory.open(format)?;
        info!(format = %format, "Speaker opened");

        let stop = Arc::new(AtomicBool::new(false));
        let chunks = queue.consumer();
        let worker_stop = stop.clone();
        let failure = Arc::new(Notify::new());
        let worker_failure = failure.clone();

        let worker = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let exit = playback_loop(speaker, chunks, worker_stop, poll);
                if exit.error.is_some() {
                    worker_failure.notify_one();
                }
                exit
            })
            .map_err(|e| VoiceError::Device(format!("Failed to spawn playback thread: {}", e)))?;

        Ok(Self {
            queue,
            stop,
            failure,
            worker: Some(worker),
        })
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    /// Resolves once the playback thread has stopped on a device error.
    /// Never resolves while playback is healthy. The error itself is
    /// returned by [`release`](Self::release).
    pub async fn failed(&self) {
        self.failure.notified().await
    }

    /// Stop the playback thread and close the device.
    ///
    /// Any device error seen by the thread, or returned when closing, is
    /// returned here. A write error takes precedence over a close error.
    ///
    /// Blocks for at most one poll interval plus the write in progress.
    /// Async callers should run it on the blocking pool.
    pub fn release(mut self) -> VoiceResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> VoiceResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        self.stop.store(true, Ordering::SeqCst);
        let exit = worker
            .join()
            .map_err(|_| VoiceError::Device("Playback thread panicked".to_string()))?;

        let unplayed = self.queue.drain();
        if unplayed > 0 {
            debug!(unplayed, "Dropped unplayed chunks at shutdown");
        }

        let closed = exit.speaker.close();
        info!("Speaker closed");

        match (exit.error, closed) {
            (Some(write_err), Err(close_err)) => {
                warn!(error = %close_err, "Speaker close failed after a write error");
                Err(write_err)
            }
            (Some(write_err), Ok(())) => Err(write_err),
            (None, result) => result,
        }
    }
}

impl<S: SpeakerDevice> Drop for PlaybackContext<S> {
    // Joins the playback thread: bounded by one poll plus one write
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Playback shutdown failed");
        }
    }
}

/// Body of the playback thread.
///
/// Waits at most `poll` for each chunk so the stop signal is noticed
/// promptly even when the agent is silent.
fn playback_loop<S: SpeakerDevice>(
    mut speaker: S,
    chunks: Receiver<AudioChunk>,
    stop: Arc<AtomicBool>,
    poll: Duration,
) -> WorkerExit<S> {
    debug!("Playback thread started");

    while !stop.load(Ordering::SeqCst) {
        match chunks.recv_timeout(poll) {
            Ok(chunk) => {
                if let Err(e) = speaker.write(chunk.as_bytes()) {
                    error!(error = %e, "Speaker write failed, playback stopped");
                    return WorkerExit {
                        speaker,
                        error: Some(e),
                    };
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Playback thread observed stop signal");
    WorkerExit {
        speaker,
        error: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum SpeakerEvent {
        Opened,
        Wrote(Vec<u8>),
        Closed,
    }

    /// Records everything that happens to the speakers it opens.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSpeakers {
        pub events: Arc<Mutex<Vec<SpeakerEvent>>>,
        pub fail_writes: bool,
    }

    pub(crate) struct RecordingSpeaker {
        events: Arc<Mutex<Vec<SpeakerEvent>>>,
        fail_writes: bool,
    }

    impl RecordingSpeakers {
        pub fn events(&self) -> Vec<SpeakerEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn written(&self) -> Vec<Vec<u8>> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SpeakerEvent::Wrote(bytes) => Some(bytes),
                    _ => None,
                })
                .collect()
        }

        pub fn count(&self, wanted: &SpeakerEvent) -> usize {
            self.events().iter().filter(|e| *e == wanted).count()
        }

        /// Poll until `n` chunks were written or the deadline passes.
        pub fn wait_for_writes(&self, n: usize) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.written().len() < n && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(2));
            }
        }
    }

    impl SpeakerFactory for RecordingSpeakers {
        type Speaker = RecordingSpeaker;

        fn open(&self, _format: AudioFormat) -> VoiceResult<RecordingSpeaker> {
            self.events.lock().unwrap().push(SpeakerEvent::Opened);
            Ok(RecordingSpeaker {
                events: self.events.clone(),
                fail_writes: self.fail_writes,
            })
        }
    }

    impl SpeakerDevice for RecordingSpeaker {
        fn write(&mut self, pcm: &[u8]) -> VoiceResult<()> {
            if self.fail_writes {
                return Err(VoiceError::Device("speaker unplugged".to_string()));
            }
            self.events.lock().unwrap().push(SpeakerEvent::Wrote(pcm.to_vec()));
            Ok(())
        }

        fn close(self) -> VoiceResult<()> {
            self.events.lock().unwrap().push(SpeakerEvent::Closed);
            Ok(())
        }
    }

    /// Speaker whose writes wait for a permit on `gate` before completing.
    struct GatedSpeakers {
        entered: Sender<()>,
        gate: Receiver<()>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    struct GatedSpeaker {
        entered: Sender<()>,
        gate: Receiver<()>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SpeakerFactory for GatedSpeakers {
        type Speaker = GatedSpeaker;

        fn open(&self, _format: AudioFormat) -> VoiceResult<GatedSpeaker> {
            Ok(GatedSpeaker {
                entered: self.entered.clone(),
                gate: self.gate.clone(),
                written: self.written.clone(),
            })
        }
    }

    impl SpeakerDevice for GatedSpeaker {
        fn write(&mut self, pcm: &[u8]) -> VoiceResult<()> {
            let _ = self.entered.send(());
            self.gate
                .recv()
                .map_err(|_| VoiceError::Device("gate closed".to_string()))?;
            self.written.lock().unwrap().push(pcm.to_vec());
            Ok(())
        }

        fn close(self) -> VoiceResult<()> {
            Ok(())
        }
    }

    fn chunk(tag: u8) -> AudioChunk {
        AudioChunk::new(vec![tag; 6])
    }

    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn test_drain_discards_everything_queued() {
        let queue = PlaybackQueue::new();
        for i in 0..5 {
            queue.push(chunk(i));
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.drain(), 5);
        assert!(queue.is_empty());

        queue.push(chunk(9));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_only_chunks_after_barge_in_are_played() {
        let speakers = RecordingSpeakers::default();
        let queue = PlaybackQueue::new();

        queue.push(chunk(1));
        queue.push(chunk(2));
        assert_eq!(queue.drain(), 2);
        queue.push(chunk(3));

        let playback =
            PlaybackContext::with_queue(&speakers, AudioFormat::mono16(16_000), POLL, queue)
                .unwrap();
        speakers.wait_for_writes(1);
        playback.release().unwrap();

        assert_eq!(speakers.written(), vec![vec![3u8; 6]]);
    }

    #[test]
    fn test_barge_in_lets_the_chunk_being_written_finish() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let written = Arc::new(Mutex::new(Vec::new()));
        let speakers = GatedSpeakers {
            entered: entered_tx,
            gate: gate_rx,
            written: written.clone(),
        };

        let playback =
            PlaybackContext::open(&speakers, AudioFormat::mono16(16_000), POLL).unwrap();
        playback.queue().push(chunk(1));
        playback.queue().push(chunk(2));

        // C1 is inside write, C2 still queued
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(playback.queue().drain(), 1);
        playback.queue().push(chunk(3));

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while written.lock().unwrap().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        playback.release().unwrap();

        assert_eq!(*written.lock().unwrap(), vec![vec![1u8; 6], vec![3u8; 6]]);
    }

    #[tokio::test]
    async fn test_write_failure_is_signalled() {
        let speakers = RecordingSpeakers {
            fail_writes: true,
            ..Default::default()
        };
        let playback =
            PlaybackContext::open(&speakers, AudioFormat::mono16(16_000), POLL).unwrap();
        playback.queue().push(chunk(1));

        tokio::time::timeout(Duration::from_secs(5), playback.failed())
            .await
            .expect("playback failure was not signalled");
        assert!(matches!(playback.release(), Err(VoiceError::Device(_))));
    }

    #[tokio::test]
    async fn test_healthy_playback_never_signals_failure() {
        let speakers = RecordingSpeakers::default();
        let playback =
            PlaybackContext::open(&speakers, AudioFormat::mono16(16_000), POLL).unwrap();
        playback.queue().push(chunk(1));
        speakers.wait_for_writes(1);

        let signalled = tokio::time::timeout(Duration::from_millis(50), playback.failed()).await;
        assert!(signalled.is_err());
        playback.release().unwrap();
    }

    #[test]
    fn test_chunks_play_in_receipt_order() {
        let speakers = RecordingSpeakers::default();
        let playback =
            PlaybackContext::open(&speakers, AudioFormat::mono16(16_000), POLL).unwrap();
        for i in 0..10 {
            playback.queue().push(chunk(i));
        }
        speakers.wait_for_writes(10);
        playback.release().unwrap();

        let expected: Vec<Vec<u8>> = (0..10).map(|i| vec![i; 6]).collect();
        assert_eq!(speakers.written(), expected);
    }

    #[test]
    fn test_device_opened_and_closed_once() {
        let speakers = RecordingSpeakers::default();
        let playback =
            PlaybackContext::open(&speakers, AudioFormat::mono16(16_000), POLL).unwrap();
        playback.queue().push(chunk(1));
        speakers.wait_for_writes(1);
        playback.release().unwrap();

        let events = speakers.events();
        assert_eq!(speakers.count(&SpeakerEvent::Opened), 1);
        assert_eq!(speakers.count(&SpeakerEvent::Closed), 1);
        assert_eq!(events.first(), Some(&SpeakerEvent::Opened));
        assert_eq!(events.last(), Some(&SpeakerEvent::Closed));
    }

    #[test]
    fn test_drop_releases_device() {
        let speakers = RecordingSpeakers::default();
        {
            let _playback =
                PlaybackContext::open(&speakers, AudioFormat::mono16(16_000), POLL).unwrap();
        }
        assert_eq!(speakers.count(&SpeakerEvent::Opened), 1);
        assert_eq!(speakers.count(&SpeakerEvent::Closed), 1);
    }

    #[test]
    fn test_write_error_surfaces_on_release_and_device_still_closed() {
        let speakers = RecordingSpeakers {
            fail_writes: true,
            ..Default::default()
        };
        let playback =
            PlaybackContext::open(&speakers, AudioFormat::mono16(16_000), POLL).unwrap();
        playback.queue().push(chunk(1));

        // Give the thread time to hit the failing write
        std::thread::sleep(Duration::from_millis(50));
        let err = playback.release().unwrap_err();

        assert!(matches!(err, VoiceError::Device(_)));
        assert_eq!(speakers.count(&SpeakerEvent::Closed), 1);
    }
}
