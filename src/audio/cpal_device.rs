//! cpal-backed microphone and speaker.
//!
//! Microphone: the cpal callback converts to i16 if needed, re-frames into
//! fixed-size frames and pushes them to the Frame Queue. Nothing else runs
//! in the callback.
//!
//! Speaker: a lock-free SPSC ring buffer sits between `write` and the cpal
//! output callback. `write` blocks while the ring is full, which makes the
//! playback thread advance at the device's pace. The cpal `Stream` is not
//! `Send` on every platform, so it is built and kept alive on its own
//! thread for as long as the speaker is open.

use crate::audio::capture::CaptureDevice;
use crate::audio::frame_queue::FrameSender;
use crate::audio::pcm::{bytes_to_samples, f32_to_i16, i16_to_f32, FrameAssembler};
use crate::audio::playback::{SpeakerDevice, SpeakerFactory};
use crate::audio::AudioFormat;
use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// How long `write` sleeps when the ring buffer is full.
const RING_FULL_BACKOFF: Duration = Duration::from_millis(5);

fn device_err(context: &str, err: impl std::fmt::Display) -> VoiceError {
    VoiceError::Device(format!("{}: {}", context, err))
}

fn stream_config(format: AudioFormat) -> StreamConfig {
    StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: BufferSize::Default,
    }
}

/// Default input device, opened at the capture format.
pub struct CpalMicrophone {
    format: AudioFormat,
    frame_samples: usize,
    stream: Option<Stream>,
    active: Arc<AtomicBool>,
}

impl CpalMicrophone {
    pub fn new(format: AudioFormat, frame_samples: usize) -> Self {
        Self {
            format,
            frame_samples,
            stream: None,
            active: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CaptureDevice for CpalMicrophone {
    fn start(&mut self, frames: FrameSender) -> VoiceResult<()> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VoiceError::Device("No input device found".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| device_err("Failed to get input config", e))?;

        info!(
            device = %device.name().unwrap_or_default(),
            format = %self.format,
            native = ?supported.sample_format(),
            "Opening microphone"
        );

        let config = stream_config(self.format);
        let err_active = self.active.clone();
        let err_fn = move |err: cpal::StreamError| {
            error!(error = %err, "Microphone stream error");
            err_active.store(false, Ordering::SeqCst);
        };
        let mut assembler = FrameAssembler::new(self.frame_samples);

        let stream = match supported.sample_format() {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    assembler.push_samples(data, |frame| {
                        frames.push(frame);
                    });
                },
                err_fn,
                None,
            ),
            SampleFormat::F32 => {
                let mut converted: Vec<i16> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        converted.clear();
                        converted.extend(data.iter().map(|&s| f32_to_i16(s)));
                        assembler.push_samples(&converted, |frame| {
                            frames.push(frame);
                        });
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(VoiceError::Device(format!(
                    "Unsupported microphone sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| device_err("Failed to build input stream", e))?;

        stream
            .play()
            .map_err(|e| device_err("Failed to start microphone", e))?;
        self.active.store(true, Ordering::SeqCst);
        self.stream = Some(stream);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn stop(&mut self) -> VoiceResult<()> {
        self.active.store(false, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| device_err("Failed to stop microphone", e))?;
            info!("Microphone closed");
        }
        Ok(())
    }
}

/// Opens the default output device.
pub struct CpalSpeakers;

impl SpeakerFactory for CpalSpeakers {
    type Speaker = CpalSpeaker;

    fn open(&self, format: AudioFormat) -> VoiceResult<CpalSpeaker> {
        // A quarter second of audio between the playback thread and the device
        let ring = HeapRb::<i16>::new((format.sample_rate as usize / 4).max(1));
        let (producer, consumer) = ring.split();

        let failed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<VoiceResult<()>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let keeper_failed = failed.clone();

        let keeper = std::thread::Builder::new()
            .name("speaker-stream".to_string())
            .spawn(move || {
                let stream = match build_output_stream(format, consumer, keeper_failed) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Keep the stream alive until the speaker is closed or dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Speaker stream dropped");
            })
            .map_err(|e| device_err("Failed to spawn speaker thread", e))?;

        ready_rx
            .recv()
            .map_err(|_| VoiceError::Device("Speaker thread exited during startup".to_string()))??;

        Ok(CpalSpeaker {
            producer,
            failed,
            shutdown: Some(shutdown_tx),
            keeper: Some(keeper),
        })
    }
}

fn build_output_stream(
    format: AudioFormat,
    mut consumer: HeapCons<i16>,
    failed: Arc<AtomicBool>,
) -> VoiceResult<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| VoiceError::Device("No output device found".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| device_err("Failed to get output config", e))?;

    info!(
        device = %device.name().unwrap_or_default(),
        format = %format,
        native = ?supported.sample_format(),
        "Opening speaker"
    );

    let config = stream_config(format);
    let err_fn = move |err: cpal::StreamError| {
        error!(error = %err, "Speaker stream error");
        failed.store(true, Ordering::SeqCst);
    };

    let stream = match supported.sample_format() {
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let filled = consumer.pop_slice(data);
                data[filled..].fill(0);
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    *out = consumer.try_pop().map(i16_to_f32).unwrap_or(0.0);
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(VoiceError::Device(format!(
                "Unsupported speaker sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| device_err("Failed to build output stream", e))?;

    stream
        .play()
        .map_err(|e| device_err("Failed to start speaker", e))?;
    Ok(stream)
}

/// An open speaker. Owned by the playback thread.
pub struct CpalSpeaker {
    producer: HeapProd<i16>,
    failed: Arc<AtomicBool>,
    shutdown: Option<mpsc::Sender<()>>,
    keeper: Option<JoinHandle<()>>,
}

impl SpeakerDevice for CpalSpeaker {
    fn write(&mut self, pcm: &[u8]) -> VoiceResult<()> {
        let samples = bytes_to_samples(pcm);
        let mut offset = 0;

        while offset < samples.len() {
            if self.failed.load(Ordering::SeqCst) {
                return Err(VoiceError::Device("Speaker stream failed".to_string()));
            }
            let pushed = self.producer.push_slice(&samples[offset..]);
            offset += pushed;
            if pushed == 0 {
                std::thread::sleep(RING_FULL_BACKOFF);
            }
        }
        Ok(())
    }

    fn close(mut self) -> VoiceResult<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(keeper) = self.keeper.take() {
            keeper
                .join()
                .map_err(|_| VoiceError::Device("Speaker thread panicked".to_string()))?;
        }
        Ok(())
    }
}
