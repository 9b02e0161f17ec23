//! # Audio Pipeline Module
//!
//! Microphone capture, the queues on either side of the network, and speaker
//! playback.
//!
//! ## Key Components:
//! - **Frame Queue**: unbounded FIFO from the capture device to the uplink
//! - **Capture Source**: drives an input device and feeds the Frame Queue
//! - **Playback Queue / Worker**: FIFO from the downlink to a dedicated
//!   playback thread that performs blocking device writes
//! - **PlaybackContext**: scoped owner of the output device and the worker
//!
//! ## Audio Format Requirements:
//! - **Capture**: 48kHz, 16-bit little-endian PCM, mono, fixed-size frames
//! - **Playback**: 16kHz, 16-bit little-endian PCM, mono, any chunk size

pub mod capture;      // Capture Source and the CaptureDevice trait
pub mod frame_queue;  // Microphone → uplink queue
pub mod pcm;          // Sample conversion and fixed-size framing
pub mod playback;     // Playback queue, worker thread and PlaybackContext

#[cfg(feature = "audio-io")]
pub mod cpal_device;  // cpal-backed microphone and speaker

use std::fmt;

/// Format of a linear PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl AudioFormat {
    /// Mono 16-bit PCM at the given rate, the only layout the agent speaks.
    pub fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bit_depth: 16,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bit_depth / 8) as usize * self.channels as usize
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch/{}bit", self.sample_rate, self.channels, self.bit_depth)
    }
}

/// One fixed-size block of microphone PCM.
///
/// Produced by the capture device, sent exactly once by the uplink.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioFrame(Vec<u8>);

impl AudioFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioFrame({} bytes)", self.0.len())
    }
}

/// A variable-size block of synthesized speech from the agent.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioChunk(Vec<u8>);

impl AudioChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioChunk({} bytes)", self.0.len())
    }
}
