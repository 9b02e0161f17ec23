//! # PCM Conversion and Framing
//!
//! Audio devices hand us whatever buffer size and sample type they like. The
//! agent wants fixed-size frames of 16-bit little-endian mono samples, and
//! sends back 16-bit little-endian chunks that the speaker may want as floats.
//!
//! ## Key Functions:
//! - **FrameAssembler**: re-slices an arbitrary sample stream into fixed frames
//! - **Sample conversion**: i16 ⇄ f32 and bytes ⇄ i16

use crate::audio::AudioFrame;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Accumulates samples and emits one `AudioFrame` every `frame_samples`.
///
/// Lives inside the device callback, so it owns a single reusable buffer and
/// only allocates when a complete frame is handed out.
pub struct FrameAssembler {
    frame_samples: usize,
    pending: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(frame_samples: usize) -> Self {
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
        }
    }

    /// Size in bytes of every emitted frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * 2
    }

    /// Append samples, calling `emit` once for every completed frame.
    pub fn push_samples<F>(&mut self, samples: &[i16], mut emit: F)
    where
        F: FnMut(AudioFrame),
    {
        let frame_bytes = self.frame_bytes();
        for &sample in samples {
            // Writing into a Vec cannot fail
            let _ = self.pending.write_i16::<LittleEndian>(sample);
            if self.pending.len() == frame_bytes {
                let frame = std::mem::replace(&mut self.pending, Vec::with_capacity(frame_bytes));
                emit(AudioFrame::new(frame));
            }
        }
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

/// Convert normalized float samples to 16-bit PCM, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    let scaled = sample * 32768.0;
    scaled.clamp(-32768.0, 32767.0) as i16
}

/// Convert 16-bit PCM to a normalized float in [-1.0, 1.0).
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Decode little-endian 16-bit PCM bytes. A trailing odd byte is ignored.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    let usable = bytes.len() - bytes.len() % 2;
    let mut samples = vec![0i16; usable / 2];
    LittleEndian::read_i16_into(&bytes[..usable], &mut samples);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_emits_fixed_frames_in_order() {
        let mut assembler = FrameAssembler::new(4);
        let mut frames = Vec::new();

        assembler.push_samples(&[1, 2, 3], |f| frames.push(f));
        assert!(frames.is_empty());
        assert_eq!(assembler.pending_bytes(), 6);

        assembler.push_samples(&[4, 5, 6, 7, 8, 9], |f| frames.push(f));
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 8));
        assert_eq!(bytes_to_samples(frames[0].as_bytes()), vec![1, 2, 3, 4]);
        assert_eq!(bytes_to_samples(frames[1].as_bytes()), vec![5, 6, 7, 8]);
        assert_eq!(assembler.pending_bytes(), 2);
    }

    #[test]
    fn test_float_conversion_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), i16::MIN);
        assert!((i16_to_f32(16384) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_bytes_to_samples_ignores_trailing_byte() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x7f];
        assert_eq!(bytes_to_samples(&bytes), vec![1, -1]);
    }
}
