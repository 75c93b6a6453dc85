//! PCM conversion between the capture/playback float samples and the wire's
//! 16-bit little-endian encoding, plus fixed-size outbound framing.

use crate::{ParlaError, Result};

/// Convert f32 samples in [-1.0, 1.0] to 16-bit little-endian PCM bytes
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert 16-bit little-endian PCM bytes back to f32 samples
///
/// Fails on an odd byte count, which indicates a truncated or corrupt chunk.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(ParlaError::DecodeError(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Duration in seconds of a mono sample block at the given rate
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / sample_rate as f64
}

/// Accumulates capture samples into constant-size frames.
///
/// The capture callback delivers blocks of arbitrary length; the wire wants
/// frames of a fixed sample count, emitted in capture order.
pub struct FrameChunker {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Feed samples, returning every complete frame now available
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            frames.push(self.pending.drain(..self.frame_size).collect());
        }
        frames
    }

    /// Number of buffered samples not yet forming a full frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let input = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let bytes = encode_pcm16(&input);
        assert_eq!(bytes.len(), input.len() * 2);

        let output = decode_pcm16(&bytes).unwrap();
        assert_eq!(output.len(), input.len());
        for (a, b) in input.iter().zip(output.iter()) {
            assert!((a - b).abs() < 0.001);
        }
    }

    #[test]
    fn test_encode_clamps_overrange() {
        let bytes = encode_pcm16(&[2.0, -2.0]);
        let decoded = decode_pcm16(&bytes).unwrap();
        assert!(decoded[0] > 0.99);
        assert!(decoded[1] < -0.99);
    }

    #[test]
    fn test_decode_odd_length_fails() {
        let result = decode_pcm16(&[0x00, 0x01, 0x02]);
        assert!(matches!(result, Err(crate::ParlaError::DecodeError(_))));
    }

    #[test]
    fn test_chunker_constant_frame_size() {
        let mut chunker = FrameChunker::new(100);

        assert!(chunker.push(&vec![0.1; 60]).is_empty());
        assert_eq!(chunker.pending_len(), 60);

        let frames = chunker.push(&vec![0.2; 250]);
        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.len(), 100);
        }
        assert_eq!(chunker.pending_len(), 10);
    }

    #[test]
    fn test_chunker_preserves_order() {
        let mut chunker = FrameChunker::new(4);
        let frames = chunker.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(frames[0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frames[1], vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_duration() {
        assert!((duration_secs(24_000, 24_000) - 1.0).abs() < f64::EPSILON);
        assert!((duration_secs(12_000, 24_000) - 0.5).abs() < f64::EPSILON);
    }
}
