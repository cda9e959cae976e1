//! 16-bit little-endian PCM decoding for streamed audio chunks.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// Sample rate of synthesized speech chunks
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
/// Channel count of synthesized speech chunks
pub const DEFAULT_CHANNELS: u16 = 1;

const BYTES_PER_SAMPLE: usize = 2;
const PCM_SCALE: f32 = 32768.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Base64 decode error: {0}")]
    Base64(String),

    #[error("Misaligned PCM payload: {len} bytes is not a multiple of {frame_bytes}")]
    Misaligned { len: usize, frame_bytes: usize },

    #[error("Invalid PCM format: {0}")]
    InvalidFormat(String),
}

/// Layout of a PCM stream, fixed for the whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl PcmFormat {
    fn frame_bytes(&self) -> usize {
        BYTES_PER_SAMPLE * self.channels as usize
    }
}

/// Deinterleaved, normalized audio ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples of one channel, `None` past the last channel
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Decode a base64 payload of interleaved i16 LE samples into an [`AudioBuffer`].
///
/// Each sample is scaled by `1/32768`, so amplitudes land in `[-1.0, 1.0)`.
/// Fails on invalid base64 or when the byte length is not a whole number of
/// frames; the caller drops the chunk in that case.
pub fn decode_base64_pcm(payload: &str, format: PcmFormat) -> Result<AudioBuffer, DecodeError> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    decode_pcm(&bytes, format)
}

/// Decode raw interleaved i16 LE bytes into an [`AudioBuffer`]
pub fn decode_pcm(bytes: &[u8], format: PcmFormat) -> Result<AudioBuffer, DecodeError> {
    if format.channels == 0 {
        return Err(DecodeError::InvalidFormat("channel count is zero".into()));
    }
    if format.sample_rate == 0 {
        return Err(DecodeError::InvalidFormat("sample rate is zero".into()));
    }

    let frame_bytes = format.frame_bytes();
    if bytes.len() % frame_bytes != 0 {
        return Err(DecodeError::Misaligned {
            len: bytes.len(),
            frame_bytes,
        });
    }

    let channel_count = format.channels as usize;
    let frames = bytes.len() / frame_bytes;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];

    for frame in bytes.chunks_exact(frame_bytes) {
        for (channel, sample) in channels.iter_mut().zip(frame.chunks_exact(BYTES_PER_SAMPLE)) {
            let raw = i16::from_le_bytes([sample[0], sample[1]]);
            channel.push(raw as f32 / PCM_SCALE);
        }
    }

    Ok(AudioBuffer::new(format.sample_rate, channels))
}

/// Convert normalized f32 samples to i16 LE bytes (inverse of [`decode_pcm`])
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut pcm_data = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);

    for &sample in samples {
        let scaled = (sample * PCM_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32);
        pcm_data.extend_from_slice(&(scaled as i16).to_le_bytes());
    }

    pcm_data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono() -> PcmFormat {
        PcmFormat::default()
    }

    #[test]
    fn test_default_format() {
        let format = PcmFormat::default();
        assert_eq!(format.sample_rate, 24_000);
        assert_eq!(format.channels, 1);
    }

    #[test]
    fn test_decode_scales_by_32768() {
        let bytes: Vec<u8> = [i16::MIN, -16384, 0, 16384, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        let buffer = decode_pcm(&bytes, mono()).unwrap();
        assert_eq!(buffer.frames(), 5);
        let samples = buffer.channel(0).unwrap();
        assert_eq!(&samples[..4], &[-1.0, -0.5, 0.0, 0.5]);
        assert!(samples[4] < 1.0);
    }

    #[test]
    fn test_decode_deinterleaves_stereo() {
        let bytes: Vec<u8> = [100i16, -100, 200, -200, 300, -300]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let format = PcmFormat {
            sample_rate: 24_000,
            channels: 2,
        };

        let buffer = decode_pcm(&bytes, format).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 3);
        assert!(buffer.channel(0).unwrap().iter().all(|&s| s > 0.0));
        assert!(buffer.channel(1).unwrap().iter().all(|&s| s < 0.0));
        assert!(buffer.channel(2).is_none());
    }

    #[test]
    fn test_frame_count_and_duration() {
        let payload = STANDARD.encode(vec![0u8; 48_000]);
        let buffer = decode_base64_pcm(&payload, mono()).unwrap();
        assert_eq!(buffer.frames(), 24_000);
        assert!((buffer.duration() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let result = decode_base64_pcm("not base64!!", mono());
        assert!(matches!(result, Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_odd_length_is_rejected() {
        let payload = STANDARD.encode([1u8, 2, 3]);
        let result = decode_base64_pcm(&payload, mono());
        assert_eq!(
            result,
            Err(DecodeError::Misaligned {
                len: 3,
                frame_bytes: 2
            })
        );
    }

    #[test]
    fn test_partial_stereo_frame_is_rejected() {
        let format = PcmFormat {
            sample_rate: 24_000,
            channels: 2,
        };
        let result = decode_pcm(&[0u8; 6], format);
        assert!(matches!(result, Err(DecodeError::Misaligned { .. })));
    }

    #[test]
    fn test_empty_payload_decodes_to_empty_buffer() {
        let buffer = decode_base64_pcm("", mono()).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.duration(), 0.0);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let samples: Vec<f32> = (0..1000)
            .map(|i| (i as f32 * 0.0137).sin() * 0.9)
            .collect();
        let payload = STANDARD.encode(encode_pcm16(&samples));

        let buffer = decode_base64_pcm(&payload, mono()).unwrap();
        for (original, decoded) in samples.iter().zip(buffer.channel(0).unwrap()) {
            assert!((original - decoded).abs() <= 1.0 / 32768.0);
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let bytes = encode_pcm16(&[2.0, -2.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
    }
}
