mod device;

pub use device::{Microphone, MicrophoneConfig};

use std::io::Cursor;
use strum::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to encode recording: {0}")]
    Encode(#[from] hound::Error),
}

/// A chunk of mono microphone samples in i16 format
#[derive(Clone, Debug)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
}

/// Format the microphone delivers samples in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
}

/// One finished recording, ready to be sent as a single binary frame
#[derive(Debug, Clone)]
pub struct AudioBlob {
    /// 16-bit mono WAV
    pub bytes: Vec<u8>,
    pub frames: usize,
    pub sample_rate: u32,
}

impl AudioBlob {
    pub fn duration(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CaptureState {
    /// Microphone or transport not ready yet
    #[strum(serialize = "Idle")]
    Idle,
    /// Ready for a start trigger
    #[strum(serialize = "Idle")]
    Armed,
    #[strum(serialize = "Recording...")]
    Recording,
    /// The microphone could not be opened; permanent for the session
    #[strum(serialize = "Microphone unavailable")]
    Disabled,
}

/// Hold-to-talk recording gate.
///
/// A start trigger begins a recording only when the microphone is ready, the
/// transport is open and nothing is recording. Samples accumulate for the
/// whole recording and the stop trigger turns them into one [`AudioBlob`].
/// Repeated triggers in the target state are no-ops.
#[derive(Debug)]
pub struct CapturePipeline {
    state: CaptureState,
    format: Option<CaptureFormat>,
    transport_open: bool,
    samples: Vec<i16>,
    disabled_reason: Option<String>,
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl CapturePipeline {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            format: None,
            transport_open: false,
            samples: Vec::new(),
            disabled_reason: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.as_deref()
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// The microphone opened and delivers samples in `format`
    pub fn device_ready(&mut self, format: CaptureFormat) {
        if self.state == CaptureState::Disabled {
            return;
        }
        self.format = Some(format);
        self.refresh();
    }

    /// The microphone could not be opened or went away. No retry follows.
    pub fn device_denied(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        log::error!("🎤 Capture: Microphone unavailable: {}", reason);
        self.state = CaptureState::Disabled;
        self.format = None;
        self.samples.clear();
        self.disabled_reason = Some(reason);
    }

    pub fn set_transport_open(&mut self, open: bool) {
        self.transport_open = open;
        self.refresh();
    }

    fn refresh(&mut self) {
        match self.state {
            CaptureState::Idle | CaptureState::Armed => {
                self.state = if self.format.is_some() && self.transport_open {
                    CaptureState::Armed
                } else {
                    CaptureState::Idle
                };
            }
            CaptureState::Recording | CaptureState::Disabled => {}
        }
    }

    /// Begin recording. Returns whether a new recording started.
    pub fn start(&mut self) -> bool {
        if self.state != CaptureState::Armed {
            log::debug!("Capture: Start trigger ignored in state {:?}", self.state);
            return false;
        }
        self.samples.clear();
        self.state = CaptureState::Recording;
        log::info!("🎤 Capture: Recording started");
        true
    }

    /// Append microphone samples; ignored unless recording
    pub fn push_samples(&mut self, samples: &[i16]) {
        if self.state == CaptureState::Recording {
            self.samples.extend_from_slice(samples);
        }
    }

    /// Finish the recording. Returns the blob, or `None` when nothing was recording.
    pub fn stop(&mut self) -> Result<Option<AudioBlob>, CaptureError> {
        if self.state != CaptureState::Recording {
            log::debug!("Capture: Stop trigger ignored in state {:?}", self.state);
            return Ok(None);
        }

        let samples = std::mem::take(&mut self.samples);
        self.state = CaptureState::Idle;
        self.refresh();

        let Some(format) = self.format else {
            return Err(CaptureError::Config("recording without a capture format".into()));
        };

        let blob = encode_wav(&samples, format.sample_rate)?;
        log::info!(
            "🎤 Capture: Recording stopped ({:.2}s, {} bytes)",
            blob.duration(),
            blob.bytes.len()
        );
        Ok(Some(blob))
    }
}

/// Encode mono i16 samples as a WAV file in memory
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<AudioBlob, CaptureError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(AudioBlob {
        bytes: cursor.into_inner(),
        frames: samples.len(),
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_pipeline() -> CapturePipeline {
        let mut pipeline = CapturePipeline::new();
        pipeline.device_ready(CaptureFormat { sample_rate: 16_000 });
        pipeline.set_transport_open(true);
        pipeline
    }

    #[test]
    fn test_armed_needs_device_and_transport() {
        let mut pipeline = CapturePipeline::new();
        assert_eq!(pipeline.state(), CaptureState::Idle);
        pipeline.set_transport_open(true);
        assert_eq!(pipeline.state(), CaptureState::Idle);
        pipeline.device_ready(CaptureFormat { sample_rate: 16_000 });
        assert_eq!(pipeline.state(), CaptureState::Armed);
        pipeline.set_transport_open(false);
        assert_eq!(pipeline.state(), CaptureState::Idle);
    }

    #[test]
    fn test_start_requires_open_transport() {
        let mut pipeline = CapturePipeline::new();
        pipeline.device_ready(CaptureFormat { sample_rate: 16_000 });
        assert!(!pipeline.start());
        assert_eq!(pipeline.state(), CaptureState::Idle);
    }

    #[test]
    fn test_second_start_is_noop() {
        let mut pipeline = ready_pipeline();
        assert!(pipeline.start());
        pipeline.push_samples(&[1, 2, 3]);
        assert!(!pipeline.start());
        pipeline.push_samples(&[4]);

        let blob = pipeline.stop().unwrap().unwrap();
        assert_eq!(blob.frames, 4);
    }

    #[test]
    fn test_stop_without_recording_is_noop() {
        let mut pipeline = ready_pipeline();
        assert!(pipeline.stop().unwrap().is_none());
        assert_eq!(pipeline.state(), CaptureState::Armed);
    }

    #[test]
    fn test_samples_outside_recording_are_discarded() {
        let mut pipeline = ready_pipeline();
        pipeline.push_samples(&[9; 100]);
        pipeline.start();
        pipeline.push_samples(&[1; 10]);
        let blob = pipeline.stop().unwrap().unwrap();
        assert_eq!(blob.frames, 10);
        assert_eq!(pipeline.state(), CaptureState::Armed);
    }

    #[test]
    fn test_denied_device_is_permanent() {
        let mut pipeline = CapturePipeline::new();
        pipeline.device_denied("permission denied");
        pipeline.set_transport_open(true);
        pipeline.device_ready(CaptureFormat { sample_rate: 16_000 });
        assert_eq!(pipeline.state(), CaptureState::Disabled);
        assert!(!pipeline.start());
        assert_eq!(pipeline.disabled_reason(), Some("permission denied"));
    }

    #[test]
    fn test_transport_close_keeps_recording_until_stop() {
        let mut pipeline = ready_pipeline();
        pipeline.start();
        pipeline.set_transport_open(false);
        assert!(pipeline.is_recording());
        assert!(pipeline.stop().unwrap().is_some());
        assert_eq!(pipeline.state(), CaptureState::Idle);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(CaptureState::Recording.to_string(), "Recording...");
        assert_eq!(CaptureState::Armed.to_string(), "Idle");
        assert_eq!(CaptureState::Disabled.to_string(), "Microphone unavailable");
    }

    #[test]
    fn test_wav_header() {
        let blob = encode_wav(&[0, 1000, -1000], 16_000).unwrap();
        assert_eq!(&blob.bytes[0..4], b"RIFF");
        assert_eq!(&blob.bytes[8..12], b"WAVE");
        assert_eq!(blob.bytes.len(), 44 + 6);
    }
}
