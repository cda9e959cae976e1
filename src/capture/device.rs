use super::{AudioChunk, CaptureError, CaptureFormat};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, FromSample, Sample, SampleFormat, SizedSample, StreamConfig,
};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 480;
const CHANNEL_CAPACITY: usize = 256;

/// Microphone configuration
#[derive(Debug, Clone, Default)]
pub struct MicrophoneConfig {
    /// Input device name (None = default device)
    pub device_name: Option<String>,
}

/// Open microphone streaming mono i16 chunks in the device's native rate.
///
/// The cpal stream is owned by a dedicated thread and stopped on drop.
pub struct Microphone {
    format: CaptureFormat,
    stop_sender: std_mpsc::Sender<()>,
    capture_thread: Option<thread::JoinHandle<()>>,
}

impl Microphone {
    pub fn open(
        config: &MicrophoneConfig,
    ) -> Result<(Self, mpsc::Receiver<AudioChunk>), CaptureError> {
        let host = cpal::default_host();

        let device = if let Some(name) = &config.device_name {
            host.input_devices()
                .map_err(|e| CaptureError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| CaptureError::Device(format!("Device not found: {}", name)))?
        } else {
            host.default_input_device()
                .ok_or_else(|| CaptureError::Device("No default input device found".into()))?
        };

        let supported_config = device
            .default_input_config()
            .map_err(|e| CaptureError::Config(e.to_string()))?;
        let sample_format = supported_config.sample_format();
        let stream_config = supported_config.config();
        let format = CaptureFormat {
            sample_rate: stream_config.sample_rate.0,
        };

        log::info!(
            "🎤 Capture: {} channels @ {}Hz (format: {:?})",
            stream_config.channels,
            format.sample_rate,
            sample_format
        );

        let (chunk_sender, chunk_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (stop_sender, stop_receiver) = std_mpsc::channel();
        let (ready_sender, ready_receiver) = std_mpsc::channel();

        let capture_thread = thread::spawn(move || {
            let stream = match sample_format {
                SampleFormat::I16 => {
                    Self::build_stream::<i16>(&device, &stream_config, chunk_sender)
                }
                SampleFormat::U16 => {
                    Self::build_stream::<u16>(&device, &stream_config, chunk_sender)
                }
                SampleFormat::F32 => {
                    Self::build_stream::<f32>(&device, &stream_config, chunk_sender)
                }
                other => Err(CaptureError::Config(format!(
                    "Unsupported sample format: {:?}",
                    other
                ))),
            }
            .and_then(|stream| {
                stream
                    .play()
                    .map_err(|e| CaptureError::Stream(e.to_string()))?;
                Ok(stream)
            });

            match stream {
                Ok(stream) => {
                    let _ = ready_sender.send(Ok(()));
                    // Park until the handle is dropped
                    let _ = stop_receiver.recv();
                    log::debug!("Capture: Microphone thread exiting");
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_sender.send(Err(e));
                }
            }
        });

        match ready_receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = capture_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = capture_thread.join();
                return Err(CaptureError::Stream(
                    "Microphone thread exited before the stream started".into(),
                ));
            }
        }

        Ok((
            Self {
                format,
                stop_sender,
                capture_thread: Some(capture_thread),
            },
            chunk_receiver,
        ))
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        sender: mpsc::Sender<AudioChunk>,
    ) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample + Send + Sync + 'static,
        i16: FromSample<T>,
    {
        let channels = config.channels as usize;

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    for chunk in first_channel_chunks(data, channels, CHUNK_SIZE) {
                        if sender.try_send(chunk).is_err() {
                            log::debug!("Capture: Dropping chunk, receiver is full or gone");
                        }
                    }
                },
                move |err| {
                    log::error!("Capture: Stream error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }

    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }
}

/// Split one callback's interleaved frames into chunks of channel 0 as i16.
///
/// Nothing is carried over between callbacks, so the last chunk may be short.
fn first_channel_chunks<T>(data: &[T], channels: usize, chunk_size: usize) -> Vec<AudioChunk>
where
    T: Sample,
    i16: FromSample<T>,
{
    let samples: Vec<i16> = data
        .chunks(channels.max(1))
        .filter_map(|frame| frame.first().map(|&s| i16::from_sample(s)))
        .collect();

    samples
        .chunks(chunk_size.max(1))
        .map(|chunk| AudioChunk {
            samples: chunk.to_vec(),
        })
        .collect()
}

impl Drop for Microphone {
    fn drop(&mut self) {
        let _ = self.stop_sender.send(());
        if let Some(thread) = self.capture_thread.take() {
            if let Err(e) = thread.join() {
                log::error!("Failed to join capture thread: {:?}", e);
            }
        }
    }
}
