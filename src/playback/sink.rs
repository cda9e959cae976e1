use super::{AudioOutput, PlaybackError, ScheduledBuffer};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

pub struct CpalSinkConfig {
    /// Output device name (None = default device)
    pub device_name: Option<String>,
    /// Sample rate to request from the device when it supports it
    pub preferred_sample_rate: u32,
    /// Warn when audio is scheduled further ahead than this (seconds)
    pub high_water_secs: f64,
}

impl Default for CpalSinkConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            preferred_sample_rate: crate::pcm::DEFAULT_SAMPLE_RATE,
            high_water_secs: 45.0,
        }
    }
}

enum SinkCommand {
    Schedule(ScheduledBuffer),
    Stop,
}

/// State shared between the sink handle, its thread and the device callback
struct SinkClock {
    frames_rendered: AtomicU64,
    output_rate: u32,
}

impl SinkClock {
    fn seconds(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.output_rate as f64
    }
}

type PendingQueue = Arc<Mutex<VecDeque<ScheduledBuffer>>>;

/// Output device sink whose clock is the number of frames the device has rendered.
///
/// The stream lives on a dedicated thread; scheduled buffers reach it through
/// a command channel and are kept ordered by start time.
pub struct CpalSink {
    command_sender: Sender<SinkCommand>,
    clock: Arc<SinkClock>,
    config: CpalSinkConfig,
    is_stopped: Arc<AtomicBool>,
    audio_thread: Option<thread::JoinHandle<()>>,
}

impl CpalSink {
    pub fn new(config: CpalSinkConfig) -> Result<Self, PlaybackError> {
        log::debug!("Playback: Creating new CpalSink");
        let host = cpal::default_host();
        log::debug!("Playback: Using audio host: {:?}", host.id());

        let device = match &config.device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| PlaybackError::DeviceError(e.to_string()))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| {
                    PlaybackError::DeviceError(format!("Output device not found: {}", name))
                })?,
            None => host.default_output_device().ok_or_else(|| {
                PlaybackError::DeviceError("No output device found".to_string())
            })?,
        };
        log::debug!("Playback: Using output device: {:?}", device.name());

        let (stream_config, sample_format) =
            Self::select_config(&device, config.preferred_sample_rate)?;
        log::info!(
            "🔊 Playback: {} channels @ {}Hz (format: {:?})",
            stream_config.channels,
            stream_config.sample_rate.0,
            sample_format
        );

        let clock = Arc::new(SinkClock {
            frames_rendered: AtomicU64::new(0),
            output_rate: stream_config.sample_rate.0,
        });
        let (command_sender, command_receiver) = channel();
        let (ready_sender, ready_receiver) = channel();
        let thread_clock = Arc::clone(&clock);

        let audio_thread = thread::spawn(move || {
            Self::run_stream(
                device,
                stream_config,
                sample_format,
                thread_clock,
                command_receiver,
                ready_sender,
            );
        });

        match ready_receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = audio_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = audio_thread.join();
                return Err(PlaybackError::DeviceError(
                    "Audio thread exited before the stream started".to_string(),
                ));
            }
        }

        log::debug!("Playback: Successfully created CpalSink");
        Ok(Self {
            command_sender,
            clock,
            config,
            is_stopped: Arc::new(AtomicBool::new(false)),
            audio_thread: Some(audio_thread),
        })
    }

    /// Prefer a config that runs natively at the source rate, else the device default
    fn select_config(
        device: &Device,
        sample_rate: u32,
    ) -> Result<(StreamConfig, SampleFormat), PlaybackError> {
        let native = device
            .supported_output_configs()
            .map_err(|e| PlaybackError::DeviceError(e.to_string()))?
            .find(|range| {
                range.sample_format() == SampleFormat::F32
                    && range.min_sample_rate().0 <= sample_rate
                    && range.max_sample_rate().0 >= sample_rate
            })
            .map(|range| range.with_sample_rate(cpal::SampleRate(sample_rate)));

        let supported = match native {
            Some(config) => config,
            None => device
                .default_output_config()
                .map_err(|e| PlaybackError::DeviceError(e.to_string()))?,
        };
        Ok((supported.config(), supported.sample_format()))
    }

    fn run_stream(
        device: Device,
        stream_config: StreamConfig,
        sample_format: SampleFormat,
        clock: Arc<SinkClock>,
        command_receiver: Receiver<SinkCommand>,
        ready_sender: Sender<Result<(), PlaybackError>>,
    ) {
        log::debug!("Playback: Audio thread started");
        let pending: PendingQueue = Arc::new(Mutex::new(VecDeque::new()));

        let stream = match sample_format {
            SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &stream_config,
                Arc::clone(&pending),
                Arc::clone(&clock),
            ),
            SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &stream_config,
                Arc::clone(&pending),
                Arc::clone(&clock),
            ),
            SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &stream_config,
                Arc::clone(&pending),
                Arc::clone(&clock),
            ),
            other => Err(PlaybackError::DeviceError(format!(
                "Unsupported sample format: {:?}",
                other
            ))),
        };

        let stream = match stream.and_then(|stream| {
            stream
                .play()
                .map_err(|e| PlaybackError::DeviceError(e.to_string()))?;
            Ok(stream)
        }) {
            Ok(stream) => {
                let _ = ready_sender.send(Ok(()));
                stream
            }
            Err(e) => {
                log::error!("Playback: Failed to start audio stream: {}", e);
                let _ = ready_sender.send(Err(e));
                return;
            }
        };

        while let Ok(command) = command_receiver.recv() {
            match command {
                SinkCommand::Schedule(scheduled) => {
                    let Ok(mut queue) = pending.lock() else {
                        log::error!("Playback: Pending queue poisoned");
                        break;
                    };
                    let position =
                        queue.partition_point(|queued| queued.start_time <= scheduled.start_time);
                    queue.insert(position, scheduled);
                }
                SinkCommand::Stop => {
                    log::debug!("Playback: Received stop command");
                    break;
                }
            }
        }

        log::debug!("Playback: Audio thread exiting");
        drop(stream);
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        pending: PendingQueue,
        clock: Arc<SinkClock>,
    ) -> Result<cpal::Stream, PlaybackError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let output_channels = config.channels as usize;
        let output_rate = config.sample_rate.0;
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let first_frame = clock.frames_rendered.load(Ordering::Acquire);
                    scratch.resize(data.len(), 0.0);

                    match pending.lock() {
                        Ok(mut queue) => render_frames(
                            &mut queue,
                            first_frame,
                            output_rate,
                            output_channels,
                            &mut scratch,
                        ),
                        Err(_) => scratch.fill(0.0),
                    }

                    for (out, &value) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(value);
                    }

                    let frames = (data.len() / output_channels) as u64;
                    clock
                        .frames_rendered
                        .store(first_frame + frames, Ordering::Release);
                },
                move |err| {
                    log::error!("Playback: Stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PlaybackError::DeviceError(e.to_string()))
    }

    pub fn output_rate(&self) -> u32 {
        self.clock.output_rate
    }

    pub fn stop(&self) -> Result<(), PlaybackError> {
        log::debug!("Playback: Stopping sink");
        self.is_stopped.store(true, Ordering::Release);
        self.command_sender
            .send(SinkCommand::Stop)
            .map_err(|e| PlaybackError::DeviceError(e.to_string()))
    }
}

impl AudioOutput for CpalSink {
    fn clock_now(&self) -> f64 {
        self.clock.seconds()
    }

    fn play_at(&self, scheduled: ScheduledBuffer) -> Result<(), PlaybackError> {
        if self.is_stopped.load(Ordering::Acquire) {
            log::warn!("Playback: Cannot schedule - sink is stopped");
            return Err(PlaybackError::Stopped);
        }

        let lead = scheduled.start_time - self.clock_now();
        if lead > self.config.high_water_secs {
            log::warn!(
                "Playback: Audio scheduled {:.1}s ahead (threshold: {:.1}s)",
                lead,
                self.config.high_water_secs
            );
        }

        log::debug!(
            "Playback: Scheduling {} frames at {:.3}s",
            scheduled.buffer.frames(),
            scheduled.start_time
        );
        self.command_sender
            .send(SinkCommand::Schedule(scheduled))
            .map_err(|e| PlaybackError::ScheduleError(e.to_string()))
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if !self.is_stopped.load(Ordering::Acquire) {
            if let Err(e) = self.command_sender.send(SinkCommand::Stop) {
                log::error!("Failed to send stop command: {}", e);
            }
        }

        if let Some(thread) = self.audio_thread.take() {
            if let Err(e) = thread.join() {
                log::error!("Failed to join audio thread: {:?}", e);
            }
        }
    }
}

/// Fill `out` (interleaved, `output_channels` wide) starting at output frame
/// `first_frame`, consuming buffers whose end has passed.
///
/// Each output frame takes the buffer covering its instant, linearly
/// interpolated when the buffer's rate differs from `output_rate`. Frames no
/// buffer covers are silent.
fn render_frames(
    queue: &mut VecDeque<ScheduledBuffer>,
    first_frame: u64,
    output_rate: u32,
    output_channels: usize,
    out: &mut [f32],
) {
    let rate = output_rate as f64;

    for (i, frame) in out.chunks_mut(output_channels).enumerate() {
        let t = (first_frame + i as u64) as f64 / rate;
        while queue.front().is_some_and(|s| s.end_time() <= t) {
            queue.pop_front();
        }

        frame.fill(0.0);
        for scheduled in queue.iter() {
            if scheduled.start_time > t {
                break;
            }

            let buffer = &scheduled.buffer;
            let position = (t - scheduled.start_time) * buffer.sample_rate() as f64;
            let index = position.floor() as usize;
            if index >= buffer.frames() {
                continue;
            }
            let fract = (position - position.floor()) as f32;

            for (c, sample) in frame.iter_mut().enumerate() {
                let Some(source) = buffer.channel(c % buffer.channel_count()) else {
                    continue;
                };
                let a = source[index];
                let b = source.get(index + 1).copied().unwrap_or(a);
                *sample += a + (b - a) * fract;
            }
        }
    }
}
