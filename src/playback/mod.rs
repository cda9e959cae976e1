mod scheduler;
mod sink;

pub use scheduler::{PlaybackScheduler, ScheduledBuffer};
pub use sink::{CpalSink, CpalSinkConfig};

use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PlaybackError {
    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Failed to schedule audio: {0}")]
    ScheduleError(String),

    #[error("Sink is stopped")]
    Stopped,
}

/// Audio output with its own monotonically advancing clock.
///
/// `clock_now` and the `start_time` given to `play_at` are seconds on the
/// same timeline.
pub trait AudioOutput {
    fn clock_now(&self) -> f64;

    fn play_at(&self, scheduled: ScheduledBuffer) -> Result<(), PlaybackError>;
}

/// Output that renders nothing and follows the wall clock.
///
/// Used when no output device is available so the conversation keeps going.
pub struct SilentOutput {
    started: Instant,
}

impl SilentOutput {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SilentOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for SilentOutput {
    fn clock_now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn play_at(&self, scheduled: ScheduledBuffer) -> Result<(), PlaybackError> {
        log::debug!(
            "Playback: Discarding {:.1}ms of audio at {:.3}s (silent output)",
            scheduled.buffer.duration() * 1000.0,
            scheduled.start_time
        );
        Ok(())
    }
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn clock_now(&self) -> f64 {
        (**self).clock_now()
    }

    fn play_at(&self, scheduled: ScheduledBuffer) -> Result<(), PlaybackError> {
        (**self).play_at(scheduled)
    }
}
