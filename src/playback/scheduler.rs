use crate::pcm::AudioBuffer;

/// A buffer with the output-clock time at which it must start
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBuffer {
    pub start_time: f64,
    pub buffer: AudioBuffer,
}

impl ScheduledBuffer {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.buffer.duration()
    }
}

/// Gapless scheduler for back-to-back playback on a shared audio clock.
///
/// Holds a single cursor, the earliest time new audio may start. Each call to
/// [`schedule`](Self::schedule) places the buffer at `max(cursor, now)` and
/// moves the cursor to its end, so buffers play in call order without overlap
/// and without silence between them. A buffer that arrives after the cursor
/// has passed starts immediately, shifting everything after it forward.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_available_time: f64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_available_time(&self) -> f64 {
        self.next_available_time
    }

    pub fn schedule(&mut self, buffer: AudioBuffer, clock_now: f64) -> ScheduledBuffer {
        let start_time = self.next_available_time.max(clock_now);
        if start_time > self.next_available_time && self.next_available_time > 0.0 {
            log::debug!(
                "Playback: Chunk arrived {:.1}ms late, shifting playback forward",
                (start_time - self.next_available_time) * 1000.0
            );
        }

        let scheduled = ScheduledBuffer { start_time, buffer };
        self.next_available_time = scheduled.end_time();
        scheduled
    }
}
