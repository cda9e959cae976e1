use crate::pcm::{decode_base64_pcm, PcmFormat};
use crate::playback::{PlaybackScheduler, ScheduledBuffer};
use crate::protocol::{parse_event, InboundEvent};
use crate::turns::TurnAssembler;

/// Side effect requested by a routed event, executed by the caller afterwards
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Hand this buffer to the audio output at its start time
    Play(ScheduledBuffer),
    /// The open turn changed
    TurnUpdated,
    /// The open turn was closed into history with this index
    TurnClosed(u64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RouterStats {
    pub events_routed: u64,
    pub dropped_messages: u64,
    pub dropped_chunks: u64,
    pub scheduled_seconds: f64,
}

/// Classifies inbound frames and applies them to the turn state and the scheduler.
///
/// Frames are handled one at a time; every transition completes before the
/// next frame is looked at. Bad frames and undecodable audio are dropped
/// without touching any state.
pub struct EventRouter {
    turns: TurnAssembler,
    scheduler: PlaybackScheduler,
    format: PcmFormat,
    stats: RouterStats,
}

impl EventRouter {
    pub fn new(format: PcmFormat) -> Self {
        Self {
            turns: TurnAssembler::new(),
            scheduler: PlaybackScheduler::new(),
            format,
            stats: RouterStats::default(),
        }
    }

    pub fn turns(&self) -> &TurnAssembler {
        &self.turns
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn into_turns(self) -> TurnAssembler {
        self.turns
    }

    /// Route one text frame. `clock_now` is the audio output clock at arrival.
    pub fn route_text(&mut self, text: &str, clock_now: f64) -> Option<Effect> {
        match parse_event(text) {
            Ok(event) => self.route_event(event, clock_now),
            Err(e) => {
                self.stats.dropped_messages += 1;
                log::debug!("Router: Dropping frame: {}", e);
                None
            }
        }
    }

    pub fn route_event(&mut self, event: InboundEvent, clock_now: f64) -> Option<Effect> {
        self.stats.events_routed += 1;
        log::trace!("Router: Routing {} event", event.kind());

        match event {
            InboundEvent::InputTranscript(text) => {
                self.turns.append_input(text);
                Some(Effect::TurnUpdated)
            }
            InboundEvent::OutputTranscript(text) => {
                self.turns.append_output(text);
                Some(Effect::TurnUpdated)
            }
            InboundEvent::TurnComplete => self.turns.complete().map(Effect::TurnClosed),
            InboundEvent::Audio(payload) => self.route_audio(&payload, clock_now),
        }
    }

    fn route_audio(&mut self, payload: &str, clock_now: f64) -> Option<Effect> {
        let buffer = match decode_base64_pcm(payload, self.format) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.stats.dropped_chunks += 1;
                log::warn!("Router: Dropping undecodable audio chunk: {}", e);
                return None;
            }
        };

        if buffer.is_empty() {
            log::debug!("Router: Skipping empty audio chunk");
            return None;
        }

        let scheduled = self.scheduler.schedule(buffer, clock_now);
        self.stats.scheduled_seconds += scheduled.buffer.duration();
        Some(Effect::Play(scheduled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::encode_pcm16;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    fn audio_frame(frames: usize) -> String {
        let payload = STANDARD.encode(encode_pcm16(&vec![0.25; frames]));
        format!(r#"{{"type":"audio","data":"{}"}}"#, payload)
    }

    #[test]
    fn test_audio_is_scheduled() {
        let mut router = EventRouter::new(PcmFormat::default());
        let effect = router.route_text(&audio_frame(2400), 1.0);

        match effect {
            Some(Effect::Play(scheduled)) => {
                assert_eq!(scheduled.start_time, 1.0);
                assert_eq!(scheduled.buffer.frames(), 2400);
            }
            other => panic!("expected Play, got {:?}", other),
        }
        assert!((router.scheduler().next_available_time() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_bad_audio_leaves_cursor_unchanged() {
        let mut router = EventRouter::new(PcmFormat::default());
        router.route_text(&audio_frame(2400), 0.0);
        let cursor = router.scheduler().next_available_time();

        let effect = router.route_text(r#"{"type":"audio","data":"AAEC"}"#, 0.05);
        assert_eq!(effect, None);
        assert_eq!(router.scheduler().next_available_time(), cursor);
        assert_eq!(router.stats().dropped_chunks, 1);
    }

    #[test]
    fn test_empty_audio_is_skipped() {
        let mut router = EventRouter::new(PcmFormat::default());
        let effect = router.route_text(r#"{"type":"audio","data":""}"#, 2.0);
        assert_eq!(effect, None);
        assert_eq!(router.scheduler().next_available_time(), 0.0);
    }

    #[test]
    fn test_transcripts_update_turn() {
        let mut router = EventRouter::new(PcmFormat::default());
        assert_eq!(
            router.route_text(r#"{"type":"input_transcript","data":"hi"}"#, 0.0),
            Some(Effect::TurnUpdated)
        );
        assert_eq!(
            router.route_text(r#"{"type":"transcript","data":"hello"}"#, 0.0),
            Some(Effect::TurnUpdated)
        );
        assert_eq!(
            router.route_text(r#"{"type":"message","data":"response.done"}"#, 0.0),
            Some(Effect::TurnClosed(0))
        );
    }

    #[test]
    fn test_premature_completion_has_no_effect() {
        let mut router = EventRouter::new(PcmFormat::default());
        let effect = router.route_text(r#"{"type":"message","data":"response.done"}"#, 0.0);
        assert_eq!(effect, None);
        assert!(router.turns().history().is_empty());
    }

    #[test]
    fn test_malformed_frames_are_counted() {
        let mut router = EventRouter::new(PcmFormat::default());
        router.route_text("garbage", 0.0);
        router.route_text(r#"{"type":"bogus","data":"x"}"#, 0.0);
        assert_eq!(router.stats().dropped_messages, 2);
        assert_eq!(router.stats().events_routed, 0);
    }
}
