use crate::capture::{AudioChunk, CapturePipeline};
use crate::error::Result;
use crate::input::ControlEvent;
use crate::pcm::PcmFormat;
use crate::playback::AudioOutput;
use crate::presentation::{ConversationView, Presenter, TransportState};
use crate::router::{Effect, EventRouter, RouterStats};
use crate::turns::Turn;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The user asked to quit
    Quit,
    /// No more control events can arrive
    ControlsClosed,
    /// The server closed the socket
    ServerClosed,
    /// The socket failed
    TransportError(String),
    Cancelled,
}

/// Final state of a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub history: Vec<Turn>,
    pub open_turn: Turn,
    pub stats: RouterStats,
    pub recordings_sent: u64,
    pub close_reason: CloseReason,
}

/// One thing woke the session up
enum Wake {
    Cancelled,
    Frame(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Control(Option<ControlEvent>),
    Mic(Option<AudioChunk>),
}

/// A connected conversation: inbound frames drive turns and playback,
/// control events drive recording.
///
/// Everything runs on the task that awaits [`run`](Self::run); each wake-up is
/// handled to completion before the next one is polled.
pub struct Session<O: AudioOutput, P: Presenter> {
    router: EventRouter,
    capture: CapturePipeline,
    output: O,
    presenter: P,
    transport: TransportState,
    talk_key: char,
    recordings_sent: u64,
}

impl<O: AudioOutput, P: Presenter> Session<O, P> {
    pub fn new(format: PcmFormat, output: O, presenter: P, talk_key: char) -> Self {
        Self {
            router: EventRouter::new(format),
            capture: CapturePipeline::new(),
            output,
            presenter,
            transport: TransportState::Connecting,
            talk_key,
            recordings_sent: 0,
        }
    }

    pub fn capture_mut(&mut self) -> &mut CapturePipeline {
        &mut self.capture
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn present(&mut self) {
        let turns = self.router.turns();
        let view = ConversationView {
            transport: self.transport,
            capture: self.capture.state(),
            talk_key: self.talk_key,
            current: turns.current(),
            history: turns.history(),
        };
        self.presenter.present(&view);
    }

    /// Drive the session until the socket closes, the user quits or `cancel` fires
    pub async fn run<S>(
        mut self,
        ws_stream: WebSocketStream<S>,
        mut controls: mpsc::Receiver<ControlEvent>,
        mut mic: Option<mpsc::Receiver<AudioChunk>>,
        cancel: CancellationToken,
    ) -> Result<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws_stream.split();
        self.transport = TransportState::Open;
        self.capture.set_transport_open(true);
        self.present();
        log::info!("Session: Started");

        let close_reason = loop {
            let wake = tokio::select! {
                _ = cancel.cancelled() => Wake::Cancelled,
                frame = read.next() => Wake::Frame(frame),
                control = controls.recv() => Wake::Control(control),
                chunk = next_chunk(&mut mic) => Wake::Mic(chunk),
            };

            match wake {
                Wake::Cancelled => break CloseReason::Cancelled,
                Wake::Frame(Some(Ok(Message::Text(text)))) => self.on_text(text.as_str()),
                Wake::Frame(Some(Ok(Message::Binary(data)))) => {
                    log::debug!("Session: Ignoring {} byte binary frame", data.len());
                }
                Wake::Frame(Some(Ok(Message::Close(frame)))) => {
                    log::info!("Session: Server closed connection: {:?}", frame);
                    break CloseReason::ServerClosed;
                }
                Wake::Frame(Some(Ok(_))) => {}
                Wake::Frame(Some(Err(e))) => {
                    log::error!("Session: Websocket error: {}", e);
                    break CloseReason::TransportError(e.to_string());
                }
                Wake::Frame(None) => break CloseReason::ServerClosed,
                Wake::Control(Some(ControlEvent::TalkPressed)) => {
                    if self.capture.start() {
                        self.present();
                    }
                }
                Wake::Control(Some(ControlEvent::TalkReleased)) => {
                    let was_recording = self.capture.is_recording();
                    if was_recording {
                        self.drain_mic(&mut mic);
                    }
                    match self.capture.stop() {
                        Ok(Some(blob)) => {
                            let len = blob.bytes.len();
                            if let Err(e) = write.send(Message::Binary(blob.bytes.into())).await {
                                log::error!("Session: Failed to send recording: {}", e);
                                break CloseReason::TransportError(e.to_string());
                            }
                            self.recordings_sent += 1;
                            log::debug!("Session: Sent {} byte recording", len);
                        }
                        Ok(None) => {}
                        Err(e) => log::error!("Session: Failed to finish recording: {}", e),
                    }
                    if was_recording {
                        self.present();
                    }
                }
                Wake::Control(Some(ControlEvent::Quit)) => {
                    log::info!("🛑 Session: Quit requested");
                    let _ = write.send(Message::Close(None)).await;
                    break CloseReason::Quit;
                }
                Wake::Control(None) => break CloseReason::ControlsClosed,
                Wake::Mic(Some(chunk)) => self.capture.push_samples(&chunk.samples),
                Wake::Mic(None) => {
                    mic = None;
                    self.capture.device_denied("microphone stream ended");
                    self.present();
                }
            }
        };

        log::info!("Session: Ended ({:?})", close_reason);
        if self.capture.is_recording() {
            log::warn!("Session: Discarding recording in progress");
        }
        self.transport = TransportState::Closed;
        self.capture.set_transport_open(false);
        self.present();

        let stats = self.router.stats();
        let (history, open_turn) = self.router.into_turns().into_parts();
        Ok(SessionSummary {
            history,
            open_turn,
            stats,
            recordings_sent: self.recordings_sent,
            close_reason,
        })
    }

    /// Move chunks already queued by the microphone into the recording
    fn drain_mic(&mut self, mic: &mut Option<mpsc::Receiver<AudioChunk>>) {
        let Some(receiver) = mic else {
            return;
        };
        let mut drained = 0;
        while let Ok(chunk) = receiver.try_recv() {
            self.capture.push_samples(&chunk.samples);
            drained += 1;
        }
        if drained > 0 {
            log::trace!("Session: Drained {} queued mic chunks before stop", drained);
        }
    }

    fn on_text(&mut self, text: &str) {
        let clock_now = self.output.clock_now();
        match self.router.route_text(text, clock_now) {
            Some(Effect::Play(scheduled)) => {
                if let Err(e) = self.output.play_at(scheduled) {
                    log::warn!("Session: Audio output rejected chunk: {}", e);
                }
            }
            Some(Effect::TurnUpdated) | Some(Effect::TurnClosed(_)) => self.present(),
            None => {}
        }
    }
}

async fn next_chunk(mic: &mut Option<mpsc::Receiver<AudioChunk>>) -> Option<AudioChunk> {
    match mic {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
