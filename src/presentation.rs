//! Read-only projection of the conversation onto the terminal.

use crate::capture::CaptureState;
use crate::turns::Turn;
use crossterm::{cursor, queue, style::Print, terminal};
use std::io::{self, Write};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TransportState {
    #[strum(serialize = "Waiting")]
    Connecting,
    #[strum(serialize = "Ready")]
    Open,
    #[strum(serialize = "Closed")]
    Closed,
}

/// Snapshot of everything the view shows
#[derive(Debug, Clone, Copy)]
pub struct ConversationView<'a> {
    pub transport: TransportState,
    pub capture: CaptureState,
    pub talk_key: char,
    pub current: &'a Turn,
    /// Closed turns, oldest first
    pub history: &'a [Turn],
}

impl ConversationView<'_> {
    /// Render as plain lines: status, open turn, then closed turns newest first
    pub fn lines(&self) -> Vec<String> {
        let key = match self.talk_key {
            ' ' => "space bar".to_string(),
            c => format!("'{}' key", c),
        };

        let mut lines = vec![
            format!("Websocket status: {}", self.transport),
            format!("Press and hold the {} to record audio. Release to stop.", key),
            format!("Status: {}", self.capture),
            String::new(),
        ];
        push_turn(&mut lines, self.current);
        for turn in self.history.iter().rev() {
            push_turn(&mut lines, turn);
        }
        lines
    }
}

fn push_turn(lines: &mut Vec<String>, turn: &Turn) {
    lines.push(format!("#{}", turn.index));
    lines.push(format!("Client: {}", turn.input_text()));
    lines.push(format!("Server: {}", turn.output_text()));
}

/// Receives a fresh view whenever the conversation or status changes
pub trait Presenter {
    fn present(&mut self, view: &ConversationView<'_>);
}

/// Redraws the whole view on a raw-mode terminal
pub struct TerminalPresenter<W: Write> {
    out: W,
}

impl TerminalPresenter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn draw(&mut self, lines: &[String]) -> io::Result<()> {
        queue!(
            self.out,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        for line in lines {
            // Raw mode does not translate \n
            queue!(self.out, Print(line), Print("\r\n"))?;
        }
        self.out.flush()
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn present(&mut self, view: &ConversationView<'_>) {
        if let Err(e) = self.draw(&view.lines()) {
            log::warn!("Presentation: Failed to draw: {}", e);
        }
    }
}

/// Presenter that draws nothing
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _view: &ConversationView<'_>) {}
}
