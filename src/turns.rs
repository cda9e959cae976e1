//! Turn assembly: transcript fragments in, ordered closed turns out.

use strum::Display;

/// One input/output exchange of the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub index: u64,
    pub input_transcript: Vec<String>,
    pub output_transcript: Vec<String>,
}

impl Turn {
    fn open(index: u64) -> Self {
        Self {
            index,
            input_transcript: Vec::new(),
            output_transcript: Vec::new(),
        }
    }

    pub fn input_text(&self) -> String {
        self.input_transcript.concat()
    }

    pub fn output_text(&self) -> String {
        self.output_transcript.concat()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TurnPhase {
    /// The open turn has no input fragment yet; completion signals are ignored
    AwaitingContent,
    /// At least one input fragment arrived; the next completion closes the turn
    ContentReceived,
}

/// Accumulates fragments into the open turn and promotes it to history on completion.
///
/// Exactly one turn is open at any time. History is append-only and ordered
/// oldest-first by index.
#[derive(Debug)]
pub struct TurnAssembler {
    current: Turn,
    has_content: bool,
    history: Vec<Turn>,
}

impl Default for TurnAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnAssembler {
    pub fn new() -> Self {
        Self {
            current: Turn::open(0),
            has_content: false,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> &Turn {
        &self.current
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn phase(&self) -> TurnPhase {
        if self.has_content {
            TurnPhase::ContentReceived
        } else {
            TurnPhase::AwaitingContent
        }
    }

    pub fn append_input(&mut self, text: String) {
        self.current.input_transcript.push(text);
        self.has_content = true;
    }

    /// Output fragments always land in the open turn, even before any input
    pub fn append_output(&mut self, text: String) {
        self.current.output_transcript.push(text);
    }

    /// Close the open turn if it has content. Returns the closed turn's index.
    ///
    /// A completion while still awaiting content is absorbed without effect.
    pub fn complete(&mut self) -> Option<u64> {
        if !self.has_content {
            log::debug!(
                "Turns: Ignoring completion for turn {} without input",
                self.current.index
            );
            return None;
        }

        let next = Turn::open(self.current.index + 1);
        let closed = std::mem::replace(&mut self.current, next);
        self.has_content = false;

        let index = closed.index;
        log::info!(
            "Turns: Closed turn {} ({} input, {} output fragments)",
            index,
            closed.input_transcript.len(),
            closed.output_transcript.len()
        );
        self.history.push(closed);
        Some(index)
    }

    /// Consume the assembler, returning history and the still-open turn
    pub fn into_parts(self) -> (Vec<Turn>, Turn) {
        (self.history, self.current)
    }
}
