//! Hold-to-talk keyboard handling.

use crate::error::{ClientError, Result};
use crossterm::event::{
    Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
    KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use futures_util::StreamExt;
use std::io;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// User intent derived from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    TalkPressed,
    TalkReleased,
    Quit,
}

/// Maps key events of one talk key to press/release triggers.
///
/// With release reporting, press starts and release stops; repeats while
/// held are ignored. Without it the key toggles.
#[derive(Debug)]
pub struct HoldToTalk {
    talk_key: char,
    reports_release: bool,
    held: bool,
}

impl HoldToTalk {
    pub fn new(talk_key: char, reports_release: bool) -> Self {
        Self {
            talk_key,
            reports_release,
            held: false,
        }
    }

    fn is_talk_key(&self, code: KeyCode) -> bool {
        matches!(code, KeyCode::Char(c) if c.to_ascii_lowercase() == self.talk_key)
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Option<ControlEvent> {
        let ctrl_c = key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c'));
        if key.kind == KeyEventKind::Press
            && (ctrl_c
                || key.code == KeyCode::Esc
                || (key.code == KeyCode::Char('q') && self.talk_key != 'q'))
        {
            return Some(ControlEvent::Quit);
        }

        if !self.is_talk_key(key.code) {
            return None;
        }

        match (key.kind, self.reports_release, self.held) {
            (KeyEventKind::Press, _, false) => {
                self.held = true;
                Some(ControlEvent::TalkPressed)
            }
            (KeyEventKind::Press, false, true) => {
                self.held = false;
                Some(ControlEvent::TalkReleased)
            }
            (KeyEventKind::Release, _, true) => {
                self.held = false;
                Some(ControlEvent::TalkReleased)
            }
            _ => None,
        }
    }
}

/// Raw-mode terminal with key-release reporting when the terminal supports it.
///
/// Restores the terminal on drop.
pub struct TerminalGuard {
    reports_release: bool,
}

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        terminal::enable_raw_mode().map_err(|e| ClientError::Terminal(e.to_string()))?;

        let reports_release = matches!(terminal::supports_keyboard_enhancement(), Ok(true));
        if reports_release {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        } else {
            log::info!("Input: Terminal cannot report key releases, talk key toggles");
        }

        Ok(Self { reports_release })
    }

    pub fn reports_release(&self) -> bool {
        self.reports_release
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.reports_release {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        if let Err(e) = terminal::disable_raw_mode() {
            log::error!("Failed to restore terminal: {}", e);
        }
    }
}

/// Forward talk-key triggers from the terminal until the receiver goes away
pub fn spawn_key_listener(
    mut talk: HoldToTalk,
    sender: mpsc::Sender<ControlEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(event) = events.next().await {
            let key = match event {
                Ok(Event::Key(key)) => key,
                Ok(_) => continue,
                Err(e) => {
                    log::error!("Input: Failed to read terminal event: {}", e);
                    break;
                }
            };

            if let Some(control) = talk.on_key(key) {
                log::debug!("Input: {:?}", control);
                if sender.send(control).await.is_err() {
                    break;
                }
            }
        }
        log::debug!("Input: Key listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_hold_and_release() {
        let mut talk = HoldToTalk::new(' ', true);
        assert_eq!(
            talk.on_key(key(KeyCode::Char(' '), KeyEventKind::Press)),
            Some(ControlEvent::TalkPressed)
        );
        assert_eq!(
            talk.on_key(key(KeyCode::Char(' '), KeyEventKind::Repeat)),
            None
        );
        assert_eq!(
            talk.on_key(key(KeyCode::Char(' '), KeyEventKind::Press)),
            None
        );
        assert_eq!(
            talk.on_key(key(KeyCode::Char(' '), KeyEventKind::Release)),
            Some(ControlEvent::TalkReleased)
        );
        assert_eq!(
            talk.on_key(key(KeyCode::Char(' '), KeyEventKind::Release)),
            None
        );
    }

    #[test]
    fn test_toggle_without_release_reporting() {
        let mut talk = HoldToTalk::new(' ', false);
        assert_eq!(
            talk.on_key(key(KeyCode::Char(' '), KeyEventKind::Press)),
            Some(ControlEvent::TalkPressed)
        );
        assert_eq!(
            talk.on_key(key(KeyCode::Char(' '), KeyEventKind::Press)),
            Some(ControlEvent::TalkReleased)
        );
    }

    #[test]
    fn test_other_keys_are_ignored() {
        let mut talk = HoldToTalk::new(' ', true);
        assert_eq!(talk.on_key(key(KeyCode::Char('x'), KeyEventKind::Press)), None);
        assert_eq!(talk.on_key(key(KeyCode::Enter, KeyEventKind::Press)), None);
    }

    #[test]
    fn test_quit_keys() {
        let mut talk = HoldToTalk::new(' ', true);
        assert_eq!(
            talk.on_key(key(KeyCode::Esc, KeyEventKind::Press)),
            Some(ControlEvent::Quit)
        );
        assert_eq!(
            talk.on_key(key(KeyCode::Char('q'), KeyEventKind::Press)),
            Some(ControlEvent::Quit)
        );
        let ctrl_c = KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..key(KeyCode::Char('c'), KeyEventKind::Press)
        };
        assert_eq!(talk.on_key(ctrl_c), Some(ControlEvent::Quit));
    }

    #[test]
    fn test_q_can_be_the_talk_key() {
        let mut talk = HoldToTalk::new('q', true);
        assert_eq!(
            talk.on_key(key(KeyCode::Char('Q'), KeyEventKind::Press)),
            Some(ControlEvent::TalkPressed)
        );
    }
}
