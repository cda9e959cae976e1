//! Wire format of the conversation socket.
//!
//! Inbound text frames carry one JSON object each, `{"type": ..., "data": ...}`.
//! Outbound audio is sent as one binary frame per recording.

use serde::Deserialize;
use thiserror::Error;

/// Data value of a `message` frame that closes the current turn
pub const TURN_COMPLETE_SENTINEL: &str = "response.done";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unknown message: {0}")]
    UnknownMessage(String),
}

/// Frame as it appears on the wire, tagged by `type` with the payload in `data`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum WireEvent {
    InputTranscript(String),
    Transcript(String),
    Message(String),
    Audio(String),
}

/// Event received from the speech service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Fragment of the caller's speech-to-text
    InputTranscript(String),
    /// Fragment of the response text
    OutputTranscript(String),
    /// Base64 PCM chunk of synthesized speech
    Audio(String),
    /// The service finished producing output for the current turn
    TurnComplete,
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::InputTranscript(_) => "input_transcript",
            InboundEvent::OutputTranscript(_) => "transcript",
            InboundEvent::Audio(_) => "audio",
            InboundEvent::TurnComplete => "turn_complete",
        }
    }
}

impl TryFrom<WireEvent> for InboundEvent {
    type Error = ProtocolError;

    fn try_from(event: WireEvent) -> Result<Self, Self::Error> {
        match event {
            WireEvent::InputTranscript(text) => Ok(InboundEvent::InputTranscript(text)),
            WireEvent::Transcript(text) => Ok(InboundEvent::OutputTranscript(text)),
            WireEvent::Audio(payload) => Ok(InboundEvent::Audio(payload)),
            WireEvent::Message(data) if data == TURN_COMPLETE_SENTINEL => {
                Ok(InboundEvent::TurnComplete)
            }
            WireEvent::Message(data) => Err(ProtocolError::UnknownMessage(format!(
                "message with data '{}'",
                data
            ))),
        }
    }
}

/// Parse one text frame into an [`InboundEvent`]
pub fn parse_event(text: &str) -> Result<InboundEvent, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    let wire: WireEvent = serde_json::from_value(value).map_err(|e| match kind {
        Some(kind) => ProtocolError::UnknownMessage(format!("type '{}': {}", kind, e)),
        None => ProtocolError::UnknownMessage("missing 'type' field".to_string()),
    })?;

    InboundEvent::try_from(wire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_transcript() {
        let event = parse_event(r#"{"type":"input_transcript","data":"hi"}"#).unwrap();
        assert_eq!(event, InboundEvent::InputTranscript("hi".into()));
    }

    #[test]
    fn test_parse_output_transcript() {
        let event = parse_event(r#"{"type":"transcript","data":"hello"}"#).unwrap();
        assert_eq!(event, InboundEvent::OutputTranscript("hello".into()));
    }

    #[test]
    fn test_parse_audio() {
        let event = parse_event(r#"{"type":"audio","data":"AAAA"}"#).unwrap();
        assert_eq!(event, InboundEvent::Audio("AAAA".into()));
        assert_eq!(event.kind(), "audio");
    }

    #[test]
    fn test_parse_turn_complete() {
        let event = parse_event(r#"{"type":"message","data":"response.done"}"#).unwrap();
        assert_eq!(event, InboundEvent::TurnComplete);
    }

    #[test]
    fn test_other_message_data_is_unknown() {
        let result = parse_event(r#"{"type":"message","data":"response.created"}"#);
        assert!(matches!(result, Err(ProtocolError::UnknownMessage(_))));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = parse_event(r#"{"type":"session.updated","data":"x"}"#);
        assert!(matches!(result, Err(ProtocolError::UnknownMessage(_))));
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let result = parse_event(r#"{"data":"x"}"#);
        assert_eq!(
            result,
            Err(ProtocolError::UnknownMessage(
                "missing 'type' field".to_string()
            ))
        );
    }

    #[test]
    fn test_missing_data_is_rejected() {
        assert!(parse_event(r#"{"type":"transcript"}"#).is_err());
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let result = parse_event("{not json");
        assert!(matches!(result, Err(ProtocolError::InvalidJson(_))));
    }
}
