use crate::pcm::PcmFormat;
use clap::Parser;
use secrecy::{ExposeSecret, SecretBox};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8000/ws";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid sample rate {0}: expected 8000..=192000")]
    InvalidSampleRate(u32),
    #[error("Invalid channel count {0}: expected 1..=8")]
    InvalidChannels(u16),
    #[error("Invalid talk key '{0}': use 'space' or a single character")]
    InvalidTalkKey(String),
    #[error("Token cannot be empty")]
    EmptyToken,
}

/// Command line arguments, each with an environment fallback
#[derive(Parser, Debug, Clone)]
#[command(name = "voice-client", version, about = "Hold a key, talk, hear the reply")]
pub struct Args {
    /// Websocket endpoint of the voice relay
    #[arg(long, env = "VOICE_CLIENT_URL", default_value = DEFAULT_SERVER_URL)]
    pub url: String,

    /// Bearer token sent with the websocket handshake
    #[arg(long, env = "VOICE_CLIENT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Sample rate of the synthesized audio stream
    #[arg(long, env = "VOICE_CLIENT_SAMPLE_RATE", default_value_t = crate::pcm::DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Channel count of the synthesized audio stream
    #[arg(long, env = "VOICE_CLIENT_CHANNELS", default_value_t = crate::pcm::DEFAULT_CHANNELS)]
    pub channels: u16,

    /// Key to hold while talking ("space" or a single character)
    #[arg(long, env = "VOICE_CLIENT_TALK_KEY", default_value = "space")]
    pub talk_key: String,

    /// Microphone device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Speaker device name
    #[arg(long)]
    pub output_device: Option<String>,

    /// Do not open an output device; received audio is discarded
    #[arg(long)]
    pub no_audio: bool,

    /// List input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Validated client configuration
#[derive(Debug)]
pub struct ClientConfig {
    pub server_url: Url,
    pub token: Option<SecretBox<String>>,
    pub playback_format: PcmFormat,
    pub talk_key: char,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub audio_enabled: bool,
}

impl ClientConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let server_url = parse_server_url(&args.url)?;

        if !(8_000..=192_000).contains(&args.sample_rate) {
            return Err(ConfigError::InvalidSampleRate(args.sample_rate));
        }
        if !(1..=8).contains(&args.channels) {
            return Err(ConfigError::InvalidChannels(args.channels));
        }

        let token = match &args.token {
            Some(token) if token.trim().is_empty() => return Err(ConfigError::EmptyToken),
            Some(token) => Some(SecretBox::new(Box::new(token.trim().to_string()))),
            None => None,
        };

        Ok(Self {
            server_url,
            token,
            playback_format: PcmFormat {
                sample_rate: args.sample_rate,
                channels: args.channels,
            },
            talk_key: parse_talk_key(&args.talk_key)?,
            input_device: args.input_device.clone(),
            output_device: args.output_device.clone(),
            audio_enabled: !args.no_audio,
        })
    }

    /// Get the bearer token (use only when building the handshake)
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret().as_str())
    }
}

fn parse_server_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("scheme must be ws or wss, got {}", other),
        }),
    }
}

fn parse_talk_key(raw: &str) -> Result<char, ConfigError> {
    if raw.eq_ignore_ascii_case("space") {
        return Ok(' ');
    }

    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Ok(c.to_ascii_lowercase()),
        _ => Err(ConfigError::InvalidTalkKey(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["voice-client"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_url_validation() {
        assert!(parse_server_url("ws://localhost:8000/ws").is_ok());
        assert!(parse_server_url("wss://example.com/ws").is_ok());
        assert!(parse_server_url("http://localhost:8000/ws").is_err());
        assert!(parse_server_url("not a url").is_err());
    }

    #[test]
    fn test_talk_key_parsing() {
        assert_eq!(parse_talk_key("space").unwrap(), ' ');
        assert_eq!(parse_talk_key("SPACE").unwrap(), ' ');
        assert_eq!(parse_talk_key("T").unwrap(), 't');
        assert!(parse_talk_key("ab").is_err());
        assert!(parse_talk_key("").is_err());
    }

    #[test]
    fn test_explicit_args() {
        let config = ClientConfig::from_args(&args(&[
            "--url",
            "wss://relay.example/ws",
            "--sample-rate",
            "16000",
            "--channels",
            "2",
            "--talk-key",
            "r",
            "--token",
            " secret ",
            "--no-audio",
        ]))
        .unwrap();

        assert_eq!(config.server_url.as_str(), "wss://relay.example/ws");
        assert_eq!(config.playback_format.sample_rate, 16_000);
        assert_eq!(config.playback_format.channels, 2);
        assert_eq!(config.talk_key, 'r');
        assert_eq!(config.token(), Some("secret"));
        assert!(!config.audio_enabled);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(matches!(
            ClientConfig::from_args(&args(&["--sample-rate", "100"])),
            Err(ConfigError::InvalidSampleRate(100))
        ));
        assert!(matches!(
            ClientConfig::from_args(&args(&["--channels", "0"])),
            Err(ConfigError::InvalidChannels(0))
        ));
        assert!(matches!(
            ClientConfig::from_args(&args(&["--token", "  "])),
            Err(ConfigError::EmptyToken)
        ));
    }
}
