use crate::capture::{AudioChunk, Microphone, MicrophoneConfig};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::input::{spawn_key_listener, HoldToTalk, TerminalGuard};
use crate::playback::{AudioOutput, CpalSink, CpalSinkConfig, SilentOutput};
use crate::presentation::TerminalPresenter;
use crate::session::{Session, SessionSummary};
use crate::transport;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;

/// Open the audio output, falling back to silence when no device is usable
async fn open_output(config: &ClientConfig) -> Result<Box<dyn AudioOutput>> {
    if !config.audio_enabled {
        log::info!("🔊 Playback disabled, received audio is discarded");
        return Ok(Box::new(SilentOutput::new()));
    }

    let sink_config = CpalSinkConfig {
        device_name: config.output_device.clone(),
        preferred_sample_rate: config.playback_format.sample_rate,
        ..CpalSinkConfig::default()
    };
    // Device setup waits on the stream thread
    match task::spawn_blocking(move || CpalSink::new(sink_config)).await? {
        Ok(sink) => Ok(Box::new(sink)),
        Err(e) => {
            log::error!("🔊 Audio output unavailable, continuing without playback: {}", e);
            Ok(Box::new(SilentOutput::new()))
        }
    }
}

type OpenMicrophone = (Option<Microphone>, Option<mpsc::Receiver<AudioChunk>>);

/// Open the microphone; a failure disables capture for the whole session
async fn open_microphone<O: AudioOutput>(
    config: &ClientConfig,
    session: &mut Session<O, TerminalPresenter<std::io::Stdout>>,
) -> Result<OpenMicrophone> {
    let mic_config = MicrophoneConfig {
        device_name: config.input_device.clone(),
    };
    match task::spawn_blocking(move || Microphone::open(&mic_config)).await? {
        Ok((microphone, chunks)) => {
            session.capture_mut().device_ready(microphone.format());
            Ok((Some(microphone), Some(chunks)))
        }
        Err(e) => {
            session.capture_mut().device_denied(e.to_string());
            Ok((None, None))
        }
    }
}

/// Run one interactive conversation on the terminal
pub async fn run(config: ClientConfig) -> Result<SessionSummary> {
    // Ctrl+C raises SIGINT until the terminal goes raw; after that the key
    // listener turns it into a quit
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let output = open_output(&config).await?;
    let mut session = Session::new(
        config.playback_format,
        output,
        TerminalPresenter::stdout(),
        config.talk_key,
    );
    let (_microphone, mic_chunks) = open_microphone(&config, &mut session).await?;

    session.present();
    let ws_stream = transport::connect_until_cancelled(&config, &cancel).await?;

    let terminal = TerminalGuard::enter()?;

    // Keys are only listened to once the transport is open
    let (control_sender, control_receiver) = mpsc::channel(16);
    let listener = spawn_key_listener(
        HoldToTalk::new(config.talk_key, terminal.reports_release()),
        control_sender,
    );

    let summary = session
        .run(ws_stream, control_receiver, mic_chunks, cancel)
        .await;

    listener.abort();
    drop(terminal);
    summary
}
