use anyhow::Context;
use clap::Parser;
use realtime_voice_client::{
    capture::Microphone,
    client,
    config::{Args, ClientConfig},
    ClientError,
};
use std::fs::File;

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (for development)
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args)?;
    log::info!("🚀 Initializing voice-client");

    if args.list_devices {
        for name in Microphone::list_devices().context("failed to list input devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = ClientConfig::from_args(&args).context("invalid configuration")?;
    let summary = match client::run(config).await {
        Ok(summary) => summary,
        Err(ClientError::Interrupted) => {
            println!("👋 Interrupted before the connection opened");
            return Ok(());
        }
        Err(e) => return Err(e).context("conversation session failed"),
    };

    println!(
        "👋 Goodbye! {} turns completed, {} recordings sent",
        summary.history.len(),
        summary.recordings_sent
    );
    if summary.stats.dropped_chunks > 0 || summary.stats.dropped_messages > 0 {
        println!(
            "   ({} malformed messages and {} undecodable audio chunks were skipped)",
            summary.stats.dropped_messages, summary.stats.dropped_chunks
        );
    }
    Ok(())
}
