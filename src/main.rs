use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use buddy_voice::audio::{
    AudioDevice, FRAME_LENGTH, KeywordModel, Microphone, PhraseSpotter, START_SLOT, STOP_SLOT,
};
use buddy_voice::conversation::Services;
use buddy_voice::listener::DeviceOpener;
use buddy_voice::llm::ChatCompletions;
use buddy_voice::playback::ProcessLauncher;
use buddy_voice::speech::{DeepgramBatch, DeepgramLive, DeepgramSpeech, LiveOptions};
use buddy_voice::{Config, WakeListener};

/// Buddy - hands-free voice assistant
#[derive(Parser)]
#[command(name = "buddy", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,buddy_voice=info",
        1 => "info,buddy_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    let deepgram_key = || SecretString::from(config.api_keys.deepgram.expose_secret().to_owned());

    let models = [
        KeywordModel::phrase("start", &config.keywords.start_phrase, START_SLOT),
        KeywordModel::phrase("stop", &config.keywords.stop_phrase, STOP_SLOT),
    ];
    let segment_transcriber = DeepgramBatch::new(deepgram_key(), config.voice.stt_model.clone())?;
    let spotter = PhraseSpotter::new(&models, Arc::new(segment_transcriber))?;

    let live = LiveOptions {
        model: config.voice.stt_model.clone(),
        language: config.voice.language.clone(),
        endpointing_ms: config.voice.endpointing_ms,
        ..LiveOptions::default()
    };

    let sink = player_launcher(&config.voice.player);
    if !sink.is_installed() {
        tracing::warn!(
            player = sink.program(),
            "audio player not found, replies will fail until it is installed"
        );
    }

    let services = Services {
        transcriber: Arc::new(DeepgramLive::new(deepgram_key(), live)?),
        generator: Arc::new(ChatCompletions::new(
            config.llm.base_url.clone(),
            SecretString::from(config.api_keys.llm.expose_secret().to_owned()),
            config.llm.model.clone(),
            config.llm.temperature,
            config.llm.system_prompt.clone(),
        )?),
        synthesizer: Arc::new(DeepgramSpeech::new(
            deepgram_key(),
            config.voice.tts_model.clone(),
            config.voice.tts_sample_rate,
        )?),
        sink: Arc::new(sink),
    };

    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let open_device: DeviceOpener = Box::new(|| {
        let microphone = Microphone::new(FRAME_LENGTH)?;
        Ok(AudioDevice::new(Box::new(microphone)))
    });

    tracing::info!(
        start = %config.keywords.start_phrase,
        stop = %config.keywords.stop_phrase,
        exit = %config.keywords.exit_phrase,
        "buddy ready"
    );

    let mut listener = WakeListener::new(
        open_device,
        Box::new(spotter),
        services,
        config.keywords.exit_phrase.clone(),
    );
    listener.run(&shutdown).await?;

    Ok(())
}

/// Build the sink launcher from a player command line
fn player_launcher(player: &str) -> ProcessLauncher {
    let mut parts = player.split_whitespace().map(ToString::to_string);
    match parts.next() {
        Some(program) if program != "ffplay" || player.trim() != "ffplay" => {
            ProcessLauncher::new(program, parts.collect())
        }
        _ => ProcessLauncher::ffplay(),
    }
}
